// Copyright 2018 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#[macro_use]
extern crate clap;

mod addressing;
mod batch_builder;
mod buffer;
mod ca_client;
mod confirmation;
mod config;
mod dispatcher;
mod error;
mod eventbus;
mod ingestion;
mod queue;
mod ratelimit;
mod signer;
mod store;
mod transaction;
mod validator_client;
mod wire;

use ca_client::CAClient;
use config::CliOverrides;
use dispatcher::Dispatcher;
use eventbus::AmqpEventBus;
use queue::AmqpUpstreamChannel;
use signer::Signer;
use store::MongoDocumentStore;
use validator_client::ValidatorClient;

use clap::ArgMatches;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    init_logging();

    let args = parse_args();
    let overrides = CliOverrides {
        private_key_file: args.value_of("key").map(String::from),
        validator_url: args.value_of("validator_url").map(String::from),
        ca_api_url: args.value_of("ca_url").map(String::from),
        rabbitmq_url: args.value_of("amqp_url").map(String::from),
        mongo_database_url: args.value_of("mongo_url").map(String::from),
    };

    let mut config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    };
    config.apply_overrides(&overrides);

    let signer = match Signer::new(config.private_key_file.as_deref()) {
        Ok(signer) => Arc::new(signer),
        Err(e) => {
            eprintln!("signing key error: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(public_key = %signer.public_key_hex().unwrap_or_default(), "batcher identity ready");

    let upstream = match AmqpUpstreamChannel::connect(&config.rabbitmq_url).await {
        Ok(channel) => Arc::new(channel),
        Err(e) => {
            eprintln!("failed to connect to upstream queue: {}", e);
            std::process::exit(1);
        }
    };
    let event_bus = match AmqpEventBus::connect(&config.rabbitmq_url).await {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            eprintln!("failed to connect to event bus: {}", e);
            std::process::exit(1);
        }
    };
    let store = match MongoDocumentStore::connect(
        &config.mongo_database_url,
        &config.mongo_database,
        &config.mongo_collection,
    )
    .await
    {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("failed to connect to document store: {}", e);
            std::process::exit(1);
        }
    };
    let ca = Arc::new(CAClient::new(&config.ca_api_url));
    let validator = match ValidatorClient::new(&config.validator_url) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("failed to connect to validator: {}", e);
            std::process::exit(1);
        }
    };

    let buffer = Arc::new(buffer::StagingBuffer::new(config.buffer_max_size));
    let (delivery_tx, delivery_rx) = mpsc::channel(config.buffer_max_size);

    let ingestion_upstream = upstream.clone();
    let ingestion_buffer = buffer.clone();
    let ingestion_handle = tokio::spawn(async move {
        ingestion::run(delivery_rx, ingestion_buffer, ingestion_upstream).await;
    });

    let consume_upstream = upstream.clone();
    let consume_handle = tokio::spawn(async move {
        if let Err(e) = consume_upstream.consume_into(delivery_tx).await {
            tracing::error!(error = %e, "upstream consumer exited");
        }
    });

    let dispatcher = Dispatcher::new(
        buffer,
        config.token_bucket_capacity,
        config.token_bucket_rate,
        config.leaky_bucket_limit,
        upstream,
        signer,
        ca,
        validator,
        event_bus,
        store,
    );
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, draining in-flight work");
        }
        _ = dispatcher_handle => {
            tracing::error!("dispatcher task exited unexpectedly");
        }
        _ = consume_handle => {
            tracing::error!("upstream consumer task exited unexpectedly");
        }
        _ = ingestion_handle => {
            tracing::error!("ingestion task exited unexpectedly");
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();
}

fn parse_args<'a>() -> ArgMatches<'a> {
    let app = clap_app!(airanchor_gatewayd =>
        (name: APP_NAME)
        (version: VERSION)
        (about: "Rate-limited transaction batching gateway in front of a Sawtooth validator")
        (@arg key: -k --key +takes_value "Path to the batcher's secp256k1 private key file")
        (@arg validator_url: --("validator-url") +takes_value "Validator binary RPC endpoint")
        (@arg ca_url: --("ca-url") +takes_value "Certificate authority base URL")
        (@arg amqp_url: --("amqp-url") +takes_value "AMQP broker URL for the upstream queue and event bus")
        (@arg mongo_url: --("mongo-url") +takes_value "MongoDB connection host")
    );
    app.get_matches()
}
