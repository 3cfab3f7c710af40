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

//! The blockchain event bus: a per-transaction-hash ephemeral queue the
//! confirmation listener polls and then tears down.

use crate::error::GatewayError;

use async_trait::async_trait;
use futures_lite::stream::StreamExt;
use lapin::options::{
    BasicConsumeOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};
use std::time::Duration;
use tokio::time::timeout;

/// A confirmation channel: one per transaction hash, torn down after use.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Waits up to `wait` for a confirmation sentinel on `hash`'s queue,
    /// then deletes the queue regardless of outcome.
    async fn await_confirmation(&self, hash: &str, wait: Duration) -> bool;
}

pub struct AmqpEventBus {
    connection: Connection,
}

impl AmqpEventBus {
    pub async fn connect(amqp_url: &str) -> Result<Self, GatewayError> {
        let amqp_url = crate::queue::normalize_amqp_url(amqp_url);
        let connection = Connection::connect(&amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        Ok(AmqpEventBus { connection })
    }
}

#[async_trait]
impl EventBus for AmqpEventBus {
    async fn await_confirmation(&self, hash: &str, wait: Duration) -> bool {
        let channel = match self.connection.create_channel().await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, hash, "failed to open event bus channel");
                return false;
            }
        };

        let declared = channel
            .queue_declare(
                hash,
                QueueDeclareOptions {
                    durable: false,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await;
        if let Err(e) = declared {
            tracing::error!(error = %e, hash, "failed to declare event bus queue");
            return false;
        }

        let consumer = channel
            .basic_consume(
                hash,
                "airanchor-gateway-listener",
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await;

        let arrived = match consumer {
            Ok(mut consumer) => matches!(timeout(wait, consumer.next()).await, Ok(Some(Ok(_)))),
            Err(e) => {
                tracing::error!(error = %e, hash, "failed to consume event bus queue");
                false
            }
        };

        if let Err(e) = channel
            .queue_delete(hash, QueueDeleteOptions::default())
            .await
        {
            tracing::warn!(error = %e, hash, "failed to delete event bus queue");
        }

        arrived
    }
}
