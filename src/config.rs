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

//! Loads and validates every tunable and endpoint from the environment,
//! with command-line flags taking precedence where the CLI exposes them.

use crate::error::ConfigError;

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub token_bucket_rate: f64,
    pub token_bucket_capacity: f64,
    pub leaky_bucket_limit: u64,
    pub buffer_max_size: usize,
    pub private_key_file: Option<String>,
    pub validator_url: String,
    pub ca_api_url: String,
    pub rabbitmq_url: String,
    pub mongo_database_url: String,
    pub mongo_database: String,
    pub mongo_collection: String,
}

impl Config {
    /// Reads every tunable and endpoint from the environment, falling
    /// back to its default, then validates the numeric ones. A malformed
    /// value is a fatal startup error -- this never runs once a task has
    /// started.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token_bucket_rate = parse_env("TOKEN_BUCKET_RATE", "5")?;
        let token_bucket_capacity = parse_env("TOKEN_BUCKET_CAPACITY", "30")?;
        let leaky_bucket_limit = parse_env("LEAKY_BUCKET_LIMIT", "10")?;
        let buffer_max_size = parse_env("BUFFER_MAX_SIZE", "80")?;

        if token_bucket_rate <= 0.0 {
            return Err(ConfigError(
                "TOKEN_BUCKET_RATE must be a positive number".to_string(),
            ));
        }
        if token_bucket_capacity <= 0.0 {
            return Err(ConfigError(
                "TOKEN_BUCKET_CAPACITY must be a positive number".to_string(),
            ));
        }
        if buffer_max_size == 0 {
            return Err(ConfigError(
                "BUFFER_MAX_SIZE must be a positive integer".to_string(),
            ));
        }

        Ok(Config {
            token_bucket_rate,
            token_bucket_capacity,
            leaky_bucket_limit,
            buffer_max_size,
            private_key_file: env::var("PRIVATE_KEY_FILE").ok(),
            validator_url: env::var("SAWTOOTH_VALIDATOR_URL")
                .unwrap_or_else(|_| "tcp://localhost:4004".to_string()),
            ca_api_url: env::var("CA_API_URL").unwrap_or_else(|_| "localhost:8761".to_string()),
            rabbitmq_url: env::var("RABBITMQ_URL").unwrap_or_else(|_| "localhost".to_string()),
            mongo_database_url: env::var("MONGO_DATABASE_URL")
                .unwrap_or_else(|_| "localhost:27017".to_string()),
            mongo_database: env::var("MONGO_DATABASE").unwrap_or_else(|_| "AirAnchor".to_string()),
            mongo_collection: env::var("MONGO_COLLECTION")
                .unwrap_or_else(|_| "locations".to_string()),
        })
    }

    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(ref path) = overrides.private_key_file {
            self.private_key_file = Some(path.clone());
        }
        if let Some(ref url) = overrides.validator_url {
            self.validator_url = url.clone();
        }
        if let Some(ref url) = overrides.ca_api_url {
            self.ca_api_url = url.clone();
        }
        if let Some(ref url) = overrides.rabbitmq_url {
            self.rabbitmq_url = url.clone();
        }
        if let Some(ref url) = overrides.mongo_database_url {
            self.mongo_database_url = url.clone();
        }
    }
}

/// Flag-sourced overrides, applied over the loaded environment config.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub private_key_file: Option<String>,
    pub validator_url: Option<String>,
    pub ca_api_url: Option<String>,
    pub rabbitmq_url: Option<String>,
    pub mongo_database_url: Option<String>,
}

fn parse_env<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|_| ConfigError(format!("{} is not a valid value: {}", name, raw)))
}
