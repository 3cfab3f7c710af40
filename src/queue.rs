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

//! The upstream durable queue: consumed by the ingestion task, acked or
//! rejected by the dispatcher.

use crate::error::GatewayError;

use async_trait::async_trait;
use futures_lite::stream::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::mpsc;

pub const QUEUE_NAME: &str = "sawtooth";
const PREFETCH: u16 = 5;

/// Accepts a bare host (`localhost`, the configured default) or a full
/// `amqp://` URI and always returns a URI lapin can connect with.
pub(crate) fn normalize_amqp_url(url: &str) -> String {
    if url.starts_with("amqp://") || url.starts_with("amqps://") {
        url.to_string()
    } else {
        format!("amqp://{}", url)
    }
}

/// The ack/reject/multi-ack contract the dispatcher and buffer depend on.
/// Calls are safe to issue from any task; the AMQP implementation posts
/// them to the channel's owning connection internally.
#[async_trait]
pub trait UpstreamChannel: Send + Sync {
    async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), GatewayError>;
    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), GatewayError>;
}

pub struct AmqpUpstreamChannel {
    channel: Channel,
}

impl AmqpUpstreamChannel {
    pub async fn connect(amqp_url: &str) -> Result<Self, GatewayError> {
        let amqp_url = normalize_amqp_url(amqp_url);
        let connection =
            Connection::connect(&amqp_url, ConnectionProperties::default())
                .await
                .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        channel
            .basic_qos(PREFETCH, BasicQosOptions::default())
            .await
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        channel
            .queue_declare(
                QUEUE_NAME,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        Ok(AmqpUpstreamChannel { channel })
    }

    /// Starts consuming `sawtooth` and forwards each delivery's tag and body
    /// into `sink`, bounded-wait, as the ingestion task does.
    pub async fn consume_into(
        &self,
        sink: mpsc::Sender<(u64, Vec<u8>)>,
    ) -> Result<(), GatewayError> {
        let mut consumer = self
            .channel
            .basic_consume(
                QUEUE_NAME,
                "airanchor-gateway",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(error = %e, "upstream consumer error");
                    continue;
                }
            };
            if sink
                .send((delivery.delivery_tag, delivery.data.clone()))
                .await
                .is_err()
            {
                break;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl UpstreamChannel for AmqpUpstreamChannel {
    async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), GatewayError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple })
            .await
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), GatewayError> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))
    }
}
