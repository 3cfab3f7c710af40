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

//! Submits batch lists to the validator over its binary ZeroMQ protocol
//! and parses the typed response.

use crate::error::GatewayError;

use async_trait::async_trait;
use protobuf::Message as ProtobufMessage;
use sawtooth_sdk::messages::client_batch_submit::{
    ClientBatchSubmitResponse, ClientBatchSubmitResponse_Status,
};
use sawtooth_sdk::messages::validator::{Message, Message_MessageType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Outcome of a validator submission: `Accepted` covers `OK` and any other
/// status name the validator may legitimately report; the two named
/// failures get their own variants because the dispatcher treats them
/// differently.
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(String),
    InvalidBatch,
    BackPressure,
}

/// The validator's binary batch-submission contract, split out as a trait
/// so the batch builder can be exercised against a fake validator in tests.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn submit(&self, batch_list_bytes: Vec<u8>) -> Result<SubmitOutcome, GatewayError>;
}

pub struct ValidatorClient {
    socket: Arc<Mutex<zmq::Socket>>,
    timeout: Duration,
}

impl ValidatorClient {
    /// Opens a persistent DEALER connection to the validator at `url`
    /// (e.g. `tcp://localhost:4004`), shared across every call to `submit`.
    pub fn new(url: &str) -> Result<Self, GatewayError> {
        let url = if url.starts_with("tcp://") {
            url.to_string()
        } else {
            format!("tcp://{}", url)
        };

        let context = zmq::Context::new();
        let socket = context
            .socket(zmq::DEALER)
            .map_err(|e| GatewayError::ValidatorTimeout.tap_log(&e))?;
        socket
            .connect(&url)
            .map_err(|e| GatewayError::ValidatorTimeout.tap_log(&e))?;

        Ok(ValidatorClient {
            socket: Arc::new(Mutex::new(socket)),
            timeout: Duration::from_secs(5),
        })
    }

}

#[async_trait]
impl Validator for ValidatorClient {
    /// Sends `batch_list_bytes` as a `CLIENT_BATCH_SUBMIT_REQUEST` and
    /// awaits the response within the 5s deadline.
    async fn submit(&self, batch_list_bytes: Vec<u8>) -> Result<SubmitOutcome, GatewayError> {
        let socket = self.socket.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let socket = socket.blocking_lock();
            submit_blocking(&socket, &batch_list_bytes, timeout)
        })
        .await
        .map_err(|_| GatewayError::ValidatorTimeout)?
    }
}

fn correlation_id() -> String {
    let mut bytes = [0u8; 16];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    hex::encode(bytes)
}

fn submit_blocking(
    socket: &zmq::Socket,
    batch_list_bytes: &[u8],
    timeout: Duration,
) -> Result<SubmitOutcome, GatewayError> {
    let correlation_id = correlation_id();

    let mut request = Message::new();
    request.set_message_type(Message_MessageType::CLIENT_BATCH_SUBMIT_REQUEST);
    request.set_correlation_id(correlation_id.clone());
    request.set_content(batch_list_bytes.to_vec());

    let request_bytes = request
        .write_to_bytes()
        .map_err(GatewayError::ProtobufError)?;

    socket
        .send(request_bytes, 0)
        .map_err(|_| GatewayError::ValidatorTimeout)?;

    let mut items = [socket.as_poll_item(zmq::POLLIN)];
    let ready = zmq::poll(&mut items, timeout.as_millis() as i64)
        .map_err(|_| GatewayError::ValidatorTimeout)?;
    if ready == 0 || !items[0].is_readable() {
        return Err(GatewayError::ValidatorTimeout);
    }

    let response_bytes = socket
        .recv_bytes(0)
        .map_err(|_| GatewayError::ValidatorTimeout)?;

    let response: Message =
        protobuf::parse_from_bytes(&response_bytes).map_err(GatewayError::ProtobufError)?;

    if response.get_correlation_id() != correlation_id {
        return Err(GatewayError::ValidatorTimeout);
    }

    let parsed: ClientBatchSubmitResponse =
        protobuf::parse_from_bytes(response.get_content()).map_err(GatewayError::ProtobufError)?;

    Ok(map_status(parsed.get_status()))
}

fn map_status(status: ClientBatchSubmitResponse_Status) -> SubmitOutcome {
    match status {
        ClientBatchSubmitResponse_Status::INVALID_BATCH => SubmitOutcome::InvalidBatch,
        ClientBatchSubmitResponse_Status::QUEUE_FULL => SubmitOutcome::BackPressure,
        other => SubmitOutcome::Accepted(format!("{:?}", other)),
    }
}

// Small helper so a `zmq::Error` can be folded into `GatewayError` while
// still being logged with its original detail; `ValidatorTimeout` is the
// closest-fit permanent kind for "the transport never came up".
trait TapLog {
    fn tap_log(self, err: &zmq::Error) -> Self;
}

impl TapLog for GatewayError {
    fn tap_log(self, err: &zmq::Error) -> Self {
        tracing::error!(error = %err, "validator transport error");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_invalid_batch() {
        assert_eq!(
            map_status(ClientBatchSubmitResponse_Status::INVALID_BATCH),
            SubmitOutcome::InvalidBatch
        );
    }

    #[test]
    fn maps_queue_full_to_back_pressure() {
        assert_eq!(
            map_status(ClientBatchSubmitResponse_Status::QUEUE_FULL),
            SubmitOutcome::BackPressure
        );
    }

    #[test]
    fn maps_ok_to_accepted() {
        match map_status(ClientBatchSubmitResponse_Status::OK) {
            SubmitOutcome::Accepted(_) => {}
            other => panic!("expected Accepted, got {:?}", other),
        }
    }
}
