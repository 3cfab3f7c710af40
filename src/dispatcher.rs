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

//! The scheduler: gates the staging buffer behind the two-stage rate
//! limiter, hands drains to the batch builder, and settles upstream
//! acknowledgement.

use crate::batch_builder::build_and_submit;
use crate::buffer::StagingBuffer;
use crate::ca_client::CertificateAuthority;
use crate::confirmation;
use crate::error::GatewayError;
use crate::eventbus::EventBus;
use crate::queue::UpstreamChannel;
use crate::ratelimit::{LeakyBucket, TokenBucket};
use crate::signer::Signer;
use crate::store::DocumentStore;
use crate::validator_client::Validator;
use crate::wire::TransactionRequest;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const EMPTY_BUFFER_POLL: Duration = Duration::from_millis(200);
const TOKEN_BUCKET_POLL: Duration = Duration::from_millis(50);

pub struct Dispatcher {
    buffer: Arc<StagingBuffer>,
    token_bucket: TokenBucket,
    leaky_bucket: LeakyBucket,
    upstream: Arc<dyn UpstreamChannel>,
    signer: Arc<Signer>,
    ca: Arc<dyn CertificateAuthority>,
    validator: Arc<dyn Validator>,
    event_bus: Arc<dyn EventBus>,
    store: Arc<dyn DocumentStore>,
}

impl Dispatcher {
    pub fn new(
        buffer: Arc<StagingBuffer>,
        token_bucket_capacity: f64,
        token_bucket_rate: f64,
        leaky_bucket_limit: u64,
        upstream: Arc<dyn UpstreamChannel>,
        signer: Arc<Signer>,
        ca: Arc<dyn CertificateAuthority>,
        validator: Arc<dyn Validator>,
        event_bus: Arc<dyn EventBus>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Dispatcher {
            buffer,
            token_bucket: TokenBucket::new(token_bucket_capacity, token_bucket_rate),
            leaky_bucket: LeakyBucket::new(leaky_bucket_limit),
            upstream,
            signer,
            ca,
            validator,
            event_bus,
            store,
        }
    }

    /// Runs the drain loop forever. Intended to be spawned as its
    /// own task and cancelled at shutdown between iterations.
    pub async fn run(mut self) {
        loop {
            self.drain_once().await;
        }
    }

    async fn drain_once(&mut self) {
        while self.buffer.is_empty().await {
            sleep(EMPTY_BUFFER_POLL).await;
        }

        let size = self.buffer.len_hint().await;
        if size == 0 {
            return;
        }
        while !self.token_bucket.consume(size as f64).await {
            sleep(TOKEN_BUCKET_POLL).await;
        }

        let allowance = self.leaky_bucket.release(size as u64);
        let drained = self.buffer.drain(allowance as usize).await;
        if drained.is_empty() {
            return;
        }

        let mut survivors = Vec::with_capacity(drained.len());
        for message in &drained {
            match TransactionRequest::deserialize(&message.body) {
                Ok(request) => survivors.push(request),
                Err(e) => {
                    let err = GatewayError::MalformedRequest(e.to_string());
                    tracing::warn!(delivery_tag = message.delivery_tag, error = %err, "rejecting");
                    let _ = self.upstream.reject(message.delivery_tag, false).await;
                }
            }
        }

        if survivors.is_empty() {
            return;
        }

        let last_tag = drained.last().unwrap().delivery_tag;
        let batch_size = survivors.len();

        match build_and_submit(survivors, &self.signer, self.ca.as_ref(), self.validator.as_ref())
            .await
        {
            Ok(submitted) => {
                tracing::info!(batch_size, "batch submitted");
                if let Err(e) = self.upstream.ack(last_tag, true).await {
                    tracing::error!(error = %e, "failed to ack upstream batch");
                }
                for payload in submitted {
                    let event_bus = self.event_bus.clone();
                    let store = self.store.clone();
                    tokio::spawn(async move {
                        confirmation::listen(payload, event_bus.as_ref(), store.as_ref()).await;
                    });
                }
            }
            Err(e) if e.is_back_pressure() => {
                tracing::warn!(batch_size, "validator signalled back pressure, requeueing");
                for message in &drained {
                    let _ = self.upstream.reject(message.delivery_tag, true).await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, batch_size, "batch failed, rejecting without requeue");
                for message in &drained {
                    let _ = self.upstream.reject(message.delivery_tag, false).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::StagedMessage;
    use crate::error::GatewayError;
    use crate::store::ConfirmationDocument;
    use crate::validator_client::SubmitOutcome;
    use crate::wire::{CertificateSigningRequest, RequestHeader};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordingUpstream {
        acked: StdMutex<Vec<(u64, bool)>>,
        rejected: StdMutex<Vec<(u64, bool)>>,
    }

    impl RecordingUpstream {
        fn new() -> Self {
            RecordingUpstream {
                acked: StdMutex::new(Vec::new()),
                rejected: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl UpstreamChannel for RecordingUpstream {
        async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), GatewayError> {
            self.acked.lock().unwrap().push((delivery_tag, multiple));
            Ok(())
        }

        async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), GatewayError> {
            self.rejected.lock().unwrap().push((delivery_tag, requeue));
            Ok(())
        }
    }

    struct FakeCa;

    #[async_trait]
    impl CertificateAuthority for FakeCa {
        async fn sign_csr(&self, _csr: &CertificateSigningRequest) -> Result<String, GatewayError> {
            Ok("ca-sig".to_string())
        }
    }

    struct FakeValidator {
        outcome: SubmitOutcome,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Validator for FakeValidator {
        async fn submit(&self, _batch_list_bytes: Vec<u8>) -> Result<SubmitOutcome, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match &self.outcome {
                SubmitOutcome::Accepted(s) => SubmitOutcome::Accepted(s.clone()),
                SubmitOutcome::InvalidBatch => SubmitOutcome::InvalidBatch,
                SubmitOutcome::BackPressure => SubmitOutcome::BackPressure,
            })
        }
    }

    struct NullEventBus;

    #[async_trait]
    impl EventBus for NullEventBus {
        async fn await_confirmation(&self, _hash: &str, _wait: Duration) -> bool {
            false
        }
    }

    struct NullStore;

    #[async_trait]
    impl DocumentStore for NullStore {
        async fn create(&self, _document: ConfirmationDocument) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn signed_request(signer: &Signer) -> TransactionRequest {
        let csr = CertificateSigningRequest {
            distinguished_name: "CN=test".to_string(),
            public_key: "02".to_string() + &"22".repeat(32),
            optional_params: None,
        };
        let sender_public_key = signer.public_key_hex().unwrap();
        let header = RequestHeader {
            sender_public_key: sender_public_key.clone(),
            certificate_request: csr.clone(),
        };
        let signed_bytes = serde_cbor::to_vec(&header).unwrap();
        let signature = signer.sign(&signed_bytes).unwrap();

        TransactionRequest {
            sender_public_key,
            header,
            certificate_request: csr,
            signature,
            data: b"hello".to_vec(),
        }
    }

    #[tokio::test]
    async fn happy_path_multi_acks_last_tag() {
        let signer = Arc::new(Signer::new(None).unwrap());
        let buffer = Arc::new(StagingBuffer::new(10));
        for tag in 1..=3u64 {
            let body = signed_request(&signer).serialize().unwrap();
            buffer.push(StagedMessage { delivery_tag: tag, body }).await;
        }

        let upstream = Arc::new(RecordingUpstream::new());
        let validator = Arc::new(FakeValidator {
            outcome: SubmitOutcome::Accepted("OK".to_string()),
            calls: AtomicUsize::new(0),
        });

        let mut dispatcher = Dispatcher::new(
            buffer,
            30.0,
            5.0,
            10,
            upstream.clone(),
            signer,
            Arc::new(FakeCa),
            validator.clone(),
            Arc::new(NullEventBus),
            Arc::new(NullStore),
        );

        dispatcher.drain_once().await;

        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(upstream.acked.lock().unwrap().as_slice(), &[(3, true)]);
        assert!(upstream.rejected.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_message_is_rejected_without_requeue() {
        let signer = Arc::new(Signer::new(None).unwrap());
        let buffer = Arc::new(StagingBuffer::new(10));
        buffer
            .push(StagedMessage {
                delivery_tag: 1,
                body: b"not cbor".to_vec(),
            })
            .await;

        let upstream = Arc::new(RecordingUpstream::new());
        let validator = Arc::new(FakeValidator {
            outcome: SubmitOutcome::Accepted("OK".to_string()),
            calls: AtomicUsize::new(0),
        });

        let mut dispatcher = Dispatcher::new(
            buffer,
            30.0,
            5.0,
            10,
            upstream.clone(),
            signer,
            Arc::new(FakeCa),
            validator.clone(),
            Arc::new(NullEventBus),
            Arc::new(NullStore),
        );

        dispatcher.drain_once().await;

        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(upstream.rejected.lock().unwrap().as_slice(), &[(1, false)]);
    }

    #[tokio::test]
    async fn back_pressure_requeues_the_whole_drain() {
        let signer = Arc::new(Signer::new(None).unwrap());
        let buffer = Arc::new(StagingBuffer::new(10));
        for tag in 1..=2u64 {
            let body = signed_request(&signer).serialize().unwrap();
            buffer.push(StagedMessage { delivery_tag: tag, body }).await;
        }

        let upstream = Arc::new(RecordingUpstream::new());
        let validator = Arc::new(FakeValidator {
            outcome: SubmitOutcome::BackPressure,
            calls: AtomicUsize::new(0),
        });

        let mut dispatcher = Dispatcher::new(
            buffer,
            30.0,
            5.0,
            10,
            upstream.clone(),
            signer,
            Arc::new(FakeCa),
            validator,
            Arc::new(NullEventBus),
            Arc::new(NullStore),
        );

        dispatcher.drain_once().await;

        let rejected = upstream.rejected.lock().unwrap();
        assert_eq!(rejected.as_slice(), &[(1, true), (2, true)]);
    }
}
