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

//! Turns a drain of surviving upstream requests into one signed batch,
//! submits it, and hands back the payloads worth listening for.

use crate::ca_client::CertificateAuthority;
use crate::error::GatewayError;
use crate::signer::Signer;
use crate::transaction::{build_batch, build_batch_list, build_transaction};
use crate::validator_client::{SubmitOutcome, Validator};
use crate::wire::{TransactionPayload, TransactionRequest};

use protobuf::Message as ProtobufMessage;

/// One payload worth spawning a confirmation listener for, once its batch
/// has been accepted.
pub struct SubmittedPayload {
    pub hash: String,
    pub sender: String,
    pub signer: String,
}

/// Verifies signatures, obtains CA countersignatures, assembles and signs
/// the batch, and submits it. Requests with invalid signatures are dropped
/// silently; everything else either submits together or fails together.
pub async fn build_and_submit(
    requests: Vec<TransactionRequest>,
    signer: &Signer,
    ca: &dyn CertificateAuthority,
    validator: &dyn Validator,
) -> Result<Vec<SubmittedPayload>, GatewayError> {
    let surviving: Vec<TransactionRequest> = requests
        .into_iter()
        .filter(|r| {
            let ok = r.verify_signature();
            if !ok {
                let err = GatewayError::InvalidSignature;
                tracing::warn!(sender = %r.sender_public_key, error = %err, "dropping request");
            }
            ok
        })
        .collect();

    let mut transactions = Vec::with_capacity(surviving.len());
    let mut submitted = Vec::with_capacity(surviving.len());

    let batcher_key = signer
        .public_key_hex()
        .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    for request in surviving {
        let ca_signature = ca.sign_csr(&request.certificate_request).await?;

        let payload = TransactionPayload::new(
            request.certificate_request.clone(),
            ca_signature,
            request.sender_public_key.clone(),
            request.data.clone(),
        );
        let payload_bytes = payload
            .serialize()
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let payload_hash = payload
            .hash()
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        let transaction = build_transaction(&payload, &payload_bytes, &payload_hash, signer)?;

        submitted.push(SubmittedPayload {
            hash: payload_hash,
            sender: request.sender_public_key,
            signer: batcher_key.clone(),
        });
        transactions.push(transaction);
    }

    let batch = build_batch(transactions, signer)?;
    let batch_list = build_batch_list(batch);
    let batch_list_bytes = batch_list.write_to_bytes()?;

    match validator.submit(batch_list_bytes).await? {
        SubmitOutcome::Accepted(status) => {
            tracing::info!(status = %status, batch_size = submitted.len(), "batch accepted");
            Ok(submitted)
        }
        SubmitOutcome::InvalidBatch => Err(GatewayError::InvalidBatch(
            "validator rejected batch".to_string(),
        )),
        SubmitOutcome::BackPressure => Err(GatewayError::BackPressure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{CertificateSigningRequest, RequestHeader};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeCa {
        signature: String,
    }

    #[async_trait]
    impl CertificateAuthority for FakeCa {
        async fn sign_csr(&self, _csr: &CertificateSigningRequest) -> Result<String, GatewayError> {
            Ok(self.signature.clone())
        }
    }

    struct FailingCa;

    #[async_trait]
    impl CertificateAuthority for FailingCa {
        async fn sign_csr(&self, _csr: &CertificateSigningRequest) -> Result<String, GatewayError> {
            Err(GatewayError::CAUnavailable("down".to_string()))
        }
    }

    struct FakeValidator {
        outcome: Mutex<Option<SubmitOutcome>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Validator for FakeValidator {
        async fn submit(&self, _batch_list_bytes: Vec<u8>) -> Result<SubmitOutcome, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.lock().unwrap().take().unwrap())
        }
    }

    fn signed_request(signer: &Signer, valid: bool) -> TransactionRequest {
        let csr = CertificateSigningRequest {
            distinguished_name: "CN=test".to_string(),
            public_key: "02".to_string() + &"11".repeat(32),
            optional_params: None,
        };
        let sender_public_key = signer.public_key_hex().unwrap();
        let header = RequestHeader {
            sender_public_key: sender_public_key.clone(),
            certificate_request: csr.clone(),
        };
        let signed_bytes = serde_cbor::to_vec(&header).unwrap();
        let signature = if valid {
            signer.sign(&signed_bytes).unwrap()
        } else {
            "00".repeat(64)
        };

        TransactionRequest {
            sender_public_key,
            header,
            certificate_request: csr,
            signature,
            data: b"hello".to_vec(),
        }
    }

    #[tokio::test]
    async fn happy_path_submits_all_surviving_transactions_in_order() {
        let signer = Signer::new(None).unwrap();
        let requests = vec![
            signed_request(&signer, true),
            signed_request(&signer, true),
            signed_request(&signer, true),
        ];

        let ca = FakeCa {
            signature: "ca-sig".to_string(),
        };
        let validator = FakeValidator {
            outcome: Mutex::new(Some(SubmitOutcome::Accepted("OK".to_string()))),
            calls: AtomicUsize::new(0),
        };

        let submitted = build_and_submit(requests, &signer, &ca, &validator)
            .await
            .unwrap();

        assert_eq!(submitted.len(), 3);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_signature_is_dropped_but_others_still_submit() {
        let signer = Signer::new(None).unwrap();
        let requests = vec![
            signed_request(&signer, true),
            signed_request(&signer, false),
            signed_request(&signer, true),
        ];

        let ca = FakeCa {
            signature: "ca-sig".to_string(),
        };
        let validator = FakeValidator {
            outcome: Mutex::new(Some(SubmitOutcome::Accepted("OK".to_string()))),
            calls: AtomicUsize::new(0),
        };

        let submitted = build_and_submit(requests, &signer, &ca, &validator)
            .await
            .unwrap();

        assert_eq!(submitted.len(), 2);
    }

    #[tokio::test]
    async fn ca_failure_fails_the_whole_batch() {
        let signer = Signer::new(None).unwrap();
        let requests = vec![signed_request(&signer, true)];

        let ca = FailingCa;
        let validator = FakeValidator {
            outcome: Mutex::new(Some(SubmitOutcome::Accepted("OK".to_string()))),
            calls: AtomicUsize::new(0),
        };

        let result = build_and_submit(requests, &signer, &ca, &validator).await;
        assert!(matches!(result, Err(GatewayError::CAUnavailable(_))));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn back_pressure_is_surfaced_to_the_dispatcher() {
        let signer = Signer::new(None).unwrap();
        let requests = vec![signed_request(&signer, true)];

        let ca = FakeCa {
            signature: "ca-sig".to_string(),
        };
        let validator = FakeValidator {
            outcome: Mutex::new(Some(SubmitOutcome::BackPressure)),
            calls: AtomicUsize::new(0),
        };

        let result = build_and_submit(requests, &signer, &ca, &validator).await;
        assert!(matches!(result, Err(GatewayError::BackPressure)));
    }
}
