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

//! One independent task per submitted transaction: waits for a chain
//! confirmation and persists the record, or times out quietly.

use crate::batch_builder::SubmittedPayload;
use crate::eventbus::EventBus;
use crate::store::{ConfirmationDocument, DocumentStore};

use std::time::Duration;

const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Waits on `payload.hash`'s event queue and persists a confirmation
/// document if it arrives before the deadline. Never returns an error --
/// a timeout is logged and the task simply exits.
pub async fn listen(
    payload: SubmittedPayload,
    event_bus: &dyn EventBus,
    store: &dyn DocumentStore,
) {
    let confirmed = event_bus
        .await_confirmation(&payload.hash, CONFIRMATION_TIMEOUT)
        .await;

    if !confirmed {
        tracing::info!(hash = %payload.hash, "confirmation timed out");
        return;
    }

    let document = ConfirmationDocument {
        sender: payload.sender,
        signer: payload.signer,
        ca: String::new(),
        hash: payload.hash.clone(),
    };

    if let Err(e) = store.create(document).await {
        tracing::error!(error = %e, hash = %payload.hash, "failed to persist confirmation document");
    } else {
        tracing::info!(hash = %payload.hash, "confirmation persisted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeBus {
        arrives: bool,
    }

    #[async_trait]
    impl EventBus for FakeBus {
        async fn await_confirmation(&self, _hash: &str, _wait: Duration) -> bool {
            self.arrives
        }
    }

    struct RecordingStore {
        created: AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for RecordingStore {
        async fn create(&self, _document: ConfirmationDocument) -> Result<(), GatewayError> {
            self.created.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn persists_document_on_confirmation() {
        let bus = FakeBus { arrives: true };
        let store = RecordingStore {
            created: AtomicBool::new(false),
        };
        let payload = SubmittedPayload {
            hash: "h1".to_string(),
            sender: "sender".to_string(),
            signer: "signer".to_string(),
        };

        listen(payload, &bus, &store).await;

        assert!(store.created.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn skips_persistence_on_timeout() {
        let bus = FakeBus { arrives: false };
        let store = RecordingStore {
            created: AtomicBool::new(false),
        };
        let payload = SubmittedPayload {
            hash: "h1".to_string(),
            sender: "sender".to_string(),
            signer: "signer".to_string(),
        };

        listen(payload, &bus, &store).await;

        assert!(!store.created.load(Ordering::SeqCst));
    }
}
