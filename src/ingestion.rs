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

//! Bridges the upstream consumer callback to the staging buffer: a bounded
//! wait on enqueue, and reject-with-requeue on timeout.

use crate::buffer::{StagedMessage, StagingBuffer};
use crate::error::GatewayError;
use crate::queue::UpstreamChannel;

use std::sync::Arc;
use tokio::sync::mpsc;

/// Pulls `(delivery_tag, body)` pairs off `deliveries` and stages each one,
/// requeueing upstream if the buffer stays full past its bounded wait.
pub async fn run(
    mut deliveries: mpsc::Receiver<(u64, Vec<u8>)>,
    buffer: Arc<StagingBuffer>,
    upstream: Arc<dyn UpstreamChannel>,
) {
    while let Some((delivery_tag, body)) = deliveries.recv().await {
        let staged = StagedMessage { delivery_tag, body };
        if !buffer.push(staged).await {
            let err = GatewayError::BufferFull;
            tracing::warn!(delivery_tag, error = %err, "requeueing upstream");
            if let Err(e) = upstream.reject(delivery_tag, true).await {
                tracing::error!(error = %e, delivery_tag, "failed to requeue upstream message");
            }
        }
    }
}
