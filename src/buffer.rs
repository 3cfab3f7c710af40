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

//! Bounded FIFO staging area between the upstream consumer callback and the
//! dispatcher loop.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const ENQUEUE_TIMEOUT: Duration = Duration::from_millis(1200);

/// A drained message still carrying its upstream delivery tag.
pub struct StagedMessage {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
}

pub struct StagingBuffer {
    sender: mpsc::Sender<StagedMessage>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<StagedMessage>>,
}

impl StagingBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        StagingBuffer {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    /// Enqueues `message`, waiting up to 1.2s for room. Returns `false` on
    /// timeout, signalling the caller to reject-with-requeue upstream.
    pub async fn push(&self, message: StagedMessage) -> bool {
        timeout(ENQUEUE_TIMEOUT, self.sender.send(message))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    pub async fn len_hint(&self) -> usize {
        self.receiver.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len_hint().await == 0
    }

    /// Drains up to `max` messages in FIFO order without blocking beyond
    /// what is already buffered.
    pub async fn drain(&self, max: usize) -> Vec<StagedMessage> {
        let mut receiver = self.receiver.lock().await;
        let mut drained = Vec::with_capacity(max);
        while drained.len() < max {
            match receiver.try_recv() {
                Ok(message) => drained.push(message),
                Err(_) => break,
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_drain_preserves_fifo_order() {
        let buffer = StagingBuffer::new(10);
        for i in 0..5u64 {
            assert!(
                buffer
                    .push(StagedMessage {
                        delivery_tag: i,
                        body: vec![i as u8],
                    })
                    .await
            );
        }

        let drained = buffer.drain(5).await;
        let tags: Vec<u64> = drained.iter().map(|m| m.delivery_tag).collect();
        assert_eq!(tags, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn drain_respects_max_and_leaves_remainder() {
        let buffer = StagingBuffer::new(10);
        for i in 0..5u64 {
            buffer
                .push(StagedMessage {
                    delivery_tag: i,
                    body: vec![],
                })
                .await;
        }

        let first = buffer.drain(3).await;
        assert_eq!(first.len(), 3);
        assert_eq!(buffer.len_hint().await, 2);
    }

    #[tokio::test]
    async fn push_times_out_when_buffer_stays_full() {
        let buffer = StagingBuffer::new(1);
        assert!(
            buffer
                .push(StagedMessage {
                    delivery_tag: 0,
                    body: vec![],
                })
                .await
        );
        let second = buffer.push(StagedMessage {
            delivery_tag: 1,
            body: vec![],
        });
        assert!(!second.await);
    }
}
