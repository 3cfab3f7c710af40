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

//! Assembles signed `Transaction`/`Batch`/`BatchList` protobuf messages.
//!
//! The wire schema for these types is an external contract owned by the
//! validator (`sawtooth_sdk::messages`); this module only ever populates
//! fields, it never changes the schema.

use crate::addressing;
use crate::error::GatewayError;
use crate::signer::Signer;
use crate::wire::TransactionPayload;

use protobuf::{Message, RepeatedField};
use sawtooth_sdk::messages::batch::{Batch, BatchHeader, BatchList};
use sawtooth_sdk::messages::transaction::{Transaction, TransactionHeader};

/// Builds and signs one `Transaction` wrapping `payload`. The transaction's
/// signer-of-record is the batcher, not the original client -- only the
/// embedded `payload.sender_public_key` identifies the client.
pub fn build_transaction(
    payload: &TransactionPayload,
    payload_bytes: &[u8],
    payload_hash: &str,
    signer: &Signer,
) -> Result<Transaction, GatewayError> {
    let address = addressing::address(&payload.sender_public_key, payload_hash);
    let batcher_key = signer
        .public_key_hex()
        .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let mut txn_header = TransactionHeader::new();
    txn_header.set_family_name(String::from(addressing::FAMILY_NAME));
    txn_header.set_family_version(String::from(addressing::FAMILY_VERSION));
    txn_header.set_nonce(payload.nonce.clone());
    txn_header.set_signer_public_key(batcher_key.clone());
    txn_header.set_batcher_public_key(batcher_key);
    txn_header.set_inputs(RepeatedField::from_vec(vec![address.clone()]));
    txn_header.set_outputs(RepeatedField::from_vec(vec![address]));
    txn_header.set_payload_sha512(payload_hash.to_string());

    let txn_header_bytes = txn_header.write_to_bytes()?;
    let signature = signer
        .sign(&txn_header_bytes)
        .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let mut txn = Transaction::new();
    txn.set_payload(payload_bytes.to_vec());
    txn.set_header(txn_header_bytes);
    txn.set_header_signature(signature);

    Ok(txn)
}

/// Builds and signs one `Batch` carrying every transaction, in order.
/// `batch.header.transaction_ids` therefore lists the transactions'
/// header signatures in the same order they were assembled.
pub fn build_batch(transactions: Vec<Transaction>, signer: &Signer) -> Result<Batch, GatewayError> {
    let transaction_ids: Vec<String> = transactions
        .iter()
        .map(|t| t.header_signature.clone())
        .collect();

    let batcher_key = signer
        .public_key_hex()
        .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let mut batch_header = BatchHeader::new();
    batch_header.set_transaction_ids(RepeatedField::from_vec(transaction_ids));
    batch_header.set_signer_public_key(batcher_key);

    let batch_header_bytes = batch_header.write_to_bytes()?;
    let signature = signer
        .sign(&batch_header_bytes)
        .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let mut batch = Batch::new();
    batch.set_transactions(RepeatedField::from_vec(transactions));
    batch.set_header(batch_header_bytes);
    batch.set_header_signature(signature);

    Ok(batch)
}

/// Wraps a single batch in a `BatchList`, the unit the validator accepts.
pub fn build_batch_list(batch: Batch) -> BatchList {
    let mut batch_list = BatchList::new();
    batch_list.set_batches(RepeatedField::from_vec(vec![batch]));
    batch_list
}
