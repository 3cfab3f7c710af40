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

//! Wire types carried by the upstream queue and built by the batch builder.
//!
//! Everything here round-trips through CBOR: field order follows struct
//! declaration order, so `hash(serialize(payload))` is stable across
//! producers as required by the payload's immutability invariant.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Certificate signing request embedded in every upstream request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSigningRequest {
    pub distinguished_name: String,
    pub public_key: String,
    pub optional_params: Option<std::collections::BTreeMap<String, String>>,
}

/// The header a client signs over before submitting a `TransactionRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub sender_public_key: String,
    pub certificate_request: CertificateSigningRequest,
}

/// A single upstream message body: one client's request to be batched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub sender_public_key: String,
    pub header: RequestHeader,
    pub certificate_request: CertificateSigningRequest,
    pub signature: String,
    pub data: Vec<u8>,
}

impl TransactionRequest {
    pub fn serialize(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(bytes)
    }

    /// Bytes the client's `signature` was computed over.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(&self.header)
    }

    pub fn verify_signature(&self) -> bool {
        match self.signed_bytes() {
            Ok(bytes) => {
                crate::signer::Signer::verify(&bytes, &self.signature, &self.sender_public_key)
            }
            Err(_) => false,
        }
    }
}

/// The immutable, core-constructed payload carried inside a `Transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub certificate_request: CertificateSigningRequest,
    pub certificate_authority_signature: String,
    pub sender_public_key: String,
    pub nonce: String,
    pub data: Vec<u8>,
}

impl TransactionPayload {
    pub fn new(
        certificate_request: CertificateSigningRequest,
        certificate_authority_signature: String,
        sender_public_key: String,
        data: Vec<u8>,
    ) -> Self {
        let mut nonce_bytes = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut nonce_bytes);

        TransactionPayload {
            certificate_request,
            certificate_authority_signature,
            sender_public_key,
            nonce: hex::encode(nonce_bytes),
            data,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(bytes)
    }

    /// SHA-512 hex digest of the payload's canonical serialization. Stable
    /// for the lifetime of the payload since the payload is immutable.
    pub fn hash(&self) -> Result<String, serde_cbor::Error> {
        let bytes = self.serialize()?;
        let mut hasher = Sha512::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}
