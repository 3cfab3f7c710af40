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

//! Holds the batcher's secp256k1 identity and signs bytes with it.
//!
//! The gateway's signer is distinct from any client's: it signs every
//! transaction and batch header as the "batcher of record", never the
//! original sender.

use crate::error::SigningKeyError;

use sawtooth_sdk::signing;
use std::fs;

pub struct Signer {
    context: Box<dyn signing::Context>,
    private_key: Box<dyn signing::PrivateKey>,
}

impl Signer {
    /// Loads a signer from a hex-encoded private key file, or generates a
    /// fresh one if `key_path` is `None`.
    pub fn new(key_path: Option<&str>) -> Result<Self, SigningKeyError> {
        let context = signing::create_context("secp256k1")
            .map_err(|e| SigningKeyError(format!("failed to create secp256k1 context: {}", e)))?;

        let private_key: Box<dyn signing::PrivateKey> = match key_path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .map_err(|e| SigningKeyError(format!("failed to read {}: {}", path, e)))?;
                let key_hex = contents.trim();
                Box::new(
                    signing::secp256k1::Secp256k1PrivateKey::from_hex(key_hex).map_err(|e| {
                        SigningKeyError(format!("malformed private key in {}: {}", path, e))
                    })?,
                )
            }
            None => context.new_random_private_key().map_err(|e| {
                SigningKeyError(format!("failed to generate a random private key: {}", e))
            })?,
        };

        Ok(Signer {
            context,
            private_key,
        })
    }

    pub fn sign(&self, message: &[u8]) -> Result<String, SigningKeyError> {
        let factory = signing::CryptoFactory::new(self.context.as_ref());
        factory
            .new_signer(self.private_key.as_ref())
            .sign(message)
            .map_err(|e| SigningKeyError(format!("signing failed: {}", e)))
    }

    pub fn public_key_hex(&self) -> Result<String, SigningKeyError> {
        let factory = signing::CryptoFactory::new(self.context.as_ref());
        factory
            .new_signer(self.private_key.as_ref())
            .get_public_key()
            .map(|pk| pk.as_hex())
            .map_err(|e| SigningKeyError(format!("failed to derive public key: {}", e)))
    }

    /// Verifies a signature produced by a client over `message` under
    /// `public_key_hex`. Used only to check incoming requests -- never on
    /// the gateway's own signatures.
    pub fn verify(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
        let context = match signing::create_context("secp256k1") {
            Ok(c) => c,
            Err(_) => return false,
        };
        let public_key = match signing::secp256k1::Secp256k1PublicKey::from_hex(public_key_hex) {
            Ok(k) => k,
            Err(_) => return false,
        };
        context
            .verify(signature_hex, message, &public_key)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Signer(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_signer_signs_and_verifies() {
        let signer = Signer::new(None).expect("failed to create signer");
        let message = b"air anchor gateway";
        let signature = signer.sign(message).expect("failed to sign");
        let pub_key = signer.public_key_hex().expect("failed to get pub key");

        assert!(Signer::verify(message, &signature, &pub_key));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let signer = Signer::new(None).expect("failed to create signer");
        let signature = signer.sign(b"original").expect("failed to sign");
        let pub_key = signer.public_key_hex().expect("failed to get pub key");

        assert!(!Signer::verify(b"tampered", &signature, &pub_key));
    }

    #[test]
    fn loading_from_file_matches_hex_key() {
        let dir = std::env::temp_dir();
        let path = dir.join("airanchor_test_signer_key.priv");

        let context = signing::create_context("secp256k1").unwrap();
        let key = context.new_random_private_key().unwrap();
        std::fs::write(&path, key.as_hex()).unwrap();

        let signer = Signer::new(Some(path.to_str().unwrap())).expect("failed to load key");
        assert_eq!(signer.public_key_hex().unwrap().len(), 66);

        std::fs::remove_file(&path).ok();
    }
}
