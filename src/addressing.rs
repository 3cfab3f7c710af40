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

//! Derives the state addresses this transaction family reads and writes.

use sha2::{Digest, Sha512};

pub const FAMILY_NAME: &str = "AirAnchor";
pub const FAMILY_VERSION: &str = "1.0";

fn sha512_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Address prefix shared by every state entry this family writes:
/// `sha512(FAMILY_NAME)[0:6]`.
fn family_prefix() -> String {
    sha512_hex(FAMILY_NAME.as_bytes())[..6].to_string()
}

/// The 12-char query prefix for a given sender key: family prefix plus the
/// first 6 hex chars of the sender's public key. Only used for state
/// queries, never on the ingestion path.
pub fn key_prefix(sender_public_key_hex: &str) -> String {
    format!("{}{}", family_prefix(), &sender_public_key_hex[..6])
}

/// The full 70-hex-char state address for a (sender, payload-hash) pair:
/// `sha512(FAMILY_NAME)[0:6] ++ sender_public_key[0:6] ++ payload_hash[-58:]`.
///
/// The slice boundaries are an external contract with every other
/// transaction family sharing this address space -- any other split yields
/// an incompatible namespace.
pub fn address(sender_public_key_hex: &str, payload_hash_hex: &str) -> String {
    let suffix_start = payload_hash_hex.len() - 58;
    format!(
        "{}{}",
        key_prefix(sender_public_key_hex),
        &payload_hash_hex[suffix_start..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_seventy_hex_chars() {
        let sender = "02".to_string() + &"ab".repeat(32);
        let payload_hash = "11".repeat(64);
        let addr = address(&sender, &payload_hash);

        assert_eq!(addr.len(), 70);
        assert!(addr.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn address_uses_exact_slice_boundaries() {
        let sender = "02".to_string() + &"ab".repeat(32);
        let payload_hash = "11".repeat(64);
        let addr = address(&sender, &payload_hash);

        let expected_prefix = family_prefix();
        assert_eq!(&addr[..6], expected_prefix);
        assert_eq!(&addr[6..12], &sender[..6]);
        assert_eq!(&addr[12..], &payload_hash[payload_hash.len() - 58..]);
    }

    #[test]
    fn key_prefix_is_twelve_hex_chars() {
        let sender = "03".to_string() + &"cd".repeat(32);
        let prefix = key_prefix(&sender);

        assert_eq!(prefix.len(), 12);
    }

    #[test]
    fn family_prefix_is_deterministic() {
        assert_eq!(family_prefix(), family_prefix());
        assert_eq!(family_prefix().len(), 6);
    }
}
