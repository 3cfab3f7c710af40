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

//! Talks to the certificate authority that countersigns every CSR.

use crate::error::GatewayError;
use crate::wire::CertificateSigningRequest;

use async_trait::async_trait;
use reqwest::StatusCode;

/// The certificate authority's countersigning contract. Split out as a
/// trait so the batch builder can be exercised against a fake CA in tests.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    async fn sign_csr(&self, csr: &CertificateSigningRequest) -> Result<String, GatewayError>;
}

pub struct CAClient {
    base_url: String,
    client: reqwest::Client,
}

impl CAClient {
    pub fn new(base_url: &str) -> Self {
        let base_url = if base_url.starts_with("http://") || base_url.starts_with("https://") {
            base_url.to_string()
        } else {
            format!("http://{}", base_url)
        };

        CAClient {
            base_url,
            client: reqwest::Client::new(),
        }
    }

}

#[async_trait]
impl CertificateAuthority for CAClient {
    /// POSTs `csr` to `{base_url}/api/v1/sign` and returns the CA's opaque
    /// signature string, or a typed `GatewayError`.
    async fn sign_csr(&self, csr: &CertificateSigningRequest) -> Result<String, GatewayError> {
        let url = format!("{}/api/v1/sign", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(csr)
            .send()
            .await
            .map_err(|e| GatewayError::CAUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<String>()
                .await
                .map_err(|e| GatewayError::CAUnavailable(format!("malformed CA response: {}", e))),
            StatusCode::UNAUTHORIZED => Err(GatewayError::CAUnauthorized),
            other => Err(GatewayError::CAUnavailable(format!(
                "unexpected CA status: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_http_scheme() {
        let client = CAClient::new("localhost:8761");
        assert_eq!(client.base_url, "http://localhost:8761");
    }

    #[test]
    fn scheme_is_preserved_when_present() {
        let client = CAClient::new("https://ca.example.com");
        assert_eq!(client.base_url, "https://ca.example.com");
    }
}
