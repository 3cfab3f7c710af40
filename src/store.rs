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

//! Persists a confirmation document per confirmed transaction.

use crate::error::GatewayError;

use async_trait::async_trait;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};

/// One record per confirmed transaction, keyed by the payload hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationDocument {
    pub sender: String,
    pub signer: String,
    pub ca: String,
    pub hash: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, document: ConfirmationDocument) -> Result<(), GatewayError>;
}

pub struct MongoDocumentStore {
    collection: Collection<ConfirmationDocument>,
}

impl MongoDocumentStore {
    pub async fn connect(
        database_url: &str,
        database: &str,
        collection: &str,
    ) -> Result<Self, GatewayError> {
        let uri = if database_url.starts_with("mongodb://") {
            database_url.to_string()
        } else {
            format!("mongodb://{}", database_url)
        };
        let client = Client::with_uri_str(&uri)
            .await
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let collection = client.database(database).collection(collection);
        Ok(MongoDocumentStore { collection })
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn create(&self, document: ConfirmationDocument) -> Result<(), GatewayError> {
        self.collection
            .insert_one(document, None)
            .await
            .map(|_| ())
            .map_err(|e| GatewayError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))
    }
}
