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

//! Contains the error kinds this gateway distinguishes and their sources.

use sawtooth_sdk::signing;
use std::borrow::Borrow;
use std::error::Error as StdError;

/// Every error a running gateway can encounter, scoped to a message, a
/// batch, or a listener -- never to the whole process.
#[derive(Debug)]
pub enum GatewayError {
    /// The upstream message body did not decode as a `TransactionRequest`.
    MalformedRequest(String),
    /// The client signature over the request header did not verify.
    InvalidSignature,
    /// The CA returned a non-2xx status other than 401, or was unreachable.
    CAUnavailable(String),
    /// The CA returned 401.
    CAUnauthorized,
    /// The validator did not respond within the RPC deadline.
    ValidatorTimeout,
    /// The validator rejected the batch as malformed.
    InvalidBatch(String),
    /// The validator reported `QUEUE_FULL`; the batch should be requeued.
    BackPressure,
    /// The staging buffer did not have room within the enqueue deadline.
    BufferFull,
    ProtobufError(protobuf::ProtobufError),
    SigningError(signing::Error),
    IoError(std::io::Error),
}

impl StdError for GatewayError {
    fn cause(&self) -> Option<&dyn StdError> {
        match *self {
            GatewayError::ProtobufError(ref err) => Some(err.borrow()),
            GatewayError::SigningError(ref err) => Some(err.borrow()),
            GatewayError::IoError(ref err) => Some(err.borrow()),
            _ => None,
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            GatewayError::MalformedRequest(ref s) => write!(f, "MalformedRequest: {}", s),
            GatewayError::InvalidSignature => write!(f, "InvalidSignature"),
            GatewayError::CAUnavailable(ref s) => write!(f, "CAUnavailable: {}", s),
            GatewayError::CAUnauthorized => write!(f, "CAUnauthorized"),
            GatewayError::ValidatorTimeout => write!(f, "ValidatorTimeout"),
            GatewayError::InvalidBatch(ref s) => write!(f, "InvalidBatch: {}", s),
            GatewayError::BackPressure => write!(f, "BackPressure"),
            GatewayError::BufferFull => write!(f, "BufferFull"),
            GatewayError::ProtobufError(ref err) => write!(f, "ProtobufError: {}", err),
            GatewayError::SigningError(ref err) => write!(f, "SigningError: {}", err),
            GatewayError::IoError(ref err) => write!(f, "IoError: {}", err),
        }
    }
}

impl From<protobuf::ProtobufError> for GatewayError {
    fn from(e: protobuf::ProtobufError) -> Self {
        GatewayError::ProtobufError(e)
    }
}

impl From<signing::Error> for GatewayError {
    fn from(e: signing::Error) -> Self {
        GatewayError::SigningError(e)
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::IoError(e)
    }
}

impl GatewayError {
    /// Whether the drained upstream messages should be requeued (transient)
    /// rather than dropped (permanent).
    pub fn is_back_pressure(&self) -> bool {
        matches!(self, GatewayError::BackPressure)
    }
}

/// Startup-time configuration error: a malformed or missing environment
/// variable. Unlike `GatewayError`, this aborts the process before any task
/// starts -- there's nothing sensible to run with a broken configuration.
#[derive(Debug)]
pub struct ConfigError(pub String);

impl StdError for ConfigError {}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "ConfigError: {}", self.0)
    }
}

/// Startup-time error reading or parsing the batcher's private key file.
#[derive(Debug)]
pub struct SigningKeyError(pub String);

impl StdError for SigningKeyError {}

impl std::fmt::Display for SigningKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "SigningKeyError: {}", self.0)
    }
}
