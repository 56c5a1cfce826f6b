//  SPEC.rs
//    by Lut99
//
//  Created:
//    20 Jan 2025, 09:44:10
//  Last edited:
//    22 Jun 2026, 11:09:35
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the seams of the worker runtime: the host connection that
//!   delivers command batches, the auxiliary RPC channel, the data
//!   converter that marshals payloads and the construction-time options.
//

use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use specifications::commands::{ENCODING_JSON, Headers, METADATA_ENCODING, Payload};
use specifications::failures::Failure;

use crate::client::Client;
use crate::errors::{ConverterError, TickError};
use crate::queue::ResponseQueue;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn test_codec_kind_degrades_to_json() {
        assert_eq!(CodecKind::from_str("protobuf"), Ok(CodecKind::Protobuf));
        assert_eq!(CodecKind::from_str("json"), Ok(CodecKind::Json));
        // Unknown values must not raise
        assert_eq!(CodecKind::from_str("msgpack"), Ok(CodecKind::Json));
        assert_eq!(CodecKind::from_str(""), Ok(CodecKind::Json));
    }

    #[test]
    fn test_json_converter_roundtrip() {
        let converter: JsonConverter = JsonConverter;
        let value: Value = serde_json::json!({ "sum": -2, "name": "add" });

        let payload: Payload = converter.encode(&value).unwrap();
        assert_eq!(payload.metadata.get(METADATA_ENCODING).map(Vec::as_slice), Some(ENCODING_JSON.as_bytes()));
        assert_eq!(converter.decode(&payload).unwrap(), value);
    }

    #[test]
    fn test_json_converter_rejects_foreign_encoding() {
        let converter: JsonConverter = JsonConverter;
        let mut payload: Payload = Payload::new(b"xxxx".to_vec());
        payload.metadata.insert(METADATA_ENCODING.into(), b"binary/zstd".to_vec());
        assert!(matches!(converter.decode(&payload), Err(ConverterError::UnsupportedEncoding { .. })));
    }
}





/***** CONSTANTS *****/
/// The environment entry examined to select the batch codec.
pub const CODEC_ENV: &str = "RR_CODEC";





/***** AUXILLARY *****/
/// A single batch as delivered by the host: one frame of encoded commands plus the context
/// headers the host attached to it.
#[derive(Clone, Debug)]
pub struct Batch {
    /// The encoded commands of this batch.
    pub messages: Vec<u8>,
    /// The context headers the host attached to this batch.
    pub context:  Headers,
}



/// Selects which codec frames the command batches.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Frame batches as JSON arrays.
    Json,
    /// Frame batches as protobuf messages.
    Protobuf,
}
impl CodecKind {
    /// Reads the codec choice from the [`CODEC_ENV`] environment entry.
    ///
    /// # Returns
    /// [`CodecKind::Protobuf`] if the entry is `protobuf`; [`CodecKind::Json`] in every other
    /// case, including an absent entry. Unknown values degrade, they never raise.
    pub fn from_env() -> Self {
        match std::env::var(CODEC_ENV) {
            Ok(raw) if raw == "protobuf" => Self::Protobuf,
            Ok(raw) if raw == "json" || raw.is_empty() => Self::Json,
            Ok(raw) => {
                warn!("Unknown codec '{raw}' in '{CODEC_ENV}', falling back to JSON");
                Self::Json
            },
            Err(_) => Self::Json,
        }
    }
}
impl FromStr for CodecKind {
    type Err = std::convert::Infallible;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "protobuf" => Ok(Self::Protobuf),
            _ => Ok(Self::Json),
        }
    }
}



/// Collects the construction-time knobs of the worker factory.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct FactoryOptions {
    /// Overrides the codec choice; when absent, the [`CODEC_ENV`] environment entry decides.
    #[serde(default)]
    pub codec: Option<CodecKind>,
    /// Engages the legacy annotation reader next to the attribute reader.
    #[serde(default)]
    pub legacy_annotations: bool,
}
impl FactoryOptions {
    /// Resolves the effective codec choice of these options.
    ///
    /// # Returns
    /// The explicit override if one is set, or else the environment's choice.
    #[inline]
    pub fn resolve_codec(&self) -> CodecKind { self.codec.unwrap_or_else(CodecKind::from_env) }
}





/***** LIBRARY *****/
/// The boundary to the sidecar host that brokers traffic with the service.
///
/// The physical transport is none of the runtime's business; anything that can produce framed
/// batches will do. `wait_batch` may block (the tick loop has nothing else to do anyway).
#[async_trait]
pub trait HostConnection: Send {
    /// The error type of this particular transport.
    type Error: Error + Send + Sync + 'static;


    /// Blocks until the host delivers the next batch.
    ///
    /// # Returns
    /// The next [`Batch`], or [`None`] if the host signalled end-of-stream (which makes the tick
    /// loop return cleanly).
    ///
    /// # Errors
    /// This function may error if the transport broke down.
    async fn wait_batch(&mut self) -> Result<Option<Batch>, Self::Error>;

    /// Hands one encoded outbound batch to the host.
    ///
    /// # Arguments
    /// - `frame`: The encoded commands to send.
    ///
    /// # Errors
    /// This function may error if the transport broke down.
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), Self::Error>;

    /// Reports a tick failure to the host. The loop continues afterwards.
    ///
    /// # Arguments
    /// - `err`: The failure that aborted the current tick.
    ///
    /// # Errors
    /// This function may error if the transport broke down.
    async fn error(&mut self, err: &TickError) -> Result<(), Self::Error>;
}



/// The auxiliary request/response RPC channel used by activity handlers and the workflow-service
/// path. Shared by the whole factory; must be safe for serialized use by the tick thread.
pub trait RpcConnection: Send + Sync {
    /// Performs a single synchronous call.
    ///
    /// # Arguments
    /// - `method`: The remote method to call.
    /// - `params`: The already-marshalled parameters.
    ///
    /// # Returns
    /// The call's result payloads.
    ///
    /// # Errors
    /// This function errors if the remote side reports a failure.
    fn call(&self, method: &str, params: Vec<Payload>) -> Result<Vec<Payload>, Failure>;
}



/// Marshals values into payloads and back. User-provided; the runtime only assumes it is
/// deterministic for a given input.
pub trait DataConverter: Send + Sync {
    /// Writes a value as a payload.
    ///
    /// # Errors
    /// This function may error if the value cannot be represented.
    fn encode(&self, value: &Value) -> Result<Payload, ConverterError>;

    /// Reads a payload back into a value.
    ///
    /// # Errors
    /// This function may error if the payload is malformed or has a foreign encoding.
    fn decode(&self, payload: &Payload) -> Result<Value, ConverterError>;


    /// Convenience wrapper that encodes a slice of values in order.
    #[inline]
    fn encode_all(&self, values: &[Value]) -> Result<Vec<Payload>, ConverterError> { values.iter().map(|value| self.encode(value)).collect() }

    /// Convenience wrapper that decodes a slice of payloads in order.
    #[inline]
    fn decode_all(&self, payloads: &[Payload]) -> Result<Vec<Value>, ConverterError> { payloads.iter().map(|payload| self.decode(payload)).collect() }
}



/// The default [`DataConverter`], which writes values as plain JSON bytes.
#[derive(Clone, Copy, Debug)]
pub struct JsonConverter;
impl DataConverter for JsonConverter {
    fn encode(&self, value: &Value) -> Result<Payload, ConverterError> {
        let mut payload: Payload = Payload::new(serde_json::to_vec(value).map_err(|err| ConverterError::EncodeError { err })?);
        payload.metadata.insert(METADATA_ENCODING.into(), ENCODING_JSON.as_bytes().to_vec());
        Ok(payload)
    }

    fn decode(&self, payload: &Payload) -> Result<Value, ConverterError> {
        // Respect a foreign encoding announcement instead of producing garbage
        if let Some(encoding) = payload.metadata.get(METADATA_ENCODING) {
            if encoding.as_slice() != ENCODING_JSON.as_bytes() {
                return Err(ConverterError::UnsupportedEncoding { encoding: String::from_utf8_lossy(encoding).into() });
            }
        }
        serde_json::from_slice(&payload.data).map_err(|err| ConverterError::DecodeError { err })
    }
}



/// Bundles the shared facilities that travel down the dispatch path during one tick.
///
/// Handing these out per-dispatch (instead of wiring back-references into every component) is
/// what keeps the factory's ownership graph acyclic.
pub struct TickContext<'t> {
    /// The correlating client for outbound requests.
    pub client:    &'t mut Client,
    /// The queue that collects this tick's outbound commands.
    pub queue:     &'t mut ResponseQueue,
    /// The converter that marshals payloads.
    pub converter: &'t dyn DataConverter,
    /// The shared RPC channel handed to activity handlers.
    pub rpc:       &'t Arc<dyn RpcConnection>,
}
