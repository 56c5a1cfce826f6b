//  COMMANDS.rs
//    by Lut99
//
//  Created:
//    13 Jan 2025, 10:26:54
//  Last edited:
//    22 Jun 2026, 10:11:33
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the commands that are exchanged with the host: requests,
//!   which instruct the other side to do something, and responses, which
//!   resolve a prior request by id. Also defines the codec-agnostic wire
//!   shape of a command (see the `wire` module for the protobuf
//!   rendition).
//

use std::collections::BTreeMap;
use std::error;
use std::fmt::{Display, Formatter, Result as FResult};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn test_request_roundtrip() {
        let cmd: Command = Command::Request(
            Request::new(1, START_WORKFLOW)
                .with_payloads(vec![Payload { metadata: BTreeMap::new(), data: b"\"hello world\"".to_vec() }])
                .with_header(HEADER_TASK_QUEUE, "default")
                .with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into())),
        );

        let raw: String = serde_json::to_string(&cmd).unwrap();
        assert_eq!(serde_json::from_str::<Command>(&raw).unwrap(), cmd);
    }

    #[test]
    fn test_response_roundtrip() {
        let ok: Command = Command::Response(Response { id: 7, result: Ok(vec![Payload { metadata: BTreeMap::new(), data: b"42".to_vec() }]) });
        let raw: String = serde_json::to_string(&ok).unwrap();
        assert_eq!(serde_json::from_str::<Command>(&raw).unwrap(), ok);

        let err: Command = Command::Response(Response { id: 8, result: Err(crate::failures::Failure::not_found("no such queue")) });
        let raw: String = serde_json::to_string(&err).unwrap();
        assert_eq!(serde_json::from_str::<Command>(&raw).unwrap(), err);
    }

    #[test]
    fn test_empty_response_is_ok() {
        // A record without `command`, `payloads` or `failure` is an empty OK response
        let cmd: Command = serde_json::from_str("{\"id\":3}").unwrap();
        assert_eq!(cmd, Command::Response(Response { id: 3, result: Ok(vec![]) }));
    }

    #[test]
    fn test_request_with_failure_is_rejected() {
        let res: Result<Command, _> = serde_json::from_str("{\"id\":3,\"command\":\"StartWorkflow\",\"failure\":{\"kind\":\"NotFound\",\"message\":\"nope\"}}");
        assert!(res.is_err());
    }

    #[test]
    fn test_json_is_deterministic() {
        let mut header: Headers = BTreeMap::new();
        header.insert("zulu".into(), "1".into());
        header.insert("alpha".into(), "2".into());
        let cmd: Command = Command::Request(Request::new(5, GET_WORKER_INFO).with_headers(header));

        // BTreeMap-backed maps serialize in key order, every time
        let once: String = serde_json::to_string(&cmd).unwrap();
        let twice: String = serde_json::to_string(&cmd).unwrap();
        assert_eq!(once, twice);
        assert!(once.find("alpha").unwrap() < once.find("zulu").unwrap());
    }
}





/***** CONSTANTS *****/
/// The header key that routes a request to a specific worker.
pub const HEADER_TASK_QUEUE: &str = "taskQueue";

/// The metadata key on a [`Payload`] that names its encoding.
pub const METADATA_ENCODING: &str = "encoding";
/// The encoding written by the default JSON data converter.
pub const ENCODING_JSON: &str = "json/plain";

/// The option key carrying the user-chosen workflow id on start requests.
pub const OPT_WORKFLOW_ID: &str = "workflowID";
/// The option key carrying the host-assigned run id on start requests.
pub const OPT_RUN_ID: &str = "runID";
/// The option key naming the signal on signal (and signal-with-start) requests.
pub const OPT_SIGNAL_NAME: &str = "signalName";
/// The option key naming the query on query requests.
pub const OPT_QUERY_NAME: &str = "queryName";
/// The option key carrying the reason on terminate requests.
pub const OPT_REASON: &str = "reason";
/// The option key naming the workflow or activity type on start/invoke requests.
pub const OPT_NAME: &str = "name";
/// The option key carrying the duration, in milliseconds, on outbound timer requests.
pub const OPT_MS: &str = "ms";

/// Inbound request kind: create a new workflow execution.
pub const START_WORKFLOW: &str = "StartWorkflow";
/// Inbound request kind: deliver a signal into a running execution.
pub const SIGNAL_WORKFLOW: &str = "SignalWorkflow";
/// Inbound request kind: start an execution and deliver a first signal atomically.
pub const SIGNAL_WITH_START_WORKFLOW: &str = "SignalWithStartWorkflow";
/// Inbound request kind: synchronously read state from a running execution.
pub const QUERY_WORKFLOW: &str = "QueryWorkflow";
/// Inbound request kind: request cancellation of a running execution.
pub const CANCEL_WORKFLOW: &str = "CancelWorkflow";
/// Inbound request kind: forcibly terminate a running execution.
pub const TERMINATE_WORKFLOW: &str = "TerminateWorkflow";
/// Inbound request kind: finish the current run and start a successor run.
pub const CONTINUE_AS_NEW_WORKFLOW: &str = "ContinueAsNewWorkflow";
/// Inbound request kind: await the outcome of an execution.
pub const GET_WORKFLOW_RESULT: &str = "GetWorkflowResult";
/// Inbound request kind: invoke a registered activity.
pub const INVOKE_ACTIVITY: &str = "InvokeActivity";
/// Inbound request kind (factory-scoped): enumerate the registered workers.
pub const GET_WORKER_INFO: &str = "GetWorkerInfo";

/// Outbound request kind: ask the host to schedule an activity.
pub const EXECUTE_ACTIVITY: &str = "ExecuteActivity";
/// Outbound request kind: ask the host to start a timer.
pub const NEW_TIMER: &str = "NewTimer";





/***** HELPERS *****/
/// Serde glue that writes byte strings as base64.
mod b64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> { serializer.serialize_str(&STANDARD.encode(data)) }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw: String = String::deserialize(deserializer)?;
        STANDARD.decode(&raw).map_err(D::Error::custom)
    }
}

/// Serde glue that writes string-to-bytes maps with base64 values.
mod b64_map {
    use std::collections::BTreeMap;

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(map: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&String, String> = map.iter().map(|(k, v)| (k, STANDARD.encode(v))).collect();
        serde::Serialize::serialize(&encoded, serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded: BTreeMap<String, String> = BTreeMap::deserialize(deserializer)?;
        encoded.into_iter().map(|(k, v)| STANDARD.decode(&v).map(|v| (k, v)).map_err(D::Error::custom)).collect()
    }
}



/// The flat, codec-agnostic record that a [`Command`] is written as.
///
/// A record carrying `command` is a request; any other record resolves a prior request by `id`,
/// carrying either `failure` or (possibly empty) `payloads`.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct RawCommand {
    /// The correlation id of this command.
    id:       u64,
    /// The request kind, present on requests only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command:  Option<String>,
    /// Free-form, kind-specific options.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    options:  Map<String, Value>,
    /// The values carried by this command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    payloads: Vec<Payload>,
    /// Free-form routing / context metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    header:   Headers,
    /// The failure resolving a prior request, present on failure responses only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure:  Option<crate::failures::Failure>,
}

impl From<Command> for RawCommand {
    fn from(value: Command) -> Self {
        match value {
            Command::Request(Request { id, command, options, payloads, header }) => {
                Self { id, command: Some(command), options, payloads, header, failure: None }
            },
            Command::Response(Response { id, result }) => match result {
                Ok(payloads) => Self { id, command: None, options: Map::new(), payloads, header: Headers::new(), failure: None },
                Err(failure) => Self { id, command: None, options: Map::new(), payloads: vec![], header: Headers::new(), failure: Some(failure) },
            },
        }
    }
}
impl TryFrom<RawCommand> for Command {
    type Error = CommandParseError;

    fn try_from(value: RawCommand) -> Result<Self, Self::Error> {
        let RawCommand { id, command, options, payloads, header, failure } = value;
        match (command, failure) {
            (Some(command), None) => Ok(Self::Request(Request { id, command, options, payloads, header })),
            (None, Some(failure)) => Ok(Self::Response(Response { id, result: Err(failure) })),
            (None, None) => Ok(Self::Response(Response { id, result: Ok(payloads) })),
            (Some(command), Some(_)) => Err(CommandParseError::RequestWithFailure { id, command }),
        }
    }
}





/***** ERRORS *****/
/// Defines the errors that may occur when reading a wire record as a [`Command`].
#[derive(Debug)]
pub enum CommandParseError {
    /// The record carried both a request kind and a failure.
    RequestWithFailure { id: u64, command: String },
}
impl Display for CommandParseError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use CommandParseError::*;
        match self {
            RequestWithFailure { id, command } => write!(f, "Command {id} ('{command}') carries both a request kind and a failure"),
        }
    }
}
impl error::Error for CommandParseError {}





/***** LIBRARY *****/
/// The free-form string map that carries routing and context metadata on a command.
pub type Headers = BTreeMap<String, String>;



/// A single marshalled value.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Payload {
    /// Describes how `data` is encoded (see [`METADATA_ENCODING`]).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", with = "b64_map")]
    pub metadata: BTreeMap<String, Vec<u8>>,
    /// The encoded value itself.
    #[serde(with = "b64")]
    pub data:     Vec<u8>,
}

impl Payload {
    /// Constructor for a Payload without metadata.
    ///
    /// # Arguments
    /// - `data`: The already-encoded value bytes.
    ///
    /// # Returns
    /// A new Payload with empty metadata.
    #[inline]
    pub fn new(data: impl Into<Vec<u8>>) -> Self { Self { metadata: BTreeMap::new(), data: data.into() } }
}



/// An inbound or outbound instruction, to be resolved by a later [`Response`] with the same id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    /// The correlation id. Unique and monotonically increasing on each side of the wire.
    pub id:       u64,
    /// The request kind (e.g., [`START_WORKFLOW`]).
    pub command:  String,
    /// Free-form, kind-specific options.
    pub options:  Map<String, Value>,
    /// The values carried by this request.
    pub payloads: Vec<Payload>,
    /// Free-form routing / context metadata (e.g., [`HEADER_TASK_QUEUE`]).
    pub header:   Headers,
}

impl Request {
    /// Constructor for the Request.
    ///
    /// # Arguments
    /// - `id`: The correlation id of the new request.
    /// - `command`: The request kind.
    ///
    /// # Returns
    /// A new Request without payloads, options or headers.
    #[inline]
    pub fn new(id: u64, command: impl Into<String>) -> Self {
        Self { id, command: command.into(), options: Map::new(), payloads: vec![], header: Headers::new() }
    }

    /// Replaces the payloads of this Request.
    #[inline]
    pub fn with_payloads(mut self, payloads: Vec<Payload>) -> Self {
        self.payloads = payloads;
        self
    }

    /// Adds a single header entry to this Request.
    #[inline]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    /// Replaces the headers of this Request.
    #[inline]
    pub fn with_headers(mut self, header: Headers) -> Self {
        self.header = header;
        self
    }

    /// Adds a single option entry to this Request.
    #[inline]
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Reads a string-typed option.
    ///
    /// # Arguments
    /// - `key`: The option to read.
    ///
    /// # Returns
    /// The option's value, or [`None`] if it is absent or not a string.
    #[inline]
    pub fn opt_str(&self, key: &str) -> Option<&str> { self.options.get(key).and_then(Value::as_str) }

    /// Reads an unsigned integer-typed option.
    ///
    /// # Arguments
    /// - `key`: The option to read.
    ///
    /// # Returns
    /// The option's value, or [`None`] if it is absent or not an unsigned integer.
    #[inline]
    pub fn opt_u64(&self, key: &str) -> Option<u64> { self.options.get(key).and_then(Value::as_u64) }
}



/// The resolution of a prior [`Request`] on the same side of the wire, correlated by id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    /// The id of the request this response resolves.
    pub id:     u64,
    /// The produced values, or the failure that occurred instead.
    pub result: Result<Vec<Payload>, crate::failures::Failure>,
}



/// A single command crossing the host boundary.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(into = "RawCommand", try_from = "RawCommand")]
pub enum Command {
    /// An instruction for the other side.
    Request(Request),
    /// The resolution of a prior instruction from the other side.
    Response(Response),
}

impl Command {
    /// Returns the correlation id of this command, whichever variant it is.
    #[inline]
    pub fn id(&self) -> u64 {
        match self {
            Self::Request(req) => req.id,
            Self::Response(res) => res.id,
        }
    }

    /// Returns whether this command is a [`Command::Request`].
    #[inline]
    pub fn is_request(&self) -> bool { matches!(self, Self::Request(_)) }
}
