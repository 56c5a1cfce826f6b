//  WIRE.rs
//    by Lut99
//
//  Created:
//    14 Jan 2025, 11:50:08
//  Last edited:
//    04 May 2026, 14:20:17
//  Auto updated?
//    Yes
//
//  Description:
//!   Contains prost messages for the protobuf rendition of command
//!   batches, plus the conversions between the wire messages and the
//!   model types in [`crate::commands`].
//

use std::collections::BTreeMap;
use std::error;
use std::fmt::{Display, Formatter, Result as FResult};

use prost::Message;
use serde_json::{Map, Value};

use crate::commands;
use crate::failures;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Payload as ModelPayload, Request, Response, START_WORKFLOW};


    #[test]
    fn test_batch_roundtrip() {
        let batch: Vec<commands::Command> = vec![
            commands::Command::Request(
                Request::new(1, START_WORKFLOW)
                    .with_payloads(vec![ModelPayload::new(b"\"hello\"".to_vec())])
                    .with_header(commands::HEADER_TASK_QUEUE, "default")
                    .with_option(commands::OPT_WORKFLOW_ID, Value::String("wf-1".into())),
            ),
            commands::Command::Response(Response { id: 2, result: Ok(vec![]) }),
            commands::Command::Response(Response { id: 3, result: Err(failures::Failure::canceled("gone")) }),
        ];

        // Through the wire types and back
        let wire: CommandBatch =
            CommandBatch { commands: batch.iter().cloned().map(Command::try_from).collect::<Result<Vec<Command>, CommandConvertError>>().unwrap() };
        let bytes: Vec<u8> = wire.encode_to_vec();
        let back: CommandBatch = CommandBatch::decode(bytes.as_slice()).unwrap();
        let back: Vec<commands::Command> =
            back.commands.into_iter().map(commands::Command::try_from).collect::<Result<Vec<commands::Command>, CommandConvertError>>().unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let mut header: commands::Headers = BTreeMap::new();
        header.insert("zulu".into(), "1".into());
        header.insert("alpha".into(), "2".into());
        let cmd: Command = Command::try_from(commands::Command::Request(Request::new(9, START_WORKFLOW).with_headers(header))).unwrap();

        assert_eq!(cmd.encode_to_vec(), cmd.clone().encode_to_vec());
    }

    #[test]
    fn test_illegal_failure_kind() {
        let wire: Failure = Failure { kind: 1337, message: "??".into(), cause: None };
        assert!(matches!(failures::Failure::try_from(wire), Err(CommandConvertError::IllegalFailureKind { raw: 1337 })));
    }
}





/***** ERRORS *****/
/// Defines the errors occurring when converting between wire messages and model commands.
#[derive(Debug)]
pub enum CommandConvertError {
    /// The wire failure carried a kind discriminant outside the known set.
    IllegalFailureKind { raw: i32 },
    /// Failed to write the request options as JSON.
    OptionsSerialize { err: serde_json::Error },
    /// Failed to read the request options as JSON.
    OptionsDeserialize { err: serde_json::Error },
    /// The wire command carried both a request kind and a failure.
    RequestWithFailure { id: u64, command: String },
}
impl Display for CommandConvertError {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use CommandConvertError::*;
        match self {
            IllegalFailureKind { raw } => write!(f, "Unknown failure kind discriminant {raw} in wire failure"),
            OptionsSerialize { .. } => write!(f, "Failed to serialize request options"),
            OptionsDeserialize { .. } => write!(f, "Failed to deserialize request options"),
            RequestWithFailure { id, command } => write!(f, "Wire command {id} ('{command}') carries both a request kind and a failure"),
        }
    }
}
impl error::Error for CommandConvertError {
    #[inline]
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        use CommandConvertError::*;
        match self {
            IllegalFailureKind { .. } => None,
            OptionsSerialize { err } => Some(err),
            OptionsDeserialize { err } => Some(err),
            RequestWithFailure { .. } => None,
        }
    }
}





/***** MESSAGES *****/
/// Wire rendition of a [`commands::Payload`].
#[derive(Clone, Message)]
pub struct Payload {
    /// Describes how `data` is encoded.
    #[prost(btree_map = "string, bytes", tag = "1")]
    pub metadata: BTreeMap<String, Vec<u8>>,
    /// The encoded value itself.
    #[prost(bytes = "vec", tag = "2")]
    pub data:     Vec<u8>,
}

impl From<commands::Payload> for Payload {
    #[inline]
    fn from(value: commands::Payload) -> Self { Self { metadata: value.metadata, data: value.data } }
}
impl From<Payload> for commands::Payload {
    #[inline]
    fn from(value: Payload) -> Self { Self { metadata: value.metadata, data: value.data } }
}



/// Wire rendition of a [`failures::Failure`].
#[derive(Clone, Message)]
pub struct Failure {
    /// The category of this failure, as a [`failures::FailureKind`] discriminant.
    #[prost(enumeration = "crate::failures::FailureKind", tag = "1")]
    pub kind:    i32,
    /// A human-readable description of what went wrong.
    #[prost(string, tag = "2")]
    pub message: String,
    /// The failure that caused this one, if any.
    #[prost(message, optional, boxed, tag = "3")]
    pub cause:   Option<Box<Failure>>,
}

impl From<failures::Failure> for Failure {
    fn from(value: failures::Failure) -> Self {
        Self { kind: value.kind as i32, message: value.message, cause: value.cause.map(|cause| Box::new(Self::from(*cause))) }
    }
}
impl TryFrom<Failure> for failures::Failure {
    type Error = CommandConvertError;

    fn try_from(value: Failure) -> Result<Self, Self::Error> {
        let kind: failures::FailureKind =
            failures::FailureKind::try_from(value.kind).map_err(|_| CommandConvertError::IllegalFailureKind { raw: value.kind })?;
        let cause: Option<Box<failures::Failure>> = match value.cause {
            Some(cause) => Some(Box::new(Self::try_from(*cause)?)),
            None => None,
        };
        Ok(Self { kind, message: value.message, cause })
    }
}



/// Wire rendition of a [`commands::Command`].
///
/// A message carrying `command` is a request; any other message resolves a prior request by `id`,
/// carrying either `failure` or (possibly empty) `payloads`. Request options travel as JSON bytes
/// so that both codecs agree on their shape.
#[derive(Clone, Message)]
pub struct Command {
    /// The correlation id of this command.
    #[prost(uint64, tag = "1")]
    pub id:       u64,
    /// The request kind, present on requests only.
    #[prost(string, optional, tag = "2")]
    pub command:  Option<String>,
    /// Free-form, kind-specific options, as a JSON object (empty if there are none).
    #[prost(bytes = "vec", tag = "3")]
    pub options:  Vec<u8>,
    /// The values carried by this command.
    #[prost(message, repeated, tag = "4")]
    pub payloads: Vec<Payload>,
    /// Free-form routing / context metadata.
    #[prost(btree_map = "string, string", tag = "5")]
    pub header:   BTreeMap<String, String>,
    /// The failure resolving a prior request, present on failure responses only.
    #[prost(message, optional, tag = "6")]
    pub failure:  Option<Failure>,
}

impl TryFrom<commands::Command> for Command {
    type Error = CommandConvertError;

    fn try_from(value: commands::Command) -> Result<Self, Self::Error> {
        match value {
            commands::Command::Request(req) => {
                let options: Vec<u8> =
                    if req.options.is_empty() { vec![] } else { serde_json::to_vec(&req.options).map_err(|err| CommandConvertError::OptionsSerialize { err })? };
                Ok(Self {
                    id: req.id,
                    command: Some(req.command),
                    options,
                    payloads: req.payloads.into_iter().map(Payload::from).collect(),
                    header: req.header,
                    failure: None,
                })
            },

            commands::Command::Response(res) => match res.result {
                Ok(payloads) => Ok(Self {
                    id: res.id,
                    command: None,
                    options: vec![],
                    payloads: payloads.into_iter().map(Payload::from).collect(),
                    header: BTreeMap::new(),
                    failure: None,
                }),
                Err(failure) => {
                    Ok(Self { id: res.id, command: None, options: vec![], payloads: vec![], header: BTreeMap::new(), failure: Some(failure.into()) })
                },
            },
        }
    }
}
impl TryFrom<Command> for commands::Command {
    type Error = CommandConvertError;

    fn try_from(value: Command) -> Result<Self, Self::Error> {
        let Command { id, command, options, payloads, header, failure } = value;
        match (command, failure) {
            (Some(command), None) => {
                let options: Map<String, Value> =
                    if options.is_empty() { Map::new() } else { serde_json::from_slice(&options).map_err(|err| CommandConvertError::OptionsDeserialize { err })? };
                Ok(Self::Request(commands::Request { id, command, options, payloads: payloads.into_iter().map(commands::Payload::from).collect(), header }))
            },
            (None, Some(failure)) => Ok(Self::Response(commands::Response { id, result: Err(failures::Failure::try_from(failure)?) })),
            (None, None) => Ok(Self::Response(commands::Response { id, result: Ok(payloads.into_iter().map(commands::Payload::from).collect()) })),
            (Some(command), Some(_)) => Err(CommandConvertError::RequestWithFailure { id, command }),
        }
    }
}



/// A whole tick's worth of commands, framed as a single message.
#[derive(Clone, Message)]
pub struct CommandBatch {
    /// The commands of this batch, in delivery order.
    #[prost(message, repeated, tag = "1")]
    pub commands: Vec<Command>,
}
