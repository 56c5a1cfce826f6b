//  ERRORS.rs
//    by Lut99
//
//  Created:
//    20 Jan 2025, 09:15:26
//  Last edited:
//    22 Jun 2026, 11:03:48
//  Auto updated?
//    Yes
//
//  Description:
//!   Contains errors used within the `weft-wrk` crate only.
//

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FResult};

use weft_shr::identifier::{Identifier, IdentifierParseError};


/***** ERRORS *****/
/// Defines errors that relate to the data converter.
#[derive(Debug)]
pub enum ConverterError {
    /// Failed to write a value as payload bytes.
    EncodeError { err: serde_json::Error },
    /// Failed to read payload bytes as a value.
    DecodeError { err: serde_json::Error },
    /// The payload announced an encoding this converter does not speak.
    UnsupportedEncoding { encoding: String },
}
impl Display for ConverterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ConverterError::*;
        match self {
            EncodeError { .. } => write!(f, "Failed to encode value to payload"),
            DecodeError { .. } => write!(f, "Failed to decode payload to value"),
            UnsupportedEncoding { encoding } => write!(f, "Payload has unsupported encoding '{encoding}'"),
        }
    }
}
impl Error for ConverterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use ConverterError::*;
        match self {
            EncodeError { err } => Some(err),
            DecodeError { err } => Some(err),
            UnsupportedEncoding { .. } => None,
        }
    }
}



/// Defines errors that relate to encoding/decoding command batches.
#[derive(Debug)]
pub enum CodecError {
    /// Failed to write a batch as JSON.
    JsonSerializeError { err: serde_json::Error },
    /// Failed to read a batch as JSON.
    JsonDeserializeError { err: serde_json::Error },
    /// Failed to read a batch as a protobuf message.
    ProtoDeserializeError { err: prost::DecodeError },
    /// Failed to convert between wire messages and model commands.
    ConvertError { err: specifications::wire::CommandConvertError },
}
impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use CodecError::*;
        match self {
            JsonSerializeError { .. } => write!(f, "Failed to serialize command batch to JSON"),
            JsonDeserializeError { .. } => write!(f, "Failed to deserialize command batch from JSON"),
            ProtoDeserializeError { .. } => write!(f, "Failed to deserialize command batch from protobuf"),
            ConvertError { .. } => write!(f, "Failed to convert wire command batch"),
        }
    }
}
impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use CodecError::*;
        match self {
            JsonSerializeError { err } => Some(err),
            JsonDeserializeError { err } => Some(err),
            ProtoDeserializeError { err } => Some(err),
            ConvertError { err } => Some(err),
        }
    }
}



/// Defines errors that relate to the correlating client.
#[derive(Debug)]
pub enum ClientError {
    /// An inbound response did not match any pending slot.
    UnknownResponse { id: u64 },
}
impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ClientError::*;
        match self {
            UnknownResponse { id } => write!(f, "Inbound response {id} does not match any pending outbound request"),
        }
    }
}
impl Error for ClientError {}



/// Defines errors that relate to the task-queue registry.
#[derive(Debug)]
pub enum RegistryError {
    /// A worker was registered for a task queue that already has one.
    DuplicateQueue { name: Identifier },
}
impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use RegistryError::*;
        match self {
            DuplicateQueue { name } => write!(f, "A worker is already registered for task queue '{name}'"),
        }
    }
}
impl Error for RegistryError {}



/// Defines errors that relate to the metadata reader.
#[derive(Debug)]
pub enum ReaderError {
    /// The type metadata carried no workflow/activity marker at all.
    NoHandlers { type_name: String },
    /// The same handler name was declared twice on one type.
    DuplicateHandler { type_name: String, name: String },
    /// A handler attribute carried an empty name argument.
    EmptyName { type_name: String, member: String },
}
impl Display for ReaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use ReaderError::*;
        match self {
            NoHandlers { type_name } => write!(f, "Type '{type_name}' does not declare any workflow or activity handlers"),
            DuplicateHandler { type_name, name } => write!(f, "Type '{type_name}' declares handler '{name}' more than once"),
            EmptyName { type_name, member } => write!(f, "Handler attribute on '{type_name}::{member}' has an empty name argument"),
        }
    }
}
impl Error for ReaderError {}



/// Defines errors that relate to a single worker's handler tables.
#[derive(Debug)]
pub enum WorkerError {
    /// A handler was registered under a name that is not a legal identifier.
    IllegalName { raw: String, err: IdentifierParseError },
    /// A workflow type was registered twice.
    DuplicateWorkflow { queue: Identifier, name: Identifier },
    /// An activity type was registered twice.
    DuplicateActivity { queue: Identifier, name: Identifier },
    /// Reading type metadata failed during described registration.
    ReadError { type_name: String, err: ReaderError },
    /// The described type did not declare a workflow handler.
    NoWorkflowHandler { type_name: String },
    /// The described type did not declare an activity handler.
    NoActivityHandler { type_name: String },
}
impl Display for WorkerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use WorkerError::*;
        match self {
            IllegalName { raw, .. } => write!(f, "Cannot register handler under illegal name '{raw}'"),
            DuplicateWorkflow { queue, name } => write!(f, "Workflow type '{name}' is already registered with task queue '{queue}'"),
            DuplicateActivity { queue, name } => write!(f, "Activity type '{name}' is already registered with task queue '{queue}'"),
            ReadError { type_name, .. } => write!(f, "Failed to read handler metadata of type '{type_name}'"),
            NoWorkflowHandler { type_name } => write!(f, "Type '{type_name}' does not declare a workflow handler"),
            NoActivityHandler { type_name } => write!(f, "Type '{type_name}' does not declare an activity handler"),
        }
    }
}
impl Error for WorkerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use WorkerError::*;
        match self {
            IllegalName { err, .. } => Some(err),
            DuplicateWorkflow { .. } => None,
            DuplicateActivity { .. } => None,
            ReadError { err, .. } => Some(err),
            NoWorkflowHandler { .. } => None,
            NoActivityHandler { .. } => None,
        }
    }
}



/// Defines the failures that abort a single tick. These are caught at the batch boundary,
/// reported to the host and do not terminate the loop.
#[derive(Debug)]
pub enum TickError {
    /// Failed to decode the inbound batch.
    DecodeError { err: CodecError },
    /// Failed to encode the outbound batch.
    EncodeError { err: CodecError },
    /// An inbound response violated the correlation protocol.
    ProtocolError { err: ClientError },
    /// Failed to hand the encoded outbound batch to the host.
    SendError { err: Box<dyn Error + Send + Sync> },
}
impl Display for TickError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use TickError::*;
        match self {
            DecodeError { .. } => write!(f, "Failed to decode inbound command batch"),
            EncodeError { .. } => write!(f, "Failed to encode outbound command batch"),
            ProtocolError { .. } => write!(f, "Inbound command batch violates the correlation protocol"),
            SendError { .. } => write!(f, "Failed to send outbound command batch to the host"),
        }
    }
}
impl Error for TickError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use TickError::*;
        match self {
            DecodeError { err } => Some(err),
            EncodeError { err } => Some(err),
            ProtocolError { err } => Some(err),
            SendError { err } => Some(&**err),
        }
    }
}



/// Defines errors that relate to the worker factory itself.
#[derive(Debug)]
pub enum FactoryError {
    /// A task queue name was not a legal identifier.
    IllegalQueueName { raw: String, err: IdentifierParseError },
    /// A worker was registered for a task queue that already has one.
    DuplicateQueue { err: RegistryError },
    /// Worker registration was attempted while the loop is running.
    RegisterWhileRunning { name: String },
    /// Failed to receive the next batch from the host.
    HostRecvError { err: Box<dyn Error + Send + Sync> },
}
impl Display for FactoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use FactoryError::*;
        match self {
            IllegalQueueName { raw, .. } => write!(f, "Cannot create worker for illegal task queue name '{raw}'"),
            DuplicateQueue { .. } => write!(f, "Cannot create worker for duplicate task queue"),
            RegisterWhileRunning { name } => write!(f, "Cannot create worker for task queue '{name}' while the tick loop is running"),
            HostRecvError { .. } => write!(f, "Failed to receive next batch from the host"),
        }
    }
}
impl Error for FactoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use FactoryError::*;
        match self {
            IllegalQueueName { err, .. } => Some(err),
            DuplicateQueue { err } => Some(err),
            RegisterWhileRunning { .. } => None,
            HostRecvError { err } => Some(&**err),
        }
    }
}
