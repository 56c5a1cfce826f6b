//  CODEC.rs
//    by Lut99
//
//  Created:
//    21 Jan 2025, 10:40:19
//  Last edited:
//    22 Jun 2026, 11:21:14
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the codec layer that frames command batches on the host
//!   boundary. Two codecs exist, JSON and protobuf; both preserve command
//!   order and produce deterministic bytes for a given input.
//

use prost::Message as _;
use specifications::commands::Command;
use specifications::wire;

pub use crate::errors::CodecError as Error;
use crate::spec::CodecKind;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use specifications::commands::{HEADER_TASK_QUEUE, OPT_WORKFLOW_ID, Payload, Request, Response, START_WORKFLOW};
    use specifications::failures::Failure;

    use super::*;


    /// Builds a batch that exercises every command shape.
    fn example_batch() -> Vec<Command> {
        vec![
            Command::Request(
                Request::new(1, START_WORKFLOW)
                    .with_payloads(vec![Payload::new(b"\"hello world\"".to_vec())])
                    .with_header(HEADER_TASK_QUEUE, "default")
                    .with_option(OPT_WORKFLOW_ID, serde_json::Value::String("wf-1".into())),
            ),
            Command::Response(Response { id: 2, result: Ok(vec![Payload::new(b"-1".to_vec())]) }),
            Command::Response(Response { id: 3, result: Err(Failure::illegal_state("not running")) }),
            Command::Response(Response { id: 4, result: Ok(vec![]) }),
        ]
    }

    #[test]
    fn test_json_roundtrip() {
        let codec: JsonCodec = JsonCodec;
        let batch: Vec<Command> = example_batch();
        assert_eq!(codec.decode(&codec.encode(&batch).unwrap()).unwrap(), batch);
    }

    #[test]
    fn test_proto_roundtrip() {
        let codec: ProtoCodec = ProtoCodec;
        let batch: Vec<Command> = example_batch();
        assert_eq!(codec.decode(&codec.encode(&batch).unwrap()).unwrap(), batch);
    }

    #[test]
    fn test_both_codecs_are_deterministic() {
        let batch: Vec<Command> = example_batch();
        for codec in [&JsonCodec as &dyn Codec, &ProtoCodec as &dyn Codec] {
            assert_eq!(codec.encode(&batch).unwrap(), codec.encode(&batch).unwrap());
        }
    }

    #[test]
    fn test_empty_batch() {
        for codec in [&JsonCodec as &dyn Codec, &ProtoCodec as &dyn Codec] {
            let frame: Vec<u8> = codec.encode(&[]).unwrap();
            assert!(codec.decode(&frame).unwrap().is_empty());
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(JsonCodec.decode(b"}{ not json"), Err(Error::JsonDeserializeError { .. })));
        assert!(matches!(ProtoCodec.decode(&[0xFF, 0xFF, 0xFF, 0xFF]), Err(Error::ProtoDeserializeError { .. })));
    }
}





/***** LIBRARY *****/
/// Frames command batches as bytes and back.
///
/// Implementations must preserve command order and must produce deterministic output for a given
/// input batch (the replay guarantees of the runtime hinge on it).
pub trait Codec: Send {
    /// Reads one frame into its command sequence.
    ///
    /// # Arguments
    /// - `raw`: The frame as received from the host.
    ///
    /// # Returns
    /// The commands of the frame, in delivery order.
    ///
    /// # Errors
    /// This function may error if the frame is malformed.
    fn decode(&self, raw: &[u8]) -> Result<Vec<Command>, Error>;

    /// Writes a command sequence as one frame.
    ///
    /// # Arguments
    /// - `commands`: The commands to frame, in production order.
    ///
    /// # Returns
    /// The frame to hand to the host.
    ///
    /// # Errors
    /// This function may error if a command cannot be represented.
    fn encode(&self, commands: &[Command]) -> Result<Vec<u8>, Error>;
}

/// Resolves a [`CodecKind`] to its codec.
///
/// # Arguments
/// - `kind`: The configured [`CodecKind`].
///
/// # Returns
/// A boxed [`Codec`] implementing that framing.
#[inline]
pub fn codec_for(kind: CodecKind) -> Box<dyn Codec> {
    match kind {
        CodecKind::Json => Box::new(JsonCodec),
        CodecKind::Protobuf => Box::new(ProtoCodec),
    }
}



/// The JSON codec: a frame is a JSON array of flat command records.
#[derive(Clone, Copy, Debug)]
pub struct JsonCodec;
impl Codec for JsonCodec {
    fn decode(&self, raw: &[u8]) -> Result<Vec<Command>, Error> {
        serde_json::from_slice(raw).map_err(|err| Error::JsonDeserializeError { err })
    }

    fn encode(&self, commands: &[Command]) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(commands).map_err(|err| Error::JsonSerializeError { err })
    }
}



/// The protobuf codec: a frame is a single encoded [`wire::CommandBatch`] message.
#[derive(Clone, Copy, Debug)]
pub struct ProtoCodec;
impl Codec for ProtoCodec {
    fn decode(&self, raw: &[u8]) -> Result<Vec<Command>, Error> {
        let batch: wire::CommandBatch = wire::CommandBatch::decode(raw).map_err(|err| Error::ProtoDeserializeError { err })?;
        batch.commands.into_iter().map(|cmd| Command::try_from(cmd).map_err(|err| Error::ConvertError { err })).collect()
    }

    fn encode(&self, commands: &[Command]) -> Result<Vec<u8>, Error> {
        let commands: Vec<wire::Command> =
            commands.iter().cloned().map(|cmd| wire::Command::try_from(cmd).map_err(|err| Error::ConvertError { err })).collect::<Result<Vec<wire::Command>, Error>>()?;
        Ok(wire::CommandBatch { commands }.encode_to_vec())
    }
}
