//  DUMMY.rs
//    by Lut99
//
//  Created:
//    28 Jan 2025, 13:41:26
//  Last edited:
//    22 Jun 2026, 12:10:05
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines test doubles for the runtime: a scripted host connection, a
//!   recording RPC channel, an owning tick bench and the sample workflows
//!   and activities the scenario tests drive.
//

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use specifications::commands::{Command, Headers, Payload};
use specifications::failures::Failure;

use crate::client::Client;
use crate::codec::{Codec, JsonCodec};
use crate::execution::{Flow, Workflow, WorkflowContext};
use crate::queue::ResponseQueue;
use crate::reader::{Attribute, Describe, TypeInfo};
use crate::spec::{Batch, DataConverter, HostConnection, JsonConverter, RpcConnection, TickContext};
use crate::worker::{Activity, ActivityContext};


/***** LIBRARY *****/
/// An owning bundle of the per-tick facilities, so tests can borrow a fresh [`TickContext`]
/// without wiring a whole factory.
pub struct DummyTick {
    /// The correlating client.
    pub client:    Client,
    /// The outbound queue.
    pub queue:     ResponseQueue,
    /// The default JSON converter.
    pub converter: JsonConverter,
    /// A recording RPC channel.
    pub rpc:       Arc<dyn RpcConnection>,
}
impl DummyTick {
    /// Constructor for the DummyTick.
    #[inline]
    pub fn new() -> Self { Self { client: Client::new(), queue: ResponseQueue::new(), converter: JsonConverter, rpc: Arc::new(DummyRpc::new()) } }

    /// Borrows this bench as a [`TickContext`].
    #[inline]
    pub fn ctx(&mut self) -> TickContext { TickContext { client: &mut self.client, queue: &mut self.queue, converter: &self.converter, rpc: &self.rpc } }
}
impl Default for DummyTick {
    #[inline]
    fn default() -> Self { Self::new() }
}



/// A scripted [`HostConnection`]: hands out pre-encoded batches in order, records every frame
/// and every reported tick failure, and signals end-of-stream when the script runs dry.
pub struct DummyHost {
    /// The batches still to deliver.
    batches: VecDeque<Batch>,
    /// The raw frames the runtime sent, in order.
    pub sent:   Vec<Vec<u8>>,
    /// The tick failures the runtime reported, rendered.
    pub errors: Vec<String>,
    /// The codec used to (de)frame batches on this side.
    codec:   Box<dyn Codec>,
}
impl DummyHost {
    /// Constructor for the DummyHost, speaking JSON.
    #[inline]
    pub fn new() -> Self { Self { batches: VecDeque::new(), sent: Vec::new(), errors: Vec::new(), codec: Box::new(JsonCodec) } }

    /// Replaces the codec this host frames batches with.
    #[inline]
    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Scripts one batch of commands, without context headers.
    #[inline]
    pub fn push_batch(&mut self, commands: &[Command]) { self.push_batch_with_context(Headers::new(), commands) }

    /// Scripts one batch of commands with the given context headers.
    pub fn push_batch_with_context(&mut self, context: Headers, commands: &[Command]) {
        let messages: Vec<u8> = self.codec.encode(commands).expect("scripted batch must encode");
        self.batches.push_back(Batch { messages, context });
    }

    /// Scripts one batch of raw bytes, for feeding the runtime garbage.
    #[inline]
    pub fn push_raw(&mut self, messages: Vec<u8>) { self.batches.push_back(Batch { messages, context: Headers::new() }); }

    /// Decodes the `index`th frame the runtime sent.
    pub fn sent_commands(&self, index: usize) -> Vec<Command> { self.codec.decode(&self.sent[index]).expect("sent frame must decode") }

    /// Decodes every frame the runtime sent, flattened in send order.
    pub fn all_sent_commands(&self) -> Vec<Command> { (0..self.sent.len()).flat_map(|index| self.sent_commands(index)).collect() }
}
impl Default for DummyHost {
    #[inline]
    fn default() -> Self { Self::new() }
}
#[async_trait]
impl HostConnection for DummyHost {
    type Error = Infallible;

    async fn wait_batch(&mut self) -> Result<Option<Batch>, Self::Error> { Ok(self.batches.pop_front()) }

    async fn send(&mut self, frame: Vec<u8>) -> Result<(), Self::Error> {
        self.sent.push(frame);
        Ok(())
    }

    async fn error(&mut self, err: &crate::errors::TickError) -> Result<(), Self::Error> {
        self.errors.push(err.to_string());
        Ok(())
    }
}



/// A recording [`RpcConnection`] that echoes its parameters back.
pub struct DummyRpc {
    /// The methods called so far, in order.
    pub calls: Mutex<Vec<String>>,
}
impl DummyRpc {
    /// Constructor for the DummyRpc.
    #[inline]
    pub fn new() -> Self { Self { calls: Mutex::new(Vec::new()) } }
}
impl Default for DummyRpc {
    #[inline]
    fn default() -> Self { Self::new() }
}
impl RpcConnection for DummyRpc {
    fn call(&self, method: &str, params: Vec<Payload>) -> Result<Vec<Payload>, Failure> {
        self.calls.lock().expect("dummy rpc mutex poisoned").push(method.into());
        Ok(params)
    }
}



/// The simplest possible workflow: completes immediately with its (single, string) input
/// upper-cased.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleWorkflow;
impl Workflow for SimpleWorkflow {
    fn start(&mut self, _ctx: &mut WorkflowContext, input: Vec<Value>) -> Result<Flow, Failure> {
        match input.first() {
            Some(Value::String(raw)) => Ok(Flow::Complete(Value::String(raw.to_uppercase()))),
            _ => Err(Failure::invalid_argument("SimpleWorkflow expects a single string argument")),
        }
    }
}
impl Describe for SimpleWorkflow {
    fn type_info() -> TypeInfo { TypeInfo::new("SimpleWorkflow").with_attr(Attribute::new("workflow", None)) }
}



/// A workflow that sleeps on a host timer and sums every `add` signal it receives in the
/// meantime; the timer resolving completes it with the sum.
#[derive(Debug, Default)]
pub struct SimpleSignalledWorkflowWithSleep {
    /// The running sum, seeded by the first input value.
    sum:   i64,
    /// The id of the timer request once issued.
    timer: Option<u64>,
}
impl SimpleSignalledWorkflowWithSleep {
    /// How long the workflow asks the host to sleep.
    pub const SLEEP_MS: u64 = 100;
}
impl Workflow for SimpleSignalledWorkflowWithSleep {
    fn start(&mut self, ctx: &mut WorkflowContext, input: Vec<Value>) -> Result<Flow, Failure> {
        self.sum = input.first().and_then(Value::as_i64).unwrap_or(0);
        self.timer = Some(ctx.new_timer(Self::SLEEP_MS));
        Ok(Flow::Pending)
    }

    fn signal(&mut self, _ctx: &mut WorkflowContext, name: &str, args: Vec<Value>) -> Result<Flow, Failure> {
        match name {
            "add" => {
                self.sum += args.first().and_then(Value::as_i64).unwrap_or(0);
                Ok(Flow::Pending)
            },
            unknown => Err(Failure::not_implemented(format!("Signal '{unknown}' is not implemented by SimpleSignalledWorkflowWithSleep"))),
        }
    }

    fn query(&self, name: &str, _args: Vec<Value>) -> Result<Value, Failure> {
        match name {
            "sum" => Ok(json!(self.sum)),
            unknown => Err(Failure::not_implemented(format!("Query '{unknown}' is not implemented by SimpleSignalledWorkflowWithSleep"))),
        }
    }

    fn resume(&mut self, _ctx: &mut WorkflowContext, request: u64, result: Result<Vec<Value>, Failure>) -> Result<Flow, Failure> {
        // A cancelled timer cancels the workflow
        match result {
            Ok(_) if self.timer == Some(request) => Ok(Flow::Complete(json!(self.sum))),
            Ok(_) => Ok(Flow::Pending),
            Err(failure) => Err(failure),
        }
    }
}



/// A workflow that delegates its whole job to the `Uppercase` activity and completes with the
/// activity's result.
#[derive(Debug, Default)]
pub struct RelayWorkflow;
impl Workflow for RelayWorkflow {
    fn start(&mut self, ctx: &mut WorkflowContext, input: Vec<Value>) -> Result<Flow, Failure> {
        ctx.execute_activity("Uppercase", &input)?;
        Ok(Flow::Pending)
    }

    fn resume(&mut self, _ctx: &mut WorkflowContext, _request: u64, result: Result<Vec<Value>, Failure>) -> Result<Flow, Failure> {
        match result {
            Ok(mut values) if !values.is_empty() => Ok(Flow::Complete(values.remove(0))),
            Ok(_) => Err(Failure::application("Uppercase activity resolved without a value")),
            Err(failure) => Err(failure),
        }
    }
}



/// An activity that upper-cases its (single, string) argument.
#[derive(Clone, Copy, Debug, Default)]
pub struct UppercaseActivity;
#[async_trait]
impl Activity for UppercaseActivity {
    async fn invoke(&self, _ctx: ActivityContext<'_>, args: Vec<Value>) -> Result<Value, Failure> {
        match args.first() {
            Some(Value::String(raw)) => Ok(Value::String(raw.to_uppercase())),
            _ => Err(Failure::invalid_argument("Uppercase expects a single string argument")),
        }
    }
}
impl Describe for UppercaseActivity {
    fn type_info() -> TypeInfo { TypeInfo::new("UppercaseActivity").with_attr(Attribute::new("activity", Some("Uppercase"))) }
}



/// An activity that relays its arguments through the shared RPC channel and returns the last
/// value that comes back.
#[derive(Clone, Copy, Debug, Default)]
pub struct RpcRelayActivity;
#[async_trait]
impl Activity for RpcRelayActivity {
    async fn invoke(&self, ctx: ActivityContext<'_>, args: Vec<Value>) -> Result<Value, Failure> {
        let converter: JsonConverter = JsonConverter;
        let params: Vec<Payload> =
            converter.encode_all(&args).map_err(|err| Failure::application(format!("Cannot marshal RPC parameters: {err}")))?;
        let mut reply: Vec<Payload> = ctx.rpc.call("echo", params)?;
        match reply.pop() {
            Some(payload) => converter.decode(&payload).map_err(|err| Failure::application(format!("Cannot unmarshal RPC reply: {err}"))),
            None => Ok(Value::Null),
        }
    }
}
