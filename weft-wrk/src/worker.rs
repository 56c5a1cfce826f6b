//  WORKER.rs
//    by Lut99
//
//  Created:
//    23 Jan 2025, 10:12:40
//  Last edited:
//    22 Jun 2026, 11:52:07
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the per-task-queue worker: the component that owns the
//!   workflow and activity handler tables, keeps the live executions and
//!   resolves every request that was routed to its queue.
//

use std::collections::HashMap;
use std::str::FromStr as _;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error};
use serde_json::{Value, json};
use specifications::commands::{
    CANCEL_WORKFLOW, CONTINUE_AS_NEW_WORKFLOW, GET_WORKFLOW_RESULT, Headers, INVOKE_ACTIVITY, OPT_NAME, OPT_QUERY_NAME, OPT_REASON, OPT_RUN_ID,
    OPT_SIGNAL_NAME, OPT_WORKFLOW_ID, Payload, QUERY_WORKFLOW, Request, SIGNAL_WITH_START_WORKFLOW, SIGNAL_WORKFLOW, START_WORKFLOW,
    TERMINATE_WORKFLOW,
};
use specifications::failures::Failure;
use specifications::info::WorkerInfo;
use weft_shr::identifier::Identifier;

pub use crate::errors::WorkerError as Error;
use crate::execution::{Execution, ExecutionState, Workflow};
use crate::reader::{Describe, HandlerKind, Reader, TypeInfo};
use crate::spec::{RpcConnection, TickContext};


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use specifications::commands::Command;
    use specifications::failures::FailureKind;

    use super::*;
    use crate::dummy::{DummyTick, SimpleSignalledWorkflowWithSleep, SimpleWorkflow, UppercaseActivity};
    use crate::spec::TickContext;


    /// Builds a worker with the sample handlers registered.
    fn worker() -> Worker {
        let mut worker: Worker = Worker::new(Identifier::from_str("default").unwrap());
        worker.register_workflow("SimpleWorkflow", || Box::new(SimpleWorkflow)).unwrap();
        worker.register_workflow("SimpleSignalledWorkflowWithSleep", || Box::<SimpleSignalledWorkflowWithSleep>::default()).unwrap();
        worker.register_activity("Uppercase", UppercaseActivity).unwrap();
        worker
    }

    /// Builds a start request for the given workflow type and id.
    fn start_request(id: u64, kind: &str, workflow_id: &str, payloads: Vec<Payload>) -> Request {
        Request::new(id, START_WORKFLOW)
            .with_option(OPT_NAME, Value::String(kind.into()))
            .with_option(OPT_WORKFLOW_ID, Value::String(workflow_id.into()))
            .with_payloads(payloads)
    }

    /// Reads the single response with the given id out of the queue snapshot.
    fn response_of(commands: &[Command], id: u64) -> Result<Vec<Payload>, Failure> {
        let mut found: Vec<&Command> = commands.iter().filter(|c| !c.is_request() && c.id() == id).collect();
        assert_eq!(found.len(), 1, "expected exactly one response with id {id}");
        match found.remove(0) {
            Command::Response(res) => res.result.clone(),
            Command::Request(_) => unreachable!(),
        }
    }


    #[tokio::test]
    async fn test_start_and_result() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();
        let mut worker: Worker = worker();

        let payload: Payload = ctx.converter.encode(&Value::String("hello world".into())).unwrap();
        worker.dispatch(&mut ctx, start_request(1, "SimpleWorkflow", "wf-1", vec![payload])).await;

        let result: Vec<Payload> = response_of(ctx.queue.commands(), 1).unwrap();
        assert_eq!(ctx.converter.decode(&result[0]).unwrap(), Value::String("HELLO WORLD".into()));
    }

    #[tokio::test]
    async fn test_duplicate_start() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();
        let mut worker: Worker = worker();

        worker.dispatch(&mut ctx, start_request(1, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![])).await;
        worker.dispatch(&mut ctx, start_request(2, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![])).await;

        let failure: Failure = response_of(ctx.queue.commands(), 2).unwrap_err();
        assert_eq!(failure.kind, FailureKind::AlreadyStarted);
    }

    #[tokio::test]
    async fn test_signal_before_start() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();
        let mut worker: Worker = worker();

        let signal: Request = Request::new(1, SIGNAL_WORKFLOW)
            .with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into()))
            .with_option(OPT_SIGNAL_NAME, Value::String("add".into()));
        worker.dispatch(&mut ctx, signal).await;

        let failure: Failure = response_of(ctx.queue.commands(), 1).unwrap_err();
        assert_eq!(failure.kind, FailureKind::IllegalState);
    }

    #[tokio::test]
    async fn test_signal_then_result() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();
        let mut worker: Worker = worker();

        worker.dispatch(&mut ctx, start_request(1, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![])).await;
        let timer_id: u64 = ctx.queue.commands()[0].id();

        let args: Payload = ctx.converter.encode(&json!(-1)).unwrap();
        let signal: Request = Request::new(2, SIGNAL_WORKFLOW)
            .with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into()))
            .with_option(OPT_SIGNAL_NAME, Value::String("add".into()))
            .with_payloads(vec![args]);
        worker.dispatch(&mut ctx, signal).await;
        assert!(response_of(ctx.queue.commands(), 2).is_ok());

        // The host resolves the timer; the start request resolves with the sum
        worker.resume(&mut ctx, "wf-1", timer_id, Ok(vec![]));
        let result: Vec<Payload> = response_of(ctx.queue.commands(), 1).unwrap();
        assert_eq!(ctx.converter.decode(&result[0]).unwrap(), json!(-1));
    }

    #[tokio::test]
    async fn test_cancel() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();
        let mut worker: Worker = worker();

        let arg: Payload = ctx.converter.encode(&json!(-1)).unwrap();
        worker.dispatch(&mut ctx, start_request(1, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![arg])).await;

        let cancel: Request = Request::new(2, CANCEL_WORKFLOW).with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into()));
        worker.dispatch(&mut ctx, cancel).await;
        assert!(response_of(ctx.queue.commands(), 2).is_ok());

        let failure: Failure = response_of(ctx.queue.commands(), 1).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Canceled);
        assert!(failure.cause.is_some());
    }

    #[tokio::test]
    async fn test_query() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();
        let mut worker: Worker = worker();

        worker.dispatch(&mut ctx, start_request(1, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![])).await;

        let query: Request = Request::new(2, QUERY_WORKFLOW)
            .with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into()))
            .with_option(OPT_QUERY_NAME, Value::String("sum".into()));
        worker.dispatch(&mut ctx, query).await;

        let result: Vec<Payload> = response_of(ctx.queue.commands(), 2).unwrap();
        assert_eq!(ctx.converter.decode(&result[0]).unwrap(), json!(0));
    }

    #[tokio::test]
    async fn test_invoke_activity() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();
        let mut worker: Worker = worker();

        let arg: Payload = ctx.converter.encode(&Value::String("loud".into())).unwrap();
        let invoke: Request = Request::new(1, INVOKE_ACTIVITY).with_option(OPT_NAME, Value::String("Uppercase".into())).with_payloads(vec![arg]);
        worker.dispatch(&mut ctx, invoke).await;

        let result: Vec<Payload> = response_of(ctx.queue.commands(), 1).unwrap();
        assert_eq!(ctx.converter.decode(&result[0]).unwrap(), Value::String("LOUD".into()));

        // Unknown activity types are a NotFound failure
        let invoke: Request = Request::new(2, INVOKE_ACTIVITY).with_option(OPT_NAME, Value::String("Lowercase".into()));
        worker.dispatch(&mut ctx, invoke).await;
        assert_eq!(response_of(ctx.queue.commands(), 2).unwrap_err().kind, FailureKind::NotFound);
    }

    #[tokio::test]
    async fn test_activity_reaches_the_rpc_channel() {
        let mut bench: DummyTick = DummyTick::new();
        let rpc: Arc<crate::dummy::DummyRpc> = Arc::new(crate::dummy::DummyRpc::new());
        bench.rpc = rpc.clone();
        let mut ctx: TickContext = bench.ctx();

        let mut worker: Worker = Worker::new(Identifier::from_str("default").unwrap());
        worker.register_activity("Echo", crate::dummy::RpcRelayActivity).unwrap();

        let arg: Payload = ctx.converter.encode(&json!("ping")).unwrap();
        let invoke: Request = Request::new(1, INVOKE_ACTIVITY).with_option(OPT_NAME, Value::String("Echo".into())).with_payloads(vec![arg]);
        worker.dispatch(&mut ctx, invoke).await;

        let result: Vec<Payload> = response_of(ctx.queue.commands(), 1).unwrap();
        assert_eq!(ctx.converter.decode(&result[0]).unwrap(), json!("ping"));
        assert_eq!(*rpc.calls.lock().unwrap(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();
        let mut worker: Worker = worker();

        worker.dispatch(&mut ctx, Request::new(1, "FlushWorkflowCache")).await;
        assert_eq!(response_of(ctx.queue.commands(), 1).unwrap_err().kind, FailureKind::NotImplemented);
    }

    #[tokio::test]
    async fn test_continue_as_new() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();
        let mut worker: Worker = worker();

        worker.dispatch(&mut ctx, start_request(1, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![])).await;

        let arg: Payload = ctx.converter.encode(&json!(-5)).unwrap();
        let cn: Request = Request::new(2, CONTINUE_AS_NEW_WORKFLOW).with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into())).with_payloads(vec![arg]);
        worker.dispatch(&mut ctx, cn).await;

        // Both the ack and the original start resolve with the successor's run id
        let ack: Vec<Payload> = response_of(ctx.queue.commands(), 2).unwrap();
        assert_eq!(ctx.converter.decode(&ack[0]).unwrap(), json!({ "runId": "run-1#1" }));
        let start: Vec<Payload> = response_of(ctx.queue.commands(), 1).unwrap();
        assert_eq!(ctx.converter.decode(&start[0]).unwrap(), json!({ "runId": "run-1#1" }));

        // The successor run is live, seeded with the hand-over input
        let query: Request = Request::new(3, QUERY_WORKFLOW)
            .with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into()))
            .with_option(OPT_QUERY_NAME, Value::String("sum".into()));
        worker.dispatch(&mut ctx, query).await;
        let result: Vec<Payload> = response_of(ctx.queue.commands(), 3).unwrap();
        assert_eq!(ctx.converter.decode(&result[0]).unwrap(), json!(-5));
    }

    #[test]
    fn test_described_registration() {
        let mut worker: Worker = Worker::new(Identifier::from_str("default").unwrap());
        worker.register_described_workflow::<SimpleWorkflow>(&crate::reader::AttributeReader).unwrap();
        worker.register_described_activity::<UppercaseActivity>(&crate::reader::AttributeReader).unwrap();

        let info: WorkerInfo = worker.info();
        assert_eq!(info.workflows, vec!["SimpleWorkflow"]);
        // The activity attribute renames the handler
        assert_eq!(info.activities, vec!["Uppercase"]);
    }

    #[test]
    fn test_registration_is_checked() {
        let mut worker: Worker = Worker::new(Identifier::from_str("default").unwrap());
        worker.register_workflow("SimpleWorkflow", || Box::new(SimpleWorkflow)).unwrap();
        assert!(matches!(worker.register_workflow("SimpleWorkflow", || Box::new(SimpleWorkflow)), Err(Error::DuplicateWorkflow { .. })));
        assert!(matches!(worker.register_workflow("not a name", || Box::new(SimpleWorkflow)), Err(Error::IllegalName { .. })));

        let info: WorkerInfo = worker.info();
        assert_eq!(info.task_queue, "default");
        assert_eq!(info.workflows, vec!["SimpleWorkflow".to_string()]);
        assert!(info.activities.is_empty());
    }
}





/***** AUXILLARY *****/
/// The context handed to an [`Activity`] handler for one invocation.
pub struct ActivityContext<'a> {
    /// The shared RPC channel to the workflow service.
    pub rpc:    &'a Arc<dyn RpcConnection>,
    /// The headers of the invoking request.
    pub header: &'a Headers,
}



/// A user-provided activity handler. Activities are side-effectful and non-replayed, so unlike
/// workflows they may use native concurrency.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Invokes the activity.
    ///
    /// # Arguments
    /// - `ctx`: The [`ActivityContext`] of this invocation.
    /// - `args`: The already-decoded arguments.
    ///
    /// # Returns
    /// The activity's result value.
    ///
    /// # Errors
    /// This function errors if the activity fails; the failure is relayed to the requester.
    async fn invoke(&self, ctx: ActivityContext<'_>, args: Vec<Value>) -> Result<Value, Failure>;
}



/// A registered workflow type.
struct WorkflowEntry {
    /// The registered type name.
    name:    Identifier,
    /// Produces a fresh handler instance per execution.
    factory: Box<dyn Fn() -> Box<dyn Workflow> + Send>,
}

/// A registered activity type.
struct ActivityEntry {
    /// The registered type name.
    name:    Identifier,
    /// The (shared) handler instance.
    handler: Arc<dyn Activity>,
}





/***** HELPER FUNCTIONS *****/
/// Drains the outcome waiters of a settled execution into response commands.
///
/// # Arguments
/// - `ctx`: The [`TickContext`] of the current tick.
/// - `execution`: The [`Execution`] to settle.
fn settle(ctx: &mut TickContext, execution: &mut Execution) {
    if execution.state.is_terminal() {
        for waiter in execution.take_waiters() {
            ctx.queue.push_response(waiter, execution.state.outcome(ctx.converter));
        }
    }
}





/***** LIBRARY *****/
/// One worker per task queue: owns the handler tables for its queue, keeps the live executions
/// and dispatches every request the server routed its way.
pub struct Worker {
    /// The task queue this worker serves.
    task_queue: Identifier,
    /// The registered workflow types, in registration order.
    workflows:  Vec<WorkflowEntry>,
    /// The registered activity types, in registration order.
    activities: Vec<ActivityEntry>,
    /// The executions this worker drives, keyed by workflow id.
    executions: HashMap<String, Execution>,
}

impl Worker {
    /// Constructor for the Worker.
    ///
    /// # Arguments
    /// - `task_queue`: The task queue this worker serves.
    ///
    /// # Returns
    /// A new Worker without any registered handlers.
    #[inline]
    pub fn new(task_queue: Identifier) -> Self { Self { task_queue, workflows: Vec::new(), activities: Vec::new(), executions: HashMap::new() } }

    /// Returns the task queue this worker serves.
    #[inline]
    pub fn task_queue(&self) -> &Identifier { &self.task_queue }

    /// Registers a workflow type with this worker.
    ///
    /// # Arguments
    /// - `name`: The type name to register under.
    /// - `factory`: Produces a fresh handler instance per execution.
    ///
    /// # Returns
    /// This worker again, for chaining.
    ///
    /// # Errors
    /// This function errors if the name is illegal or already taken.
    pub fn register_workflow(&mut self, name: &str, factory: impl Fn() -> Box<dyn Workflow> + Send + 'static) -> Result<&mut Self, Error> {
        let name: Identifier = Identifier::from_str(name).map_err(|err| Error::IllegalName { raw: name.into(), err })?;
        if self.workflows.iter().any(|entry| entry.name == name) {
            return Err(Error::DuplicateWorkflow { queue: self.task_queue.clone(), name });
        }
        debug!("Registered workflow type '{name}' with task queue '{}'", self.task_queue);
        self.workflows.push(WorkflowEntry { name, factory: Box::new(factory) });
        Ok(self)
    }

    /// Registers an activity type with this worker.
    ///
    /// # Arguments
    /// - `name`: The type name to register under.
    /// - `handler`: The handler instance, shared across invocations.
    ///
    /// # Returns
    /// This worker again, for chaining.
    ///
    /// # Errors
    /// This function errors if the name is illegal or already taken.
    pub fn register_activity(&mut self, name: &str, handler: impl Activity + 'static) -> Result<&mut Self, Error> {
        let name: Identifier = Identifier::from_str(name).map_err(|err| Error::IllegalName { raw: name.into(), err })?;
        if self.activities.iter().any(|entry| entry.name == name) {
            return Err(Error::DuplicateActivity { queue: self.task_queue.clone(), name });
        }
        debug!("Registered activity type '{name}' with task queue '{}'", self.task_queue);
        self.activities.push(ActivityEntry { name, handler: Arc::new(handler) });
        Ok(self)
    }

    /// Registers a workflow type by reading its declared metadata.
    ///
    /// # Arguments
    /// - `reader`: The [`Reader`] that maps the type's metadata to handler definitions.
    ///
    /// # Returns
    /// This worker again, for chaining.
    ///
    /// # Errors
    /// This function errors if the metadata declares no workflow handler, or if registration
    /// itself fails.
    pub fn register_described_workflow<T: Describe + Workflow + Default + 'static>(&mut self, reader: &dyn Reader) -> Result<&mut Self, Error> {
        let info: TypeInfo = T::type_info();
        let defs = reader.read(&info).map_err(|err| Error::ReadError { type_name: info.name.clone(), err })?;
        let Some(def) = defs.into_iter().find(|def| def.kind == HandlerKind::Workflow) else {
            return Err(Error::NoWorkflowHandler { type_name: info.name });
        };
        self.register_workflow(&def.name, || Box::new(T::default()) as Box<dyn Workflow>)
    }

    /// Registers an activity type by reading its declared metadata.
    ///
    /// # Arguments
    /// - `reader`: The [`Reader`] that maps the type's metadata to handler definitions.
    ///
    /// # Returns
    /// This worker again, for chaining.
    ///
    /// # Errors
    /// This function errors if the metadata declares no activity handler, or if registration
    /// itself fails.
    pub fn register_described_activity<T: Describe + Activity + Default + 'static>(&mut self, reader: &dyn Reader) -> Result<&mut Self, Error> {
        let info: TypeInfo = T::type_info();
        let defs = reader.read(&info).map_err(|err| Error::ReadError { type_name: info.name.clone(), err })?;
        let Some(def) = defs.into_iter().find(|def| def.kind == HandlerKind::Activity) else {
            return Err(Error::NoActivityHandler { type_name: info.name });
        };
        self.register_activity(&def.name, T::default())
    }

    /// Describes this worker for `GetWorkerInfo`.
    ///
    /// # Returns
    /// A [`WorkerInfo`] listing the queue and both handler inventories in registration order.
    #[inline]
    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            task_queue: self.task_queue.to_string(),
            workflows:  self.workflows.iter().map(|entry| entry.name.to_string()).collect(),
            activities: self.activities.iter().map(|entry| entry.name.to_string()).collect(),
        }
    }

    /// Dispatches a request that was routed to this worker's queue.
    ///
    /// Whatever happens, exactly one response for the request is enqueued: either right here
    /// (acks, queries, failures) or once the addressed execution reaches a terminal state.
    ///
    /// # Arguments
    /// - `ctx`: The [`TickContext`] of the current tick.
    /// - `request`: The request to dispatch.
    pub async fn dispatch(&mut self, ctx: &mut TickContext<'_>, request: Request) {
        debug!("Worker '{}' dispatching request {} ('{}')", self.task_queue, request.id, request.command);
        match request.command.as_str() {
            START_WORKFLOW => self.start(ctx, request, false),
            SIGNAL_WITH_START_WORKFLOW => self.start(ctx, request, true),
            SIGNAL_WORKFLOW => self.signal(ctx, request),
            QUERY_WORKFLOW => self.query(ctx, request),
            CANCEL_WORKFLOW => self.cancel(ctx, request),
            TERMINATE_WORKFLOW => self.terminate(ctx, request),
            CONTINUE_AS_NEW_WORKFLOW => self.continue_as_new(ctx, request),
            GET_WORKFLOW_RESULT => self.result(ctx, request),
            INVOKE_ACTIVITY => self.invoke_activity(ctx, request).await,
            unknown => {
                ctx.queue.push_response(request.id, Err(Failure::not_implemented(format!("Request kind '{unknown}' is not implemented"))));
            },
        }
    }

    /// Routes a resolved outbound request back into the suspended execution.
    ///
    /// # Arguments
    /// - `ctx`: The [`TickContext`] of the current tick.
    /// - `workflow_id`: The id of the execution the resolution belongs to.
    /// - `request_id`: The id of the resolved outbound request.
    /// - `result`: What it resolved to.
    pub fn resume(&mut self, ctx: &mut TickContext, workflow_id: &str, request_id: u64, result: Result<Vec<Payload>, Failure>) {
        let Some(execution) = self.executions.get_mut(workflow_id) else {
            debug!("Dropping resolution of request {request_id} for unknown workflow '{workflow_id}'");
            return;
        };
        let continued: Option<Vec<Value>> = execution.resume(ctx, request_id, result);
        settle(ctx, execution);
        if let Some(input) = continued {
            if let Some(execution) = self.executions.remove(workflow_id) {
                self.install(ctx, execution, Some(input));
            }
        }
    }

    /// Handles `StartWorkflow` and `SignalWithStartWorkflow`.
    ///
    /// A plain start's response resolves once the execution reaches a terminal state; a
    /// signal-with-start acks immediately with the run id and delivers its signal (the request
    /// payloads) right after starting.
    fn start(&mut self, ctx: &mut TickContext, request: Request, with_signal: bool) {
        let id: u64 = request.id;

        // Everything is validated before the first side effect
        let Some(workflow_id) = request.opt_str(OPT_WORKFLOW_ID).map(String::from) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Start request {id} is missing option '{OPT_WORKFLOW_ID}'"))));
            return;
        };
        let Some(kind) = request.opt_str(OPT_NAME) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Start request {id} is missing option '{OPT_NAME}'"))));
            return;
        };
        let signal_name: Option<String> = request.opt_str(OPT_SIGNAL_NAME).map(String::from);
        if with_signal && signal_name.is_none() {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Start request {id} is missing option '{OPT_SIGNAL_NAME}'"))));
            return;
        }
        let Some(entry) = self.workflows.iter().find(|entry| entry.name.as_ref() == kind) else {
            ctx.queue.push_response(id, Err(Failure::not_found(format!("Workflow type '{kind}' is not registered with task queue '{}'", self.task_queue))));
            return;
        };
        if let Some(existing) = self.executions.get(&workflow_id) {
            if !existing.state.is_terminal() {
                ctx.queue.push_response(id, Err(Failure::already_started(format!("Workflow '{workflow_id}' is already running (run '{}')", existing.run_id))));
                return;
            }
        }
        let args: Vec<Value> = match ctx.converter.decode_all(&request.payloads) {
            Ok(args) => args,
            Err(err) => {
                ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Cannot unmarshal payloads of start request {id}: {err}"))));
                return;
            },
        };

        // Run ids are host-supplied, or else derived from the request id so replays stay
        // byte-identical
        let run_id: String = request.opt_str(OPT_RUN_ID).map(String::from).unwrap_or_else(|| format!("run-{id}"));

        // Drive the fresh execution until it first suspends (or settles)
        let mut execution: Execution =
            Execution::new(self.task_queue.clone(), workflow_id, run_id.clone(), entry.name.clone(), (entry.factory)());
        let (input, signal_args): (Vec<Value>, Vec<Value>) = if with_signal { (vec![], args) } else { (args, vec![]) };
        let mut continued: Option<Vec<Value>> = execution.start(ctx, input);

        if with_signal {
            if let Some(name) = &signal_name {
                if continued.is_none() && !execution.state.is_terminal() {
                    match execution.signal(ctx, name, signal_args) {
                        Ok(handed_over) => continued = handed_over,
                        Err(failure) => debug!("Signal '{name}' of signal-with-start request {id} was rejected: {failure}"),
                    }
                } else {
                    debug!("Skipping signal '{name}' of request {id}: the workflow settled during start");
                }
            }
            // Ack with the run id; the outcome is observed via GetWorkflowResult
            match ctx.converter.encode(&json!({ "runId": run_id })) {
                Ok(payload) => ctx.queue.push_response(id, Ok(vec![payload])),
                Err(err) => ctx.queue.push_response(id, Err(Failure::application(format!("Cannot marshal run id of request {id}: {err}")))),
            }
        } else if execution.state.is_terminal() {
            ctx.queue.push_response(id, execution.state.outcome(ctx.converter));
        } else {
            // Resolves at the terminal state; a run that immediately continues as new resolves
            // with the successor's run id
            execution.add_waiter(id);
        }

        self.install(ctx, execution, continued);
    }

    /// Handles `SignalWorkflow`.
    fn signal(&mut self, ctx: &mut TickContext, request: Request) {
        let id: u64 = request.id;
        let Some(workflow_id) = request.opt_str(OPT_WORKFLOW_ID) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Signal request {id} is missing option '{OPT_WORKFLOW_ID}'"))));
            return;
        };
        let Some(name) = request.opt_str(OPT_SIGNAL_NAME).map(String::from) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Signal request {id} is missing option '{OPT_SIGNAL_NAME}'"))));
            return;
        };

        let continued: Option<Vec<Value>> = match self.executions.get_mut(workflow_id) {
            Some(execution) if !execution.state.is_terminal() => {
                let args: Vec<Value> = match ctx.converter.decode_all(&request.payloads) {
                    Ok(args) => args,
                    Err(err) => {
                        ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Cannot unmarshal payloads of signal request {id}: {err}"))));
                        return;
                    },
                };
                match execution.signal(ctx, &name, args) {
                    Ok(continued) => {
                        ctx.queue.push_response(id, Ok(vec![]));
                        settle(ctx, execution);
                        continued
                    },
                    Err(failure) => {
                        ctx.queue.push_response(id, Err(failure));
                        None
                    },
                }
            },
            Some(_) | None => {
                ctx.queue.push_response(id, Err(Failure::illegal_state(format!("Workflow '{workflow_id}' has not started or has terminated"))));
                return;
            },
        };

        if continued.is_some() {
            if let Some(execution) = self.executions.remove(workflow_id) {
                self.install(ctx, execution, continued);
            }
        }
    }

    /// Handles `QueryWorkflow`.
    fn query(&mut self, ctx: &mut TickContext, request: Request) {
        let id: u64 = request.id;
        let Some(workflow_id) = request.opt_str(OPT_WORKFLOW_ID) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Query request {id} is missing option '{OPT_WORKFLOW_ID}'"))));
            return;
        };
        let Some(name) = request.opt_str(OPT_QUERY_NAME) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Query request {id} is missing option '{OPT_QUERY_NAME}'"))));
            return;
        };

        match self.executions.get(workflow_id) {
            Some(execution) if !execution.state.is_terminal() => {
                let args: Vec<Value> = match ctx.converter.decode_all(&request.payloads) {
                    Ok(args) => args,
                    Err(err) => {
                        ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Cannot unmarshal payloads of query request {id}: {err}"))));
                        return;
                    },
                };
                let result: Result<Vec<Payload>, Failure> = execution.query(name, args).and_then(|value| {
                    Ok(vec![ctx.converter.encode(&value).map_err(|err| Failure::application(format!("Cannot marshal query result: {err}")))?])
                });
                ctx.queue.push_response(id, result);
            },
            Some(_) | None => {
                ctx.queue.push_response(id, Err(Failure::illegal_state(format!("Workflow '{workflow_id}' has not started or has terminated"))));
            },
        }
    }

    /// Handles `CancelWorkflow`.
    fn cancel(&mut self, ctx: &mut TickContext, request: Request) {
        let id: u64 = request.id;
        let Some(workflow_id) = request.opt_str(OPT_WORKFLOW_ID) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Cancel request {id} is missing option '{OPT_WORKFLOW_ID}'"))));
            return;
        };

        match self.executions.get_mut(workflow_id) {
            Some(execution) if !execution.state.is_terminal() => {
                ctx.queue.push_response(id, Ok(vec![]));
                execution.cancel(ctx);
                settle(ctx, execution);
            },
            Some(_) | None => {
                ctx.queue.push_response(id, Err(Failure::illegal_state(format!("Workflow '{workflow_id}' has not started or has terminated"))));
            },
        }
    }

    /// Handles `TerminateWorkflow`.
    fn terminate(&mut self, ctx: &mut TickContext, request: Request) {
        let id: u64 = request.id;
        let Some(workflow_id) = request.opt_str(OPT_WORKFLOW_ID) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Terminate request {id} is missing option '{OPT_WORKFLOW_ID}'"))));
            return;
        };
        let reason: String = request.opt_str(OPT_REASON).unwrap_or("No reason given").into();

        match self.executions.get_mut(workflow_id) {
            Some(execution) if !execution.state.is_terminal() => {
                ctx.queue.push_response(id, Ok(vec![]));
                execution.terminate(ctx, reason);
                settle(ctx, execution);
            },
            Some(_) | None => {
                ctx.queue.push_response(id, Err(Failure::illegal_state(format!("Workflow '{workflow_id}' has not started or has terminated"))));
            },
        }
    }

    /// Handles `ContinueAsNewWorkflow`: finishes the current run and starts a successor run with
    /// the request's payloads as input.
    fn continue_as_new(&mut self, ctx: &mut TickContext, request: Request) {
        let id: u64 = request.id;
        let Some(workflow_id) = request.opt_str(OPT_WORKFLOW_ID) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Continue-as-new request {id} is missing option '{OPT_WORKFLOW_ID}'"))));
            return;
        };

        match self.executions.get(workflow_id) {
            Some(execution) if !execution.state.is_terminal() => {
                let input: Vec<Value> = match ctx.converter.decode_all(&request.payloads) {
                    Ok(input) => input,
                    Err(err) => {
                        ctx.queue
                            .push_response(id, Err(Failure::invalid_argument(format!("Cannot unmarshal payloads of continue-as-new request {id}: {err}"))));
                        return;
                    },
                };

                // Ack with the successor's run id, then run the hand-over
                match ctx.converter.encode(&json!({ "runId": execution.successor_run_id() })) {
                    Ok(payload) => ctx.queue.push_response(id, Ok(vec![payload])),
                    Err(err) => {
                        ctx.queue.push_response(id, Err(Failure::application(format!("Cannot marshal run id of request {id}: {err}"))));
                        return;
                    },
                }
                if let Some(execution) = self.executions.remove(workflow_id) {
                    self.install(ctx, execution, Some(input));
                }
            },
            Some(_) | None => {
                ctx.queue.push_response(id, Err(Failure::illegal_state(format!("Workflow '{workflow_id}' has not started or has terminated"))));
            },
        }
    }

    /// Handles `GetWorkflowResult`: resolves with the execution's outcome, now or at its
    /// terminal state.
    fn result(&mut self, ctx: &mut TickContext, request: Request) {
        let id: u64 = request.id;
        let Some(workflow_id) = request.opt_str(OPT_WORKFLOW_ID) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Result request {id} is missing option '{OPT_WORKFLOW_ID}'"))));
            return;
        };

        match self.executions.get_mut(workflow_id) {
            Some(execution) if execution.state.is_terminal() => {
                ctx.queue.push_response(id, execution.state.outcome(ctx.converter));
            },
            Some(execution) => execution.add_waiter(id),
            None => {
                ctx.queue.push_response(id, Err(Failure::not_found(format!("Workflow '{workflow_id}' is not known to task queue '{}'", self.task_queue))));
            },
        }
    }

    /// Handles `InvokeActivity`.
    async fn invoke_activity(&mut self, ctx: &mut TickContext<'_>, request: Request) {
        let id: u64 = request.id;
        let Some(name) = request.opt_str(OPT_NAME) else {
            ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Activity request {id} is missing option '{OPT_NAME}'"))));
            return;
        };
        let Some(entry) = self.activities.iter().find(|entry| entry.name.as_ref() == name) else {
            ctx.queue.push_response(id, Err(Failure::not_found(format!("Activity type '{name}' is not registered with task queue '{}'", self.task_queue))));
            return;
        };
        let args: Vec<Value> = match ctx.converter.decode_all(&request.payloads) {
            Ok(args) => args,
            Err(err) => {
                ctx.queue.push_response(id, Err(Failure::invalid_argument(format!("Cannot unmarshal payloads of activity request {id}: {err}"))));
                return;
            },
        };

        // Activities are awaited inline: side effects may run natively async, but per-tick
        // ordering stays fixed
        let handler: Arc<dyn Activity> = entry.handler.clone();
        let actx: ActivityContext = ActivityContext { rpc: ctx.rpc, header: &request.header };
        match handler.invoke(actx, args).await {
            Ok(value) => {
                let result: Result<Vec<Payload>, Failure> = ctx
                    .converter
                    .encode(&value)
                    .map(|payload| vec![payload])
                    .map_err(|err| Failure::application(format!("Cannot marshal result of activity '{name}': {err}")));
                ctx.queue.push_response(id, result);
            },
            Err(failure) => ctx.queue.push_response(id, Err(failure)),
        }
    }

    /// Installs an execution into the table, running continue-as-new hand-overs until the chain
    /// settles or suspends.
    ///
    /// # Arguments
    /// - `ctx`: The [`TickContext`] of the current tick.
    /// - `execution`: The execution to install.
    /// - `continued`: The successor input if the execution asked to continue as new.
    fn install(&mut self, ctx: &mut TickContext, mut execution: Execution, mut continued: Option<Vec<Value>>) {
        loop {
            match continued {
                None => {
                    settle(ctx, &mut execution);
                    self.executions.insert(execution.workflow_id.clone(), execution);
                    return;
                },

                Some(input) => {
                    let run_id: String = execution.successor_run_id();
                    debug!("Workflow '{}' hands over to run '{run_id}'", execution.workflow_id);
                    execution.abandon_pending(ctx);
                    execution.state = ExecutionState::ContinuedAsNew { run_id: run_id.clone() };
                    settle(ctx, &mut execution);

                    let Some(entry) = self.workflows.iter().find(|entry| entry.name == execution.kind) else {
                        // The entry existed when the chain started; handler tables do not mutate
                        // during a run
                        error!("Workflow type '{}' vanished during continue-as-new of '{}'", execution.kind, execution.workflow_id);
                        return;
                    };
                    let mut successor: Execution =
                        Execution::new(self.task_queue.clone(), execution.workflow_id.clone(), run_id, execution.kind.clone(), (entry.factory)());
                    successor.generation = execution.generation + 1;
                    continued = successor.start(ctx, input);
                    execution = successor;
                },
            }
        }
    }
}
