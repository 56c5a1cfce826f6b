//  EXECUTION.rs
//    by Lut99
//
//  Created:
//    22 Jan 2025, 09:07:12
//  Last edited:
//    22 Jun 2026, 11:34:29
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements a single workflow execution: an explicit state machine
//!   that drives a user-provided [`Workflow`] handler from start to one
//!   of its terminal states. Explicit states (rather than native
//!   coroutines) are what keep replays deterministic.
//

use enum_debug::EnumDebug;
use log::debug;
use serde_json::{Value, json};
use specifications::commands::{EXECUTE_ACTIVITY, NEW_TIMER, OPT_MS, OPT_NAME, Payload, Request};
use specifications::failures::{Failure, FailureKind};
use weft_shr::identifier::Identifier;

use crate::client::{Client, Waiter};
use crate::queue::ResponseQueue;
use crate::spec::{DataConverter, TickContext};


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use specifications::commands::Command;

    use super::*;
    use crate::dummy::{DummyTick, SimpleSignalledWorkflowWithSleep, SimpleWorkflow};


    /// Shorthand for creating an execution around the given handler.
    fn execution(handler: Box<dyn Workflow>) -> Execution {
        Execution::new(Identifier::from_str("default").unwrap(), "wf-1", "run-1", Identifier::from_str("test").unwrap(), handler)
    }


    #[test]
    fn test_immediate_completion() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();

        let mut exec: Execution = execution(Box::new(SimpleWorkflow));
        exec.start(&mut ctx, vec![Value::String("hello world".into())]);
        assert!(matches!(&exec.state, ExecutionState::Completed { result } if result == &Value::String("HELLO WORLD".into())));
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();

        let mut exec: Execution = execution(Box::<SimpleSignalledWorkflowWithSleep>::default());
        exec.start(&mut ctx, vec![]);
        assert!(matches!(exec.state, ExecutionState::Running));
        // The sleep became an outbound timer request with a pending slot
        assert_eq!(ctx.queue.len(), 1);
        let timer_id: u64 = ctx.queue.commands()[0].id();
        assert!(ctx.client.is_pending(timer_id));

        // A signal mutates state but does not wake the workflow
        exec.signal(&mut ctx, "add", vec![json!(-1)]).unwrap();
        assert!(matches!(exec.state, ExecutionState::Running));

        // The timer resolving completes it
        exec.resume(&mut ctx, timer_id, Ok(vec![]));
        assert!(matches!(&exec.state, ExecutionState::Completed { result } if result == &json!(-1)));
    }

    #[test]
    fn test_cancel_flows_through_the_handler() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();

        let mut exec: Execution = execution(Box::<SimpleSignalledWorkflowWithSleep>::default());
        exec.start(&mut ctx, vec![json!(-1)]);
        assert!(matches!(exec.state, ExecutionState::Running));

        exec.cancel(&mut ctx);
        let ExecutionState::Canceled { failure } = &exec.state else { panic!("execution is not canceled") };
        assert_eq!(failure.kind, FailureKind::Canceled);
        assert!(failure.cause.is_some());
    }

    #[test]
    fn test_terminal_outcome_shapes() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();

        let mut exec: Execution = execution(Box::new(SimpleWorkflow));
        exec.start(&mut ctx, vec![Value::String("hi".into())]);

        let outcome: Result<Vec<Payload>, Failure> = exec.state.outcome(ctx.converter);
        let payloads: Vec<Payload> = outcome.unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(ctx.converter.decode(&payloads[0]).unwrap(), Value::String("HI".into()));

        let terminated: ExecutionState = ExecutionState::Terminated { reason: "enough".into() };
        assert!(matches!(terminated.outcome(ctx.converter), Err(failure) if failure.kind == FailureKind::Terminated));
    }

    #[test]
    fn test_command_roundtrip_through_context() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx: TickContext = bench.ctx();

        let mut exec: Execution = execution(Box::<SimpleSignalledWorkflowWithSleep>::default());
        exec.start(&mut ctx, vec![]);

        // The issued timer command carries its duration as an option
        let Command::Request(request) = &ctx.queue.commands()[0] else { panic!("queue does not hold a request") };
        assert_eq!(request.command, NEW_TIMER);
        assert_eq!(request.opt_u64(OPT_MS), Some(SimpleSignalledWorkflowWithSleep::SLEEP_MS));
    }
}





/***** LIBRARY *****/
/// What a [`Workflow`] handler reports back after being driven: either it suspended, or it
/// reached an end.
#[derive(Clone, Debug, EnumDebug)]
pub enum Flow {
    /// The handler suspended; it will be woken by a signal or by one of its outbound requests
    /// resolving.
    Pending,
    /// The handler produced its result.
    Complete(Value),
    /// The handler wants this run finished and a successor run started with the given input.
    ContinueAsNew(Vec<Value>),
}



/// A user-provided workflow handler.
///
/// Handlers are written as explicit state machines: every method runs to completion
/// synchronously and reports a [`Flow`]. The only suspension points are the outbound requests
/// issued through the [`WorkflowContext`], which is exactly what makes identical inbound
/// command sequences replay to identical results.
pub trait Workflow: Send {
    /// Starts the workflow.
    ///
    /// # Arguments
    /// - `ctx`: The [`WorkflowContext`] for issuing outbound requests.
    /// - `input`: The already-decoded input values.
    ///
    /// # Returns
    /// The [`Flow`] the workflow is in after starting.
    ///
    /// # Errors
    /// Erroring here moves the execution to a failed (or canceled) terminal state.
    fn start(&mut self, ctx: &mut WorkflowContext, input: Vec<Value>) -> Result<Flow, Failure>;

    /// Delivers a signal into the running workflow.
    ///
    /// # Errors
    /// Erroring here fails the signal request, not the execution.
    fn signal(&mut self, _ctx: &mut WorkflowContext, name: &str, _args: Vec<Value>) -> Result<Flow, Failure> {
        Err(Failure::not_implemented(format!("Signal '{name}' is not implemented by this workflow")))
    }

    /// Synchronously reads state from the running workflow. Must not mutate.
    ///
    /// # Errors
    /// Erroring here fails the query request, not the execution.
    fn query(&self, name: &str, _args: Vec<Value>) -> Result<Value, Failure> {
        Err(Failure::not_implemented(format!("Query '{name}' is not implemented by this workflow")))
    }

    /// Wakes the workflow because one of its outbound requests resolved.
    ///
    /// # Arguments
    /// - `ctx`: The [`WorkflowContext`] for issuing further outbound requests.
    /// - `request`: The id of the resolved request.
    /// - `result`: What it resolved to. A canceled failure here means the request was cancelled
    ///   underneath the workflow.
    ///
    /// # Returns
    /// The [`Flow`] the workflow is in after waking.
    ///
    /// # Errors
    /// Erroring here moves the execution to a failed (or canceled) terminal state.
    fn resume(&mut self, _ctx: &mut WorkflowContext, request: u64, _result: Result<Vec<Value>, Failure>) -> Result<Flow, Failure> {
        Err(Failure::not_implemented(format!("Workflow cannot be resumed (request {request})")))
    }
}



/// The context handed to a [`Workflow`] handler while it is being driven. Issues outbound
/// requests through the factory's client, on behalf of the owning execution.
pub struct WorkflowContext<'c> {
    /// The correlating client for outbound requests.
    client:    &'c mut Client,
    /// The queue that collects this tick's outbound commands.
    queue:     &'c mut ResponseQueue,
    /// The converter that marshals payloads.
    converter: &'c dyn DataConverter,
    /// The waiter identifying the owning execution.
    waiter:    Waiter,
    /// Whether cancellation of the owning execution has been requested.
    cancel_requested: bool,
    /// The request ids issued through this context.
    issued:    Vec<u64>,
}

impl<'c> WorkflowContext<'c> {
    /// Constructor for the WorkflowContext.
    fn new(ctx: &'c mut TickContext, waiter: Waiter, cancel_requested: bool) -> Self {
        Self { client: &mut *ctx.client, queue: &mut *ctx.queue, converter: ctx.converter, waiter, cancel_requested, issued: Vec::new() }
    }

    /// Issues an arbitrary outbound request on behalf of this execution.
    ///
    /// # Arguments
    /// - `request`: The request to send. Its id is overwritten with a fresh one.
    ///
    /// # Returns
    /// The id assigned to the request; the workflow's [`Workflow::resume()`] is called with it
    /// once the host responds.
    pub fn request(&mut self, request: Request) -> u64 {
        let id: u64 = self.client.request(self.queue, self.waiter.clone(), request);
        self.issued.push(id);
        id
    }

    /// Asks the host to schedule an activity.
    ///
    /// # Arguments
    /// - `name`: The activity type to schedule.
    /// - `args`: The arguments to pass.
    ///
    /// # Returns
    /// The id of the issued request.
    ///
    /// # Errors
    /// This function errors if the arguments cannot be marshalled.
    pub fn execute_activity(&mut self, name: &str, args: &[Value]) -> Result<u64, Failure> {
        let payloads: Vec<Payload> =
            self.converter.encode_all(args).map_err(|err| Failure::application(format!("Cannot marshal arguments of activity '{name}': {err}")))?;
        Ok(self.request(Request::new(0, EXECUTE_ACTIVITY).with_option(OPT_NAME, Value::String(name.into())).with_payloads(payloads)))
    }

    /// Asks the host to start a timer. The workflow has no wall clock of its own; time only
    /// exists as a host-resolved request.
    ///
    /// # Arguments
    /// - `ms`: The duration of the timer, in milliseconds.
    ///
    /// # Returns
    /// The id of the issued request.
    pub fn new_timer(&mut self, ms: u64) -> u64 { self.request(Request::new(0, NEW_TIMER).with_option(OPT_MS, json!(ms))) }

    /// Returns whether cancellation of this execution has been requested.
    #[inline]
    pub fn cancel_requested(&self) -> bool { self.cancel_requested }

    /// Consumes this context into the list of request ids it issued.
    #[inline]
    fn into_issued(self) -> Vec<u64> { self.issued }
}



/// The states a workflow execution moves through.
#[derive(Clone, Debug, EnumDebug)]
pub enum ExecutionState {
    /// The execution accepts signals, queries and resumptions.
    Running,
    /// The workflow produced its result.
    Completed { result: Value },
    /// The workflow (or its start) raised a failure.
    Failed { failure: Failure },
    /// The workflow was canceled.
    Canceled { failure: Failure },
    /// The workflow was terminated by explicit request.
    Terminated { reason: String },
    /// The run was finished in favour of a successor run.
    ContinuedAsNew { run_id: String },
}

impl ExecutionState {
    /// Returns whether this state accepts no further workflow interaction.
    #[inline]
    pub fn is_terminal(&self) -> bool { !matches!(self, Self::Running) }

    /// Renders this (terminal) state as the result of a response command.
    ///
    /// # Arguments
    /// - `converter`: The [`DataConverter`] for marshalling result values.
    ///
    /// # Returns
    /// The payloads of a successful outcome, or the failure of an unsuccessful one.
    pub fn outcome(&self, converter: &dyn DataConverter) -> Result<Vec<Payload>, Failure> {
        match self {
            Self::Running => Err(Failure::illegal_state("Workflow is still running")),
            Self::Completed { result } => {
                Ok(vec![converter.encode(result).map_err(|err| Failure::application(format!("Cannot marshal workflow result: {err}")))?])
            },
            Self::Failed { failure } => Err(failure.clone()),
            Self::Canceled { failure } => Err(failure.clone()),
            Self::Terminated { reason } => Err(Failure::terminated(format!("Workflow was terminated: {reason}"))),
            Self::ContinuedAsNew { run_id } => {
                Ok(vec![
                    converter.encode(&json!({ "runId": run_id })).map_err(|err| Failure::application(format!("Cannot marshal successor run id: {err}")))?,
                ])
            },
        }
    }
}



/// A single workflow execution: one run of one workflow id on one worker.
pub struct Execution {
    /// The task queue of the worker owning this execution.
    task_queue:  Identifier,
    /// The user-chosen workflow id.
    pub workflow_id: String,
    /// The id of this particular run.
    pub run_id:  String,
    /// The workflow type this execution runs.
    pub kind:    Identifier,
    /// Where the execution is in its lifecycle.
    pub state:   ExecutionState,
    /// The handler being driven.
    handler:     Box<dyn Workflow>,
    /// The outbound request ids this execution is suspended on, in issue order.
    pending:     Vec<u64>,
    /// The inbound request ids awaiting this execution's outcome.
    waiters:     Vec<u64>,
    /// Whether cancellation has been requested.
    cancel_requested: bool,
    /// How many continue-as-new hops preceded this run.
    pub generation: u32,
}

impl Execution {
    /// Constructor for the Execution.
    ///
    /// # Arguments
    /// - `task_queue`: The task queue of the worker owning this execution.
    /// - `workflow_id`: The user-chosen workflow id.
    /// - `run_id`: The id of this run.
    /// - `kind`: The workflow type to run.
    /// - `handler`: A fresh handler instance to drive.
    ///
    /// # Returns
    /// A new Execution in the running state.
    pub fn new(task_queue: Identifier, workflow_id: impl Into<String>, run_id: impl Into<String>, kind: Identifier, handler: Box<dyn Workflow>) -> Self {
        Self {
            task_queue,
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
            kind,
            state: ExecutionState::Running,
            handler,
            pending: Vec::new(),
            waiters: Vec::new(),
            cancel_requested: false,
            generation: 0,
        }
    }

    /// Derives the run id of this execution's continue-as-new successor.
    #[inline]
    pub fn successor_run_id(&self) -> String {
        match self.run_id.split_once('#') {
            Some((base, _)) => format!("{base}#{}", self.generation + 1),
            None => format!("{}#{}", self.run_id, self.generation + 1),
        }
    }

    /// Starts the handler.
    ///
    /// # Arguments
    /// - `ctx`: The [`TickContext`] of the current tick.
    /// - `input`: The already-decoded input values.
    ///
    /// # Returns
    /// The continue-as-new input if the handler asked for a successor run, or else [`None`].
    pub fn start(&mut self, ctx: &mut TickContext, input: Vec<Value>) -> Option<Vec<Value>> {
        debug!("Starting workflow '{}' (run '{}', type '{}')", self.workflow_id, self.run_id, self.kind);
        let mut wctx: WorkflowContext = WorkflowContext::new(ctx, self.waiter(), self.cancel_requested);
        let flow: Result<Flow, Failure> = self.handler.start(&mut wctx, input);
        let issued: Vec<u64> = wctx.into_issued();
        self.apply(ctx, flow, issued)
    }

    /// Delivers a signal into the handler.
    ///
    /// # Arguments
    /// - `ctx`: The [`TickContext`] of the current tick.
    /// - `name`: The name of the signal.
    /// - `args`: The already-decoded signal arguments.
    ///
    /// # Returns
    /// The continue-as-new input if the handler asked for a successor run, or else [`None`].
    ///
    /// # Errors
    /// This function errors if the handler rejected the signal. The execution stays running.
    pub fn signal(&mut self, ctx: &mut TickContext, name: &str, args: Vec<Value>) -> Result<Option<Vec<Value>>, Failure> {
        debug!("Delivering signal '{name}' to workflow '{}'", self.workflow_id);
        let mut wctx: WorkflowContext = WorkflowContext::new(ctx, self.waiter(), self.cancel_requested);
        let flow: Result<Flow, Failure> = self.handler.signal(&mut wctx, name, args);
        let issued: Vec<u64> = wctx.into_issued();
        match flow {
            Ok(flow) => Ok(self.apply(ctx, Ok(flow), issued)),
            // A rejected signal does not touch the execution state
            Err(failure) => Err(failure),
        }
    }

    /// Synchronously reads state from the handler.
    ///
    /// # Arguments
    /// - `name`: The name of the query.
    /// - `args`: The already-decoded query arguments.
    ///
    /// # Returns
    /// The queried value.
    ///
    /// # Errors
    /// This function errors if the handler rejected the query.
    #[inline]
    pub fn query(&self, name: &str, args: Vec<Value>) -> Result<Value, Failure> { self.handler.query(name, args) }

    /// Wakes the handler because one of its outbound requests resolved.
    ///
    /// # Arguments
    /// - `ctx`: The [`TickContext`] of the current tick.
    /// - `request`: The id of the resolved request.
    /// - `result`: What it resolved to.
    ///
    /// # Returns
    /// The continue-as-new input if the handler asked for a successor run, or else [`None`].
    pub fn resume(&mut self, ctx: &mut TickContext, request: u64, result: Result<Vec<Payload>, Failure>) -> Option<Vec<Value>> {
        // A resolution for an already-terminal execution is stale; drop it
        if self.state.is_terminal() {
            debug!("Dropping resolution of request {request} for {} workflow '{}'", self.state.variant(), self.workflow_id);
            return None;
        }
        self.pending.retain(|id| *id != request);

        // Unmarshal before waking the handler
        let result: Result<Vec<Value>, Failure> = match result {
            Ok(payloads) => match ctx.converter.decode_all(&payloads) {
                Ok(values) => Ok(values),
                Err(err) => Err(Failure::application(format!("Cannot unmarshal resolution of request {request}: {err}"))),
            },
            Err(failure) => Err(failure),
        };

        debug!("Resuming workflow '{}' with resolution of request {request}", self.workflow_id);
        let mut wctx: WorkflowContext = WorkflowContext::new(ctx, self.waiter(), self.cancel_requested);
        let flow: Result<Flow, Failure> = self.handler.resume(&mut wctx, request, result);
        let issued: Vec<u64> = wctx.into_issued();
        self.apply(ctx, flow, issued)
    }

    /// Requests cancellation of this execution.
    ///
    /// Every outstanding outbound request is flipped into a canceled failure and delivered to
    /// the handler, which observes them as ordinary (failed) resolutions. An execution without
    /// outstanding work is canceled on the spot.
    ///
    /// # Arguments
    /// - `ctx`: The [`TickContext`] of the current tick.
    pub fn cancel(&mut self, ctx: &mut TickContext) {
        debug!("Cancelling workflow '{}'", self.workflow_id);
        self.cancel_requested = true;

        if self.pending.is_empty() {
            self.state = ExecutionState::Canceled {
                failure: Failure::canceled(format!("Workflow '{}' was canceled", self.workflow_id))
                    .with_cause(Failure::canceled("Cancellation was requested before any work was outstanding")),
            };
            return;
        }

        let pending: Vec<u64> = std::mem::take(&mut self.pending);
        for id in pending {
            let Some(resolution) = ctx.client.cancel(id) else { continue };
            if self.state.is_terminal() {
                // The handler already settled; only the slots remain to be cleaned up
                continue;
            }
            self.resume(ctx, id, resolution.result);
        }

        // A workflow that neither settled nor scheduled new work has nothing left to wait for
        if !self.state.is_terminal() && self.pending.is_empty() {
            self.state = ExecutionState::Canceled {
                failure: Failure::canceled(format!("Workflow '{}' was canceled", self.workflow_id))
                    .with_cause(Failure::canceled("All outstanding requests were cancelled")),
            };
        }
    }

    /// Forcibly terminates this execution. The handler is not consulted.
    ///
    /// # Arguments
    /// - `ctx`: The [`TickContext`] of the current tick.
    /// - `reason`: The reason reported by the terminator.
    pub fn terminate(&mut self, ctx: &mut TickContext, reason: impl Into<String>) {
        let reason: String = reason.into();
        debug!("Terminating workflow '{}': {reason}", self.workflow_id);
        for id in std::mem::take(&mut self.pending) {
            ctx.client.cancel(id);
        }
        self.state = ExecutionState::Terminated { reason };
    }

    /// Registers an inbound request id that awaits this execution's outcome.
    #[inline]
    pub fn add_waiter(&mut self, id: u64) { self.waiters.push(id); }

    /// Takes all registered outcome waiters, leaving none.
    #[inline]
    pub fn take_waiters(&mut self) -> Vec<u64> { std::mem::take(&mut self.waiters) }

    /// Returns whether this execution is suspended on the given outbound request id.
    #[inline]
    pub fn has_pending(&self, id: u64) -> bool { self.pending.contains(&id) }

    /// Returns the [`Waiter`] identifying this execution.
    #[inline]
    pub fn waiter(&self) -> Waiter { Waiter::Workflow { queue: self.task_queue.clone(), workflow_id: self.workflow_id.clone() } }

    /// Applies what the handler reported to this execution's state.
    ///
    /// # Arguments
    /// - `ctx`: The [`TickContext`] of the current tick.
    /// - `flow`: What the handler reported.
    /// - `issued`: The outbound request ids the handler issued while being driven.
    ///
    /// # Returns
    /// The continue-as-new input if the handler asked for a successor run, or else [`None`].
    fn apply(&mut self, ctx: &mut TickContext, flow: Result<Flow, Failure>, issued: Vec<u64>) -> Option<Vec<Value>> {
        self.pending.extend(issued);
        match flow {
            Ok(Flow::Pending) => None,

            Ok(Flow::Complete(result)) => {
                debug!("Workflow '{}' completed", self.workflow_id);
                self.abandon_pending(ctx);
                self.state = ExecutionState::Completed { result };
                None
            },

            Ok(Flow::ContinueAsNew(input)) => {
                debug!("Workflow '{}' continues as new", self.workflow_id);
                self.abandon_pending(ctx);
                Some(input)
            },

            Err(failure) if failure.kind == FailureKind::Canceled => {
                debug!("Workflow '{}' was canceled", self.workflow_id);
                self.abandon_pending(ctx);
                self.state =
                    ExecutionState::Canceled { failure: Failure::canceled(format!("Workflow '{}' was canceled", self.workflow_id)).with_cause(failure) };
                None
            },

            Err(failure) => {
                debug!("Workflow '{}' failed: {failure}", self.workflow_id);
                self.abandon_pending(ctx);
                self.state = ExecutionState::Failed { failure };
                None
            },
        }
    }

    /// Cancels any outstanding outbound requests without consulting the handler. Used when the
    /// execution settles while requests are still in flight.
    pub(crate) fn abandon_pending(&mut self, ctx: &mut TickContext) {
        for id in std::mem::take(&mut self.pending) {
            ctx.client.cancel(id);
        }
    }
}
