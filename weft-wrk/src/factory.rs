//  FACTORY.rs
//    by Lut99
//
//  Created:
//    29 Jan 2025, 09:02:17
//  Last edited:
//    22 Jun 2026, 12:21:48
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the worker factory and its tick loop: the owner of every
//!   other runtime component, which drains the host's command batches,
//!   dispatches them, fires the lifecycle events and returns the
//!   aggregated outbound batch, tick after tick.
//

use std::str::FromStr as _;
use std::sync::Arc;

use error_trace::{ErrorTrace as _, trace};
use log::{debug, error, info};
use specifications::commands::Command;
use specifications::events::Event;
use weft_shr::identifier::Identifier;

use crate::client::{Client, Waiter};
use crate::codec::{Codec, codec_for};
pub use crate::errors::FactoryError as Error;
use crate::errors::TickError;
use crate::events::{LifecycleBus, TickScope};
use crate::queue::ResponseQueue;
use crate::reader::{AttributeReader, Reader, SelectiveReader};
use crate::registry::TaskQueueRegistry;
use crate::router::Router;
use crate::server::Server;
use crate::spec::{Batch, DataConverter, FactoryOptions, HostConnection, RpcConnection, TickContext};
use crate::worker::Worker;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::{Value, json};
    use specifications::commands::{
        CANCEL_WORKFLOW, GET_WORKER_INFO, GET_WORKFLOW_RESULT, HEADER_TASK_QUEUE, OPT_NAME, OPT_SIGNAL_NAME, OPT_WORKFLOW_ID, Payload, Request,
        Response, SIGNAL_WITH_START_WORKFLOW, SIGNAL_WORKFLOW, START_WORKFLOW,
    };
    use specifications::failures::{Failure, FailureKind};
    use specifications::info::WorkerInfo;

    use super::*;
    use crate::codec::ProtoCodec;
    use crate::dummy::{DummyHost, DummyRpc, RelayWorkflow, SimpleSignalledWorkflowWithSleep, SimpleWorkflow, UppercaseActivity};
    use crate::spec::{CodecKind, JsonConverter};


    /// Builds a factory with a `default` worker carrying the sample handlers. Also sets up the
    /// logger if the `test_logging` feature is given.
    fn factory() -> WorkerFactory {
        #[cfg(feature = "test_logging")]
        if let Err(err) = humanlog::HumanLogger::terminal(humanlog::DebugMode::Debug).init() {
            eprintln!("WARNING: Failed to setup logger: {err} (no logging for this session)");
        }

        let mut factory: WorkerFactory = WorkerFactory::new(Arc::new(JsonConverter), Arc::new(DummyRpc::new()));
        let worker: &mut Worker = factory.new_worker("default").unwrap();
        worker.register_workflow("SimpleWorkflow", || Box::new(SimpleWorkflow)).unwrap();
        worker.register_workflow("SimpleSignalledWorkflowWithSleep", || Box::<SimpleSignalledWorkflowWithSleep>::default()).unwrap();
        worker.register_workflow("RelayWorkflow", || Box::<RelayWorkflow>::default()).unwrap();
        worker.register_activity("Uppercase", UppercaseActivity).unwrap();
        factory
    }

    /// Builds a start request routed to the `default` queue.
    fn start_request(id: u64, kind: &str, workflow_id: &str, payloads: Vec<Payload>) -> Command {
        Command::Request(
            Request::new(id, START_WORKFLOW)
                .with_option(OPT_NAME, Value::String(kind.into()))
                .with_option(OPT_WORKFLOW_ID, Value::String(workflow_id.into()))
                .with_payloads(payloads)
                .with_header(HEADER_TASK_QUEUE, "default"),
        )
    }

    /// Encodes a value with the JSON converter.
    fn payload(value: &Value) -> Payload { JsonConverter.encode(value).unwrap() }

    /// Finds the response with the given id in a command list.
    fn response_of(commands: &[Command], id: u64) -> Result<Vec<Payload>, Failure> {
        match commands.iter().find(|c| !c.is_request() && c.id() == id) {
            Some(Command::Response(res)) => res.result.clone(),
            _ => panic!("no response with id {id}"),
        }
    }


    #[tokio::test]
    async fn test_start_and_result() {
        let mut factory: WorkerFactory = factory();
        let mut host: DummyHost = DummyHost::new();
        host.push_batch(&[start_request(1, "SimpleWorkflow", "wf-1", vec![payload(&json!("hello world"))])]);

        assert_eq!(factory.run(&mut host).await.unwrap(), 0);
        assert!(host.errors.is_empty());

        let result: Vec<Payload> = response_of(&host.sent_commands(0), 1).unwrap();
        assert_eq!(JsonConverter.decode(&result[0]).unwrap(), json!("HELLO WORLD"));
    }

    #[tokio::test]
    async fn test_duplicate_start() {
        let mut factory: WorkerFactory = factory();
        let mut host: DummyHost = DummyHost::new();
        host.push_batch(&[
            start_request(1, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![]),
            start_request(2, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![]),
        ]);

        factory.run(&mut host).await.unwrap();
        assert_eq!(response_of(&host.sent_commands(0), 2).unwrap_err().kind, FailureKind::AlreadyStarted);
    }

    #[tokio::test]
    async fn test_signal_then_result() {
        let mut factory: WorkerFactory = factory();
        let mut host: DummyHost = DummyHost::new();
        host.push_batch(&[start_request(1, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![])]);
        host.push_batch(&[Command::Request(
            Request::new(2, SIGNAL_WORKFLOW)
                .with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into()))
                .with_option(OPT_SIGNAL_NAME, Value::String("add".into()))
                .with_payloads(vec![payload(&json!(-1))])
                .with_header(HEADER_TASK_QUEUE, "default"),
        )]);
        // The worker's first outbound id is 1: the timer issued during start
        host.push_batch(&[Command::Response(Response { id: 1, result: Ok(vec![]) })]);

        factory.run(&mut host).await.unwrap();
        assert!(host.errors.is_empty());

        // Tick 1 sends the timer request, tick 3 resolves the start with the final sum
        assert!(host.sent_commands(0).iter().any(|c| c.is_request()));
        let result: Vec<Payload> = response_of(&host.sent_commands(2), 1).unwrap();
        assert_eq!(JsonConverter.decode(&result[0]).unwrap(), json!(-1));
    }

    #[tokio::test]
    async fn test_signal_with_start() {
        let mut factory: WorkerFactory = factory();
        let mut host: DummyHost = DummyHost::new();
        host.push_batch(&[Command::Request(
            Request::new(10, SIGNAL_WITH_START_WORKFLOW)
                .with_option(OPT_NAME, Value::String("SimpleSignalledWorkflowWithSleep".into()))
                .with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into()))
                .with_option(OPT_SIGNAL_NAME, Value::String("add".into()))
                .with_payloads(vec![payload(&json!(-1))])
                .with_header(HEADER_TASK_QUEUE, "default"),
        )]);
        host.push_batch(&[
            Command::Request(
                Request::new(11, SIGNAL_WORKFLOW)
                    .with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into()))
                    .with_option(OPT_SIGNAL_NAME, Value::String("add".into()))
                    .with_payloads(vec![payload(&json!(-1))])
                    .with_header(HEADER_TASK_QUEUE, "default"),
            ),
            Command::Request(
                Request::new(12, GET_WORKFLOW_RESULT).with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into())).with_header(HEADER_TASK_QUEUE, "default"),
            ),
        ]);
        host.push_batch(&[Command::Response(Response { id: 1, result: Ok(vec![]) })]);

        factory.run(&mut host).await.unwrap();
        assert!(host.errors.is_empty());

        // The combined command acks immediately with the run id...
        let started: Vec<Payload> = response_of(&host.sent_commands(0), 10).unwrap();
        assert_eq!(JsonConverter.decode(&started[0]).unwrap(), json!({ "runId": "run-10" }));

        // ...and the delivered signal plus the later one make the result -2
        let result: Vec<Payload> = response_of(&host.sent_commands(2), 12).unwrap();
        assert_eq!(JsonConverter.decode(&result[0]).unwrap(), json!(-2));

        // Every inbound request got exactly one response across the whole run
        let all: Vec<Command> = host.all_sent_commands();
        for id in [10, 11, 12] {
            assert_eq!(all.iter().filter(|c| !c.is_request() && c.id() == id).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_signal_before_start() {
        let mut factory: WorkerFactory = factory();
        let mut host: DummyHost = DummyHost::new();
        host.push_batch(&[Command::Request(
            Request::new(1, SIGNAL_WORKFLOW)
                .with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into()))
                .with_option(OPT_SIGNAL_NAME, Value::String("add".into()))
                .with_header(HEADER_TASK_QUEUE, "default"),
        )]);

        factory.run(&mut host).await.unwrap();
        assert_eq!(response_of(&host.sent_commands(0), 1).unwrap_err().kind, FailureKind::IllegalState);
    }

    #[tokio::test]
    async fn test_cancel() {
        let mut factory: WorkerFactory = factory();
        let mut host: DummyHost = DummyHost::new();
        host.push_batch(&[start_request(1, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![payload(&json!(-1))])]);
        host.push_batch(&[Command::Request(
            Request::new(2, CANCEL_WORKFLOW).with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into())).with_header(HEADER_TASK_QUEUE, "default"),
        )]);

        factory.run(&mut host).await.unwrap();

        // The cancel itself acks, and the start resolves as a canceled failure with a cause
        assert!(response_of(&host.sent_commands(1), 2).is_ok());
        let failure: Failure = response_of(&host.sent_commands(1), 1).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Canceled);
        assert!(failure.cause.is_some());
    }

    #[tokio::test]
    async fn test_activity_relay() {
        let mut factory: WorkerFactory = factory();
        let mut host: DummyHost = DummyHost::new();
        host.push_batch(&[start_request(1, "RelayWorkflow", "wf-1", vec![payload(&json!("quiet"))])]);
        // The host "runs" the activity and resolves the outbound request
        host.push_batch(&[Command::Response(Response { id: 1, result: Ok(vec![payload(&json!("QUIET"))]) })]);

        factory.run(&mut host).await.unwrap();
        assert!(host.errors.is_empty());

        let result: Vec<Payload> = response_of(&host.sent_commands(1), 1).unwrap();
        assert_eq!(JsonConverter.decode(&result[0]).unwrap(), json!("QUIET"));
    }

    #[tokio::test]
    async fn test_protobuf_end_to_end() {
        let options: FactoryOptions = FactoryOptions { codec: Some(CodecKind::Protobuf), legacy_annotations: false };
        let mut factory: WorkerFactory = WorkerFactory::with_options(Arc::new(JsonConverter), Arc::new(DummyRpc::new()), options);
        factory.new_worker("default").unwrap().register_workflow("SimpleWorkflow", || Box::new(SimpleWorkflow)).unwrap();

        let mut host: DummyHost = DummyHost::new().with_codec(ProtoCodec);
        host.push_batch(&[start_request(1, "SimpleWorkflow", "wf-1", vec![payload(&json!("proto"))])]);

        factory.run(&mut host).await.unwrap();
        assert!(host.errors.is_empty());
        let result: Vec<Payload> = response_of(&host.sent_commands(0), 1).unwrap();
        assert_eq!(JsonConverter.decode(&result[0]).unwrap(), json!("PROTO"));
    }

    #[tokio::test]
    async fn test_get_worker_info() {
        let mut factory: WorkerFactory = factory();
        let mut host: DummyHost = DummyHost::new();
        host.push_batch(&[Command::Request(Request::new(1, GET_WORKER_INFO))]);

        factory.run(&mut host).await.unwrap();

        let result: Vec<Payload> = response_of(&host.sent_commands(0), 1).unwrap();
        let infos: Vec<WorkerInfo> = serde_json::from_slice(&result[0].data).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].task_queue, "default");
        assert_eq!(infos[0].workflows, vec!["SimpleWorkflow", "SimpleSignalledWorkflowWithSleep", "RelayWorkflow"]);
        assert_eq!(infos[0].activities, vec!["Uppercase"]);
    }

    #[tokio::test]
    async fn test_lifecycle_order() {
        let mut factory: WorkerFactory = factory();
        let seen: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
        for event in [Event::Query, Event::Tick, Event::Signal, Event::Callback] {
            let seen: Arc<Mutex<Vec<Event>>> = seen.clone();
            factory.events_mut().listen(event, format!("spy-{event}"), move |_scope| seen.lock().unwrap().push(event));
        }

        let mut host: DummyHost = DummyHost::new();
        host.push_batch(&[]);
        host.push_batch(&[]);
        factory.run(&mut host).await.unwrap();

        // Emission order is contractual, whatever the registration order was
        assert_eq!(*seen.lock().unwrap(), [Event::ORDER.as_slice(), Event::ORDER.as_slice()].concat());
    }

    #[tokio::test]
    async fn test_per_batch_failures_do_not_kill_the_loop() {
        let mut factory: WorkerFactory = factory();
        let mut host: DummyHost = DummyHost::new();
        host.push_raw(b"}{ definitely not a batch".to_vec());
        // A response nobody asked for violates the protocol
        host.push_batch(&[Command::Response(Response { id: 999, result: Ok(vec![]) })]);
        host.push_batch(&[start_request(1, "SimpleWorkflow", "wf-1", vec![payload(&json!("still alive"))])]);

        assert_eq!(factory.run(&mut host).await.unwrap(), 0);
        assert_eq!(host.errors.len(), 2);

        // The healthy batch after the failures still went through
        let result: Vec<Payload> = response_of(&host.sent_commands(0), 1).unwrap();
        assert_eq!(JsonConverter.decode(&result[0]).unwrap(), json!("STILL ALIVE"));
    }

    #[tokio::test]
    async fn test_identical_input_gives_identical_output() {
        let script = |host: &mut DummyHost| {
            host.push_batch(&[start_request(1, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![])]);
            host.push_batch(&[Command::Response(Response { id: 1, result: Ok(vec![]) })]);
        };

        let mut first: DummyHost = DummyHost::new();
        script(&mut first);
        factory().run(&mut first).await.unwrap();

        let mut second: DummyHost = DummyHost::new();
        script(&mut second);
        factory().run(&mut second).await.unwrap();

        assert_eq!(first.sent, second.sent);
    }

    #[tokio::test]
    async fn test_pending_slots_survive_the_tick() {
        let mut factory: WorkerFactory = factory();
        let mut host: DummyHost = DummyHost::new();
        host.push_batch(&[start_request(1, "SimpleSignalledWorkflowWithSleep", "wf-1", vec![])]);

        factory.run(&mut host).await.unwrap();

        // The timer request went out this tick, so its slot must still be pending
        assert_eq!(factory.client().pending(), 1);
        assert!(factory.client().is_pending(1));
        assert!(factory.queue().is_empty());
    }

    #[test]
    fn test_registration_rules() {
        let mut factory: WorkerFactory = factory();
        assert!(matches!(factory.new_worker("default"), Err(Error::DuplicateQueue { .. })));
        assert!(matches!(factory.new_worker("no spaces allowed"), Err(Error::IllegalQueueName { .. })));
    }
}





/***** LIBRARY *****/
/// The worker factory: owns the registry, router, client, queue, event bus and codec, and runs
/// the batch loop against a host connection.
///
/// Created once per process. Workers are created eagerly through [`WorkerFactory::new_worker()`]
/// before [`WorkerFactory::run()`] enters the loop.
pub struct WorkerFactory {
    /// The registered workers, by task queue.
    registry:  TaskQueueRegistry,
    /// The dispatch table for factory-scoped requests.
    router:    Router,
    /// The inbound dispatcher.
    server:    Server,
    /// The correlating client for outbound requests.
    client:    Client,
    /// The queue collecting each tick's outbound commands.
    queue:     ResponseQueue,
    /// The lifecycle event bus.
    events:    LifecycleBus,
    /// The reader that discovers handlers on user types.
    reader:    Box<dyn Reader>,
    /// The converter that marshals payloads.
    converter: Arc<dyn DataConverter>,
    /// The shared RPC channel handed to activity handlers.
    rpc:       Arc<dyn RpcConnection>,
    /// The codec framing batches on the host boundary.
    codec:     Box<dyn Codec>,
    /// Whether the tick loop has been entered.
    running:   bool,
}

impl WorkerFactory {
    /// Constructor for the WorkerFactory using the environment's options.
    ///
    /// # Arguments
    /// - `converter`: The [`DataConverter`] that marshals payloads.
    /// - `rpc`: The [`RpcConnection`] handed to activity handlers.
    ///
    /// # Returns
    /// A new WorkerFactory without any workers.
    #[inline]
    pub fn new(converter: Arc<dyn DataConverter>, rpc: Arc<dyn RpcConnection>) -> Self { Self::with_options(converter, rpc, FactoryOptions::default()) }

    /// Constructor for the WorkerFactory with explicit options.
    ///
    /// # Arguments
    /// - `converter`: The [`DataConverter`] that marshals payloads.
    /// - `rpc`: The [`RpcConnection`] handed to activity handlers.
    /// - `options`: The [`FactoryOptions`] to apply.
    ///
    /// # Returns
    /// A new WorkerFactory without any workers.
    pub fn with_options(converter: Arc<dyn DataConverter>, rpc: Arc<dyn RpcConnection>, options: FactoryOptions) -> Self {
        let kind = options.resolve_codec();
        info!("Initializing worker factory ({kind:?} codec, legacy annotations {})", if options.legacy_annotations { "on" } else { "off" });

        let reader: Box<dyn Reader> = if options.legacy_annotations { Box::new(SelectiveReader::new()) } else { Box::new(AttributeReader) };
        Self {
            registry: TaskQueueRegistry::new(),
            router: Router::with_defaults(),
            server: Server::new(),
            client: Client::new(),
            queue: ResponseQueue::new(),
            events: LifecycleBus::new(),
            reader,
            converter,
            rpc,
            codec: codec_for(kind),
            running: false,
        }
    }

    /// Creates a new worker for the given task queue and registers it.
    ///
    /// # Arguments
    /// - `task_queue`: The task queue the new worker serves.
    ///
    /// # Returns
    /// A mutable reference to the new worker, so handlers can be attached.
    ///
    /// # Errors
    /// This function errors if the name is illegal, already taken, or if the loop is already
    /// running (the registry never mutates during a tick).
    pub fn new_worker(&mut self, task_queue: &str) -> Result<&mut Worker, Error> {
        if self.running {
            return Err(Error::RegisterWhileRunning { name: task_queue.into() });
        }
        let name: Identifier = Identifier::from_str(task_queue).map_err(|err| Error::IllegalQueueName { raw: task_queue.into(), err })?;
        self.registry.register(Worker::new(name)).map_err(|err| Error::DuplicateQueue { err })
    }

    /// Returns the reader that discovers handlers on user types.
    #[inline]
    pub fn reader(&self) -> &dyn Reader { self.reader.as_ref() }

    /// Returns the correlating client.
    #[inline]
    pub fn client(&self) -> &Client { &self.client }

    /// Returns the response queue.
    #[inline]
    pub fn queue(&self) -> &ResponseQueue { &self.queue }

    /// Returns the converter that marshals payloads.
    #[inline]
    pub fn converter(&self) -> &Arc<dyn DataConverter> { &self.converter }

    /// Returns the lifecycle event bus, for registering listeners at boot.
    #[inline]
    pub fn events_mut(&mut self) -> &mut LifecycleBus { &mut self.events }

    /// Returns the factory-scoped router, for registering routes at boot.
    #[inline]
    pub fn router_mut(&mut self) -> &mut Router { &mut self.router }

    /// Emits the lifecycle events of one tick, in the contractual order
    /// `ON_SIGNAL, ON_CALLBACK, ON_QUERY, ON_TICK`. Listeners may produce further outbound
    /// commands, which land in the same response queue.
    pub fn tick(&mut self) {
        let Self { client, queue, events, .. } = self;
        let mut scope: TickScope = TickScope { client, queue };
        for event in Event::ORDER {
            debug!("Emitting lifecycle event {event}");
            events.emit(event, &mut scope);
        }
    }

    /// Enters the batch loop against the given host until it signals end-of-stream.
    ///
    /// Per-batch failures are reported through [`HostConnection::error()`] and do not terminate
    /// the loop; only a broken host connection does.
    ///
    /// # Arguments
    /// - `host`: The [`HostConnection`] to serve.
    ///
    /// # Returns
    /// The process exit code (0 on a clean end-of-stream).
    ///
    /// # Errors
    /// This function errors if the host connection itself breaks down.
    pub async fn run<H: HostConnection>(&mut self, host: &mut H) -> Result<i32, Error> {
        self.running = true;
        info!("Entering tick loop");
        loop {
            let batch: Option<Batch> = host.wait_batch().await.map_err(|err| Error::HostRecvError { err: Box::new(err) })?;
            let Some(batch) = batch else {
                info!("Host signalled end-of-stream; leaving tick loop");
                self.running = false;
                return Ok(0);
            };

            match self.process_batch(&batch).await {
                Ok(frame) => {
                    if let Err(err) = host.send(frame).await {
                        let err: TickError = TickError::SendError { err: Box::new(err) };
                        error!("{}", err.trace());
                        if let Err(err) = host.error(&err).await {
                            error!("{}", trace!(("Failed to report tick failure to host"), err));
                        }
                    }
                },
                Err(err) => {
                    error!("{}", err.trace());
                    // Whatever half-produced output there was does not leave the process
                    self.queue.clear();
                    if let Err(err) = host.error(&err).await {
                        error!("{}", trace!(("Failed to report tick failure to host"), err));
                    }
                },
            }
        }
    }

    /// Runs one full tick for the given batch: decode, dispatch, lifecycle events, encode.
    ///
    /// # Arguments
    /// - `batch`: The [`Batch`] the host delivered.
    ///
    /// # Returns
    /// The encoded outbound batch to hand to the host.
    ///
    /// # Errors
    /// This function errors if the batch cannot be decoded, violates the correlation protocol,
    /// or the outbound commands cannot be encoded. The caller reports such failures to the host
    /// and keeps the loop alive.
    async fn process_batch(&mut self, batch: &Batch) -> Result<Vec<u8>, TickError> {
        let commands: Vec<Command> = self.codec.decode(&batch.messages).map_err(|err| TickError::DecodeError { err })?;
        debug!("Processing batch of {} command(s)", commands.len());

        {
            let Self { registry, router, server, client, queue, converter, rpc, .. } = self;
            let mut ctx: TickContext = TickContext { client, queue, converter: converter.as_ref(), rpc: &*rpc };

            // Inbound commands go in delivery order; every resolution a response triggers runs
            // to completion before the next command is looked at
            for command in commands {
                match command {
                    Command::Request(request) => server.dispatch(registry, router, &mut ctx, request, &batch.context).await,
                    Command::Response(response) => {
                        let resolution = ctx.client.dispatch(response).map_err(|err| TickError::ProtocolError { err })?;
                        match resolution {
                            Some(resolution) => match resolution.waiter {
                                Waiter::Workflow { queue: task_queue, workflow_id } => match registry.get_mut(&task_queue) {
                                    Some(worker) => worker.resume(&mut ctx, &workflow_id, resolution.id, resolution.result),
                                    None => debug!("Dropping resolution {} for unknown task queue '{task_queue}'", resolution.id),
                                },
                                Waiter::Detached => debug!("Dropping resolution {} of detached request", resolution.id),
                            },
                            None => {},
                        }
                    },
                }
            }
        }

        // Lifecycle events fire after all resolutions, before encode
        self.tick();

        let outbound: Vec<Command> = self.queue.drain();
        debug!("Tick produced {} outbound command(s)", outbound.len());
        self.codec.encode(&outbound).map_err(|err| TickError::EncodeError { err })
    }
}
