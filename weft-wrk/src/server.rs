//  SERVER.rs
//    by Lut99
//
//  Created:
//    24 Jan 2025, 09:31:58
//  Last edited:
//    22 Jun 2026, 11:58:23
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the server side of the runtime: every inbound request is
//!   resolved here, either against the factory-scoped router or against
//!   the worker its `taskQueue` header addresses.
//

use log::debug;
use specifications::commands::{HEADER_TASK_QUEUE, Headers, Request};
use specifications::failures::Failure;

use crate::registry::TaskQueueRegistry;
use crate::router::Router;
use crate::spec::TickContext;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use serde_json::Value;
    use specifications::commands::{Command, OPT_NAME, OPT_WORKFLOW_ID, START_WORKFLOW};
    use specifications::failures::FailureKind;
    use weft_shr::identifier::Identifier;

    use super::*;
    use crate::dummy::{DummyTick, SimpleWorkflow};
    use crate::worker::Worker;


    /// Builds a registry with queues `a` and `b`, where only `b` knows `SimpleWorkflow`.
    fn registry() -> TaskQueueRegistry {
        let mut registry: TaskQueueRegistry = TaskQueueRegistry::new();
        registry.register(Worker::new(Identifier::from_str("a").unwrap())).unwrap();
        let worker: &mut Worker = registry.register(Worker::new(Identifier::from_str("b").unwrap())).unwrap();
        worker.register_workflow("SimpleWorkflow", || Box::new(SimpleWorkflow)).unwrap();
        registry
    }

    /// Builds a start request without routing headers.
    fn start_request(id: u64) -> Request {
        Request::new(id, START_WORKFLOW)
            .with_option(OPT_NAME, Value::String("SimpleWorkflow".into()))
            .with_option(OPT_WORKFLOW_ID, Value::String("wf-1".into()))
    }

    /// Reads the failure of the response with the given id.
    fn failure_of(commands: &[Command], id: u64) -> Failure {
        match commands.iter().find(|c| !c.is_request() && c.id() == id) {
            Some(Command::Response(res)) => res.result.clone().unwrap_err(),
            _ => panic!("no response with id {id}"),
        }
    }


    #[tokio::test]
    async fn test_task_queue_routing() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx = bench.ctx();
        let mut registry: TaskQueueRegistry = registry();
        let router: Router = Router::with_defaults();
        let server: Server = Server::new();

        // Queue `b` knows the workflow; queue `a` does not
        server.dispatch(&mut registry, &router, &mut ctx, start_request(1).with_header(HEADER_TASK_QUEUE, "b"), &Headers::new()).await;
        server.dispatch(&mut registry, &router, &mut ctx, start_request(2).with_header(HEADER_TASK_QUEUE, "a"), &Headers::new()).await;
        // Queue `c` does not exist
        server.dispatch(&mut registry, &router, &mut ctx, start_request(3).with_header(HEADER_TASK_QUEUE, "c"), &Headers::new()).await;

        let commands: &[Command] = ctx.queue.commands();
        assert!(matches!(commands.iter().find(|c| c.id() == 1), Some(Command::Response(res)) if res.result.is_ok()));
        assert_eq!(failure_of(commands, 2).kind, FailureKind::NotFound);
        assert_eq!(failure_of(commands, 3).kind, FailureKind::NotFound);
    }

    #[tokio::test]
    async fn test_batch_context_supplies_the_queue() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx = bench.ctx();
        let mut registry: TaskQueueRegistry = registry();
        let router: Router = Router::with_defaults();
        let server: Server = Server::new();

        let mut batch_context: Headers = Headers::new();
        batch_context.insert(HEADER_TASK_QUEUE.into(), "b".into());
        server.dispatch(&mut registry, &router, &mut ctx, start_request(1), &batch_context).await;
        assert!(matches!(ctx.queue.commands().first(), Some(Command::Response(res)) if res.result.is_ok()));
    }

    #[tokio::test]
    async fn test_headerless_requests_hit_the_router() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx = bench.ctx();
        let mut registry: TaskQueueRegistry = registry();
        let router: Router = Router::with_defaults();
        let server: Server = Server::new();

        server.dispatch(&mut registry, &router, &mut ctx, Request::new(1, specifications::commands::GET_WORKER_INFO), &Headers::new()).await;
        assert!(matches!(ctx.queue.commands().first(), Some(Command::Response(res)) if res.result.is_ok()));
    }

    #[tokio::test]
    async fn test_empty_queue_header_is_rejected() {
        let mut bench: DummyTick = DummyTick::new();
        let mut ctx = bench.ctx();
        let mut registry: TaskQueueRegistry = registry();
        let router: Router = Router::with_defaults();
        let server: Server = Server::new();

        server.dispatch(&mut registry, &router, &mut ctx, start_request(1).with_header(HEADER_TASK_QUEUE, ""), &Headers::new()).await;
        assert_eq!(failure_of(ctx.queue.commands(), 1).kind, FailureKind::InvalidArgument);
    }
}





/***** LIBRARY *****/
/// The inbound half of the runtime: routes every request either to the factory-scoped router or
/// to the worker its headers address, and guarantees that exactly one response per request is
/// enqueued.
pub struct Server;

impl Server {
    /// Constructor for the Server.
    #[inline]
    pub fn new() -> Self { Self }

    /// Dispatches one inbound request.
    ///
    /// Resolution order: a request without a `taskQueue` header (on the request or on the
    /// batch context, with the request taking precedence) is factory-scoped and goes to the
    /// router; any other request goes to the worker registered for that queue. Failures along
    /// the way become failure responses; the tick itself is never aborted here.
    ///
    /// # Arguments
    /// - `registry`: The [`TaskQueueRegistry`] with all known workers.
    /// - `router`: The [`Router`] for factory-scoped requests.
    /// - `ctx`: The [`TickContext`] of the current tick.
    /// - `request`: The request to dispatch.
    /// - `context`: The headers the host attached to the whole batch.
    pub async fn dispatch(&self, registry: &mut TaskQueueRegistry, router: &Router, ctx: &mut TickContext<'_>, request: Request, context: &Headers) {
        let task_queue: Option<String> = request.header.get(HEADER_TASK_QUEUE).or_else(|| context.get(HEADER_TASK_QUEUE)).cloned();
        match task_queue {
            // Factory-scoped request
            None => {
                let result = router.dispatch(registry, &request);
                ctx.queue.push_response(request.id, result);
            },

            // Routed to a worker
            Some(name) if name.is_empty() => {
                ctx.queue.push_response(
                    request.id,
                    Err(Failure::invalid_argument(format!("Request {} carries an ill-typed '{HEADER_TASK_QUEUE}' header", request.id))),
                );
            },
            Some(name) => match registry.get_mut(&name) {
                Some(worker) => worker.dispatch(ctx, request).await,
                None => {
                    debug!("Request {} addresses unregistered task queue '{name}'", request.id);
                    ctx.queue.push_response(request.id, Err(Failure::not_found(format!("Task queue '{name}' is not registered"))));
                },
            },
        }
    }
}

impl Default for Server {
    #[inline]
    fn default() -> Self { Self::new() }
}
