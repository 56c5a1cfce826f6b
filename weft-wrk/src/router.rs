//  ROUTER.rs
//    by Lut99
//
//  Created:
//    24 Jan 2025, 08:50:33
//  Last edited:
//    11 Mar 2026, 17:26:44
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the factory-scoped request router: a dispatch table keyed
//!   by request name for the requests that address no particular task
//!   queue. Ships with `GetWorkerInfo`.
//

use std::collections::HashMap;

use log::{debug, warn};
use specifications::commands::{ENCODING_JSON, GET_WORKER_INFO, METADATA_ENCODING, Payload, Request};
use specifications::failures::Failure;
use specifications::info::WorkerInfo;

use crate::registry::TaskQueueRegistry;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use weft_shr::identifier::Identifier;

    use super::*;
    use crate::worker::Worker;


    #[test]
    fn test_get_worker_info() {
        let mut registry: TaskQueueRegistry = TaskQueueRegistry::new();
        registry.register(Worker::new(Identifier::from_str("a").unwrap())).unwrap();
        registry.register(Worker::new(Identifier::from_str("b").unwrap())).unwrap();

        let router: Router = Router::with_defaults();
        let payloads: Vec<Payload> = router.dispatch(&registry, &Request::new(1, GET_WORKER_INFO)).unwrap();
        assert_eq!(payloads.len(), 1);

        let infos: Vec<WorkerInfo> = serde_json::from_slice(&payloads[0].data).unwrap();
        assert_eq!(infos.iter().map(|info| info.task_queue.as_str()).collect::<Vec<&str>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_route() {
        let registry: TaskQueueRegistry = TaskQueueRegistry::new();
        let router: Router = Router::with_defaults();
        let failure: Failure = router.dispatch(&registry, &Request::new(1, "GetClusterWeather")).unwrap_err();
        assert_eq!(failure.kind, specifications::failures::FailureKind::NotImplemented);
    }
}





/***** LIBRARY *****/
/// A handler for one factory-scoped request kind.
pub trait Route: Send {
    /// Handles a request of this route's kind.
    ///
    /// # Arguments
    /// - `registry`: The (immutable) [`TaskQueueRegistry`] of the factory.
    /// - `request`: The request to handle.
    ///
    /// # Returns
    /// The payloads of the response.
    ///
    /// # Errors
    /// This function errors if the request cannot be satisfied; the failure becomes the
    /// response.
    fn handle(&self, registry: &TaskQueueRegistry, request: &Request) -> Result<Vec<Payload>, Failure>;
}



/// The built-in route answering `GetWorkerInfo`: the registered task-queue names with their
/// handler type inventories, in registration order.
///
/// The reply is protocol-level (not user data), so it is written as plain JSON rather than
/// through the configured data converter.
pub struct WorkerInfoRoute;
impl Route for WorkerInfoRoute {
    fn handle(&self, registry: &TaskQueueRegistry, _request: &Request) -> Result<Vec<Payload>, Failure> {
        let infos: Vec<WorkerInfo> = registry.infos();
        let data: Vec<u8> = serde_json::to_vec(&infos).map_err(|err| Failure::application(format!("Cannot marshal worker info: {err}")))?;
        let mut payload: Payload = Payload::new(data);
        payload.metadata.insert(METADATA_ENCODING.into(), ENCODING_JSON.as_bytes().to_vec());
        Ok(vec![payload])
    }
}



/// The dispatch table for factory-scoped requests, keyed by request name. Routes are registered
/// at boot and immutable thereafter.
pub struct Router {
    /// The registered routes, by request name.
    routes: HashMap<String, Box<dyn Route>>,
}

impl Router {
    /// Constructor for the Router.
    ///
    /// # Returns
    /// A new Router without any routes.
    #[inline]
    pub fn new() -> Self { Self { routes: HashMap::new() } }

    /// Constructor for the Router that registers the built-in routes.
    ///
    /// # Returns
    /// A new Router that carries [`WorkerInfoRoute`].
    #[inline]
    pub fn with_defaults() -> Self {
        let mut router: Self = Self::new();
        router.register(GET_WORKER_INFO, WorkerInfoRoute);
        router
    }

    /// Registers a route. Boot-time only; the table does not mutate once the loop runs.
    ///
    /// # Arguments
    /// - `name`: The request name to answer.
    /// - `route`: The [`Route`] that answers it.
    ///
    /// # Returns
    /// This router again, for chaining.
    pub fn register(&mut self, name: impl Into<String>, route: impl Route + 'static) -> &mut Self {
        let name: String = name.into();
        if self.routes.insert(name.clone(), Box::new(route)).is_some() {
            warn!("Route '{name}' was registered twice; keeping the latest");
        }
        self
    }

    /// Dispatches a factory-scoped request to its route.
    ///
    /// # Arguments
    /// - `registry`: The [`TaskQueueRegistry`] of the factory.
    /// - `request`: The request to dispatch.
    ///
    /// # Returns
    /// The payloads of the response.
    ///
    /// # Errors
    /// This function errors if no route carries the request's name, or if the route itself
    /// fails; either way, the failure becomes the response.
    pub fn dispatch(&self, registry: &TaskQueueRegistry, request: &Request) -> Result<Vec<Payload>, Failure> {
        debug!("Routing factory-scoped request {} ('{}')", request.id, request.command);
        match self.routes.get(&request.command) {
            Some(route) => route.handle(registry, request),
            None => Err(Failure::not_implemented(format!("Request kind '{}' is not implemented by this factory", request.command))),
        }
    }
}

impl Default for Router {
    #[inline]
    fn default() -> Self { Self::new() }
}
