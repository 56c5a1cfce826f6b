//  LIB.rs
//    by Lut99
//
//  Created:
//    20 Jan 2025, 09:01:55
//  Last edited:
//    22 Jun 2026, 12:24:30
//  Auto updated?
//    Yes
//
//  Description:
//!   The `weft-wrk` crate implements the core of the Weft worker runtime:
//!   the worker factory and its tick loop, which drain command batches
//!   from a sidecar host, drive cooperative workflow and activity
//!   executions across task queues and return the aggregated outbound
//!   batch, preserving deterministic replay semantics throughout.
//

// Declare the modules
pub mod client;
pub mod codec;
pub mod dummy;
pub mod errors;
pub mod events;
pub mod execution;
pub mod factory;
pub mod queue;
pub mod reader;
pub mod registry;
pub mod router;
pub mod server;
pub mod spec;
pub mod worker;

// Pull some stuff into the crate namespace
pub use client::Client;
pub use errors::FactoryError as Error;
pub use execution::{Flow, Workflow, WorkflowContext};
pub use factory::WorkerFactory;
pub use queue::ResponseQueue;
pub use spec::{DataConverter, FactoryOptions, HostConnection, JsonConverter, RpcConnection};
pub use worker::{Activity, ActivityContext, Worker};
