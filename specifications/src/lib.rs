//  LIB.rs
//    by Lut99
//
//  Created:
//    13 Jan 2025, 09:41:12
//  Last edited:
//    22 Jun 2026, 10:08:51
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the shared vocabulary of the Weft framework: the command
//!   batches exchanged with the host, payloads, failures, worker
//!   inventories and the lifecycle event names.
//

// Declare the modules
pub mod commands;
pub mod events;
pub mod failures;
pub mod info;
pub mod wire;

// Pull some stuff into the crate namespace
pub use commands::{Command, Headers, Payload, Request, Response};
pub use events::Event;
pub use failures::{Failure, FailureKind};
