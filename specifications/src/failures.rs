//  FAILURES.rs
//    by Lut99
//
//  Created:
//    13 Jan 2025, 10:02:36
//  Last edited:
//    04 May 2026, 13:51:20
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the failure taxonomy that travels across the host boundary.
//!   Every failed command resolution is expressed as a [`Failure`] with
//!   one of a fixed set of [`FailureKind`]s.
//

use std::error;
use std::fmt::{Display, Formatter, Result as FResult};

use enum_debug::EnumDebug;
use prost::Enumeration;
use serde::{Deserialize, Serialize};


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn test_failure_chain() {
        let failure: Failure = Failure::new(FailureKind::Canceled, "workflow canceled").with_cause(Failure::new(FailureKind::Application, "timer gone"));
        assert_eq!(failure.kind, FailureKind::Canceled);
        assert_eq!(failure.cause.as_ref().unwrap().kind, FailureKind::Application);

        // The cause must be reachable through the standard error chain as well
        let source: &dyn error::Error = error::Error::source(&failure).unwrap();
        assert_eq!(source.to_string(), "timer gone (Application)");
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in
            [FailureKind::Application, FailureKind::InvalidArgument, FailureKind::NotFound, FailureKind::IllegalState, FailureKind::AlreadyStarted, FailureKind::Canceled, FailureKind::Terminated, FailureKind::NotImplemented, FailureKind::Protocol]
        {
            assert_eq!(FailureKind::try_from(kind as i32).unwrap(), kind);
        }
        assert!(FailureKind::try_from(42).is_err());
    }
}





/***** LIBRARY *****/
/// Defines the fixed set of categories a [`Failure`] may carry.
///
/// The discriminants are part of the wire contract (see [`crate::wire`]) and must never be
/// re-ordered.
#[derive(Clone, Copy, Debug, Deserialize, Enumeration, EnumDebug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[repr(i32)]
pub enum FailureKind {
    /// A failure raised by user handler code itself.
    Application     = 0,
    /// A header or option was missing or ill-typed.
    InvalidArgument = 1,
    /// A task queue (or other addressable entity) was not registered.
    NotFound        = 2,
    /// A signal/query was delivered to an execution that has not started or has terminated.
    IllegalState    = 3,
    /// A start was requested for a workflow id that is already running.
    AlreadyStarted  = 4,
    /// The execution was canceled before it could produce a value.
    Canceled        = 5,
    /// The execution was terminated by explicit request.
    Terminated      = 6,
    /// The request kind is not implemented by the receiving worker.
    NotImplemented  = 7,
    /// The peer violated the command protocol (e.g., a response without a matching request).
    Protocol        = 8,
}



/// Defines a failed command resolution.
///
/// Failures form a chain through their `cause` field, which is surfaced through
/// [`error::Error::source()`] so they compose with the rest of the error handling.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Failure {
    /// The category of this failure.
    pub kind:    FailureKind,
    /// A human-readable description of what went wrong.
    pub message: String,
    /// The failure that caused this one, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause:   Option<Box<Failure>>,
}

impl Failure {
    /// Constructor for the Failure.
    ///
    /// # Arguments
    /// - `kind`: The [`FailureKind`] categorizing this failure.
    /// - `message`: A human-readable description of what went wrong.
    ///
    /// # Returns
    /// A new Failure without a cause.
    #[inline]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self { Self { kind, message: message.into(), cause: None } }

    /// Chains a cause onto this Failure.
    ///
    /// # Arguments
    /// - `cause`: The Failure that caused this one.
    ///
    /// # Returns
    /// The same Failure, with the cause attached.
    #[inline]
    pub fn with_cause(mut self, cause: Failure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Shorthand constructor for an [`FailureKind::Application`] failure.
    #[inline]
    pub fn application(message: impl Into<String>) -> Self { Self::new(FailureKind::Application, message) }

    /// Shorthand constructor for an [`FailureKind::InvalidArgument`] failure.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self { Self::new(FailureKind::InvalidArgument, message) }

    /// Shorthand constructor for a [`FailureKind::NotFound`] failure.
    #[inline]
    pub fn not_found(message: impl Into<String>) -> Self { Self::new(FailureKind::NotFound, message) }

    /// Shorthand constructor for an [`FailureKind::IllegalState`] failure.
    #[inline]
    pub fn illegal_state(message: impl Into<String>) -> Self { Self::new(FailureKind::IllegalState, message) }

    /// Shorthand constructor for an [`FailureKind::AlreadyStarted`] failure.
    #[inline]
    pub fn already_started(message: impl Into<String>) -> Self { Self::new(FailureKind::AlreadyStarted, message) }

    /// Shorthand constructor for a [`FailureKind::Canceled`] failure.
    #[inline]
    pub fn canceled(message: impl Into<String>) -> Self { Self::new(FailureKind::Canceled, message) }

    /// Shorthand constructor for a [`FailureKind::Terminated`] failure.
    #[inline]
    pub fn terminated(message: impl Into<String>) -> Self { Self::new(FailureKind::Terminated, message) }

    /// Shorthand constructor for a [`FailureKind::NotImplemented`] failure.
    #[inline]
    pub fn not_implemented(message: impl Into<String>) -> Self { Self::new(FailureKind::NotImplemented, message) }

    /// Shorthand constructor for a [`FailureKind::Protocol`] failure.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self { Self::new(FailureKind::Protocol, message) }
}

impl Display for Failure {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "{} ({})", self.message, self.kind.variant()) }
}
impl error::Error for Failure {
    #[inline]
    fn source(&self) -> Option<&(dyn error::Error + 'static)> { self.cause.as_ref().map(|c| c.as_ref() as &(dyn error::Error + 'static)) }
}
