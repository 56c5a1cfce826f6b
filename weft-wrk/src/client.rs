//  CLIENT.rs
//    by Lut99
//
//  Created:
//    21 Jan 2025, 08:58:33
//  Last edited:
//    22 Jun 2026, 11:18:50
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the correlating client: the side of the runtime that
//!   issues outbound requests on behalf of workflow code and matches the
//!   host's responses back to the waiting execution.
//

use std::collections::HashMap;

use enum_debug::EnumDebug;
use log::debug;
use specifications::commands::{Payload, Request, Response};
use specifications::failures::Failure;
use weft_shr::identifier::Identifier;

pub use crate::errors::ClientError as Error;
use crate::queue::ResponseQueue;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;


    /// Shorthand for a workflow waiter in tests.
    fn waiter(id: &str) -> Waiter { Waiter::Workflow { queue: Identifier::from_str("default").unwrap(), workflow_id: id.into() } }


    #[test]
    fn test_ids_are_monotonic_and_queued() {
        let mut client: Client = Client::new();
        let mut queue: ResponseQueue = ResponseQueue::new();

        let first: u64 = client.request(&mut queue, waiter("a"), Request::new(0, "NewTimer"));
        let second: u64 = client.request(&mut queue, waiter("a"), Request::new(0, "ExecuteActivity"));
        assert_eq!((first, second), (1, 2));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.commands()[0].id(), 1);
        assert_eq!(client.pending(), 2);
    }

    #[test]
    fn test_dispatch_resolves_the_matching_slot() {
        let mut client: Client = Client::new();
        let mut queue: ResponseQueue = ResponseQueue::new();
        let id: u64 = client.request(&mut queue, waiter("a"), Request::new(0, "NewTimer"));

        let resolution: Resolution = client.dispatch(Response { id, result: Ok(vec![Payload::new(b"1".to_vec())]) }).unwrap().unwrap();
        assert_eq!(resolution.id, id);
        assert!(resolution.result.is_ok());
        assert_eq!(client.pending(), 0);

        // A second response for the same id is a protocol error
        assert!(matches!(client.dispatch(Response { id, result: Ok(vec![]) }), Err(Error::UnknownResponse { .. })));
    }

    #[test]
    fn test_cancel_flips_the_slot() {
        let mut client: Client = Client::new();
        let mut queue: ResponseQueue = ResponseQueue::new();
        let id: u64 = client.request(&mut queue, waiter("a"), Request::new(0, "NewTimer"));

        let resolution: Resolution = client.cancel(id).unwrap();
        assert!(matches!(&resolution.result, Err(failure) if failure.kind == specifications::failures::FailureKind::Canceled));

        // Cancelling twice is a no-op
        assert!(client.cancel(id).is_none());

        // The real response may still arrive afterwards; it is discarded quietly
        assert!(matches!(client.dispatch(Response { id, result: Ok(vec![]) }), Ok(None)));
        assert_eq!(client.pending(), 0);
    }
}





/***** AUXILLARY *****/
/// Identifies who is waiting on a pending slot.
#[derive(Clone, Debug, EnumDebug, Eq, PartialEq)]
pub enum Waiter {
    /// A workflow execution, addressed by its queue and workflow id, suspended on the slot.
    Workflow {
        /// The task queue of the worker owning the execution.
        queue:       Identifier,
        /// The id of the waiting execution.
        workflow_id: String,
    },
    /// Nobody observes the resolution (e.g., a lifecycle listener fired the request).
    Detached,
}



/// A resolved pending slot, ready to be routed back to its waiter.
#[derive(Debug)]
pub struct Resolution {
    /// Who was waiting on the slot.
    pub waiter: Waiter,
    /// The id of the outbound request that was resolved.
    pub id:     u64,
    /// The payloads or failure it resolved to.
    pub result: Result<Vec<Payload>, Failure>,
}



/// The state of a single pending slot.
#[derive(Debug)]
enum SlotState {
    /// Waiting for the host's response.
    Pending,
    /// Cancelled locally; the waiter has already observed a canceled failure, and the host's
    /// eventual response (if any) is to be discarded.
    Canceling,
}

/// A single entry of the promise table.
#[derive(Debug)]
struct Slot {
    /// Who is waiting on this slot.
    waiter: Waiter,
    /// Where the slot is in its lifecycle.
    state:  SlotState,
}





/***** LIBRARY *****/
/// The correlated request/response client used by workflow code to issue outbound commands.
///
/// Owns the promise table: one pending slot per outbound request id. Ids are unique and
/// monotonically increasing within the process lifetime, so identical inbound sequences produce
/// identical outbound batches.
#[derive(Debug)]
pub struct Client {
    /// The next fresh outbound request id.
    next_id: u64,
    /// The promise table, keyed by outbound request id.
    slots:   HashMap<u64, Slot>,
}

impl Client {
    /// Constructor for the Client.
    ///
    /// # Returns
    /// A new Client with an empty promise table, counting ids from 1.
    #[inline]
    pub fn new() -> Self { Self { next_id: 1, slots: HashMap::new() } }

    /// Issues a new outbound request.
    ///
    /// Assigns a fresh id, appends the request to the response queue and records a pending slot
    /// for the given waiter. The slot resolves on a later tick, when the host's response arrives.
    ///
    /// # Arguments
    /// - `queue`: The [`ResponseQueue`] to append the request to.
    /// - `waiter`: The [`Waiter`] to route the eventual resolution to.
    /// - `request`: The request to send. Its id is overwritten with the fresh one.
    ///
    /// # Returns
    /// The id assigned to the request.
    pub fn request(&mut self, queue: &mut ResponseQueue, waiter: Waiter, mut request: Request) -> u64 {
        let id: u64 = self.next_id;
        self.next_id += 1;

        debug!("Issuing outbound request {id} ('{}') for waiter {}", request.command, waiter.variant());
        request.id = id;
        queue.push(specifications::commands::Command::Request(request));
        self.slots.insert(id, Slot { waiter, state: SlotState::Pending });
        id
    }

    /// Handles an inbound response from the host.
    ///
    /// # Arguments
    /// - `response`: The [`Response`] to correlate.
    ///
    /// # Returns
    /// The [`Resolution`] to route back to the waiter, or [`None`] if the slot was cancelled
    /// locally in the meantime (in which case the response is discarded).
    ///
    /// # Errors
    /// This function errors if no pending slot matches the response's id, which is a violation
    /// of the correlation protocol.
    pub fn dispatch(&mut self, response: Response) -> Result<Option<Resolution>, Error> {
        match self.slots.remove(&response.id) {
            Some(Slot { waiter, state: SlotState::Pending }) => Ok(Some(Resolution { waiter, id: response.id, result: response.result })),
            Some(Slot { state: SlotState::Canceling, .. }) => {
                debug!("Discarding response {} for locally cancelled request", response.id);
                Ok(None)
            },
            None => Err(Error::UnknownResponse { id: response.id }),
        }
    }

    /// Requests cancellation of a pending slot.
    ///
    /// The slot is flipped into a canceled failure immediately; the waiter observes it at its
    /// next suspension check. Should the host's response still arrive later, it is discarded.
    ///
    /// # Arguments
    /// - `id`: The id of the outbound request to cancel.
    ///
    /// # Returns
    /// The canceled [`Resolution`] to route back to the waiter, or [`None`] if the slot is
    /// unknown or already cancelled.
    pub fn cancel(&mut self, id: u64) -> Option<Resolution> {
        match self.slots.get_mut(&id) {
            Some(slot @ Slot { state: SlotState::Pending, .. }) => {
                slot.state = SlotState::Canceling;
                let waiter: Waiter = slot.waiter.clone();
                debug!("Cancelled outbound request {id} for waiter {}", waiter.variant());
                Some(Resolution { waiter, id, result: Err(Failure::canceled(format!("Outbound request {id} was cancelled"))) })
            },
            Some(_) | None => None,
        }
    }

    /// Returns the number of slots that are still awaiting a response.
    #[inline]
    pub fn pending(&self) -> usize { self.slots.values().filter(|slot| matches!(slot.state, SlotState::Pending)).count() }

    /// Returns whether the given id has a slot awaiting a response.
    #[inline]
    pub fn is_pending(&self, id: u64) -> bool { matches!(self.slots.get(&id), Some(Slot { state: SlotState::Pending, .. })) }
}

impl Default for Client {
    #[inline]
    fn default() -> Self { Self::new() }
}
