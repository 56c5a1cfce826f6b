//  QUEUE.rs
//    by Lut99
//
//  Created:
//    20 Jan 2025, 10:21:47
//  Last edited:
//    11 Mar 2026, 17:01:29
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the ResponseQueue, the ordered buffer that collects every
//!   outbound command produced during a tick until the codec drains it.
//

use specifications::commands::{Command, Payload, Response};
use specifications::failures::Failure;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn test_queue_preserves_insertion_order() {
        let mut queue: ResponseQueue = ResponseQueue::new();
        queue.push_response(3, Ok(vec![]));
        queue.push_response(1, Err(Failure::not_found("nope")));
        queue.push_response(2, Ok(vec![Payload::new(b"42".to_vec())]));
        assert_eq!(queue.len(), 3);

        let drained: Vec<Command> = queue.drain();
        assert!(queue.is_empty());
        assert_eq!(drained.iter().map(Command::id).collect::<Vec<u64>>(), vec![3, 1, 2]);
    }
}





/***** LIBRARY *****/
/// The ordered buffer of outbound commands produced during a tick.
///
/// Append-only within a tick; drained to empty by every encode (and cleared when a tick fails),
/// so it is guaranteed empty at the start of the next tick.
#[derive(Clone, Debug, Default)]
pub struct ResponseQueue {
    /// The buffered commands, in production order.
    commands: Vec<Command>,
}

impl ResponseQueue {
    /// Constructor for the ResponseQueue.
    ///
    /// # Returns
    /// A new, empty ResponseQueue.
    #[inline]
    pub fn new() -> Self { Self { commands: Vec::new() } }

    /// Appends a command to the back of the queue.
    ///
    /// # Arguments
    /// - `command`: The [`Command`] to append.
    #[inline]
    pub fn push(&mut self, command: Command) { self.commands.push(command); }

    /// Appends a response command to the back of the queue.
    ///
    /// # Arguments
    /// - `id`: The id of the request this response resolves.
    /// - `result`: The payloads or failure to resolve it with.
    #[inline]
    pub fn push_response(&mut self, id: u64, result: Result<Vec<Payload>, Failure>) { self.commands.push(Command::Response(Response { id, result })); }

    /// Takes all buffered commands out of the queue, leaving it empty.
    ///
    /// # Returns
    /// The buffered commands, in production order.
    #[inline]
    pub fn drain(&mut self) -> Vec<Command> { std::mem::take(&mut self.commands) }

    /// Drops all buffered commands. Used when a tick fails halfway through.
    #[inline]
    pub fn clear(&mut self) { self.commands.clear(); }

    /// Returns the number of buffered commands.
    #[inline]
    pub fn len(&self) -> usize { self.commands.len() }

    /// Returns whether the queue is currently empty.
    #[inline]
    pub fn is_empty(&self) -> bool { self.commands.is_empty() }

    /// Returns the buffered commands without draining them.
    #[inline]
    pub fn commands(&self) -> &[Command] { &self.commands }
}
