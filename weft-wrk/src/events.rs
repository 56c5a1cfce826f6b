//  EVENTS.rs
//    by Lut99
//
//  Created:
//    21 Jan 2025, 13:19:55
//  Last edited:
//    11 Mar 2026, 17:10:41
//  Auto updated?
//    Yes
//
//  Description:
//!   Wires the generic event bus to the tick loop: defines the scope that
//!   lifecycle listeners receive, which lets them land further outbound
//!   commands in the same tick's queue.
//

use specifications::commands::{Command, Request};
use specifications::events::Event;
use weft_shr::bus::Bus;

use crate::client::{Client, Waiter};
use crate::queue::ResponseQueue;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn test_listener_commands_land_in_the_queue() {
        let mut bus: LifecycleBus = LifecycleBus::new();
        bus.listen(Event::Tick, "heartbeat", |scope: &mut dyn EventScope| {
            scope.request(Request::new(0, "NewTimer"));
        });

        let mut client: Client = Client::new();
        let mut queue: ResponseQueue = ResponseQueue::new();
        let mut scope: TickScope = TickScope { client: &mut client, queue: &mut queue };
        for event in Event::ORDER {
            bus.emit(event, &mut scope);
        }

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.commands()[0].id(), 1);
        // Detached requests still occupy a pending slot
        assert_eq!(client.pending(), 1);
    }
}





/***** LIBRARY *****/
/// The bus that carries the per-tick lifecycle events (`ON_SIGNAL`, `ON_CALLBACK`, `ON_QUERY`,
/// `ON_TICK`). Listener order is registration order; emission order is [`Event::ORDER`].
pub type LifecycleBus = Bus<Event, dyn EventScope>;



/// What a lifecycle listener is allowed to do: produce further outbound commands, which land in
/// the same tick's [`ResponseQueue`].
pub trait EventScope {
    /// Issues a detached outbound request through the client (nobody observes its response).
    ///
    /// # Arguments
    /// - `request`: The request to send. Its id is overwritten with a fresh one.
    ///
    /// # Returns
    /// The id assigned to the request.
    fn request(&mut self, request: Request) -> u64;

    /// Appends a raw command to the tick's outbound queue.
    ///
    /// # Arguments
    /// - `command`: The [`Command`] to append.
    fn push(&mut self, command: Command);
}



/// The [`EventScope`] handed to listeners by the tick loop.
pub struct TickScope<'t> {
    /// The correlating client for outbound requests.
    pub client: &'t mut Client,
    /// The queue that collects this tick's outbound commands.
    pub queue:  &'t mut ResponseQueue,
}
impl EventScope for TickScope<'_> {
    #[inline]
    fn request(&mut self, request: Request) -> u64 { self.client.request(self.queue, Waiter::Detached, request) }

    #[inline]
    fn push(&mut self, command: Command) { self.queue.push(command); }
}
