//  EVENTS.rs
//    by Lut99
//
//  Created:
//    15 Jan 2025, 09:12:44
//  Last edited:
//    11 Mar 2026, 16:40:02
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the lifecycle events that the worker factory emits once per
//!   tick. The emission order is contractual; see [`Event::ORDER`].
//

use std::fmt::{Display, Formatter, Result as FResult};

use enum_debug::EnumDebug;
use serde::{Deserialize, Serialize};


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn test_order_is_contractual() {
        assert_eq!(Event::ORDER, [Event::Signal, Event::Callback, Event::Query, Event::Tick]);
        assert_eq!(Event::ORDER.map(|e| e.name()), ["ON_SIGNAL", "ON_CALLBACK", "ON_QUERY", "ON_TICK"]);
    }
}





/***** LIBRARY *****/
/// The lifecycle events emitted by the worker factory during every tick.
#[derive(Clone, Copy, Debug, Deserialize, EnumDebug, Eq, Hash, PartialEq, Serialize)]
pub enum Event {
    /// Emitted first; listeners deliver buffered signal work.
    Signal,
    /// Emitted second; listeners run scheduled callbacks.
    Callback,
    /// Emitted third; listeners answer buffered queries.
    Query,
    /// Emitted last, once the rest of the tick's work is done.
    Tick,
}

impl Event {
    /// The contractual order in which the events fire within a single tick.
    pub const ORDER: [Self; 4] = [Self::Signal, Self::Callback, Self::Query, Self::Tick];

    /// Returns the canonical (wire-level) name of this event.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Signal => "ON_SIGNAL",
            Self::Callback => "ON_CALLBACK",
            Self::Query => "ON_QUERY",
            Self::Tick => "ON_TICK",
        }
    }
}

impl Display for Event {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult { write!(f, "{}", self.name()) }
}
