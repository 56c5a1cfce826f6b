//  BUS.rs
//    by Lut99
//
//  Created:
//    16 Jan 2025, 14:38:17
//  Last edited:
//    04 May 2026, 14:40:03
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements a minimal named-slot event bus. Listeners are kept per
//!   event in registration order, and emission walks them in exactly that
//!   order, which is what makes the runtime's lifecycle events
//!   deterministic.
//

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FResult};
use std::hash::Hash;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn test_listeners_fire_in_registration_order() {
        let mut bus: Bus<&'static str, Vec<u32>> = Bus::new();
        bus.listen("tick", "first", |seen| seen.push(1));
        bus.listen("tick", "second", |seen| seen.push(2));
        bus.listen("other", "third", |seen| seen.push(3));

        let mut seen: Vec<u32> = vec![];
        bus.emit("tick", &mut seen);
        bus.emit("tick", &mut seen);
        bus.emit("missing", &mut seen);
        assert_eq!(seen, vec![1, 2, 1, 2]);
    }
}





/***** LIBRARY *****/
/// Implements a named-slot event bus with deterministic listener order.
///
/// The bus is generic over the event key `E` and the scope `S` handed to every listener, so it
/// carries no opinion about what listeners are allowed to do. Listeners registered for the same
/// event fire in registration order.
pub struct Bus<E, S: ?Sized> {
    /// The listeners, per event, in registration order.
    listeners: HashMap<E, Vec<(String, Box<dyn FnMut(&mut S) + Send>)>>,
}

impl<E: Copy + Eq + Hash, S: ?Sized> Bus<E, S> {
    /// Constructor for the Bus.
    ///
    /// # Returns
    /// A new Bus without any listeners.
    #[inline]
    pub fn new() -> Self { Self { listeners: HashMap::new() } }

    /// Registers a new listener for the given event.
    ///
    /// # Arguments
    /// - `event`: The event to listen for.
    /// - `name`: A name for this listener, used in diagnostics only.
    /// - `listener`: The closure to run whenever `event` is emitted.
    #[inline]
    pub fn listen(&mut self, event: E, name: impl Into<String>, listener: impl FnMut(&mut S) + Send + 'static) {
        self.listeners.entry(event).or_default().push((name.into(), Box::new(listener)));
    }

    /// Emits the given event, running all of its listeners in registration order.
    ///
    /// # Arguments
    /// - `event`: The event to emit.
    /// - `scope`: The scope handed to every listener.
    pub fn emit(&mut self, event: E, scope: &mut S) {
        if let Some(listeners) = self.listeners.get_mut(&event) {
            for (_, listener) in listeners {
                listener(scope);
            }
        }
    }

    /// Returns the number of listeners registered for the given event.
    #[inline]
    pub fn count(&self, event: E) -> usize { self.listeners.get(&event).map(Vec::len).unwrap_or(0) }
}

impl<E: Copy + Eq + Hash, S: ?Sized> Default for Bus<E, S> {
    #[inline]
    fn default() -> Self { Self::new() }
}
impl<E: Debug + Eq + Hash, S: ?Sized> Debug for Bus<E, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        let mut map = f.debug_map();
        for (event, listeners) in &self.listeners {
            map.entry(event, &listeners.iter().map(|(name, _)| name.as_str()).collect::<Vec<&str>>());
        }
        map.finish()
    }
}
