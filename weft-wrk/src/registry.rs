//  REGISTRY.rs
//    by Lut99
//
//  Created:
//    23 Jan 2025, 14:44:21
//  Last edited:
//    11 Mar 2026, 17:22:10
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the task-queue registry: the set of workers keyed by their
//!   (unique) task-queue names, iterated in registration order. Workers
//!   are added at configuration time and never removed during a run.
//

use specifications::info::WorkerInfo;

pub use crate::errors::RegistryError as Error;
use crate::worker::Worker;


/***** TESTS *****/
#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use weft_shr::identifier::Identifier;

    use super::*;


    #[test]
    fn test_registry_is_unique_and_ordered() {
        let mut registry: TaskQueueRegistry = TaskQueueRegistry::new();
        registry.register(Worker::new(Identifier::from_str("zulu").unwrap())).unwrap();
        registry.register(Worker::new(Identifier::from_str("alpha").unwrap())).unwrap();
        assert!(matches!(registry.register(Worker::new(Identifier::from_str("zulu").unwrap())), Err(Error::DuplicateQueue { .. })));

        // Iteration order is registration order, not name order
        assert_eq!(registry.iter().map(|worker| worker.task_queue().to_string()).collect::<Vec<String>>(), vec!["zulu", "alpha"]);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("charlie").is_none());
        assert_eq!(registry.len(), 2);
    }
}





/***** LIBRARY *****/
/// The set of registered [`Worker`]s, keyed by task-queue name.
///
/// Names are unique, iteration order is registration order (`GetWorkerInfo` reports it), and the
/// set never mutates during a tick.
#[derive(Default)]
pub struct TaskQueueRegistry {
    /// The registered workers, in registration order.
    workers: Vec<Worker>,
}

impl TaskQueueRegistry {
    /// Constructor for the TaskQueueRegistry.
    ///
    /// # Returns
    /// A new TaskQueueRegistry without any workers.
    #[inline]
    pub fn new() -> Self { Self { workers: Vec::new() } }

    /// Registers a new worker.
    ///
    /// # Arguments
    /// - `worker`: The [`Worker`] to register.
    ///
    /// # Returns
    /// A mutable reference to the just-registered worker, so handlers can be attached.
    ///
    /// # Errors
    /// This function errors if a worker for the same task queue is already registered.
    pub fn register(&mut self, worker: Worker) -> Result<&mut Worker, Error> {
        if self.workers.iter().any(|existing| existing.task_queue() == worker.task_queue()) {
            return Err(Error::DuplicateQueue { name: worker.task_queue().clone() });
        }
        self.workers.push(worker);
        let last: usize = self.workers.len() - 1;
        Ok(&mut self.workers[last])
    }

    /// Looks a worker up by task-queue name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Worker> { self.workers.iter().find(|worker| worker.task_queue().as_ref() == name) }

    /// Looks a worker up by task-queue name, mutably.
    #[inline]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Worker> { self.workers.iter_mut().find(|worker| worker.task_queue().as_ref() == name) }

    /// Iterates over the workers in registration order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Worker> { self.workers.iter() }

    /// Iterates over the workers in registration order, mutably.
    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Worker> { self.workers.iter_mut() }

    /// Describes every registered worker, in registration order.
    #[inline]
    pub fn infos(&self) -> Vec<WorkerInfo> { self.workers.iter().map(Worker::info).collect() }

    /// Returns the number of registered workers.
    #[inline]
    pub fn len(&self) -> usize { self.workers.len() }

    /// Returns whether no workers are registered at all.
    #[inline]
    pub fn is_empty(&self) -> bool { self.workers.is_empty() }
}
