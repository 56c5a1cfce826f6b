//  INFO.rs
//    by Lut99
//
//  Created:
//    15 Jan 2025, 09:31:20
//  Last edited:
//    11 Mar 2026, 16:42:56
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the reply types of the factory-scoped `GetWorkerInfo`
//!   request: the registered task queues with their handler inventories.
//

use serde::{Deserialize, Serialize};


/***** LIBRARY *****/
/// Describes a single registered worker, as reported by `GetWorkerInfo`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInfo {
    /// The task queue this worker serves.
    pub task_queue: String,
    /// The workflow type names registered with this worker, in registration order.
    pub workflows:  Vec<String>,
    /// The activity type names registered with this worker, in registration order.
    pub activities: Vec<String>,
}
