//! The producing side: an order counter drained by a pool of sub-factories.

use std::fmt;

pub mod coordinator;
pub mod order;
pub mod server;
pub mod worker;

use worker::WorkerState;

/// Lifecycle events published on an order's event bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FactoryEvent {
    Started {
        worker_id: u32,
        capacity: u32,
        duration_ms: u32,
    },
    Producing {
        worker_id: u32,
        units: u32,
        duration_ms: u32,
    },
    Finished(WorkerState),
}

impl fmt::Display for FactoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryEvent::Started {
                worker_id,
                capacity,
                duration_ms,
            } => write!(
                f,
                "created sub-factory #{worker_id} with capacity = {capacity:2} parts & duration = {duration_ms:4} mSec"
            ),
            FactoryEvent::Producing {
                worker_id,
                units,
                duration_ms,
            } => write!(
                f,
                "sub-factory #{worker_id}: going to make {units:2} parts in {duration_ms:4} mSec"
            ),
            FactoryEvent::Finished(state) => write!(
                f,
                ">>> sub-factory #{}: terminating after making a total of {} parts in {} iterations",
                state.id, state.units_produced, state.iterations
            ),
        }
    }
}
