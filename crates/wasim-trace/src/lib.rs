//! wasim trace store.
//!
//! Every execution run is identified by an id drawn from a monotonic
//! sequence, and before the guest's entry point runs the driver writes one
//! [`FunctionRecord`] per guest function under that id.  The store sits
//! outside the run's correctness path: callers treat every [`TraceError`] as
//! "tracing unavailable" and carry on.

mod error;
mod jsonl;
mod memory;

use serde::{Deserialize, Serialize};

pub use error::{TraceError, TraceResult};
pub use jsonl::JsonlTraceStore;
pub use memory::MemoryTraceStore;

/// One guest function, as indexed in the module's function index space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub run_id: u64,
    pub function_index: u32,
    pub name: String,
    pub num_params: u32,
    pub num_returns: u32,
}

/// Durable destination for run ids and function records.
pub trait TraceStore {
    /// Draw the next id from the run sequence.  Ids are strictly increasing
    /// for the lifetime of the store's backing.
    fn next_run_id(&mut self) -> TraceResult<u64>;

    /// Persist one function record.
    fn record_function(&mut self, record: &FunctionRecord) -> TraceResult<()>;
}

impl<T: TraceStore + ?Sized> TraceStore for Box<T> {
    fn next_run_id(&mut self) -> TraceResult<u64> {
        (**self).next_run_id()
    }

    fn record_function(&mut self, record: &FunctionRecord) -> TraceResult<()> {
        (**self).record_function(record)
    }
}
