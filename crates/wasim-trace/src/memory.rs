//! In-process trace store.

use crate::{FunctionRecord, TraceResult, TraceStore};

/// Keeps run ids and records in memory.  Used when no trace directory is
/// configured, and by tests that inspect what a run recorded.
#[derive(Debug, Default)]
pub struct MemoryTraceStore {
    last_run_id: u64,
    records: Vec<FunctionRecord>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[FunctionRecord] {
        &self.records
    }

    /// Records written under `run_id`, in write order.
    pub fn records_for(&self, run_id: u64) -> impl Iterator<Item = &FunctionRecord> {
        self.records.iter().filter(move |r| r.run_id == run_id)
    }
}

impl TraceStore for MemoryTraceStore {
    fn next_run_id(&mut self) -> TraceResult<u64> {
        self.last_run_id += 1;
        Ok(self.last_run_id)
    }

    fn record_function(&mut self, record: &FunctionRecord) -> TraceResult<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_start_at_one_and_increase() {
        let mut store = MemoryTraceStore::new();
        assert_eq!(store.next_run_id().unwrap(), 1);
        assert_eq!(store.next_run_id().unwrap(), 2);
    }

    #[test]
    fn records_filter_by_run() {
        let mut store = MemoryTraceStore::new();
        for (run_id, index) in [(1, 0), (2, 0), (1, 1)] {
            store
                .record_function(&FunctionRecord {
                    run_id,
                    function_index: index,
                    name: format!("f{index}"),
                    num_params: 0,
                    num_returns: 0,
                })
                .unwrap();
        }
        let indices: Vec<u32> = store.records_for(1).map(|r| r.function_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }
}
