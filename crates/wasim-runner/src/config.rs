//! Run configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use wasim_trace::{JsonlTraceStore, MemoryTraceStore, TraceStore};

use crate::error::{RunError, RunResult};

/// Settings for a [`Driver`](crate::Driver).  Loadable from a JSON file;
/// absent fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Run the optional debug-info phase that inventories the guest's
    /// `.debug_*` sections.
    pub extract_debug_info: bool,
    /// Directory of the durable trace store.  `None` keeps traces in memory.
    pub trace_dir: Option<PathBuf>,
}

impl RunConfig {
    pub fn load(path: &Path) -> RunResult<Self> {
        let config_error = |reason: String| RunError::Config {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))
    }

    /// Open the configured trace store.  Tracing is best-effort: if the
    /// durable store cannot be opened the run falls back to memory.
    pub fn trace_store(&self) -> Box<dyn TraceStore> {
        match &self.trace_dir {
            Some(dir) => match JsonlTraceStore::open(dir) {
                Ok(store) => Box::new(store),
                Err(err) => {
                    warn!(error = %err, "trace store unavailable, keeping traces in memory");
                    Box::new(MemoryTraceStore::new())
                }
            },
            None => Box::new(MemoryTraceStore::new()),
        }
    }
}
