//! wasim run driver.
//!
//! Loads a guest module, binds its imports to the host bridge, records the
//! guest's function inventory in a trace store and executes the entry
//! point (`main`, or `cwa_main` when `main` is absent).
//!
//! ```ignore
//! let mut driver = Driver::new(RunConfig::default(), MemoryTraceStore::new());
//! let report = driver.run(&wasm, Console::std())?;
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod linker;
pub mod module_info;

pub use config::RunConfig;
pub use driver::{locate_entry, Driver, EntryPoint, RunPhase, RunReport, ENTRY_POINTS};
pub use error::{RunError, RunResult};
pub use module_info::{DebugSection, ExportInfo, ExportKind, FunctionInfo, ImportInfo, ModuleInfo};
