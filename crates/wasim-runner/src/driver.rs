//! The run driver.
//!
//! A run moves through a fixed sequence of phases:
//!
//! ```text
//! Loaded → ImportsResolved → [DebugInfoExtracted] → Instrumented
//!        → EntryLocated → Executing → Completed
//! ```
//!
//! Any phase may end the run as `Failed`.  Every failure before
//! `Executing` happens without running guest code.  Phase transitions are
//! logged inside a `run` span carrying the run id.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};
use wasim_bridge::{Console, HostState, HostValue};
use wasim_trace::{FunctionRecord, TraceStore};
use wasmi::{Engine, Linker, Module, Store, Val};

use crate::config::RunConfig;
use crate::error::{RunError, RunResult};
use crate::linker::{default_val, host_value, link_imports};
use crate::module_info::{render_signature, ModuleInfo};

/// Exported entry symbols, in order of preference.
pub const ENTRY_POINTS: &[&str] = &["main", "cwa_main"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Loaded,
    ImportsResolved,
    DebugInfoExtracted,
    Instrumented,
    EntryLocated,
    Executing,
    Completed,
    Failed,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// `None` when the trace store could not issue an id.
    pub run_id: Option<u64>,
    pub entry: String,
    pub results: Vec<HostValue>,
    /// Calls to host functions that are accepted but not emulated.
    pub stub_calls: BTreeMap<String, u64>,
    pub functions_recorded: usize,
    pub phases: Vec<RunPhase>,
}

/// The export a run starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: &'static str,
    pub index: u32,
}

/// Pick the entry point: `main` if exported as a function, else `cwa_main`.
/// The entry must take no parameters.
pub fn locate_entry(info: &ModuleInfo) -> RunResult<EntryPoint> {
    let (name, func) = ENTRY_POINTS
        .iter()
        .find_map(|name| info.exported_function(name).map(|func| (*name, func)))
        .ok_or(RunError::EntryPointNotFound)?;
    if !func.params.is_empty() {
        return Err(RunError::EntryPointSignature {
            name: name.to_string(),
            signature: render_signature(&func.params, &func.results),
        });
    }
    Ok(EntryPoint {
        name,
        index: func.index,
    })
}

#[derive(Debug, Default)]
struct PhaseLog {
    phases: Vec<RunPhase>,
}

impl PhaseLog {
    fn enter(&mut self, phase: RunPhase) {
        info!(phase = ?phase, "run phase");
        self.phases.push(phase);
    }

    fn current(&self) -> Option<RunPhase> {
        self.phases.last().copied()
    }
}

/// Runs guests against the host bridge, recording into a trace store.
pub struct Driver<S: TraceStore> {
    config: RunConfig,
    store: S,
    engine: Engine,
    last_phases: Vec<RunPhase>,
}

impl<S: TraceStore> Driver<S> {
    pub fn new(config: RunConfig, store: S) -> Self {
        Self {
            config,
            store,
            engine: Engine::default(),
            last_phases: Vec::new(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn trace_store(&self) -> &S {
        &self.store
    }

    /// Phases the most recent run passed through, ending in `Completed` or
    /// `Failed`.  Empty before the first run.
    pub fn last_phases(&self) -> &[RunPhase] {
        &self.last_phases
    }

    /// Run one guest to completion.  Each call gets a fresh [`HostState`]
    /// built around `console`.
    pub fn run(&mut self, wasm: &[u8], console: Console) -> RunResult<RunReport> {
        let run_id = match self.store.next_run_id() {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "trace store unavailable, run is untraced");
                None
            }
        };

        let span = info_span!("run", run_id = tracing::field::Empty);
        if let Some(id) = run_id {
            span.record("run_id", id);
        }
        let _guard = span.enter();

        let mut phases = PhaseLog::default();
        let outcome = self.execute(wasm, console, run_id, &mut phases);
        if let Err(err) = &outcome {
            error!(error = %err, after = ?phases.current(), "run failed");
            phases.enter(RunPhase::Failed);
        }
        self.last_phases = phases.phases;
        outcome
    }

    fn execute(
        &mut self,
        wasm: &[u8],
        console: Console,
        run_id: Option<u64>,
        phases: &mut PhaseLog,
    ) -> RunResult<RunReport> {
        let info = ModuleInfo::parse(wasm)?;
        let module =
            Module::new(&self.engine, wasm).map_err(|e| RunError::Decode(e.to_string()))?;
        phases.enter(RunPhase::Loaded);

        let mut linker = Linker::<HostState>::new(&self.engine);
        let bound = link_imports(&mut linker, &info)?;
        debug!(imports = info.imports.len(), host_functions = bound, "imports resolved");
        phases.enter(RunPhase::ImportsResolved);

        if self.config.extract_debug_info {
            if info.debug_sections.is_empty() {
                info!("guest carries no debug sections");
            }
            for section in &info.debug_sections {
                info!(section = %section.name, bytes = section.size, "debug section");
            }
            phases.enter(RunPhase::DebugInfoExtracted);
        }

        let functions_recorded = self.instrument(run_id, &info);
        phases.enter(RunPhase::Instrumented);

        let entry = locate_entry(&info)?;
        info!(entry = entry.name, index = entry.index, "entry point located");
        phases.enter(RunPhase::EntryLocated);

        let mut store = Store::new(&self.engine, HostState::new(console));
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| RunError::Instantiate(e.to_string()))?
            .start(&mut store)
            .map_err(|e| RunError::Instantiate(e.to_string()))?;
        let func = instance
            .get_func(&store, entry.name)
            .ok_or(RunError::EntryPointNotFound)?;
        let mut outputs: Vec<Val> = func.ty(&store).results().iter().map(default_val).collect();

        phases.enter(RunPhase::Executing);
        func.call(&mut store, &[], &mut outputs)
            .map_err(|e| RunError::Trap(e.to_string()))?;
        phases.enter(RunPhase::Completed);

        let results = outputs.iter().filter_map(host_value).collect();
        let stub_calls = store
            .data()
            .stub_calls()
            .iter()
            .map(|(name, count)| (name.to_string(), *count))
            .collect();
        Ok(RunReport {
            run_id,
            entry: entry.name.to_string(),
            results,
            stub_calls,
            functions_recorded,
            phases: phases.phases.clone(),
        })
    }

    /// Write one record per function to the trace store.  Best-effort: the
    /// first store failure stops recording for this run but not the run.
    fn instrument(&mut self, run_id: Option<u64>, info: &ModuleInfo) -> usize {
        let Some(run_id) = run_id else {
            return 0;
        };
        let mut recorded = 0;
        for func in &info.functions {
            let record = FunctionRecord {
                run_id,
                function_index: func.index,
                name: func.name.clone(),
                num_params: func.params.len() as u32,
                num_returns: func.results.len() as u32,
            };
            if let Err(err) = self.store.record_function(&record) {
                warn!(
                    error = %err,
                    function_index = func.index,
                    "trace store unavailable, skipping remaining function records"
                );
                break;
            }
            recorded += 1;
        }
        recorded
    }
}
