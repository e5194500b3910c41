//! Binding guest imports to host functions in the interpreter.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;
use wasim_bridge::{
    resolve_namespace, BridgeError, GuestMemory, HostFunc, HostState, HostValue, ImportModule,
    WasmType,
};
use wasmi::core::{ValType, F32, F64};
use wasmi::{Caller, Extern, FuncType, Linker, Val};

use crate::error::{RunError, RunResult};
use crate::module_info::{numeric_types, render_signature, ImportInfo, ImportKind, ModuleInfo};

/// Resolve every import of the guest and define the matching host
/// functions on `linker`.  Fails on the first import the bridge cannot
/// satisfy; nothing has executed at that point.  Returns how many host
/// functions were defined.
pub fn link_imports(linker: &mut Linker<HostState>, info: &ModuleInfo) -> RunResult<usize> {
    let mut modules: BTreeMap<&str, ImportModule> = BTreeMap::new();
    let mut bound: Vec<(&'static str, &'static HostFunc)> = Vec::new();
    let mut seen = HashSet::new();

    for import in &info.imports {
        let module = match modules.get(import.module.as_str()) {
            Some(module) => *module,
            None => {
                let module = resolve_namespace(&import.module)?;
                modules.insert(import.module.as_str(), module);
                module
            }
        };
        let func = bind_import(&module, import)?;
        if seen.insert((module.namespace(), func.name)) {
            bound.push((module.namespace(), func));
        }
    }

    for (namespace, func) in &bound {
        define_host_func(linker, namespace, func)?;
        debug!(namespace = *namespace, function = func.name, "bound import");
    }
    Ok(bound.len())
}

fn bind_import(module: &ImportModule, import: &ImportInfo) -> RunResult<&'static HostFunc> {
    let (params, results) = match &import.kind {
        ImportKind::Function { params, results } => (params, results),
        ImportKind::Other(kind) => {
            return Err(BridgeError::UnsupportedImportKind {
                namespace: import.module.clone(),
                name: import.name.clone(),
                kind: kind.as_str(),
            }
            .into())
        }
    };
    match (numeric_types(params), numeric_types(results)) {
        (Some(params), Some(results)) => Ok(module.bind(&import.name, &params, &results)?),
        _ => {
            let func = module
                .function(&import.name)
                .ok_or_else(|| BridgeError::UnknownImport {
                    namespace: import.module.clone(),
                    name: import.name.clone(),
                })?;
            Err(BridgeError::ImportSignatureMismatch {
                namespace: import.module.clone(),
                name: import.name.clone(),
                expected: func.signature().to_string(),
                found: render_signature(params, results),
            }
            .into())
        }
    }
}

fn define_host_func(
    linker: &mut Linker<HostState>,
    namespace: &str,
    func: &'static HostFunc,
) -> RunResult<()> {
    let ty = FuncType::new(
        func.params.iter().copied().map(val_type),
        func.results.iter().copied().map(val_type),
    );
    linker
        .func_new(
            namespace,
            func.name,
            ty,
            move |mut caller: Caller<'_, HostState>, params: &[Val], results: &mut [Val]| {
                let args = params
                    .iter()
                    .map(host_value)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        wasmi::Error::new(format!("{}: non-numeric argument", func.name))
                    })?;
                let outcome = match caller.get_export("memory").and_then(Extern::into_memory) {
                    Some(memory) => {
                        let (bytes, state) = memory.data_and_store_mut(&mut caller);
                        func.call(state, &mut GuestMemory::new(bytes), &args)
                    }
                    None => {
                        let mut empty: [u8; 0] = [];
                        func.call(caller.data_mut(), &mut GuestMemory::new(&mut empty), &args)
                    }
                };
                let value = outcome.map_err(|e| wasmi::Error::new(e.to_string()))?;
                if let (Some(value), Some(slot)) = (value, results.first_mut()) {
                    *slot = wasm_val(value);
                }
                Ok(())
            },
        )
        .map_err(|e| RunError::Link(e.to_string()))?;
    Ok(())
}

fn val_type(ty: WasmType) -> ValType {
    match ty {
        WasmType::I32 => ValType::I32,
        WasmType::I64 => ValType::I64,
        WasmType::F32 => ValType::F32,
        WasmType::F64 => ValType::F64,
    }
}

pub(crate) fn host_value(val: &Val) -> Option<HostValue> {
    match val {
        Val::I32(v) => Some(HostValue::I32(*v)),
        Val::I64(v) => Some(HostValue::I64(*v)),
        Val::F32(v) => Some(HostValue::F32(f32::from_bits(v.to_bits()))),
        Val::F64(v) => Some(HostValue::F64(f64::from_bits(v.to_bits()))),
        _ => None,
    }
}

fn wasm_val(value: HostValue) -> Val {
    match value {
        HostValue::I32(v) => Val::I32(v),
        HostValue::I64(v) => Val::I64(v),
        HostValue::F32(v) => Val::F32(F32::from_bits(v.to_bits())),
        HostValue::F64(v) => Val::F64(F64::from_bits(v.to_bits())),
    }
}

/// Zero value of `ty`, used to size result buffers.
pub(crate) fn default_val(ty: &ValType) -> Val {
    Val::default(*ty)
}
