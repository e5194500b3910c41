//! The synthetic import module the guest links against.
//!
//! Host functions are bound by exact signature, so each one is listed with
//! its parameter and result types in a static table.  The table is checked
//! when the module is synthesized; a guest import is bound only when its
//! declared signature matches the table entry exactly.
//!
//! ## `env` namespace
//!
//! | Import                           | Signature                 |
//! |----------------------------------|---------------------------|
//! | `io_get_stderr`                  | `() -> i32`               |
//! | `io_get_stdout`                  | `() -> i32`               |
//! | `resource_open`                  | `(i32, i32) -> i32`       |
//! | `resource_read`                  | `(i32, i32, i32) -> i32`  |
//! | `resource_write`                 | `(i32, i32, i32) -> i32`  |
//! | `syscall/js.valueCall`           | `(i32 × 9) -> ()`         |
//! | `syscall/js.valueGet`            | `(i32 × 6) -> ()`         |
//! | `syscall/js.valuePrepareString`  | `(i32 × 4) -> ()`         |
//! | `syscall/js.valueLoadString`     | `(i32 × 6) -> ()`         |
//! | `syscall/js.stringVal`           | `(i32 × 5) -> ()`         |
//! | `runtime.ticks`                  | `() -> f64`               |

use std::collections::HashSet;
use std::fmt;

use crate::error::{BridgeError, BridgeResult};
use crate::host::{self, HostHandler, HostState};
use crate::memory::GuestMemory;
use crate::types::{HostValue, Signature, WasmType};

/// Namespace of the host function set.
pub const ENV_NAMESPACE: &str = "env";

/// Every namespace [`resolve_namespace`] can synthesize.
pub const SUPPORTED_NAMESPACES: &[&str] = &[ENV_NAMESPACE];

/// One entry of a namespace's function table.
pub struct HostFunc {
    pub name: &'static str,
    pub params: &'static [WasmType],
    pub results: &'static [WasmType],
    pub handler: HostHandler,
}

impl HostFunc {
    pub fn signature(&self) -> Signature<'static> {
        Signature {
            params: self.params,
            results: self.results,
        }
    }

    pub fn matches(&self, params: &[WasmType], results: &[WasmType]) -> bool {
        self.params == params && self.results == results
    }

    /// Invoke the handler after checking the arguments against the declared
    /// parameter types.
    pub fn call(
        &self,
        state: &mut HostState,
        mem: &mut GuestMemory<'_>,
        args: &[HostValue],
    ) -> BridgeResult<Option<HostValue>> {
        if let Some(index) = (0..self.params.len().max(args.len()))
            .find(|&i| args.get(i).map(HostValue::ty) != self.params.get(i).copied())
        {
            return Err(BridgeError::BadArgument {
                function: self.name,
                index,
                expected: self.params.get(index).copied().unwrap_or(WasmType::I32),
            });
        }
        (self.handler)(state, mem, args)
    }
}

impl fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunc({} {})", self.name, self.signature())
    }
}

const I32: WasmType = WasmType::I32;
const F64: WasmType = WasmType::F64;

static ENV_FUNCTIONS: &[HostFunc] = &[
    HostFunc {
        name: host::IO_GET_STDERR,
        params: &[],
        results: &[I32],
        handler: host::io_get_stderr,
    },
    HostFunc {
        name: host::IO_GET_STDOUT,
        params: &[],
        results: &[I32],
        handler: host::io_get_stdout,
    },
    HostFunc {
        name: host::RESOURCE_OPEN,
        params: &[I32, I32],
        results: &[I32],
        handler: host::resource_open,
    },
    HostFunc {
        name: host::RESOURCE_READ,
        params: &[I32, I32, I32],
        results: &[I32],
        handler: host::resource_read,
    },
    HostFunc {
        name: host::RESOURCE_WRITE,
        params: &[I32, I32, I32],
        results: &[I32],
        handler: host::resource_write,
    },
    HostFunc {
        name: host::VALUE_CALL,
        params: &[I32, I32, I32, I32, I32, I32, I32, I32, I32],
        results: &[],
        handler: host::value_call,
    },
    HostFunc {
        name: host::VALUE_GET,
        params: &[I32, I32, I32, I32, I32, I32],
        results: &[],
        handler: host::value_get,
    },
    HostFunc {
        name: host::VALUE_PREPARE_STRING,
        params: &[I32, I32, I32, I32],
        results: &[],
        handler: host::value_prepare_string,
    },
    HostFunc {
        name: host::VALUE_LOAD_STRING,
        params: &[I32, I32, I32, I32, I32, I32],
        results: &[],
        handler: host::value_load_string,
    },
    HostFunc {
        name: host::STRING_VAL,
        params: &[I32, I32, I32, I32, I32],
        results: &[],
        handler: host::string_val,
    },
    HostFunc {
        name: host::RUNTIME_TICKS,
        params: &[],
        results: &[F64],
        handler: host::runtime_ticks,
    },
];

/// A synthesized import module: one namespace and its function table.
#[derive(Debug, Clone, Copy)]
pub struct ImportModule {
    namespace: &'static str,
    functions: &'static [HostFunc],
}

impl ImportModule {
    fn new(namespace: &'static str, functions: &'static [HostFunc]) -> BridgeResult<Self> {
        let invalid = |reason: String| BridgeError::InvalidFunctionTable {
            namespace: namespace.to_string(),
            reason,
        };
        let mut seen = HashSet::new();
        for func in functions {
            if !seen.insert(func.name) {
                return Err(invalid(format!("`{}` is listed twice", func.name)));
            }
            if func.results.len() > 1 {
                return Err(invalid(format!(
                    "`{}` returns {} values, at most one is supported",
                    func.name,
                    func.results.len()
                )));
            }
        }
        Ok(Self {
            namespace,
            functions,
        })
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn functions(&self) -> &'static [HostFunc] {
        self.functions
    }

    pub fn function(&self, name: &str) -> Option<&'static HostFunc> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Find the function a guest import refers to and check its signature.
    pub fn bind(
        &self,
        name: &str,
        params: &[WasmType],
        results: &[WasmType],
    ) -> BridgeResult<&'static HostFunc> {
        let func = self.function(name).ok_or_else(|| BridgeError::UnknownImport {
            namespace: self.namespace.to_string(),
            name: name.to_string(),
        })?;
        if !func.matches(params, results) {
            return Err(BridgeError::ImportSignatureMismatch {
                namespace: self.namespace.to_string(),
                name: name.to_string(),
                expected: func.signature().to_string(),
                found: Signature { params, results }.to_string(),
            });
        }
        Ok(func)
    }
}

/// Synthesize the import module for `namespace`.
pub fn resolve_namespace(namespace: &str) -> BridgeResult<ImportModule> {
    match namespace {
        ENV_NAMESPACE => ImportModule::new(ENV_NAMESPACE, ENV_FUNCTIONS),
        other => Err(BridgeError::UnknownImportNamespace(other.to_string())),
    }
}
