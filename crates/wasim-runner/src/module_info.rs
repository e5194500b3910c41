//! Static inspection of a guest binary.
//!
//! Everything the driver needs before instantiation comes from one pass
//! over the module with `wasmparser`: the imports with their signatures,
//! the function index space (imported functions first, then defined ones)
//! with a display name for each, the export map and the `.debug_*` custom
//! sections.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use wasim_bridge::WasmType;
use wasmparser::{
    ExternalKind, FuncType, KnownCustom, Name, Parser, Payload, TypeRef, ValType,
};

use crate::error::{RunError, RunResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Function,
    Table,
    Memory,
    Global,
    Tag,
}

impl ExportKind {
    fn from_external(kind: ExternalKind) -> Self {
        match kind {
            ExternalKind::Func => Self::Function,
            ExternalKind::Table => Self::Table,
            ExternalKind::Memory => Self::Memory,
            ExternalKind::Global => Self::Global,
            ExternalKind::Tag => Self::Tag,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Table => "table",
            Self::Memory => "memory",
            Self::Global => "global",
            Self::Tag => "tag",
        }
    }
}

/// What an import brings into the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    Function {
        params: Vec<ValType>,
        results: Vec<ValType>,
    },
    Other(ExportKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportInfo {
    pub module: String,
    pub name: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportInfo {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

/// One entry of the function index space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub index: u32,
    pub name: String,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
    pub imported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugSection {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleInfo {
    pub imports: Vec<ImportInfo>,
    pub functions: Vec<FunctionInfo>,
    pub exports: BTreeMap<String, ExportInfo>,
    pub debug_sections: Vec<DebugSection>,
}

fn decode_error(err: wasmparser::BinaryReaderError) -> RunError {
    RunError::Decode(err.to_string())
}

impl ModuleInfo {
    /// Validate `bytes` and collect the module's static description.
    pub fn parse(bytes: &[u8]) -> RunResult<Self> {
        wasmparser::validate(bytes).map_err(decode_error)?;

        let mut info = ModuleInfo::default();
        let mut types: Vec<FuncType> = Vec::new();
        let mut section_names: HashMap<u32, String> = HashMap::new();

        for payload in Parser::new(0).parse_all(bytes) {
            match payload.map_err(decode_error)? {
                Payload::TypeSection(reader) => {
                    for ty in reader.into_iter_err_on_gc_types() {
                        types.push(ty.map_err(decode_error)?);
                    }
                }
                Payload::ImportSection(reader) => {
                    for import in reader {
                        let import = import.map_err(decode_error)?;
                        let kind = match import.ty {
                            TypeRef::Func(type_index) => {
                                let ty = func_type(&types, type_index)?;
                                info.functions.push(FunctionInfo {
                                    index: info.functions.len() as u32,
                                    name: format!("{}.{}", import.module, import.name),
                                    params: ty.params().to_vec(),
                                    results: ty.results().to_vec(),
                                    imported: true,
                                });
                                ImportKind::Function {
                                    params: ty.params().to_vec(),
                                    results: ty.results().to_vec(),
                                }
                            }
                            TypeRef::Table(_) => ImportKind::Other(ExportKind::Table),
                            TypeRef::Memory(_) => ImportKind::Other(ExportKind::Memory),
                            TypeRef::Global(_) => ImportKind::Other(ExportKind::Global),
                            TypeRef::Tag(_) => ImportKind::Other(ExportKind::Tag),
                        };
                        info.imports.push(ImportInfo {
                            module: import.module.to_string(),
                            name: import.name.to_string(),
                            kind,
                        });
                    }
                }
                Payload::FunctionSection(reader) => {
                    for type_index in reader {
                        let ty = func_type(&types, type_index.map_err(decode_error)?)?;
                        info.functions.push(FunctionInfo {
                            index: info.functions.len() as u32,
                            name: String::new(),
                            params: ty.params().to_vec(),
                            results: ty.results().to_vec(),
                            imported: false,
                        });
                    }
                }
                Payload::ExportSection(reader) => {
                    for export in reader {
                        let export = export.map_err(decode_error)?;
                        info.exports.insert(
                            export.name.to_string(),
                            ExportInfo {
                                name: export.name.to_string(),
                                kind: ExportKind::from_external(export.kind),
                                index: export.index,
                            },
                        );
                    }
                }
                Payload::CustomSection(reader) => match reader.as_known() {
                    // Custom sections are not validated; skip malformed names.
                    KnownCustom::Name(names) => {
                        for name in names.into_iter().flatten() {
                            if let Name::Function(map) = name {
                                for naming in map.into_iter().flatten() {
                                    section_names.insert(naming.index, naming.name.to_string());
                                }
                            }
                        }
                    }
                    _ if reader.name().starts_with(".debug") => {
                        info.debug_sections.push(DebugSection {
                            name: reader.name().to_string(),
                            size: reader.data().len(),
                        });
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        info.assign_names(section_names);
        Ok(info)
    }

    /// Name precedence: name section, then export name, then the import's
    /// `module.field`, then `func[index]`.
    fn assign_names(&mut self, mut section_names: HashMap<u32, String>) {
        let mut export_names: HashMap<u32, &str> = HashMap::new();
        for export in self.exports.values() {
            if export.kind == ExportKind::Function {
                export_names.entry(export.index).or_insert(&export.name);
            }
        }
        for func in &mut self.functions {
            if let Some(name) = section_names.remove(&func.index) {
                func.name = name;
            } else if let Some(name) = export_names.get(&func.index) {
                func.name = name.to_string();
            } else if func.name.is_empty() {
                func.name = format!("func[{}]", func.index);
            }
        }
    }

    pub fn function(&self, index: u32) -> Option<&FunctionInfo> {
        self.functions.get(index as usize)
    }

    /// The exported function named `name`, if any.
    pub fn exported_function(&self, name: &str) -> Option<&FunctionInfo> {
        self.exports
            .get(name)
            .filter(|export| export.kind == ExportKind::Function)
            .and_then(|export| self.function(export.index))
    }
}

fn func_type(types: &[FuncType], index: u32) -> RunResult<&FuncType> {
    types
        .get(index as usize)
        .ok_or_else(|| RunError::Decode(format!("type index {index} out of range")))
}

/// Map guest value types onto the bridge's numeric types.  `None` if any of
/// them is a vector or reference type.
pub fn numeric_types(types: &[ValType]) -> Option<Vec<WasmType>> {
    types
        .iter()
        .map(|ty| match ty {
            ValType::I32 => Some(WasmType::I32),
            ValType::I64 => Some(WasmType::I64),
            ValType::F32 => Some(WasmType::F32),
            ValType::F64 => Some(WasmType::F64),
            _ => None,
        })
        .collect()
}

/// Render a guest signature as `(i32, v128) -> (f64)`.
pub fn render_signature(params: &[ValType], results: &[ValType]) -> String {
    fn list(types: &[ValType]) -> String {
        let names: Vec<String> = types
            .iter()
            .map(|ty| match ty {
                ValType::I32 => "i32".to_string(),
                ValType::I64 => "i64".to_string(),
                ValType::F32 => "f32".to_string(),
                ValType::F64 => "f64".to_string(),
                ValType::V128 => "v128".to_string(),
                other => format!("{other:?}").to_lowercase(),
            })
            .collect();
        format!("({})", names.join(", "))
    }
    format!("{} -> {}", list(params), list(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_types_rejects_vectors() {
        assert_eq!(
            numeric_types(&[ValType::I32, ValType::F64]),
            Some(vec![WasmType::I32, WasmType::F64])
        );
        assert_eq!(numeric_types(&[ValType::I32, ValType::V128]), None);
    }

    #[test]
    fn signature_rendering() {
        assert_eq!(
            render_signature(&[ValType::I32, ValType::I64], &[ValType::F64]),
            "(i32, i64) -> (f64)"
        );
        assert_eq!(render_signature(&[], &[]), "() -> ()");
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = ModuleInfo::parse(b"definitely not wasm").unwrap_err();
        assert!(matches!(err, RunError::Decode(_)));
    }

    #[test]
    fn empty_module_has_nothing() {
        let info = ModuleInfo::parse(b"\0asm\x01\0\0\0").unwrap();
        assert!(info.imports.is_empty());
        assert!(info.functions.is_empty());
        assert!(info.exports.is_empty());
    }
}
