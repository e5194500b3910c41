//! Foreign value references.
//!
//! The guest expects a JavaScript engine on the other side of its imports
//! and refers to every object, string, symbol and function by a 32-bit id.
//! [`ReferenceTable`] is the host's stand-in for that engine's value store:
//! an append-only log of references owned by a single run.
//!
//! Ids 0–7 are reserved for singleton values with a fixed meaning (see
//! [`Sentinel`]).  Dynamically allocated ids start at 8, increase by one on
//! every allocation and are never reused.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// First id handed out by [`ReferenceTable::allocate`].
pub const FIRST_DYNAMIC_REF: u32 = 8;

/// Id of the guest-visible global object.
pub const GLOBAL_REF: u32 = 5;

/// Constructor names the guest's startup code looks up on the global object.
/// These must come back function-typed for initialization to proceed.
pub const GLOBAL_CONSTRUCTORS: &[&str] = &[
    "Object",
    "Array",
    "Int8Array",
    "Int16Array",
    "Int32Array",
    "Uint8Array",
    "Uint16Array",
    "Uint32Array",
    "Float32Array",
    "Float64Array",
];

/// Type tag of a foreign reference.  The discriminants are the tag values
/// carried in the NaN-boxed encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Object = 0,
    String = 1,
    Symbol = 2,
    Function = 3,
}

impl RefKind {
    pub const ALL: [RefKind; 4] = [
        RefKind::Object,
        RefKind::String,
        RefKind::Symbol,
        RefKind::Function,
    ];

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Object),
            1 => Some(Self::String),
            2 => Some(Self::Symbol),
            3 => Some(Self::Function),
            _ => None,
        }
    }
}

/// The reserved singleton references, ids 0 through 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentinel {
    NaN = 0,
    Zero = 1,
    Null = 2,
    True = 3,
    False = 4,
    Global = 5,
    /// The guest's linear memory.
    Memory = 6,
    /// The runtime instance the guest calls back into.
    Go = 7,
}

impl Sentinel {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::NaN),
            1 => Some(Self::Zero),
            2 => Some(Self::Null),
            3 => Some(Self::True),
            4 => Some(Self::False),
            5 => Some(Self::Global),
            6 => Some(Self::Memory),
            7 => Some(Self::Go),
            _ => None,
        }
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NaN => "NaN",
            Self::Zero => "0",
            Self::Null => "null",
            Self::True => "true",
            Self::False => "false",
            Self::Global => "global",
            Self::Memory => "memory",
            Self::Go => "jsGo",
        }
    }

    fn record(self) -> ForeignReference {
        ForeignReference {
            id: self.id(),
            name: self.name().to_string(),
            parent_id: self.id(),
            kind: RefKind::Object,
        }
    }
}

/// A single foreign value known to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignReference {
    pub id: u32,
    /// Property name the value was obtained through.
    pub name: String,
    /// Id of the value the property was read from.  Sentinels are their own
    /// parent.
    pub parent_id: u32,
    pub kind: RefKind,
}

/// Instance-owned registry of foreign references.
///
/// Allocation takes `&mut self`, so a table has exactly one writer; each run
/// owns its own table and concurrent runs never share one.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    /// Entry `i` holds the reference with id `FIRST_DYNAMIC_REF + i`.
    entries: Vec<ForeignReference>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new reference and return its id.
    pub fn allocate(
        &mut self,
        name: impl Into<String>,
        kind: RefKind,
        parent_id: u32,
    ) -> BridgeResult<u32> {
        let id = u32::try_from(self.entries.len())
            .ok()
            .and_then(|n| n.checked_add(FIRST_DYNAMIC_REF))
            .ok_or(BridgeError::ReferencesExhausted)?;
        self.entries.push(ForeignReference {
            id,
            name: name.into(),
            parent_id,
            kind,
        });
        Ok(id)
    }

    /// Allocate the reference produced by reading `property` off `parent_id`.
    ///
    /// Well-known constructor names read off the global object are
    /// function-typed; everything else is an object.
    pub fn allocate_property(
        &mut self,
        parent_id: u32,
        property: &str,
    ) -> BridgeResult<(u32, RefKind)> {
        let kind = property_kind(parent_id, property);
        let id = self.allocate(property, kind, parent_id)?;
        Ok((id, kind))
    }

    /// Look up a reference.  Sentinel ids resolve to their built-in records.
    pub fn resolve(&self, id: u32) -> Option<ForeignReference> {
        if let Some(sentinel) = Sentinel::from_id(id) {
            return Some(sentinel.record());
        }
        let index = usize::try_from(id.checked_sub(FIRST_DYNAMIC_REF)?).ok()?;
        self.entries.get(index).cloned()
    }

    /// Whether `id` names a sentinel or an allocated reference.
    pub fn contains(&self, id: u32) -> bool {
        self.resolve(id).is_some()
    }

    /// Number of dynamically allocated references.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently allocated id, if any.
    pub fn highest_id(&self) -> Option<u32> {
        self.entries.last().map(|r| r.id)
    }
}

/// Kind of the value obtained by reading `property` off `parent_id`.
pub fn property_kind(parent_id: u32, property: &str) -> RefKind {
    if parent_id == GLOBAL_REF && GLOBAL_CONSTRUCTORS.contains(&property) {
        RefKind::Function
    } else {
        RefKind::Object
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_resolve_without_allocation() {
        let table = ReferenceTable::new();
        for id in 0..FIRST_DYNAMIC_REF {
            let r = table.resolve(id).expect("sentinel should resolve");
            assert_eq!(r.id, id);
        }
        assert_eq!(table.resolve(GLOBAL_REF).unwrap().name, "global");
        assert!(table.is_empty());
    }

    #[test]
    fn sentinel_names_follow_runtime_value_slots() {
        let names: Vec<&str> = (0..FIRST_DYNAMIC_REF)
            .map(|id| Sentinel::from_id(id).unwrap().name())
            .collect();
        assert_eq!(
            names,
            vec!["NaN", "0", "null", "true", "false", "global", "memory", "jsGo"]
        );
        assert_eq!(Sentinel::Memory.id(), 6);
        assert_eq!(Sentinel::Go.id(), 7);
    }

    #[test]
    fn unallocated_id_is_not_found() {
        let mut table = ReferenceTable::new();
        assert!(table.resolve(8).is_none());
        table.allocate("a", RefKind::Object, GLOBAL_REF).unwrap();
        assert!(table.resolve(8).is_some());
        assert!(table.resolve(9).is_none());
        assert!(!table.contains(9));
        assert!(table.contains(3));
    }

    #[test]
    fn property_kind_only_special_cases_global() {
        assert_eq!(property_kind(GLOBAL_REF, "Uint8Array"), RefKind::Function);
        assert_eq!(property_kind(GLOBAL_REF, "document"), RefKind::Object);
        assert_eq!(property_kind(8, "Array"), RefKind::Object);
    }
}
