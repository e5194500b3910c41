//! Tests for the reference table and the NaN-boxing codec.
//!
//! Covers:
//! - Monotonic id allocation starting after the reserved sentinels
//! - Sentinel resolution and "not found" for unallocated ids
//! - The global-constructor kind special case
//! - Exact encode/decode round trips and rejection of plain doubles
//! - Isolation between independently owned tables

#![allow(clippy::approx_constant)]

use wasim_bridge::codec::{decode, encode, SlotValue, NAN_HEAD};
use wasim_bridge::reference::{FIRST_DYNAMIC_REF, GLOBAL_CONSTRUCTORS, GLOBAL_REF};
use wasim_bridge::{RefKind, ReferenceTable, Sentinel};

// ══════════════════════════════════════════════════════════════════════════════
// Reference Table
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn allocation_starts_at_eight_and_counts_up() {
    let mut table = ReferenceTable::new();
    let ids: Vec<u32> = (0..100)
        .map(|i| {
            table
                .allocate(format!("p{i}"), RefKind::Object, GLOBAL_REF)
                .expect("allocation succeeds")
        })
        .collect();
    let expected: Vec<u32> = (8..108).collect();
    assert_eq!(ids, expected);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert!(ids.iter().all(|id| *id >= FIRST_DYNAMIC_REF));
    assert_eq!(table.len(), 100);
    assert_eq!(table.highest_id(), Some(107));
}

#[test]
fn allocated_records_are_preserved() {
    let mut table = ReferenceTable::new();
    let id = table.allocate("document", RefKind::Object, GLOBAL_REF).unwrap();
    let child = table.allocate("body", RefKind::Object, id).unwrap();

    let r = table.resolve(child).unwrap();
    assert_eq!(r.name, "body");
    assert_eq!(r.parent_id, id);
    assert_eq!(r.kind, RefKind::Object);

    // Later allocations never disturb earlier records.
    table.allocate("other", RefKind::String, id).unwrap();
    assert_eq!(table.resolve(child).unwrap().name, "body");
}

#[test]
fn caller_supplied_kind_is_kept() {
    let mut table = ReferenceTable::new();
    let id = table.allocate("sym", RefKind::Symbol, 6).unwrap();
    assert_eq!(table.resolve(id).unwrap().kind, RefKind::Symbol);
}

#[test]
fn sentinels_are_never_reassigned() {
    let mut table = ReferenceTable::new();
    for _ in 0..16 {
        table.allocate("x", RefKind::Function, GLOBAL_REF).unwrap();
    }
    for id in 0..FIRST_DYNAMIC_REF {
        let r = table.resolve(id).unwrap();
        assert_eq!(r.name, Sentinel::from_id(id).unwrap().name());
        assert_eq!(r.parent_id, id);
    }
}

#[test]
fn unknown_ids_are_not_found() {
    let table = ReferenceTable::new();
    assert!(table.resolve(8).is_none());
    assert!(table.resolve(u32::MAX).is_none());
}

#[test]
fn global_constructors_are_function_typed() {
    let mut table = ReferenceTable::new();
    for name in GLOBAL_CONSTRUCTORS {
        let (id, kind) = table.allocate_property(GLOBAL_REF, name).unwrap();
        assert_eq!(kind, RefKind::Function, "{name} should be a function");
        assert_eq!(table.resolve(id).unwrap().kind, RefKind::Function);
    }
}

#[test]
fn other_properties_default_to_object() {
    let mut table = ReferenceTable::new();
    let (_, kind) = table.allocate_property(GLOBAL_REF, "fs").unwrap();
    assert_eq!(kind, RefKind::Object);

    // The special case is tied to the global object, not to the name.
    let (fs, _) = table.allocate_property(GLOBAL_REF, "process").unwrap();
    let (_, kind) = table.allocate_property(fs, "Array").unwrap();
    assert_eq!(kind, RefKind::Object);
}

#[test]
fn tables_are_independent() {
    let mut a = ReferenceTable::new();
    let mut b = ReferenceTable::new();
    a.allocate("one", RefKind::Object, GLOBAL_REF).unwrap();
    a.allocate("two", RefKind::Object, GLOBAL_REF).unwrap();
    assert_eq!(b.allocate("first", RefKind::Object, GLOBAL_REF).unwrap(), 8);
    assert_eq!(a.resolve(8).unwrap().name, "one");
    assert_eq!(b.resolve(8).unwrap().name, "first");
}

// ══════════════════════════════════════════════════════════════════════════════
// Value Codec
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn round_trip_all_kinds_and_sample_ids() {
    let ids = [
        0u32,
        1,
        5,
        7,
        8,
        255,
        65_535,
        1 << 20,
        0x7FFF_FFFF,
        0x8000_0000,
        u32::MAX - 1,
        u32::MAX,
    ];
    for kind in RefKind::ALL {
        for id in ids {
            assert_eq!(decode(encode(kind, id)), Some((kind, id)), "{kind:?} {id}");
        }
    }
}

#[test]
fn encoded_values_carry_nan_prefix() {
    for kind in RefKind::ALL {
        let bits = encode(kind, 42);
        assert_eq!((bits >> 32) as u32 & !0x7, NAN_HEAD);
        assert!(f64::from_bits(bits).is_nan());
    }
}

#[test]
fn plain_doubles_are_not_references() {
    for value in [3.14f64, 0.5, -1.0, 1e300, f64::INFINITY, f64::NEG_INFINITY, -0.0] {
        assert_eq!(decode(value.to_bits()), None, "{value}");
    }
    assert_eq!(decode(0), None);
}

#[test]
fn negative_nan_is_not_a_reference() {
    // Sign bit set: the high word no longer matches the prefix.
    assert_eq!(decode(0xFFF8_0000_0000_0008), None);
}

#[test]
fn slot_values_round_trip() {
    for slot in [
        SlotValue::Undefined,
        SlotValue::Number { value: 3.14 },
        SlotValue::Reference {
            kind: RefKind::Function,
            id: 12,
        },
    ] {
        assert_eq!(SlotValue::from_bits(slot.to_bits()), slot);
    }
}
