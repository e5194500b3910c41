//! NaN-boxed encoding of foreign references.
//!
//! The guest keeps every JavaScript-side value in an 8-byte slot that is
//! bit-compatible with an IEEE-754 double.  Numbers are stored as-is;
//! references are stored inside the NaN space:
//!
//! ```text
//! bits 63..35 : NaN prefix (0x7FF80000 >> 3)
//! bits 34..32 : kind tag   (see RefKind)
//! bits 31..0  : reference id
//! ```
//!
//! An all-zero slot is `undefined`.

use serde::{Deserialize, Serialize};

use crate::reference::RefKind;

/// High word of every boxed reference, before the kind tag is or-ed in.
pub const NAN_HEAD: u32 = 0x7FF8_0000;

/// Bits of the high word that carry the kind tag.
pub const KIND_MASK: u32 = 0x7;

/// Slot contents the guest reads as `undefined`.
pub const UNDEFINED_BITS: u64 = 0;

/// Box `(kind, id)` into a 64-bit slot value.
pub fn encode(kind: RefKind, id: u32) -> u64 {
    (u64::from(NAN_HEAD | kind.tag()) << 32) | u64::from(id)
}

/// Unbox a 64-bit slot value.  Returns `None` for anything that is not a
/// boxed reference, including every ordinary double.
pub fn decode(bits: u64) -> Option<(RefKind, u32)> {
    let high = (bits >> 32) as u32;
    if high & !KIND_MASK != NAN_HEAD {
        return None;
    }
    let kind = RefKind::from_tag(high & KIND_MASK)?;
    Some((kind, bits as u32))
}

/// What a guest value slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SlotValue {
    Undefined,
    Number { value: f64 },
    Reference { kind: RefKind, id: u32 },
}

impl SlotValue {
    pub fn from_bits(bits: u64) -> Self {
        if bits == UNDEFINED_BITS {
            return Self::Undefined;
        }
        match decode(bits) {
            Some((kind, id)) => Self::Reference { kind, id },
            None => Self::Number {
                value: f64::from_bits(bits),
            },
        }
    }

    pub fn to_bits(self) -> u64 {
        match self {
            Self::Undefined => UNDEFINED_BITS,
            Self::Number { value } => value.to_bits(),
            Self::Reference { kind, id } => encode(kind, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_function_ref_layout() {
        assert_eq!(encode(RefKind::Object, 5), 0x7FF8_0000_0000_0005);
        assert_eq!(encode(RefKind::Function, 8), 0x7FF8_0003_0000_0008);
    }

    #[test]
    fn invalid_kind_tag_is_rejected() {
        // Tag 4 fits the mask but names no kind.
        assert_eq!(decode(0x7FF8_0004_0000_0001), None);
    }

    #[test]
    fn slot_classification() {
        assert_eq!(SlotValue::from_bits(0), SlotValue::Undefined);
        assert_eq!(
            SlotValue::from_bits(2.5f64.to_bits()),
            SlotValue::Number { value: 2.5 }
        );
        assert_eq!(
            SlotValue::from_bits(encode(RefKind::String, 9)),
            SlotValue::Reference {
                kind: RefKind::String,
                id: 9
            }
        );
    }
}
