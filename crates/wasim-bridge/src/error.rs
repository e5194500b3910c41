//! Bridge error types.

use thiserror::Error;

use crate::types::WasmType;

/// Errors raised while synthesizing or binding the host import module.
///
/// These are load-time conditions: a guest that triggers one of them cannot
/// be linked, and the driver reports the failure before any guest code runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The guest imports from a namespace the bridge does not provide.
    #[error("unknown import namespace `{0}`")]
    UnknownImportNamespace(String),

    /// The namespace exists but does not export the requested function.
    #[error("unknown import `{namespace}.{name}`")]
    UnknownImport { namespace: String, name: String },

    /// The guest declared an import whose signature differs from the host's.
    #[error(
        "import `{namespace}.{name}` signature mismatch: host has {expected}, guest declared {found}"
    )]
    ImportSignatureMismatch {
        namespace: String,
        name: String,
        expected: String,
        found: String,
    },

    /// Memory, table and global imports are not provided by the bridge.
    #[error("import `{namespace}.{name}` is a {kind}, only functions can be imported")]
    UnsupportedImportKind {
        namespace: String,
        name: String,
        kind: &'static str,
    },

    /// The static function table for a namespace is malformed.
    #[error("invalid host function table for `{namespace}`: {reason}")]
    InvalidFunctionTable { namespace: String, reason: String },

    /// A host handler received an argument of the wrong type or position.
    #[error("host function `{function}` argument {index}: expected {expected}")]
    BadArgument {
        function: &'static str,
        index: usize,
        expected: WasmType,
    },

    /// Every foreign reference id has been handed out.
    #[error("foreign reference ids exhausted")]
    ReferencesExhausted,
}

/// Bridge result type alias.
pub type BridgeResult<T> = Result<T, BridgeError>;

// ── Guest-visible return codes ───────────────────────────────────────────────

/// Descriptor returned by `resource_open` for a URL that does not parse.
pub const INVALID_DESCRIPTOR: i32 = 0;

pub const CODE_UNKNOWN_DESCRIPTOR: i32 = -1;
pub const CODE_PARTIAL_TRANSFER: i32 = -2;
pub const CODE_UNSUPPORTED_RESOURCE: i32 = -3;
pub const CODE_INVALID_URL: i32 = -4;
pub const CODE_IO: i32 = -5;
pub const CODE_DESCRIPTORS_EXHAUSTED: i32 = -6;

/// Non-fatal resource failures. Each one is reported to the guest as a
/// numeric return code and execution continues.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("can't parse resource url `{url}`: {source}")]
    InvalidResourceUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported resource: {0}")]
    UnsupportedResource(String),

    #[error("unknown descriptor {0}")]
    UnknownDescriptor(i32),

    /// Requested and actually transferred byte counts differ.
    #[error("partial transfer: requested {requested} bytes, transferred {transferred}")]
    PartialTransfer { requested: usize, transferred: usize },

    #[error("no free resource descriptors")]
    DescriptorsExhausted,

    #[error("resource i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ResourceError {
    /// The numeric code handed back to the guest for this failure.
    pub fn guest_code(&self) -> i32 {
        match self {
            Self::InvalidResourceUrl { .. } => CODE_INVALID_URL,
            Self::UnsupportedResource(_) => CODE_UNSUPPORTED_RESOURCE,
            Self::UnknownDescriptor(_) => CODE_UNKNOWN_DESCRIPTOR,
            Self::PartialTransfer { .. } => CODE_PARTIAL_TRANSFER,
            Self::DescriptorsExhausted => CODE_DESCRIPTORS_EXHAUSTED,
            Self::Io(_) => CODE_IO,
        }
    }
}

/// Resource result type alias.
pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_codes_are_distinct_and_negative() {
        let errors = [
            ResourceError::UnsupportedResource("http".into()),
            ResourceError::UnknownDescriptor(42),
            ResourceError::PartialTransfer {
                requested: 4,
                transferred: 2,
            },
            ResourceError::DescriptorsExhausted,
            ResourceError::Io(std::io::Error::other("boom")),
        ];
        let mut codes: Vec<i32> = errors.iter().map(ResourceError::guest_code).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn unknown_descriptor_is_not_partial_transfer() {
        assert_ne!(
            ResourceError::UnknownDescriptor(7).guest_code(),
            ResourceError::PartialTransfer {
                requested: 1,
                transferred: 0
            }
            .guest_code()
        );
    }

    #[test]
    fn signature_mismatch_display() {
        let err = BridgeError::ImportSignatureMismatch {
            namespace: "env".into(),
            name: "resource_open".into(),
            expected: "(i32, i32) -> (i32)".into(),
            found: "(i32) -> (i32)".into(),
        };
        assert_eq!(
            err.to_string(),
            "import `env.resource_open` signature mismatch: host has (i32, i32) -> (i32), guest declared (i32) -> (i32)"
        );
    }
}
