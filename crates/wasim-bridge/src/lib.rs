//! wasim host bridge.
//!
//! Lets a WebAssembly guest built for a JavaScript-hosted ABI run on a host
//! with no JavaScript engine.  The guest's imports are served from a
//! synthetic `env` module whose functions emulate the pieces of the
//! JavaScript value model the guest's runtime touches during start-up, plus
//! a small descriptor-based I/O surface.
//!
//! # Layout
//!
//! - [`reference`]: foreign value references, ids 0–7 reserved
//! - [`codec`]: NaN-boxing of `(kind, id)` into 64-bit guest slots
//! - [`resource`]: console streams and URL-opened resources
//! - [`memory`]: bounded access to guest linear memory
//! - [`host`]: the host functions and the per-run [`HostState`]
//! - [`imports`]: the signature table and namespace synthesis
//!
//! Nothing in this crate is process-global: every run builds its own
//! [`HostState`], so independent guests never observe each other's
//! references or descriptors.

pub mod codec;
pub mod error;
pub mod host;
pub mod imports;
pub mod memory;
pub mod reference;
pub mod resource;
pub mod types;

pub use error::{BridgeError, BridgeResult, ResourceError, ResourceResult};
pub use host::HostState;
pub use imports::{resolve_namespace, HostFunc, ImportModule, ENV_NAMESPACE};
pub use memory::GuestMemory;
pub use reference::{ForeignReference, RefKind, ReferenceTable, Sentinel};
pub use resource::{Console, ResourceKind, ResourceTable, Stream};
pub use types::{HostValue, Signature, WasmType};
