//! Guest-callable host functions and the per-run state they share.
//!
//! Every handler has the same shape: it gets the run's [`HostState`], a view
//! of guest memory and the already type-checked arguments, and returns the
//! function's single result (if its signature has one).  Guest-caused
//! failures never escape as errors: resource functions turn them into
//! negative return codes, the value bridge logs them and leaves guest memory
//! untouched.  A handler only returns `Err` for host-side inconsistencies.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::codec::{self, SlotValue, UNDEFINED_BITS};
use crate::error::{
    BridgeError, BridgeResult, ResourceError, CODE_PARTIAL_TRANSFER, INVALID_DESCRIPTOR,
};
use crate::memory::GuestMemory;
use crate::reference::ReferenceTable;
use crate::resource::{Console, ResourceTable, Stream};
use crate::types::{HostValue, WasmType};

/// Signature shared by every host function implementation.
pub type HostHandler =
    fn(&mut HostState, &mut GuestMemory<'_>, &[HostValue]) -> BridgeResult<Option<HostValue>>;

/// State owned by one run: its foreign references, its descriptors and its
/// clock.  Nothing here is shared between runs.
#[derive(Debug)]
pub struct HostState {
    references: ReferenceTable,
    resources: ResourceTable,
    started: Instant,
    stub_calls: BTreeMap<&'static str, u64>,
}

impl HostState {
    pub fn new(console: Console) -> Self {
        Self {
            references: ReferenceTable::new(),
            resources: ResourceTable::new(console),
            started: Instant::now(),
            stub_calls: BTreeMap::new(),
        }
    }

    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut ReferenceTable {
        &mut self.references
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceTable {
        &mut self.resources
    }

    /// Calls made to value-bridge functions that are not implemented yet,
    /// keyed by import name.
    pub fn stub_calls(&self) -> &BTreeMap<&'static str, u64> {
        &self.stub_calls
    }

    /// Milliseconds since the run's host state was created.
    pub fn ticks(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn not_implemented(&mut self, function: &'static str) {
        *self.stub_calls.entry(function).or_insert(0) += 1;
        warn!(function, "host function not implemented, call ignored");
    }
}

// ── Import names ─────────────────────────────────────────────────────────────

pub const IO_GET_STDERR: &str = "io_get_stderr";
pub const IO_GET_STDOUT: &str = "io_get_stdout";
pub const RESOURCE_OPEN: &str = "resource_open";
pub const RESOURCE_READ: &str = "resource_read";
pub const RESOURCE_WRITE: &str = "resource_write";
pub const VALUE_CALL: &str = "syscall/js.valueCall";
pub const VALUE_GET: &str = "syscall/js.valueGet";
pub const VALUE_PREPARE_STRING: &str = "syscall/js.valuePrepareString";
pub const VALUE_LOAD_STRING: &str = "syscall/js.valueLoadString";
pub const STRING_VAL: &str = "syscall/js.stringVal";
pub const RUNTIME_TICKS: &str = "runtime.ticks";

fn arg_i32(function: &'static str, args: &[HostValue], index: usize) -> BridgeResult<i32> {
    args.get(index)
        .and_then(HostValue::as_i32)
        .ok_or(BridgeError::BadArgument {
            function,
            index,
            expected: WasmType::I32,
        })
}

/// Guest pointers and lengths travel as `i32` but address memory unsigned.
fn arg_u32(function: &'static str, args: &[HostValue], index: usize) -> BridgeResult<u32> {
    arg_i32(function, args, index).map(|v| v as u32)
}

// ── Stream descriptors ───────────────────────────────────────────────────────

pub fn io_get_stdout(
    state: &mut HostState,
    _mem: &mut GuestMemory<'_>,
    _args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    Ok(Some(HostValue::I32(state.resources.open_stream(Stream::Stdout))))
}

pub fn io_get_stderr(
    state: &mut HostState,
    _mem: &mut GuestMemory<'_>,
    _args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    Ok(Some(HostValue::I32(state.resources.open_stream(Stream::Stderr))))
}

// ── Resources ────────────────────────────────────────────────────────────────

/// `resource_open(url_ptr, url_len) -> descriptor`
pub fn resource_open(
    state: &mut HostState,
    mem: &mut GuestMemory<'_>,
    args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    let url_ptr = arg_u32(RESOURCE_OPEN, args, 0)?;
    let url_len = arg_u32(RESOURCE_OPEN, args, 1)?;

    let Some(raw) = mem.read_exact(url_ptr, url_len) else {
        warn!(url_ptr, url_len, "resource_open: url lies outside guest memory");
        return Ok(Some(HostValue::I32(CODE_PARTIAL_TRANSFER)));
    };
    let url = String::from_utf8_lossy(&raw);

    let code = match state.resources.open(&url) {
        Ok(fd) => fd,
        Err(err @ ResourceError::InvalidResourceUrl { .. }) => {
            warn!(error = %err, "resource_open failed");
            INVALID_DESCRIPTOR
        }
        Err(err) => {
            warn!(error = %err, "resource_open failed");
            err.guest_code()
        }
    };
    Ok(Some(HostValue::I32(code)))
}

/// `resource_read(fd, data_ptr, data_len) -> count | error code`
pub fn resource_read(
    state: &mut HostState,
    mem: &mut GuestMemory<'_>,
    args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    let fd = arg_i32(RESOURCE_READ, args, 0)?;
    let data_ptr = arg_u32(RESOURCE_READ, args, 1)?;
    let data_len = arg_u32(RESOURCE_READ, args, 2)? as usize;

    let result = transfer_in(state, mem, fd, data_ptr, data_len);
    Ok(Some(HostValue::I32(report(RESOURCE_READ, fd, result))))
}

fn transfer_in(
    state: &mut HostState,
    mem: &mut GuestMemory<'_>,
    fd: i32,
    data_ptr: u32,
    data_len: usize,
) -> Result<usize, ResourceError> {
    if state.resources.kind(fd).is_none() {
        return Err(ResourceError::UnknownDescriptor(fd));
    }
    let room = mem.len().saturating_sub(data_ptr as usize);
    if room < data_len {
        return Err(ResourceError::PartialTransfer {
            requested: data_len,
            transferred: 0,
        });
    }
    let mut buf = vec![0u8; data_len];
    let produced = state.resources.read(fd, &mut buf)?;
    let copied = mem.write_at(&buf[..produced], data_ptr);
    if copied != produced {
        return Err(ResourceError::PartialTransfer {
            requested: produced,
            transferred: copied,
        });
    }
    Ok(copied)
}

/// `resource_write(fd, data_ptr, data_len) -> count | error code`
pub fn resource_write(
    state: &mut HostState,
    mem: &mut GuestMemory<'_>,
    args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    let fd = arg_i32(RESOURCE_WRITE, args, 0)?;
    let data_ptr = arg_u32(RESOURCE_WRITE, args, 1)?;
    let data_len = arg_u32(RESOURCE_WRITE, args, 2)? as usize;

    let result = transfer_out(state, mem, fd, data_ptr, data_len);
    Ok(Some(HostValue::I32(report(RESOURCE_WRITE, fd, result))))
}

fn transfer_out(
    state: &mut HostState,
    mem: &GuestMemory<'_>,
    fd: i32,
    data_ptr: u32,
    data_len: usize,
) -> Result<usize, ResourceError> {
    if state.resources.kind(fd).is_none() {
        return Err(ResourceError::UnknownDescriptor(fd));
    }
    let room = mem.len().saturating_sub(data_ptr as usize);
    if room < data_len {
        return Err(ResourceError::PartialTransfer {
            requested: data_len,
            transferred: room,
        });
    }
    let mut data = vec![0u8; data_len];
    let fetched = mem.read_at(&mut data, data_ptr);
    if fetched != data_len {
        return Err(ResourceError::PartialTransfer {
            requested: data_len,
            transferred: fetched,
        });
    }
    let written = state.resources.write(fd, &data)?;
    if written != data_len {
        return Err(ResourceError::PartialTransfer {
            requested: data_len,
            transferred: written,
        });
    }
    Ok(written)
}

fn report(function: &'static str, fd: i32, result: Result<usize, ResourceError>) -> i32 {
    match result {
        Ok(n) => {
            trace!(function, fd, bytes = n, "transfer complete");
            // Transfers are bounded by guest memory, which fits in i32.
            i32::try_from(n).unwrap_or(i32::MAX)
        }
        Err(err) => {
            warn!(function, fd, error = %err, "resource transfer failed");
            err.guest_code()
        }
    }
}

// ── Value bridge ─────────────────────────────────────────────────────────────

/// `syscall/js.valueGet(ret_ptr, value_ptr, name_ptr, name_len, _, _)`
///
/// Reads the property `name` off the value stored at `value_ptr` and stores
/// the resulting boxed reference at `ret_ptr`.
pub fn value_get(
    state: &mut HostState,
    mem: &mut GuestMemory<'_>,
    args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    let ret_ptr = arg_u32(VALUE_GET, args, 0)?;
    let value_ptr = arg_u32(VALUE_GET, args, 1)?;
    let name_ptr = arg_u32(VALUE_GET, args, 2)?;
    let name_len = arg_u32(VALUE_GET, args, 3)?;

    let Some(raw_name) = mem.read_exact(name_ptr, name_len) else {
        warn!(name_ptr, name_len, "valueGet: property name lies outside guest memory");
        return Ok(None);
    };
    let property = String::from_utf8_lossy(&raw_name);

    let Some(slot) = mem.read_u64(value_ptr) else {
        warn!(value_ptr, "valueGet: value slot lies outside guest memory");
        return Ok(None);
    };

    let result = match SlotValue::from_bits(slot) {
        SlotValue::Reference { id, .. } if state.references.contains(id) => {
            let (new_id, kind) = state.references.allocate_property(id, &property)?;
            debug!(parent = id, property = %property, id = new_id, ?kind, "valueGet");
            codec::encode(kind, new_id)
        }
        other => {
            debug!(?other, property = %property, "valueGet on a non-reference, yielding undefined");
            UNDEFINED_BITS
        }
    };

    if !mem.write_u64(ret_ptr, result) {
        warn!(ret_ptr, "valueGet: return slot lies outside guest memory");
    }
    Ok(None)
}

/// `syscall/js.valueCall`: accepted, not implemented.
pub fn value_call(
    state: &mut HostState,
    _mem: &mut GuestMemory<'_>,
    _args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    state.not_implemented(VALUE_CALL);
    Ok(None)
}

/// `syscall/js.valuePrepareString`: accepted, not implemented.
pub fn value_prepare_string(
    state: &mut HostState,
    _mem: &mut GuestMemory<'_>,
    _args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    state.not_implemented(VALUE_PREPARE_STRING);
    Ok(None)
}

/// `syscall/js.valueLoadString`: accepted, not implemented.
pub fn value_load_string(
    state: &mut HostState,
    _mem: &mut GuestMemory<'_>,
    _args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    state.not_implemented(VALUE_LOAD_STRING);
    Ok(None)
}

/// `syscall/js.stringVal`: accepted, not implemented.
pub fn string_val(
    state: &mut HostState,
    _mem: &mut GuestMemory<'_>,
    _args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    state.not_implemented(STRING_VAL);
    Ok(None)
}

// ── Clock ────────────────────────────────────────────────────────────────────

/// `runtime.ticks() -> f64`
pub fn runtime_ticks(
    state: &mut HostState,
    _mem: &mut GuestMemory<'_>,
    _args: &[HostValue],
) -> BridgeResult<Option<HostValue>> {
    Ok(Some(HostValue::F64(state.ticks())))
}
