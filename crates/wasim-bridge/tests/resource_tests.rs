//! Tests for the resource table.
//!
//! Console streams are backed by shared in-memory buffers so the bytes the
//! host would send to its own stdout/stderr can be checked exactly.

use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex};

use wasim_bridge::resource::{FILE_STDERR, FILE_STDIN, FILE_STDOUT, FILE_UNKNOWN};
use wasim_bridge::{Console, ResourceError, ResourceKind, ResourceTable, Stream};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Harness {
    table: ResourceTable,
    stdout: SharedBuffer,
    stderr: SharedBuffer,
}

fn harness_with_stdin(stdin: &[u8]) -> Harness {
    let stdout = SharedBuffer::default();
    let stderr = SharedBuffer::default();
    let console = Console::new(Cursor::new(stdin.to_vec()), stdout.clone(), stderr.clone());
    Harness {
        table: ResourceTable::new(console),
        stdout,
        stderr,
    }
}

fn harness() -> Harness {
    harness_with_stdin(b"")
}

// ══════════════════════════════════════════════════════════════════════════════
// Console streams
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn stream_descriptors_are_fixed_and_idempotent() {
    let h = harness();
    assert_eq!(h.table.open_stream(Stream::Stdout), FILE_STDOUT);
    assert_eq!(h.table.open_stream(Stream::Stdout), FILE_STDOUT);
    assert_eq!(h.table.open_stream(Stream::Stderr), FILE_STDERR);
    assert_eq!(h.table.open_stream(Stream::Stdin), FILE_STDIN);
    assert_eq!(h.table.opened_count(), 0);
}

#[test]
fn write_to_stdout_reaches_host_stdout() {
    let mut h = harness();
    let n = h.table.write(FILE_STDOUT, b"hello").unwrap();
    assert_eq!(n, 5);
    assert_eq!(h.stdout.contents(), b"hello");
    assert!(h.stderr.contents().is_empty());
}

#[test]
fn write_to_stderr_reaches_host_stderr() {
    let mut h = harness();
    assert_eq!(h.table.write(FILE_STDERR, b"oops\n").unwrap(), 5);
    assert_eq!(h.stderr.contents(), b"oops\n");
    assert!(h.stdout.contents().is_empty());
}

#[test]
fn write_to_unknown_descriptor_is_reported() {
    let mut h = harness();
    let err = h.table.write(12345, b"x").unwrap_err();
    assert!(matches!(err, ResourceError::UnknownDescriptor(12345)));
    let err = h.table.write(FILE_UNKNOWN, b"x").unwrap_err();
    assert!(matches!(err, ResourceError::UnknownDescriptor(FILE_UNKNOWN)));
    assert!(h.stdout.contents().is_empty());
}

#[test]
fn read_from_unknown_descriptor_is_reported() {
    let mut h = harness();
    let mut buf = [0u8; 4];
    let err = h.table.read(-7, &mut buf).unwrap_err();
    assert!(matches!(err, ResourceError::UnknownDescriptor(-7)));
}

#[test]
fn stdin_reads_until_end() {
    let mut h = harness_with_stdin(b"abcdef");
    let mut buf = [0u8; 4];
    assert_eq!(h.table.read(FILE_STDIN, &mut buf).unwrap(), 4);
    assert_eq!(&buf, b"abcd");
    assert_eq!(h.table.read(FILE_STDIN, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"ef");
    assert_eq!(h.table.read(FILE_STDIN, &mut buf).unwrap(), 0);
}

#[test]
fn stream_direction_is_enforced() {
    let mut h = harness();
    let mut buf = [0u8; 1];
    assert!(matches!(
        h.table.read(FILE_STDOUT, &mut buf),
        Err(ResourceError::UnsupportedResource(_))
    ));
    assert!(matches!(
        h.table.write(FILE_STDIN, b"x"),
        Err(ResourceError::UnsupportedResource(_))
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// URL-opened resources
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn unparsable_url_is_invalid_not_fatal() {
    let mut h = harness();
    let err = h.table.open("not a url").unwrap_err();
    assert!(matches!(err, ResourceError::InvalidResourceUrl { .. }));
    assert_eq!(h.table.opened_count(), 0);
}

#[test]
fn remote_schemes_are_unsupported() {
    let mut h = harness();
    for url in ["http://example.com/", "https://example.com/data"] {
        let err = h.table.open(url).unwrap_err();
        assert!(matches!(err, ResourceError::UnsupportedResource(_)), "{url}");
    }
    assert_eq!(h.table.opened_count(), 0);
}

#[test]
fn unknown_scheme_is_unsupported() {
    let mut h = harness();
    assert!(matches!(
        h.table.open("gopher://example.com/"),
        Err(ResourceError::UnsupportedResource(_))
    ));
}

#[test]
fn opened_descriptors_never_hit_sentinels() {
    let mut h = harness();
    for _ in 0..64 {
        let fd = h.table.open("null:").unwrap();
        assert!(fd > 0);
        assert!(![FILE_UNKNOWN, FILE_STDIN, FILE_STDOUT, FILE_STDERR].contains(&fd));
    }
}

#[test]
fn null_resource_discards_and_ends() {
    let mut h = harness();
    let fd = h.table.open("null:").unwrap();
    assert_eq!(h.table.kind(fd), Some(ResourceKind::Null));
    assert_eq!(h.table.write(fd, b"gone").unwrap(), 4);
    let mut buf = [1u8; 8];
    assert_eq!(h.table.read(fd, &mut buf).unwrap(), 0);
    assert!(h.stdout.contents().is_empty());
}

#[test]
fn zero_resource_fills_zeros() {
    let mut h = harness();
    let fd = h.table.open("zero:").unwrap();
    let mut buf = [0xFFu8; 16];
    assert_eq!(h.table.read(fd, &mut buf).unwrap(), 16);
    assert!(buf.iter().all(|b| *b == 0));
}

#[test]
fn random_resource_is_read_only() {
    let mut h = harness();
    let fd = h.table.open("random:").unwrap();
    let mut buf = [0u8; 32];
    assert_eq!(h.table.read(fd, &mut buf).unwrap(), 32);
    assert!(matches!(
        h.table.write(fd, b"x"),
        Err(ResourceError::UnsupportedResource(_))
    ));
}

#[test]
fn log_resource_accepts_writes_without_touching_stdout() {
    let mut h = harness();
    let fd = h.table.open("log:?prefix=guest").unwrap();
    assert_eq!(h.table.kind(fd), Some(ResourceKind::Log));
    assert_eq!(h.table.write(fd, b"line one\nline two\n").unwrap(), 18);
    assert!(h.stdout.contents().is_empty());
    let mut buf = [0u8; 4];
    assert_eq!(h.table.read(fd, &mut buf).unwrap(), 0);
}

#[test]
fn tables_do_not_share_descriptors() {
    let mut a = harness();
    let mut b = harness();
    let fd = a.table.open("zero:").unwrap();
    assert_eq!(b.table.kind(fd), None);
    assert_eq!(b.table.open("null:").unwrap(), fd);
    assert_eq!(a.table.kind(fd), Some(ResourceKind::Zero));
}
