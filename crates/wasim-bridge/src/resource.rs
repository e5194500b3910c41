//! Descriptor-addressed resources: the console streams plus URL-opened
//! resources.
//!
//! The three console streams live at fixed sentinel descriptors far above
//! anything [`ResourceTable::open`] hands out, so the two ranges can never
//! collide.  Opened resources are selected by URL scheme:
//!
//! | Scheme    | Read                 | Write                     |
//! |-----------|----------------------|---------------------------|
//! | `null:`   | end of resource      | accepted, discarded       |
//! | `zero:`   | zero bytes           | accepted, discarded       |
//! | `random:` | OS random bytes      | unsupported               |
//! | `log:`    | end of resource      | one log line per line     |
//!
//! Every other scheme, `http:` and `https:` included, is unsupported.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{ResourceError, ResourceResult};

pub const FILE_UNKNOWN: i32 = 9_999_999;
pub const FILE_STDIN: i32 = 9_999_998;
pub const FILE_STDOUT: i32 = 9_999_997;
pub const FILE_STDERR: i32 = 9_999_996;

/// First descriptor handed out for an opened resource.
pub const FIRST_DYNAMIC_DESCRIPTOR: i32 = 1;
/// Opened descriptors stay below the sentinel range.
pub const MAX_DYNAMIC_DESCRIPTOR: i32 = 9_999_000;

/// One of the three console streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl Stream {
    pub fn descriptor(self) -> i32 {
        match self {
            Self::Stdin => FILE_STDIN,
            Self::Stdout => FILE_STDOUT,
            Self::Stderr => FILE_STDERR,
        }
    }

    pub fn from_descriptor(fd: i32) -> Option<Self> {
        match fd {
            FILE_STDIN => Some(Self::Stdin),
            FILE_STDOUT => Some(Self::Stdout),
            FILE_STDERR => Some(Self::Stderr),
            _ => None,
        }
    }
}

/// What a descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Stdin,
    Stdout,
    Stderr,
    Log,
    Random,
    Null,
    Zero,
}

/// Host-side backing of the console streams.
pub struct Console {
    stdin: Box<dyn Read + Send>,
    stdout: Box<dyn Write + Send>,
    stderr: Box<dyn Write + Send>,
}

impl Console {
    pub fn new(
        stdin: impl Read + Send + 'static,
        stdout: impl Write + Send + 'static,
        stderr: impl Write + Send + 'static,
    ) -> Self {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        }
    }

    /// The host process's own standard streams.
    pub fn std() -> Self {
        Self::new(io::stdin(), io::stdout(), io::stderr())
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::std()
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Backing {
    Log { prefix: String },
    Random,
    Null,
    Zero,
}

#[derive(Debug)]
struct OpenResource {
    url: String,
    backing: Backing,
}

impl OpenResource {
    fn kind(&self) -> ResourceKind {
        match self.backing {
            Backing::Log { .. } => ResourceKind::Log,
            Backing::Random => ResourceKind::Random,
            Backing::Null => ResourceKind::Null,
            Backing::Zero => ResourceKind::Zero,
        }
    }
}

/// Instance-owned descriptor table.
#[derive(Debug)]
pub struct ResourceTable {
    console: Console,
    opened: BTreeMap<i32, OpenResource>,
    next_descriptor: i32,
}

impl ResourceTable {
    pub fn new(console: Console) -> Self {
        Self {
            console,
            opened: BTreeMap::new(),
            next_descriptor: FIRST_DYNAMIC_DESCRIPTOR,
        }
    }

    /// Descriptor of a console stream.  Always the same fixed value.
    pub fn open_stream(&self, stream: Stream) -> i32 {
        stream.descriptor()
    }

    /// Parse `url` and open the resource its scheme names.
    pub fn open(&mut self, url: &str) -> ResourceResult<i32> {
        let parsed = Url::parse(url).map_err(|source| ResourceError::InvalidResourceUrl {
            url: url.to_string(),
            source,
        })?;
        let backing = match parsed.scheme() {
            "log" => Backing::Log {
                prefix: parsed
                    .query_pairs()
                    .find(|(key, _)| key == "prefix")
                    .map(|(_, value)| value.into_owned())
                    .unwrap_or_default(),
            },
            "random" => Backing::Random,
            "null" => Backing::Null,
            "zero" => Backing::Zero,
            "http" | "https" => {
                return Err(ResourceError::UnsupportedResource(format!(
                    "remote fetching is not available: {url}"
                )))
            }
            other => {
                return Err(ResourceError::UnsupportedResource(format!(
                    "unknown scheme `{other}` in {url}"
                )))
            }
        };

        if self.next_descriptor > MAX_DYNAMIC_DESCRIPTOR {
            return Err(ResourceError::DescriptorsExhausted);
        }
        let fd = self.next_descriptor;
        self.next_descriptor += 1;
        debug!(fd, url, "opened resource");
        self.opened.insert(
            fd,
            OpenResource {
                url: url.to_string(),
                backing,
            },
        );
        Ok(fd)
    }

    /// Fill `buf` from the resource behind `fd`.  Returns the number of
    /// bytes produced; `0` means end of resource.
    pub fn read(&mut self, fd: i32, buf: &mut [u8]) -> ResourceResult<usize> {
        if let Some(stream) = Stream::from_descriptor(fd) {
            return match stream {
                Stream::Stdin => Ok(self.console.stdin.read(buf)?),
                Stream::Stdout | Stream::Stderr => Err(ResourceError::UnsupportedResource(
                    format!("{stream:?} is write-only"),
                )),
            };
        }
        let resource = self
            .opened
            .get(&fd)
            .ok_or(ResourceError::UnknownDescriptor(fd))?;
        match &resource.backing {
            Backing::Log { .. } | Backing::Null => Ok(0),
            Backing::Zero => {
                buf.fill(0);
                Ok(buf.len())
            }
            Backing::Random => {
                getrandom::getrandom(buf)
                    .map_err(|e| ResourceError::Io(io::Error::other(e.to_string())))?;
                Ok(buf.len())
            }
        }
    }

    /// Send `data` to the resource behind `fd`.  Returns the number of bytes
    /// accepted.
    pub fn write(&mut self, fd: i32, data: &[u8]) -> ResourceResult<usize> {
        if let Some(stream) = Stream::from_descriptor(fd) {
            let out: &mut dyn Write = match stream {
                Stream::Stdout => &mut self.console.stdout,
                Stream::Stderr => &mut self.console.stderr,
                Stream::Stdin => {
                    return Err(ResourceError::UnsupportedResource(
                        "Stdin is read-only".to_string(),
                    ))
                }
            };
            out.write_all(data)?;
            out.flush()?;
            return Ok(data.len());
        }
        let resource = self
            .opened
            .get(&fd)
            .ok_or(ResourceError::UnknownDescriptor(fd))?;
        match &resource.backing {
            Backing::Log { prefix } => {
                let text = String::from_utf8_lossy(data);
                for line in text.lines() {
                    info!(target: "wasim::guest", prefix = %prefix, "{line}");
                }
                Ok(data.len())
            }
            Backing::Null | Backing::Zero => Ok(data.len()),
            Backing::Random => Err(ResourceError::UnsupportedResource(format!(
                "{} is read-only",
                resource.url
            ))),
        }
    }

    /// Kind of the resource behind `fd`, if the descriptor is known.
    pub fn kind(&self, fd: i32) -> Option<ResourceKind> {
        match Stream::from_descriptor(fd) {
            Some(Stream::Stdin) => Some(ResourceKind::Stdin),
            Some(Stream::Stdout) => Some(ResourceKind::Stdout),
            Some(Stream::Stderr) => Some(ResourceKind::Stderr),
            None => self.opened.get(&fd).map(OpenResource::kind),
        }
    }

    /// Number of URL-opened resources.
    pub fn opened_count(&self) -> usize {
        self.opened.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ResourceTable {
        ResourceTable::new(Console::new(io::empty(), io::sink(), io::sink()))
    }

    #[test]
    fn sentinels_sit_above_dynamic_range() {
        for fd in [FILE_UNKNOWN, FILE_STDIN, FILE_STDOUT, FILE_STDERR] {
            assert!(fd > MAX_DYNAMIC_DESCRIPTOR);
        }
    }

    #[test]
    fn each_reserved_scheme_has_its_own_kind() {
        let mut t = table();
        let kinds: Vec<_> = ["log:?prefix=app", "random:", "null:", "zero:"]
            .iter()
            .map(|u| {
                let fd = t.open(u).unwrap();
                t.kind(fd).unwrap()
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Log,
                ResourceKind::Random,
                ResourceKind::Null,
                ResourceKind::Zero
            ]
        );
    }

    #[test]
    fn descriptors_are_sequential() {
        let mut t = table();
        assert_eq!(t.open("null:").unwrap(), 1);
        assert_eq!(t.open("null:").unwrap(), 2);
        assert_eq!(t.opened_count(), 2);
    }
}
