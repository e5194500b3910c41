//! Durable trace store on the local filesystem.
//!
//! ```text
//! <dir>/run_seq          last issued run id, decimal
//! <dir>/functions.jsonl  one FunctionRecord per line
//! ```
//!
//! `run_seq` is replaced atomically (write to a temporary file, then rename)
//! so a crash never leaves a half-written sequence behind.  The
//! read-increment-replace cycle holds an exclusive lock on `run_seq.lock`,
//! so stores opened on the same directory, in this process or another,
//! never issue the same id.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs4::fs_std::FileExt;
use tracing::debug;

use crate::{FunctionRecord, TraceError, TraceResult, TraceStore};

const RUN_SEQ_FILE: &str = "run_seq";
const RUN_SEQ_LOCK_FILE: &str = "run_seq.lock";
const FUNCTIONS_FILE: &str = "functions.jsonl";
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_POLL: Duration = Duration::from_millis(5);

#[derive(Debug)]
pub struct JsonlTraceStore {
    dir: PathBuf,
    functions: BufWriter<File>,
}

impl JsonlTraceStore {
    /// Open (creating if necessary) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> TraceResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| TraceError::Io {
            path: dir.clone(),
            source,
        })?;
        let functions_path = dir.join(FUNCTIONS_FILE);
        let functions = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&functions_path)
            .map_err(|source| TraceError::Io {
                path: functions_path,
                source,
            })?;
        Ok(Self {
            dir,
            functions: BufWriter::new(functions),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read every record stored under `dir`.
    pub fn load_records(dir: impl AsRef<Path>) -> TraceResult<Vec<FunctionRecord>> {
        let path = dir.as_ref().join(FUNCTIONS_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(TraceError::Io { path, source }),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(TraceError::from))
            .collect()
    }

    fn lock_sequence(&self) -> TraceResult<SequenceLock> {
        let path = self.dir.join(RUN_SEQ_LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| TraceError::Io {
                path: path.clone(),
                source,
            })?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(true) => return Ok(SequenceLock { file }),
                Ok(false) => {}
                Err(source) => return Err(TraceError::Io { path, source }),
            }
            if start.elapsed() >= LOCK_TIMEOUT {
                return Err(TraceError::Unavailable(format!(
                    "timed out waiting for {}",
                    path.display()
                )));
            }
            std::thread::sleep(LOCK_POLL);
        }
    }

    fn last_run_id(&self) -> TraceResult<u64> {
        let path = self.dir.join(RUN_SEQ_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => content
                .trim()
                .parse()
                .map_err(|_| TraceError::CorruptSequence { path, content }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(source) => Err(TraceError::Io { path, source }),
        }
    }
}

/// Exclusive hold on the run sequence.  Unlocks on drop.
struct SequenceLock {
    file: File,
}

impl Drop for SequenceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl TraceStore for JsonlTraceStore {
    fn next_run_id(&mut self) -> TraceResult<u64> {
        let _lock = self.lock_sequence()?;
        let next = self
            .last_run_id()?
            .checked_add(1)
            .ok_or_else(|| TraceError::Unavailable("run sequence exhausted".to_string()))?;

        let tmp = self
            .dir
            .join(format!("{RUN_SEQ_FILE}.{}.tmp", std::process::id()));
        fs::write(&tmp, format!("{next}\n")).map_err(|source| TraceError::Io {
            path: tmp.clone(),
            source,
        })?;
        let seq = self.dir.join(RUN_SEQ_FILE);
        fs::rename(&tmp, &seq).map_err(|source| TraceError::Io { path: seq, source })?;

        debug!(run_id = next, dir = %self.dir.display(), "allocated run id");
        Ok(next)
    }

    fn record_function(&mut self, record: &FunctionRecord) -> TraceResult<()> {
        let path = self.dir.join(FUNCTIONS_FILE);
        serde_json::to_writer(&mut self.functions, record)?;
        self.functions
            .write_all(b"\n")
            .and_then(|()| self.functions.flush())
            .map_err(|source| TraceError::Io { path, source })
    }
}
