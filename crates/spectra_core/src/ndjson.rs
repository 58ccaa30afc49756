//! Newline-delimited JSON interchange files, one per entity kind.
//!
//! # Responsibility
//! - Read canonical records from NDJSON, ignoring unknown fields.
//! - Append records without duplicating ids already on disk.
//!
//! # Invariants
//! - One JSON object per line; blank lines are skipped.
//! - A missing file reads as an empty record list.
//! - Appending the same records twice leaves the file unchanged.

use crate::model::{CanonicalRecord, EntityKind};
use crate::normalize::{BatchRecord, CanonicalBatch};
use log::info;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub type NdjsonResult<T> = Result<T, NdjsonError>;

#[derive(Debug)]
pub enum NdjsonError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, line: usize, message: String },
    Serialize { message: String },
}

impl Display for NdjsonError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "io error on `{}`: {source}", path.display()),
            Self::Parse {
                path,
                line,
                message,
            } => write!(f, "invalid record at {}:{line}: {message}", path.display()),
            Self::Serialize { message } => write!(f, "failed to serialize record: {message}"),
        }
    }
}

impl Error for NdjsonError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { .. } | Self::Serialize { .. } => None,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> NdjsonError + '_ {
    move |source| NdjsonError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads every record of a file. Fails on the first malformed line.
pub fn read_records<T: CanonicalRecord>(path: &Path) -> NdjsonResult<Vec<T>> {
    read_lines(path, |line_no, line| {
        serde_json::from_str::<T>(line).map_err(|err| NdjsonError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            message: err.to_string(),
        })
    })
}

/// Reads arbitrary JSON values, one per line.
pub fn read_values(path: &Path) -> NdjsonResult<Vec<Value>> {
    read_lines(path, |line_no, line| {
        serde_json::from_str::<Value>(line).map_err(|err| NdjsonError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            message: err.to_string(),
        })
    })
}

fn read_lines<T>(
    path: &Path,
    mut parse: impl FnMut(usize, &str) -> NdjsonResult<T>,
) -> NdjsonResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(io_error(path))?;
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_error(path))?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse(idx + 1, &line)?);
    }
    Ok(records)
}

/// Ids already present in a file, read from the kind's id field.
fn existing_ids(path: &Path, id_field: &str) -> NdjsonResult<HashSet<String>> {
    Ok(read_values(path)?
        .into_iter()
        .filter_map(|value| value.get(id_field).and_then(Value::as_str).map(str::to_string))
        .collect())
}

/// Appends records whose id is not yet in the file. Returns how many were written.
pub fn append_dedupe<T: CanonicalRecord>(path: &Path, records: &[T]) -> NdjsonResult<usize> {
    let mut seen = existing_ids(path, T::KIND.id_field())?;
    let fresh: Vec<&T> = records
        .iter()
        .filter(|record| seen.insert(record.record_id().to_string()))
        .collect();
    if fresh.is_empty() {
        return Ok(0);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    for record in &fresh {
        let line = serde_json::to_string(record).map_err(|err| NdjsonError::Serialize {
            message: err.to_string(),
        })?;
        writer.write_all(line.as_bytes()).map_err(io_error(path))?;
        writer.write_all(b"\n").map_err(io_error(path))?;
    }
    writer.flush().map_err(io_error(path))?;
    Ok(fresh.len())
}

/// A directory holding one NDJSON file per entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdjsonDir {
    root: PathBuf,
}

impl NdjsonDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    fn append_kind<T: BatchRecord>(
        &self,
        batch: &CanonicalBatch,
        written: &mut BTreeMap<EntityKind, usize>,
    ) -> NdjsonResult<()> {
        let count = append_dedupe(&self.path_for(T::KIND), batch.records::<T>())?;
        written.insert(T::KIND, count);
        Ok(())
    }

    /// Appends every record of a batch. Returns written counts per kind.
    pub fn append_batch(&self, batch: &CanonicalBatch) -> NdjsonResult<BTreeMap<EntityKind, usize>> {
        use crate::model::{
            Isotopologue, Reference, SourceSnapshot, Species, SpectroscopicParameter, State,
            Transition,
        };

        let mut written = BTreeMap::new();
        self.append_kind::<Reference>(batch, &mut written)?;
        self.append_kind::<SourceSnapshot>(batch, &mut written)?;
        self.append_kind::<Species>(batch, &mut written)?;
        self.append_kind::<Isotopologue>(batch, &mut written)?;
        self.append_kind::<State>(batch, &mut written)?;
        self.append_kind::<Transition>(batch, &mut written)?;
        self.append_kind::<SpectroscopicParameter>(batch, &mut written)?;
        info!(
            "event=ndjson_append module=ndjson status=ok dir={} written={}",
            self.root.display(),
            written.values().sum::<usize>()
        );
        Ok(written)
    }

    fn read_kind<T: BatchRecord>(&self, batch: &mut CanonicalBatch) -> NdjsonResult<()> {
        for record in read_records::<T>(&self.path_for(T::KIND))? {
            batch.insert(record);
        }
        Ok(())
    }

    /// Reads all files into one batch; the first record seen for an id wins.
    pub fn read_batch(&self) -> NdjsonResult<CanonicalBatch> {
        use crate::model::{
            Isotopologue, Reference, SourceSnapshot, Species, SpectroscopicParameter, State,
            Transition,
        };

        let mut batch = CanonicalBatch::new();
        self.read_kind::<Reference>(&mut batch)?;
        self.read_kind::<SourceSnapshot>(&mut batch)?;
        self.read_kind::<Species>(&mut batch)?;
        self.read_kind::<Isotopologue>(&mut batch)?;
        self.read_kind::<State>(&mut batch)?;
        self.read_kind::<Transition>(&mut batch)?;
        self.read_kind::<SpectroscopicParameter>(&mut batch)?;
        Ok(batch)
    }
}
