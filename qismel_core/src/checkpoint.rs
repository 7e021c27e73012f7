//! Versioned binary checkpoints.
//!
//! A checkpoint file starts with a raw 4-byte magic, followed by a bincode
//! header naming the kind of component that wrote it and its schema
//! version, then the component's snapshot payload. The header is checked
//! before the payload is decoded. The codec uses fixed-width
//! little-endian integers so the same snapshot always produces the same
//! bytes.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const CHECKPOINT_MAGIC: [u8; 4] = *b"QSML";

/// Errors that can occur while saving or loading checkpoints.
#[derive(Debug)]
pub enum CheckpointError {
    Io(std::io::Error),
    Codec(bincode::Error),
    /// The file does not start with [`CHECKPOINT_MAGIC`].
    NotACheckpoint,
    /// The file was written by a different component.
    KindMismatch { expected: String, found: String },
    VersionMismatch { expected: u32, found: u32 },
    /// The payload decoded but violates the component's invariants.
    InvalidFormat(String),
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(err) => write!(f, "I/O error while accessing checkpoint: {err}"),
            CheckpointError::Codec(err) => write!(f, "failed to (de)serialize checkpoint: {err}"),
            CheckpointError::NotACheckpoint => write!(f, "file is not a checkpoint"),
            CheckpointError::KindMismatch { expected, found } => write!(
                f,
                "checkpoint holds a '{found}' snapshot, expected '{expected}'"
            ),
            CheckpointError::VersionMismatch { expected, found } => write!(
                f,
                "checkpoint version mismatch: expected {expected}, found {found}"
            ),
            CheckpointError::InvalidFormat(msg) => write!(f, "invalid checkpoint: {msg}"),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        CheckpointError::Io(err)
    }
}

impl From<bincode::Error> for CheckpointError {
    fn from(err: bincode::Error) -> Self {
        CheckpointError::Codec(err)
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

#[derive(Serialize, Deserialize)]
struct Header {
    kind: String,
    version: u32,
}

/// A component that can be written to and restored from disk.
///
/// Implementors only describe how to take and restore a snapshot; the
/// header checks run in [`Checkpointable::load_snapshot`].
pub trait Checkpointable: Sized {
    /// Identifies the component in the header
    const KIND: &'static str;
    const VERSION: u32;

    type Snapshot: Serialize + DeserializeOwned;

    fn snapshot(&self) -> Self::Snapshot;

    fn restore(snapshot: Self::Snapshot) -> Result<Self, CheckpointError>;

    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let header = Header {
            kind: Self::KIND.to_string(),
            version: Self::VERSION,
        };
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&CHECKPOINT_MAGIC)?;
        codec().serialize_into(&mut writer, &header)?;
        codec().serialize_into(&mut writer, &self.snapshot())?;
        writer.flush()?;
        tracing::debug!(kind = Self::KIND, path = %path.display(), "checkpoint written");
        Ok(())
    }

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        Self::restore(Self::load_snapshot(path)?)
    }

    /// Reads and checks the header, returning the raw snapshot.
    fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self::Snapshot, CheckpointError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 4];
        match reader.read_exact(&mut magic) {
            Ok(()) if magic == CHECKPOINT_MAGIC => {}
            Ok(()) => return Err(CheckpointError::NotACheckpoint),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                return Err(CheckpointError::NotACheckpoint)
            }
            Err(err) => return Err(err.into()),
        }

        let header: Header = codec().deserialize_from(&mut reader)?;
        if header.kind != Self::KIND {
            return Err(CheckpointError::KindMismatch {
                expected: Self::KIND.to_string(),
                found: header.kind,
            });
        }
        if header.version != Self::VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: Self::VERSION,
                found: header.version,
            });
        }
        Ok(codec().deserialize_from(&mut reader)?)
    }
}
