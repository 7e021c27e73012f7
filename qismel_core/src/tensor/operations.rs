//! Logged binary tensor operations.
//!
//! These wrap the corresponding [`TensorBuffer`] methods and append a summary
//! of every successful result to `operations.jsonl` in an [`OperationLog`]
//! directory:
//! - [`add`] - Elementwise sum
//! - [`multiply`] - Elementwise product
//! - [`concatenate`] - Join along an axis
//!
//! The free functions journal to [`logging::DEFAULT_LOG_DIR`]. A failure to
//! write the journal is reported through `tracing` and never fails the
//! operation itself.

use std::path::{Path, PathBuf};

use super::{TensorBuffer, TensorStatistics};
use crate::error::CoreResult;
use crate::logging;

/// Directory that logged operations append their journal to.
///
/// # Examples
///
/// ```
/// use qismel_core::tensor::operations::OperationLog;
/// use qismel_core::TensorBuffer;
///
/// let log = OperationLog::new(std::env::temp_dir().join("qismel_doc_ops"));
/// let a = TensorBuffer::from_seed(1, &[4, 4]).unwrap();
/// let b = TensorBuffer::from_seed(2, &[4, 4]).unwrap();
/// let sum = log.add(&a, &b).unwrap();
/// assert_eq!(sum.shape(), &[4, 4]);
/// assert!(log.journal_path().exists());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationLog {
    dir: PathBuf,
}

impl OperationLog {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn journal_path(&self) -> PathBuf {
        self.dir.join("operations.jsonl")
    }

    /// Elementwise sum of two buffers with identical shapes.
    pub fn add(&self, a: &TensorBuffer, b: &TensorBuffer) -> CoreResult<TensorBuffer> {
        let tensor = a.add(b)?;
        self.record("add", &tensor.statistics());
        Ok(tensor)
    }

    /// Elementwise product of two buffers with identical shapes.
    pub fn multiply(&self, a: &TensorBuffer, b: &TensorBuffer) -> CoreResult<TensorBuffer> {
        let tensor = a.multiply(b)?;
        self.record("multiply", &tensor.statistics());
        Ok(tensor)
    }

    /// Concatenates `b` after `a` along `axis`.
    ///
    /// Fails with [`crate::CoreError::ShapeMismatch`] when any non-axis
    /// dimension differs; neither input is touched in that case.
    pub fn concatenate(
        &self,
        a: &TensorBuffer,
        b: &TensorBuffer,
        axis: usize,
    ) -> CoreResult<TensorBuffer> {
        let tensor = a.concatenate(b, axis)?;
        self.record("concatenate", &tensor.statistics());
        Ok(tensor)
    }

    fn record(&self, name: &str, stats: &TensorStatistics) {
        if let Err(err) = logging::log_operation(&self.dir, name, stats) {
            tracing::warn!("failed to log tensor operation {name}: {err}");
        }
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new(logging::DEFAULT_LOG_DIR)
    }
}

/// [`OperationLog::add`] journaled to the default directory.
pub fn add(a: &TensorBuffer, b: &TensorBuffer) -> CoreResult<TensorBuffer> {
    OperationLog::default().add(a, b)
}

/// [`OperationLog::multiply`] journaled to the default directory.
pub fn multiply(a: &TensorBuffer, b: &TensorBuffer) -> CoreResult<TensorBuffer> {
    OperationLog::default().multiply(a, b)
}

/// [`OperationLog::concatenate`] journaled to the default directory.
pub fn concatenate(a: &TensorBuffer, b: &TensorBuffer, axis: usize) -> CoreResult<TensorBuffer> {
    OperationLog::default().concatenate(a, b, axis)
}
