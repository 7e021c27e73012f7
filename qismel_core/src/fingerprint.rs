//! Lossless state-action keys for the value table.
//!
//! A [`Fingerprint`] is a tagged, length-prefixed byte encoding of the full
//! numeric payload, the action label, every modality embedding and every
//! sensor reading. Because nothing is hashed or sampled, two pairs share a
//! fingerprint only when they are structurally identical. The price is that
//! keys grow linearly with tensor size.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! 'S' ndim:u64 dims:u64*           shape
//! 'D' len:u64  bits:u64*           payload, IEEE-754 bit patterns
//! 'A' len:u64  utf8                action label
//! 'E' count:u64 { len utf8 len bits* }*   embeddings, key-sorted
//! 'N' count:u64 { len utf8 bits }*        sensors, key-sorted
//! ```

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::state::StateTensor;

const TAG_SHAPE: u8 = b'S';
const TAG_DATA: u8 = b'D';
const TAG_ACTION: u8 = b'A';
const TAG_EMBEDDINGS: u8 = b'E';
const TAG_SENSORS: u8 = b'N';

/// Bytes shown by [`Fingerprint::preview`].
const PREVIEW_BYTES: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short hex digest for logs: the total length plus a folded prefix.
    ///
    /// Not unique; never use it as a key.
    pub fn preview(&self) -> String {
        let mut folded = [0u8; PREVIEW_BYTES];
        for (idx, byte) in self.0.iter().enumerate() {
            let slot = idx % PREVIEW_BYTES;
            folded[slot] = folded[slot].rotate_left(3) ^ byte;
        }
        let hex: String = folded.iter().map(|b| format!("{b:02x}")).collect();
        format!("{}:{}", self.0.len(), hex)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preview())
    }
}

/// Encodes a (state, action) pair into its fingerprint.
///
/// # Examples
///
/// ```
/// use qismel_core::{fingerprint, StateTensor};
///
/// let state = StateTensor::from_vec(&[2], vec![1.0, 2.0]).unwrap();
/// assert_eq!(fingerprint(&state, "move"), fingerprint(&state, "move"));
/// assert_ne!(fingerprint(&state, "move"), fingerprint(&state, "grab"));
/// ```
pub fn fingerprint(state: &StateTensor, action: &str) -> Fingerprint {
    let data = state.data();
    let embedded: usize = state
        .embeddings()
        .iter()
        .map(|(key, values)| 16 + key.len() + values.len() * 8)
        .sum();
    let capacity = 64 + state.shape().len() * 8 + data.len() * 8 + action.len() + embedded;
    let mut encoder = Encoder::with_capacity(capacity);

    encoder.tag(TAG_SHAPE);
    encoder.count(state.shape().len());
    for &dim in state.shape() {
        encoder.count(dim);
    }

    encoder.tag(TAG_DATA);
    encoder.floats(data);

    encoder.tag(TAG_ACTION);
    encoder.text(action);

    if !state.embeddings().is_empty() {
        encoder.tag(TAG_EMBEDDINGS);
        encoder.count(state.embeddings().len());
        for (modality, values) in state.embeddings() {
            encoder.text(modality);
            encoder.floats(values);
        }
    }

    if !state.sensors().is_empty() {
        encoder.tag(TAG_SENSORS);
        encoder.count(state.sensors().len());
        for (name, value) in state.sensors() {
            encoder.text(name);
            encoder.float(*value);
        }
    }

    Fingerprint(encoder.finish())
}

struct Encoder {
    bytes: Vec<u8>,
}

impl Encoder {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    fn tag(&mut self, tag: u8) {
        self.bytes.push(tag);
    }

    fn count(&mut self, count: usize) {
        self.bytes.extend_from_slice(&(count as u64).to_le_bytes());
    }

    /// `-0.0` is written as `0.0` so values that compare equal share a key.
    fn float(&mut self, value: f64) {
        let value = if value == 0.0 { 0.0 } else { value };
        self.bytes.extend_from_slice(&value.to_bits().to_le_bytes());
    }

    fn floats(&mut self, values: &[f64]) {
        self.count(values.len());
        for &value in values {
            self.float(value);
        }
    }

    fn text(&mut self, text: &str) {
        self.count(text.len());
        self.bytes.extend_from_slice(text.as_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.bytes
    }
}
