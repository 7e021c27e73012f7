use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::tensor::TensorBuffer;

/// Element type the numeric payload was perceived as.
///
/// The buffer itself always stores `f64`; the tag records the source
/// precision so consumers can round-trip to the original representation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Float32,
    #[default]
    Float64,
    Int32,
    UInt8,
    Bool,
}

/// A named point annotation on the numeric buffer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymbolicFeature {
    pub name: String,
    pub coords: Vec<usize>,
    /// Free-form type label, e.g. "object", "edge", "goal".
    pub kind: String,
}

impl SymbolicFeature {
    pub fn new(name: impl Into<String>, coords: Vec<usize>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coords,
            kind: kind.into(),
        }
    }
}

/// Provenance of a state snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub source: String,
    /// Ordered log of every derivation applied since perception.
    pub processing_steps: Vec<String>,
    pub custom: BTreeMap<String, Value>,
}

/// Immutable multimodal state snapshot.
///
/// Combines a shaped numeric buffer with symbolic annotations, optional
/// per-modality embeddings, named sensor readings, provenance metadata and
/// task/environment context. Nothing here can be mutated after
/// construction; every `with_*` method and [`StateTensor::derive`] returns a
/// fresh instance and leaves `self` untouched.
///
/// # Examples
///
/// ```
/// use qismel_core::{StateTensor, TensorBuffer};
///
/// let buffer = TensorBuffer::from_seed(7, &[3, 3]).unwrap();
/// let state = StateTensor::builder(buffer)
///     .source("camera-0")
///     .sensor("temperature", 21.5)
///     .feature("goal", vec![2, 2], "target")
///     .build()
///     .unwrap();
///
/// let normalized = state.derive("normalize", |b| b.normalize()).unwrap();
/// assert_eq!(normalized.metadata().processing_steps, vec!["normalize"]);
/// assert!(state.metadata().processing_steps.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStateTensor")]
pub struct StateTensor {
    buffer: TensorBuffer,
    datatype: DataType,
    features: Vec<SymbolicFeature>,
    metadata: StateMetadata,
    embeddings: BTreeMap<String, Vec<f64>>,
    sensors: BTreeMap<String, f64>,
    task_context: Option<String>,
    env_context: Option<String>,
}

#[derive(Deserialize)]
struct RawStateTensor {
    buffer: TensorBuffer,
    datatype: DataType,
    features: Vec<SymbolicFeature>,
    metadata: StateMetadata,
    embeddings: BTreeMap<String, Vec<f64>>,
    sensors: BTreeMap<String, f64>,
    task_context: Option<String>,
    env_context: Option<String>,
}

impl TryFrom<RawStateTensor> for StateTensor {
    type Error = CoreError;

    fn try_from(raw: RawStateTensor) -> CoreResult<Self> {
        StateTensorBuilder {
            state: StateTensor {
                buffer: raw.buffer,
                datatype: raw.datatype,
                features: raw.features,
                metadata: raw.metadata,
                embeddings: raw.embeddings,
                sensors: raw.sensors,
                task_context: raw.task_context,
                env_context: raw.env_context,
            },
        }
        .build()
    }
}

impl StateTensor {
    /// Wraps a bare buffer with no annotations.
    pub fn new(buffer: TensorBuffer) -> Self {
        Self {
            buffer,
            datatype: DataType::default(),
            features: Vec::new(),
            metadata: StateMetadata::default(),
            embeddings: BTreeMap::new(),
            sensors: BTreeMap::new(),
            task_context: None,
            env_context: None,
        }
    }

    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> CoreResult<Self> {
        Ok(Self::new(TensorBuffer::from_vec(shape, data)?))
    }

    pub fn builder(buffer: TensorBuffer) -> StateTensorBuilder {
        StateTensorBuilder {
            state: Self::new(buffer),
        }
    }

    pub fn buffer(&self) -> &TensorBuffer {
        &self.buffer
    }

    pub fn shape(&self) -> &[usize] {
        self.buffer.shape()
    }

    pub fn data(&self) -> &[f64] {
        self.buffer.data()
    }

    pub fn get(&self, coords: &[usize]) -> CoreResult<f64> {
        self.buffer.get(coords)
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn features(&self) -> &[SymbolicFeature] {
        &self.features
    }

    pub fn metadata(&self) -> &StateMetadata {
        &self.metadata
    }

    /// Per-modality embeddings keyed by modality name, in sorted order.
    pub fn embeddings(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.embeddings
    }

    pub fn embedding(&self, modality: &str) -> Option<&[f64]> {
        self.embeddings.get(modality).map(Vec::as_slice)
    }

    /// Sensor readings keyed by sensor name, in sorted order.
    pub fn sensors(&self) -> &BTreeMap<String, f64> {
        &self.sensors
    }

    pub fn sensor(&self, name: &str) -> Option<f64> {
        self.sensors.get(name).copied()
    }

    pub fn task_context(&self) -> Option<&str> {
        self.task_context.as_deref()
    }

    pub fn env_context(&self) -> Option<&str> {
        self.env_context.as_deref()
    }

    /// Applies a buffer transform and records `step` in the processing log.
    ///
    /// Feature coordinates are revalidated against the new shape; the
    /// original snapshot is never modified, even on failure.
    pub fn derive<F>(&self, step: &str, transform: F) -> CoreResult<Self>
    where
        F: FnOnce(&TensorBuffer) -> CoreResult<TensorBuffer>,
    {
        let buffer = transform(&self.buffer)?;
        Ok(self.with_buffer(buffer)?.with_processing_step(step))
    }

    /// Replaces the numeric payload, keeping every side-channel.
    pub fn with_buffer(&self, buffer: TensorBuffer) -> CoreResult<Self> {
        for feature in &self.features {
            buffer.check_coords(&feature.coords)?;
        }
        let mut next = self.clone();
        next.buffer = buffer;
        Ok(next)
    }

    pub fn with_processing_step(&self, step: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.metadata.processing_steps.push(step.into());
        next
    }

    pub fn with_sensor(&self, name: impl Into<String>, value: f64) -> Self {
        let mut next = self.clone();
        next.sensors.insert(name.into(), value);
        next
    }

    pub fn with_embedding(&self, modality: impl Into<String>, embedding: Vec<f64>) -> Self {
        let mut next = self.clone();
        next.embeddings.insert(modality.into(), embedding);
        next
    }

    pub fn with_context(&self, task: impl Into<String>, environment: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.task_context = Some(task.into());
        next.env_context = Some(environment.into());
        next
    }
}

impl Display for StateTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StateTensor {:?} features={} embeddings={} sensors={} steps={}",
            self.shape(),
            self.features.len(),
            self.embeddings.len(),
            self.sensors.len(),
            self.metadata.processing_steps.len(),
        )
    }
}

/// Assembles a [`StateTensor`], validating feature coordinates on `build`.
#[derive(Debug, Clone)]
pub struct StateTensorBuilder {
    state: StateTensor,
}

impl StateTensorBuilder {
    pub fn datatype(mut self, datatype: DataType) -> Self {
        self.state.datatype = datatype;
        self
    }

    pub fn feature(
        mut self,
        name: impl Into<String>,
        coords: Vec<usize>,
        kind: impl Into<String>,
    ) -> Self {
        self.state
            .features
            .push(SymbolicFeature::new(name, coords, kind));
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.state.metadata.source = source.into();
        self
    }

    pub fn custom(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state.metadata.custom.insert(key.into(), value);
        self
    }

    pub fn embedding(mut self, modality: impl Into<String>, embedding: Vec<f64>) -> Self {
        self.state.embeddings.insert(modality.into(), embedding);
        self
    }

    pub fn sensor(mut self, name: impl Into<String>, value: f64) -> Self {
        self.state.sensors.insert(name.into(), value);
        self
    }

    pub fn task_context(mut self, task: impl Into<String>) -> Self {
        self.state.task_context = Some(task.into());
        self
    }

    pub fn env_context(mut self, environment: impl Into<String>) -> Self {
        self.state.env_context = Some(environment.into());
        self
    }

    /// Fails with [`crate::CoreError::Index`] if any feature lies outside the buffer.
    pub fn build(self) -> CoreResult<StateTensor> {
        for feature in &self.state.features {
            self.state.buffer.check_coords(&feature.coords)?;
        }
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> StateTensor {
        StateTensor::builder(TensorBuffer::from_seed(5, &[2, 3]).unwrap())
            .datatype(DataType::Float32)
            .source("unit-test")
            .custom("episode", json!(3))
            .feature("agent", vec![0, 1], "object")
            .embedding("image", vec![0.1, 0.2])
            .sensor("battery", 0.75)
            .task_context("fetch")
            .env_context("grid")
            .build()
            .unwrap()
    }

    #[test]
    fn builder_populates_every_channel() {
        let state = sample();
        assert_eq!(state.shape(), &[2, 3]);
        assert_eq!(state.datatype(), DataType::Float32);
        assert_eq!(state.metadata().source, "unit-test");
        assert_eq!(state.metadata().custom["episode"], json!(3));
        assert_eq!(state.features()[0].kind, "object");
        assert_eq!(state.embedding("image"), Some(&[0.1, 0.2][..]));
        assert_eq!(state.sensor("battery"), Some(0.75));
        assert_eq!(state.task_context(), Some("fetch"));
        assert_eq!(state.env_context(), Some("grid"));
    }

    #[test]
    fn builder_rejects_out_of_range_feature() {
        let result = StateTensor::builder(TensorBuffer::zeros(&[2, 2]).unwrap())
            .feature("ghost", vec![2, 0], "object")
            .build();
        assert!(matches!(result, Err(CoreError::Index { .. })));
    }

    #[test]
    fn derivations_leave_original_untouched() {
        let state = sample();
        let snapshot = state.clone();

        let renamed = state.with_sensor("battery", 0.5);
        let annotated = state.with_embedding("audio", vec![1.0]);
        let normalized = state.derive("normalize", |b| b.normalize()).unwrap();

        assert_eq!(state, snapshot);
        assert_eq!(renamed.sensor("battery"), Some(0.5));
        assert!(annotated.embedding("audio").is_some());
        assert_eq!(normalized.metadata().processing_steps, vec!["normalize"]);
        assert_eq!(normalized.features(), state.features());
    }

    #[test]
    fn processing_steps_keep_order() {
        let state = sample()
            .with_processing_step("denoise")
            .with_processing_step("crop");
        assert_eq!(state.metadata().processing_steps, vec!["denoise", "crop"]);
    }

    #[test]
    fn failed_derivation_is_reported() {
        let state = StateTensor::from_vec(&[2], vec![1.0, 1.0]).unwrap();
        let result = state.derive("normalize", |b| b.normalize());
        assert!(matches!(result, Err(CoreError::DegenerateRange { .. })));
        assert!(state.metadata().processing_steps.is_empty());
    }

    #[test]
    fn derive_revalidates_features_against_new_shape() {
        let state = sample();
        let shrink = state.derive("shrink", |_| TensorBuffer::zeros(&[1, 1]));
        assert!(matches!(shrink, Err(CoreError::Index { .. })));
    }

    #[test]
    fn deserialization_revalidates_features() {
        let state = sample();
        let mut value = serde_json::to_value(&state).unwrap();
        let decoded: StateTensor = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(decoded, state);

        value["features"][0]["coords"] = json!([5, 0]);
        assert!(serde_json::from_value::<StateTensor>(value).is_err());
    }
}
