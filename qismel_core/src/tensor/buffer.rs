use std::fmt::{self, Display};

use ndarray::{ArrayD, Axis, IxDyn, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A fixed-shape, row-major, N-dimensional numeric buffer.
///
/// The shape is always non-empty and every dimension is positive, so the
/// flat length is `product(shape)` and at least one element exists. All
/// binary operations return a new buffer; only [`TensorBuffer::set`]
/// mutates in place.
///
/// # Examples
///
/// ```
/// use qismel_core::TensorBuffer;
///
/// let mut buffer = TensorBuffer::zeros(&[2, 3]).unwrap();
/// buffer.set(&[1, 2], 4.5).unwrap();
/// assert_eq!(buffer.get(&[1, 2]).unwrap(), 4.5);
/// assert_eq!(buffer.flat_index(&[1, 2]).unwrap(), 5);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensorBuffer")]
pub struct TensorBuffer {
    data: ArrayD<f64>,
}

/// Unchecked wire form; decoding goes through the same shape validation
/// as the constructors.
#[derive(Deserialize)]
struct RawTensorBuffer {
    data: ArrayD<f64>,
}

impl TryFrom<RawTensorBuffer> for TensorBuffer {
    type Error = CoreError;

    fn try_from(raw: RawTensorBuffer) -> CoreResult<Self> {
        validate_shape(raw.data.shape())?;
        Ok(Self::from_array(raw.data))
    }
}

impl TensorBuffer {
    /// Creates a zero-filled buffer.
    ///
    /// Fails with [`CoreError::Config`] when `shape` is empty or contains a zero.
    pub fn zeros(shape: &[usize]) -> CoreResult<Self> {
        validate_shape(shape)?;
        Ok(Self {
            data: ArrayD::zeros(IxDyn(shape)),
        })
    }

    /// Alias for [`TensorBuffer::zeros`].
    pub fn new(shape: &[usize]) -> CoreResult<Self> {
        Self::zeros(shape)
    }

    /// Builds a buffer from row-major data.
    ///
    /// # Errors
    ///
    /// * [`CoreError::Config`] if the shape is invalid
    /// * [`CoreError::ShapeMismatch`] if `data.len() != product(shape)`
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> CoreResult<Self> {
        validate_shape(shape)?;
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(CoreError::shape_mismatch(
                &[expected],
                &[data.len()],
                "buffer length",
            ));
        }
        let data = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|err| CoreError::config("shape", err.to_string()))?;
        Ok(Self { data })
    }

    /// Creates a deterministic pseudo-random buffer with values in `[0, 1]`.
    ///
    /// The same seed and shape always produce the same buffer. A seed of 0 is
    /// treated as 1.
    pub fn from_seed(seed: u64, shape: &[usize]) -> CoreResult<Self> {
        let mut buffer = Self::zeros(shape)?;
        let state = if seed == 0 { 1 } else { seed };
        buffer
            .as_slice_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, value)| {
                let step = idx as u64 + state;
                *value = normalized(lcg(step));
            });
        Ok(buffer)
    }

    fn from_array(data: ArrayD<f64>) -> Self {
        if data.is_standard_layout() {
            Self { data }
        } else {
            Self {
                data: data.as_standard_layout().into_owned(),
            }
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false: a valid shape has at least one element.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major view of the numeric payload.
    pub fn data(&self) -> &[f64] {
        self.data
            .as_slice()
            .expect("tensor buffer keeps standard layout")
    }

    fn as_slice_mut(&mut self) -> &mut [f64] {
        self.data
            .as_slice_mut()
            .expect("tensor buffer keeps standard layout")
    }

    /// Checks arity and bounds of a coordinate tuple.
    pub fn check_coords(&self, coords: &[usize]) -> CoreResult<()> {
        let shape = self.shape();
        if coords.len() != shape.len() || coords.iter().zip(shape).any(|(c, dim)| c >= dim) {
            return Err(CoreError::index(coords, shape));
        }
        Ok(())
    }

    /// Maps a coordinate tuple to its row-major flat index.
    pub fn flat_index(&self, coords: &[usize]) -> CoreResult<usize> {
        self.check_coords(coords)?;
        let mut index = 0usize;
        for (coord, dim) in coords.iter().zip(self.shape()) {
            index = index * dim + coord;
        }
        Ok(index)
    }

    /// Maps a row-major flat index back to its coordinate tuple.
    pub fn coords_of(&self, flat: usize) -> CoreResult<Vec<usize>> {
        if flat >= self.len() {
            return Err(CoreError::index(&[flat], &[self.len()]));
        }
        let mut coords = vec![0usize; self.ndim()];
        let mut remainder = flat;
        for (axis, dim) in self.shape().iter().enumerate().rev() {
            coords[axis] = remainder % dim;
            remainder /= dim;
        }
        Ok(coords)
    }

    pub fn get(&self, coords: &[usize]) -> CoreResult<f64> {
        self.check_coords(coords)?;
        Ok(self.data[coords])
    }

    pub fn set(&mut self, coords: &[usize], value: f64) -> CoreResult<()> {
        self.check_coords(coords)?;
        self.data[coords] = value;
        Ok(())
    }

    /// Elementwise sum. Shapes must be identical.
    pub fn add(&self, other: &Self) -> CoreResult<Self> {
        self.zip_with(other, "add", |lhs, rhs| lhs + rhs)
    }

    /// Elementwise difference. Shapes must be identical.
    pub fn subtract(&self, other: &Self) -> CoreResult<Self> {
        self.zip_with(other, "subtract", |lhs, rhs| lhs - rhs)
    }

    /// Elementwise (Hadamard) product. Shapes must be identical.
    pub fn multiply(&self, other: &Self) -> CoreResult<Self> {
        self.zip_with(other, "multiply", |lhs, rhs| lhs * rhs)
    }

    fn zip_with<F>(&self, other: &Self, context: &str, op: F) -> CoreResult<Self>
    where
        F: Fn(f64, f64) -> f64 + Sync + Send,
    {
        if self.shape() != other.shape() {
            return Err(CoreError::shape_mismatch(
                self.shape(),
                other.shape(),
                context,
            ));
        }
        let mut data = ArrayD::zeros(self.data.raw_dim());
        Zip::from(&mut data)
            .and(&self.data)
            .and(&other.data)
            .par_for_each(|out, &lhs, &rhs| {
                *out = op(lhs, rhs);
            });
        Ok(Self { data })
    }

    pub fn scale(&self, factor: f64) -> Self {
        self.map(|value| value * factor)
    }

    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        let mut out = self.clone();
        out.as_slice_mut()
            .par_iter_mut()
            .for_each(|value| *value = f(*value));
        out
    }

    /// Reverses the axis order, relocating data so the result is row-major.
    ///
    /// For a 2-D buffer this is the matrix transpose.
    pub fn transpose(&self) -> Self {
        Self::from_array(self.data.t().as_standard_layout().into_owned())
    }

    /// Linearly rescales all values into `[0, 1]` via `(x - min) / (max - min)`.
    ///
    /// A constant buffer (or one holding non-finite values) has no usable
    /// range and fails with [`CoreError::DegenerateRange`] instead of
    /// producing NaN. Finite spreads wider than `f64::MAX` are rescaled
    /// by halving both sides of the quotient.
    pub fn normalize(&self) -> CoreResult<Self> {
        let slice = self.data();
        let min = slice.par_iter().cloned().reduce(|| f64::INFINITY, f64::min);
        let max = slice
            .par_iter()
            .cloned()
            .reduce(|| f64::NEG_INFINITY, f64::max);
        let all_finite = slice.par_iter().all(|value| value.is_finite());

        if !all_finite || max <= min {
            return Err(CoreError::degenerate_range(min, max));
        }

        let range = max - min;
        if range.is_finite() {
            Ok(self.map(|value| (value - min) / range))
        } else {
            let (half_min, half_range) = (min / 2.0, max / 2.0 - min / 2.0);
            Ok(self.map(|value| (value / 2.0 - half_min) / half_range))
        }
    }

    /// Joins two buffers along `axis`.
    ///
    /// Every dimension except `axis` must match; the result's `axis`
    /// dimension is the sum of both inputs'. Neither input is modified.
    pub fn concatenate(&self, other: &Self, axis: usize) -> CoreResult<Self> {
        if axis >= self.ndim() {
            return Err(CoreError::config(
                "axis",
                format!("axis {} out of range for {} dimensions", axis, self.ndim()),
            ));
        }
        let compatible = self.ndim() == other.ndim()
            && self
                .shape()
                .iter()
                .zip(other.shape())
                .enumerate()
                .all(|(idx, (lhs, rhs))| idx == axis || lhs == rhs);
        if !compatible {
            return Err(CoreError::shape_mismatch(
                self.shape(),
                other.shape(),
                format!("concatenate along axis {}", axis),
            ));
        }

        let joined = ndarray::concatenate(Axis(axis), &[self.data.view(), other.data.view()])
            .map_err(|err| {
                CoreError::shape_mismatch(self.shape(), other.shape(), err.to_string())
            })?;
        Ok(Self::from_array(joined))
    }

    pub fn statistics(&self) -> TensorStatistics {
        let slice = self.data();
        let count = slice.len() as f64;
        let min = slice.par_iter().cloned().reduce(|| f64::INFINITY, f64::min);
        let max = slice
            .par_iter()
            .cloned()
            .reduce(|| f64::NEG_INFINITY, f64::max);
        let mean = slice.par_iter().sum::<f64>() / count;
        let variance = slice
            .par_iter()
            .map(|value| {
                let diff = value - mean;
                diff * diff
            })
            .sum::<f64>()
            / count;

        TensorStatistics {
            min,
            max,
            mean,
            variance,
        }
    }
}

impl Display for TensorBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.statistics();
        write!(
            f,
            "TensorBuffer {:?} min={:.3} max={:.3} mean={:.3} variance={:.5}",
            self.shape(),
            stats.min,
            stats.max,
            stats.mean,
            stats.variance,
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq)]
pub struct TensorStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
}

fn validate_shape(shape: &[usize]) -> CoreResult<()> {
    if shape.is_empty() {
        return Err(CoreError::config("shape", "must have at least one dimension"));
    }
    if shape.iter().any(|&dim| dim == 0) {
        return Err(CoreError::config(
            "shape",
            format!("dimensions must be positive, got {:?}", shape),
        ));
    }
    Ok(())
}

fn lcg(seed: u64) -> u64 {
    seed.wrapping_mul(1664525).wrapping_add(1013904223)
}

fn normalized(value: u64) -> f64 {
    let fraction = (value & 0xFFFF_FFFF) as f64 / (u32::MAX as f64);
    fraction.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn matrix(rows: usize, cols: usize) -> TensorBuffer {
        let data = (0..rows * cols).map(|v| v as f64).collect();
        TensorBuffer::from_vec(&[rows, cols], data).unwrap()
    }

    #[test]
    fn rejects_invalid_shapes() {
        assert!(matches!(
            TensorBuffer::zeros(&[]),
            Err(CoreError::Config { .. })
        ));
        assert!(matches!(
            TensorBuffer::zeros(&[3, 0]),
            Err(CoreError::Config { .. })
        ));
        assert!(matches!(
            TensorBuffer::from_vec(&[2, 2], vec![1.0; 3]),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn set_then_get_returns_value_for_random_coords() {
        let mut rng = StdRng::seed_from_u64(7);
        let shape = [3, 4, 5];
        let mut buffer = TensorBuffer::zeros(&shape).unwrap();
        for _ in 0..200 {
            let coords: Vec<usize> = shape.iter().map(|&dim| rng.gen_range(0..dim)).collect();
            let value: f64 = rng.gen_range(-100.0..100.0);
            buffer.set(&coords, value).unwrap();
            assert_eq!(buffer.get(&coords).unwrap(), value);
        }
    }

    #[test]
    fn get_rejects_wrong_arity_and_out_of_range() {
        let buffer = matrix(2, 3);
        assert!(matches!(buffer.get(&[1]), Err(CoreError::Index { .. })));
        assert!(matches!(buffer.get(&[0, 0, 0]), Err(CoreError::Index { .. })));
        assert!(matches!(buffer.get(&[2, 0]), Err(CoreError::Index { .. })));
        assert!(matches!(buffer.get(&[0, 3]), Err(CoreError::Index { .. })));
    }

    #[test]
    fn set_out_of_range_leaves_buffer_untouched() {
        let mut buffer = matrix(2, 2);
        let before = buffer.clone();
        assert!(buffer.set(&[5, 5], 1.0).is_err());
        assert_eq!(buffer, before);
    }

    #[test]
    fn flat_index_round_trips_through_coords() {
        let buffer = TensorBuffer::zeros(&[2, 3, 4]).unwrap();
        for flat in 0..buffer.len() {
            let coords = buffer.coords_of(flat).unwrap();
            assert_eq!(buffer.flat_index(&coords).unwrap(), flat);
        }
        assert_eq!(buffer.flat_index(&[1, 2, 3]).unwrap(), 23);
        assert!(buffer.coords_of(24).is_err());
    }

    #[test]
    fn row_major_layout_matches_get() {
        let buffer = matrix(2, 3);
        assert_eq!(buffer.get(&[1, 0]).unwrap(), 3.0);
        assert_eq!(buffer.data()[buffer.flat_index(&[1, 2]).unwrap()], 5.0);
    }

    #[test]
    fn elementwise_ops_require_matching_shapes() {
        let a = matrix(2, 3);
        let b = matrix(3, 2);
        assert!(matches!(a.add(&b), Err(CoreError::ShapeMismatch { .. })));
        assert!(matches!(a.multiply(&b), Err(CoreError::ShapeMismatch { .. })));

        let sum = a.add(&a).unwrap();
        let product = a.multiply(&a).unwrap();
        assert_eq!(sum.get(&[1, 2]).unwrap(), 10.0);
        assert_eq!(product.get(&[1, 2]).unwrap(), 25.0);
        assert_eq!(a.subtract(&a).unwrap().statistics().max, 0.0);
    }

    #[test]
    fn transpose_relocates_data() {
        let a = matrix(2, 3);
        let t = a.transpose();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.get(&[2, 1]).unwrap(), a.get(&[1, 2]).unwrap());
        assert_eq!(t.data(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn double_transpose_is_identity() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let rows = rng.gen_range(1..6);
            let cols = rng.gen_range(1..6);
            let a = TensorBuffer::from_seed(rng.gen(), &[rows, cols]).unwrap();
            let back = a.transpose().transpose();
            assert_eq!(back.shape(), a.shape());
            assert_eq!(back.data(), a.data());
        }
    }

    #[test]
    fn transpose_reverses_all_axes() {
        let a = TensorBuffer::from_seed(3, &[2, 3, 4]).unwrap();
        let t = a.transpose();
        assert_eq!(t.shape(), &[4, 3, 2]);
        assert_eq!(t.get(&[3, 1, 0]).unwrap(), a.get(&[0, 1, 3]).unwrap());
    }

    #[test]
    fn normalize_maps_extremes_to_unit_interval() {
        let a = TensorBuffer::from_vec(&[4], vec![-2.0, 0.0, 3.0, 8.0]).unwrap();
        let n = a.normalize().unwrap();
        assert_eq!(n.get(&[0]).unwrap(), 0.0);
        assert_eq!(n.get(&[3]).unwrap(), 1.0);
        assert!((n.get(&[1]).unwrap() - 0.2).abs() < 1e-12);
        assert!(n.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn deserialization_validates_shape() {
        let original = matrix(2, 3);
        let json = serde_json::to_string(&original).unwrap();
        let decoded: TensorBuffer = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);

        let scalar = r#"{"data":{"v":1,"dim":[],"data":[1.0]}}"#;
        assert!(serde_json::from_str::<TensorBuffer>(scalar).is_err());
        let hollow = r#"{"data":{"v":1,"dim":[2,0],"data":[]}}"#;
        assert!(serde_json::from_str::<TensorBuffer>(hollow).is_err());
    }

    #[test]
    fn normalize_handles_spread_beyond_f64_max() {
        let a = TensorBuffer::from_vec(&[3], vec![-1e308, 0.0, 1e308]).unwrap();
        let n = a.normalize().unwrap();
        assert_eq!(n.data(), &[0.0, 0.5, 1.0]);

        let b = TensorBuffer::from_vec(&[2], vec![f64::MAX, -f64::MAX]).unwrap();
        assert_eq!(b.normalize().unwrap().data(), &[1.0, 0.0]);
    }

    #[test]
    fn normalize_constant_tensor_is_degenerate() {
        let a = TensorBuffer::from_vec(&[3], vec![2.5; 3]).unwrap();
        assert!(matches!(
            a.normalize(),
            Err(CoreError::DegenerateRange { .. })
        ));
        let nan = TensorBuffer::from_vec(&[2], vec![f64::NAN, 1.0]).unwrap();
        assert!(nan.normalize().is_err());
    }

    #[test]
    fn concatenate_sums_axis_dimension() {
        let a = matrix(2, 3);
        let b = matrix(1, 3);
        let rows = a.concatenate(&b, 0).unwrap();
        assert_eq!(rows.shape(), &[3, 3]);
        assert_eq!(rows.get(&[2, 1]).unwrap(), 1.0);

        let c = matrix(2, 2);
        let cols = a.concatenate(&c, 1).unwrap();
        assert_eq!(cols.shape(), &[2, 5]);
        assert_eq!(cols.get(&[1, 4]).unwrap(), 3.0);
    }

    #[test]
    fn concatenate_rejects_bad_axis_and_mismatch() {
        let a = matrix(2, 3);
        let b = matrix(2, 2);
        assert!(matches!(
            a.concatenate(&b, 0),
            Err(CoreError::ShapeMismatch { .. })
        ));
        assert!(matches!(a.concatenate(&a, 2), Err(CoreError::Config { .. })));
        let c = TensorBuffer::zeros(&[2, 3, 1]).unwrap();
        assert!(matches!(
            a.concatenate(&c, 0),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn from_seed_is_deterministic() {
        let a = TensorBuffer::from_seed(42, &[4, 4]).unwrap();
        let b = TensorBuffer::from_seed(42, &[4, 4]).unwrap();
        let c = TensorBuffer::from_seed(43, &[4, 4]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
