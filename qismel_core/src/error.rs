//! Error types for tensor access and value learning
//!
//! Every fallible core operation returns [`CoreResult`]. Tensor errors are
//! local to the value that raised them and never reach the value table; a
//! failed engine update leaves the table exactly as it was.

use std::fmt;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Error taxonomy shared by tensors, the value table and the engine
#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Invalid configuration or construction parameter (empty action set, bad shape)
    Config { parameter: String, reason: String },

    /// Binary tensor operation on incompatible shapes
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
        context: String,
    },

    /// Coordinate access with wrong arity or an out-of-range component
    Index { coords: Vec<usize>, shape: Vec<usize> },

    /// Normalization of a tensor whose value range is empty or not finite
    DegenerateRange { min: f64, max: f64 },

    /// A signal provider failed or produced an unusable value
    Signal { signal: String, reason: String },

    /// The environment could not produce a state or apply an action
    Perception { reason: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Config { parameter, reason } => {
                write!(f, "Invalid configuration for '{}': {}", parameter, reason)
            }
            CoreError::ShapeMismatch {
                expected,
                got,
                context,
            } => {
                write!(
                    f,
                    "Shape mismatch in {}: expected {:?}, got {:?}",
                    context, expected, got
                )
            }
            CoreError::Index { coords, shape } => {
                write!(
                    f,
                    "Index {:?} is out of bounds for tensor of shape {:?}",
                    coords, shape
                )
            }
            CoreError::DegenerateRange { min, max } => {
                write!(
                    f,
                    "Cannot normalize: value range [{}, {}] is degenerate",
                    min, max
                )
            }
            CoreError::Signal { signal, reason } => {
                write!(f, "Signal '{}' failed: {}", signal, reason)
            }
            CoreError::Perception { reason } => write!(f, "Perception failed: {}", reason),
        }
    }
}

impl std::error::Error for CoreError {}

impl CoreError {
    /// Create a configuration error
    pub fn config(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Config {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize], context: impl Into<String>) -> Self {
        CoreError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
            context: context.into(),
        }
    }

    /// Create an index error
    pub fn index(coords: &[usize], shape: &[usize]) -> Self {
        CoreError::Index {
            coords: coords.to_vec(),
            shape: shape.to_vec(),
        }
    }

    /// Create a degenerate range error
    pub fn degenerate_range(min: f64, max: f64) -> Self {
        CoreError::DegenerateRange { min, max }
    }

    /// Create a signal error
    pub fn signal(signal: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Signal {
            signal: signal.into(),
            reason: reason.into(),
        }
    }

    /// Create a perception error
    pub fn perception(reason: impl Into<String>) -> Self {
        CoreError::Perception {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_display() {
        let err = CoreError::shape_mismatch(&[2, 3], &[3, 2], "add");
        let msg = err.to_string();
        assert!(msg.contains("[2, 3]"));
        assert!(msg.contains("[3, 2]"));
        assert!(msg.contains("add"));
    }

    #[test]
    fn test_index_display() {
        let err = CoreError::index(&[4, 0], &[2, 2]);
        let msg = err.to_string();
        assert!(msg.contains("[4, 0]"));
        assert!(msg.contains("[2, 2]"));
    }

    #[test]
    fn test_signal_display_names_provider() {
        let err = CoreError::signal("intrinsic", "model offline");
        let msg = err.to_string();
        assert!(msg.contains("intrinsic"));
        assert!(msg.contains("model offline"));
    }

    #[test]
    fn test_error_equality() {
        let a = CoreError::config("action_set", "must not be empty");
        let b = CoreError::config("action_set", "must not be empty");
        let c = CoreError::config("shape", "must not be empty");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CoreError>();
    }
}
