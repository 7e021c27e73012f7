pub mod buffer;
pub mod operations;

pub use buffer::{TensorBuffer, TensorStatistics};
