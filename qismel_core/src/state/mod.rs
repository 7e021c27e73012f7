pub mod state_tensor;

pub use state_tensor::{DataType, StateMetadata, StateTensor, StateTensorBuilder, SymbolicFeature};
