// Reference low-point detection strategy
pub mod confidence_low_point;

pub use confidence_low_point::{ConfidenceLowPointStrategy, LowPointParams};
