use thiserror::Error;

/// Errors raised by the optimizers before or during a search
#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("Invalid parameter space: {reason}")]
    InvalidParameterSpace { reason: String },

    #[error("Invalid optimizer settings: {reason}")]
    InvalidSettings { reason: String },

    #[error("Dataset is empty or too short: {reason}")]
    EmptyDataset { reason: String },

    #[error("Bars are not in chronological order: {reason}")]
    UnorderedDataset { reason: String },

    #[error("Grid has {count} combinations, limit is {limit}")]
    TooManyCombinations { count: usize, limit: usize },

    #[error("Optimization failed: no finite candidate in {stage} stage")]
    NoValidCandidate { stage: String },

    #[error("Worker pool error: {reason}")]
    WorkerPool { reason: String },
}

/// Errors raised when a parameter set does not fit a strategy
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Parameter {name} has the wrong type: expected {expected}")]
    WrongType { name: String, expected: String },

    #[error("Parameter {name} out of range: {value}")]
    OutOfRange { name: String, value: f64 },
}

/// Errors raised by the classifier pipeline
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("No trained model available")]
    NotTrained,

    #[error("Insufficient samples: {available} available, {required} required")]
    InsufficientSamples { available: usize, required: usize },

    #[error("Label set contains a single class ({class})")]
    SingleClass { class: &'static str },

    #[error("No feature row available: {reason}")]
    NoFeatures { reason: String },

    #[error("Model failure: {reason}")]
    Model { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combination_error_formatting() {
        let error = OptimizationError::TooManyCombinations {
            count: 20000,
            limit: 10000,
        };

        let msg = error.to_string();
        assert!(msg.contains("20000"));
        assert!(msg.contains("10000"));
    }

    #[test]
    fn test_model_error_formatting() {
        let error = ModelError::InsufficientSamples {
            available: 3,
            required: 30,
        };

        let msg = error.to_string();
        assert!(msg.contains("3 available"));
        assert!(msg.contains("30 required"));
    }
}
