// Machine learning domain
pub mod feature_registry;
pub mod results;

pub use feature_registry::{FEATURE_NAMES, FeatureRow, features_to_vector};
pub use results::{FeatureImportance, PredictionResult, TrainingResult, ValidationResult};
