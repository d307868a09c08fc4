// Low-point classifier: feature extraction and training pipeline
pub mod classifier_pipeline;
pub mod feature_engineering;

pub use classifier_pipeline::{ClassifierPipeline, ClassifierSettings};
