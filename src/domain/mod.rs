// Market data domain
pub mod market;

// Optimization domain
pub mod optimization;

// Classifier domain
pub mod ml;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
