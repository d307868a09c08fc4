// Market data processing
pub mod market_data;

// Low-point classifier
pub mod ml;

// Parameter search
pub mod optimization;

// Reference strategies
pub mod strategies;
