// Market data domain
pub mod bar;
pub mod detection;

pub use bar::Bar;
pub use detection::DetectionEvent;
