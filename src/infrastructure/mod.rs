pub mod config_persistence;
pub mod csv_data;
pub mod mock;

pub use config_persistence::{ConfigDocumentEditor, PersistReport};
pub use csv_data::CsvDataModule;
pub use mock::SyntheticDataModule;
