use crate::domain::optimization::parameter_routes::{ParameterRole, route_for};
use crate::domain::optimization::{ParameterSet, ParameterValue};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toml_edit::{DocumentMut, Item, TableLike, Value};
use tracing::{info, warn};

/// What a persist call did with each parameter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistReport {
    pub updated: Vec<String>,
    pub skipped_fixed: Vec<String>,
    pub skipped_unknown: Vec<String>,
}

/// Comment-preserving editor for the TOML configuration file.
///
/// Only tunable keys from the routing table are written. Existing values keep
/// their surrounding whitespace and trailing comments; missing keys and
/// sections are inserted.
pub struct ConfigDocumentEditor {
    file_path: PathBuf,
    document: DocumentMut,
}

impl ConfigDocumentEditor {
    /// Opens `path`; a missing file starts from an empty document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let file_path = path.into();
        let document = if file_path.exists() {
            let content = fs::read_to_string(&file_path)
                .with_context(|| format!("Failed to read config file {:?}", file_path))?;
            content
                .parse::<DocumentMut>()
                .with_context(|| format!("Failed to parse config file {:?}", file_path))?
        } else {
            info!("ConfigPersistence: {:?} does not exist, starting empty", file_path);
            DocumentMut::new()
        };
        Ok(Self {
            file_path,
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn document(&self) -> &DocumentMut {
        &self.document
    }

    /// Writes the routed tunable parameters into the in-memory document.
    pub fn apply(&mut self, params: &ParameterSet) -> Result<PersistReport> {
        let mut report = PersistReport::default();
        for (name, value) in params.iter() {
            let Some(route) = route_for(name) else {
                warn!("ConfigPersistence: Skipping unknown parameter {}", name);
                report.skipped_unknown.push(name.to_string());
                continue;
            };
            if route.role == ParameterRole::Fixed {
                report.skipped_fixed.push(name.to_string());
                continue;
            }

            let table = section_mut(&mut self.document, route.section)?;
            set_preserving_decor(table, name, to_toml_value(value));
            report.updated.push(name.to_string());
        }
        Ok(report)
    }

    /// Atomic write: write to temp file then rename.
    pub fn save(&self) -> Result<()> {
        let temp_path = self.file_path.with_extension("toml.tmp");
        fs::write(&temp_path, self.document.to_string())
            .with_context(|| format!("Failed to write temp config file {:?}", temp_path))?;
        if let Err(e) = fs::rename(&temp_path, &self.file_path) {
            fs::remove_file(&temp_path).ok();
            return Err(e).with_context(|| format!("Failed to replace config file {:?}", self.file_path));
        }
        info!("ConfigPersistence: Saved {:?}", self.file_path);
        Ok(())
    }

    /// Open, apply and save in one step.
    pub fn persist(path: impl Into<PathBuf>, params: &ParameterSet) -> Result<PersistReport> {
        let mut editor = Self::open(path)?;
        let report = editor.apply(params)?;
        editor.save()?;
        info!(
            "ConfigPersistence: Updated {:?}, kept fixed {:?}",
            report.updated, report.skipped_fixed
        );
        Ok(report)
    }
}

fn section_mut<'a>(document: &'a mut DocumentMut, path: &[&str]) -> Result<&'a mut dyn TableLike> {
    let mut table: &mut dyn TableLike = document.as_table_mut();
    for segment in path {
        table = table
            .entry(segment)
            .or_insert(toml_edit::table())
            .as_table_like_mut()
            .ok_or_else(|| anyhow!("Config key {} is not a table", segment))?;
    }
    Ok(table)
}

fn set_preserving_decor(table: &mut dyn TableLike, key: &str, value: Value) {
    match table.get_mut(key).and_then(Item::as_value_mut) {
        Some(existing) => {
            let decor = existing.decor().clone();
            *existing = value;
            *existing.decor_mut() = decor;
        }
        None => {
            table.insert(key, Item::Value(value));
        }
    }
}

fn to_toml_value(value: &ParameterValue) -> Value {
    match value {
        ParameterValue::Int(v) => Value::from(*v),
        ParameterValue::Float(v) => Value::from(*v),
        ParameterValue::Categorical(s) => Value::from(s.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_test_dir() -> PathBuf {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!(
            "lowpoint_test_{}_{}_{}_config",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            unique_id
        ));
        fs::create_dir_all(&temp_dir).expect("Failed to create test temp dir");
        temp_dir
    }

    const CONFIG: &str = r#"# Low point settings
[strategy]
rise_threshold = 0.04 # success condition
max_days = 20

[strategy.confidence_weights]
# Oversold RSI level
rsi_oversold_threshold = 30   # tuned
final_threshold = 0.5
"#;

    #[test]
    fn test_updates_keep_comments_and_fixed_keys() {
        let dir = create_test_dir();
        let path = dir.join("config.toml");
        fs::write(&path, CONFIG).unwrap();

        let params = ParameterSet::new()
            .with("rsi_oversold_threshold", 27)
            .with("final_threshold", 0.45)
            .with("rise_threshold", 0.09)
            .with("max_days", 5)
            .with("mystery", 1.0);
        let report = ConfigDocumentEditor::persist(&path, &params).unwrap();

        assert_eq!(report.updated, vec!["final_threshold", "rsi_oversold_threshold"]);
        assert_eq!(report.skipped_fixed, vec!["max_days", "rise_threshold"]);
        assert_eq!(report.skipped_unknown, vec!["mystery"]);

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Low point settings\n"));
        assert!(written.contains("rise_threshold = 0.04 # success condition"));
        assert!(written.contains("max_days = 20"));
        assert!(written.contains("# Oversold RSI level\nrsi_oversold_threshold = 27   # tuned"));
        assert!(written.contains("final_threshold = 0.45"));
        assert!(!path.with_extension("toml.tmp").exists());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_keys_and_sections_are_inserted() {
        let dir = create_test_dir();
        let path = dir.join("config.toml");
        fs::write(&path, "[data]\nindex_code = \"SHSE.000905\"\n").unwrap();

        let params = ParameterSet::new().with("trend_strength_weight", 0.14);
        let report = ConfigDocumentEditor::persist(&path, &params).unwrap();
        assert_eq!(report.updated, vec!["trend_strength_weight"]);

        let reloaded: toml::Table = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            reloaded["strategy"]["confidence_weights"]["trend_strength_weight"].as_float(),
            Some(0.14)
        );
        assert_eq!(reloaded["data"]["index_code"].as_str(), Some("SHSE.000905"));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_non_table_section_is_an_error_and_file_untouched() {
        let dir = create_test_dir();
        let path = dir.join("config.toml");
        fs::write(&path, "strategy = 3\n").unwrap();

        let params = ParameterSet::new().with("final_threshold", 0.6);
        assert!(ConfigDocumentEditor::persist(&path, &params).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "strategy = 3\n");

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_unparseable_file_is_reported() {
        let dir = create_test_dir();
        let path = dir.join("config.toml");
        fs::write(&path, "[strategy\n").unwrap();
        let err = ConfigDocumentEditor::open(&path).err().unwrap();
        assert!(format!("{:#}", err).contains("config.toml"));
        fs::remove_dir_all(dir).ok();
    }
}
