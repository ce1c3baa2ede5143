use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use csv::ReaderBuilder;
use serde_json::Value;

use crate::error::ClarityError;

/// Collects sample names already present in the report's results.
#[derive(Debug, Clone, Default)]
pub struct ObservedNames {
    names: BTreeSet<String>,
}

impl ObservedNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(
            names
                .into_iter()
                .map(Into::into)
                .filter(|name: &String| !name.trim().is_empty()),
        );
    }

    /// Tab-separated general-stats table; the first column holds sample names.
    pub fn read_general_stats(&mut self, path: &Path) -> Result<(), ClarityError> {
        let csv_err = |message: String| ClarityError::Csv {
            path: path.to_path_buf(),
            message,
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|err| csv_err(err.to_string()))?;
        for record in reader.records() {
            let record = record.map_err(|err| csv_err(err.to_string()))?;
            if let Some(name) = record.get(0) {
                self.extend([name]);
            }
        }
        Ok(())
    }

    /// JSON object keyed by data source, each holding an object keyed by sample.
    pub fn read_raw_data(&mut self, path: &Path) -> Result<(), ClarityError> {
        let content = fs::read_to_string(path)
            .map_err(|err| ClarityError::Filesystem(format!("read {}: {err}", path.display())))?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|err| ClarityError::ConfigParse(format!("{}: {err}", path.display())))?;
        let Some(sources) = value.as_object() else {
            return Ok(());
        };
        for source in sources.values() {
            if let Some(samples) = source.as_object() {
                self.extend(samples.keys().cloned());
            }
        }
        Ok(())
    }

    pub fn into_names(self) -> BTreeSet<String> {
        self.names
    }
}
