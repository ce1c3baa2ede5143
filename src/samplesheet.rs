use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};

use crate::domain::Well;
use crate::error::ClarityError;

const DATA_MARKER: &str = "[Data]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSheetRow {
    pub sample_name: String,
    pub sample_id: String,
    pub container: String,
    pub well: Option<Well>,
}

#[derive(Debug, Clone, Default)]
pub struct SampleSheet {
    rows: Vec<SampleSheetRow>,
}

impl SampleSheet {
    pub fn from_path(path: &Path) -> Result<Self, ClarityError> {
        let text = fs::read_to_string(path).map_err(|err| {
            ClarityError::SampleSheet(format!("read {}: {err}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ClarityError> {
        let mut lines = text.lines();
        if !lines
            .by_ref()
            .any(|line| line.trim().starts_with(DATA_MARKER))
        {
            return Err(ClarityError::SampleSheet(format!(
                "no {DATA_MARKER} section"
            )));
        }
        let data = lines
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_reader(data.as_bytes());
        let headers = reader
            .headers()
            .map_err(|err| ClarityError::SampleSheet(err.to_string()))?
            .clone();

        let name_col = column(&headers, &["SampleName"])?;
        let id_col = column(&headers, &["SampleID", "Sample_ID"])?;
        let plate_col = column(&headers, &["SamplePlate"])?;
        let well_col = column(&headers, &["SampleWell"])?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| ClarityError::SampleSheet(err.to_string()))?;
            let field = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();
            rows.push(SampleSheetRow {
                sample_name: field(name_col),
                sample_id: field(id_col),
                container: field(plate_col),
                well: field(well_col).parse().ok(),
            });
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[SampleSheetRow] {
        &self.rows
    }
}

fn column(headers: &StringRecord, candidates: &[&str]) -> Result<usize, ClarityError> {
    candidates
        .iter()
        .find_map(|name| headers.iter().position(|header| header.trim() == *name))
        .ok_or_else(|| {
            ClarityError::SampleSheet(format!("missing column {}", candidates.join(" or ")))
        })
}

/// Reads a CSV that maps report names to the raw names the sequencer assigned.
/// The report name comes from `description` when present, else the first
/// column; the raw name is always the first column. Only `names` are kept.
pub fn read_raw_sample_names(
    path: &Path,
    names: &BTreeSet<String>,
) -> Result<BTreeMap<String, String>, ClarityError> {
    let csv_err = |message: String| ClarityError::Csv {
        path: path.to_path_buf(),
        message,
    };
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| csv_err(err.to_string()))?;
    let headers = reader
        .headers()
        .map_err(|err| csv_err(err.to_string()))?
        .clone();
    if headers.is_empty() {
        return Err(csv_err("no header row".to_string()));
    }
    let description_col = headers.iter().position(|header| header == "description");

    let mut raw_names = BTreeMap::new();
    for record in reader.records() {
        let record = record.map_err(|err| csv_err(err.to_string()))?;
        let raw = record.get(0).unwrap_or("");
        let correct = description_col
            .and_then(|idx| record.get(idx))
            .unwrap_or(raw);
        if names.contains(correct) {
            raw_names.insert(correct.to_string(), raw.to_string());
        }
    }
    Ok(raw_names)
}
