use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::config::{FieldSpec, Section, SectionEntry};
use crate::domain::{Sample, Udfs};
use crate::error::ClarityError;
use crate::lims::LimsClient;

pub const SAMPLE_TYPE_FIELD: &str = "Sample Type";
pub const SAMPLE_TISSUE_FIELD: &str = "Sample Tissue";

/// Link from a report cell back to the sample's page in the LIMS. `href` is
/// ready to embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleLink {
    pub href: String,
    pub text: String,
}

impl SampleLink {
    pub fn new(base_uri: &str, sample_id: &str, text: impl Into<String>) -> Self {
        Self {
            href: format!(
                "{}/clarity/search?scope=Sample&query={}",
                base_uri.trim_end_matches('/'),
                escape_html(sample_id)
            ),
            text: text.into(),
        }
    }

    pub fn html(&self) -> String {
        format!(
            "<a href=\"{}\" target=\"_blank\">{}</a>",
            self.href,
            escape_html(&self.text)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Values(BTreeSet<String>),
    Text(String),
    Link(SampleLink),
}

impl FieldValue {
    pub fn text(&self) -> String {
        match self {
            FieldValue::Values(values) => values.iter().cloned().collect::<Vec<_>>().join(", "),
            FieldValue::Text(text) => text.clone(),
            FieldValue::Link(link) => link.html(),
        }
    }

    fn insert(&mut self, value: String) {
        match self {
            FieldValue::Values(values) => {
                values.insert(value);
            }
            FieldValue::Text(text) => {
                let mut values: BTreeSet<String> =
                    text.split(", ").map(str::to_string).collect();
                values.insert(value);
                *self = FieldValue::Values(values);
            }
            FieldValue::Link(link) => {
                debug!(field_value = %value, "keeping sample link {}", link.text);
            }
        }
    }
}

/// Entity name (sample or project) to field name to collected values.
pub type Metadata = BTreeMap<String, BTreeMap<String, FieldValue>>;
pub type FlatMetadata = BTreeMap<String, BTreeMap<String, String>>;

/// Collapses every value set into its comma-joined text form. Links are kept.
pub fn flatten(metadata: Metadata) -> Metadata {
    metadata
        .into_iter()
        .map(|(entity, fields)| {
            let fields = fields
                .into_iter()
                .map(|(field, value)| match value {
                    FieldValue::Link(link) => (field, FieldValue::Link(link)),
                    other => {
                        let text = other.text();
                        (field, FieldValue::Text(text))
                    }
                })
                .collect();
            (entity, fields)
        })
        .collect()
}

pub fn into_flat(metadata: &Metadata) -> FlatMetadata {
    metadata
        .iter()
        .map(|(entity, fields)| {
            let fields = fields
                .iter()
                .map(|(field, value)| (field.clone(), value.text()))
                .collect();
            (entity.clone(), fields)
        })
        .collect()
}

fn collect(
    metadata: &mut Metadata,
    entity: &str,
    fields: &[FieldSpec],
    udf: &Udfs,
) {
    for field in fields {
        if let Some(value) = udf.get(&field.name) {
            add_value(metadata, entity, &field.name, value.clone());
        }
    }
}

fn add_value(metadata: &mut Metadata, entity: &str, field: &str, value: String) {
    metadata
        .entry(entity.to_string())
        .or_default()
        .entry(field.to_string())
        .or_insert_with(|| FieldValue::Values(BTreeSet::new()))
        .insert(value);
}

pub struct MetadataAggregator<'a, L: LimsClient> {
    lims: &'a L,
    samples: &'a [Sample],
    lims_added: bool,
}

impl<'a, L: LimsClient> MetadataAggregator<'a, L> {
    pub fn new(lims: &'a L, samples: &'a [Sample]) -> Self {
        Self {
            lims,
            samples,
            lims_added: false,
        }
    }

    /// True once a sample-level pass has produced LIMS links.
    pub fn lims_added(&self) -> bool {
        self.lims_added
    }

    /// Adds the section's values to `metadata`. On a LIMS error the values
    /// gathered so far stay in `metadata`.
    pub fn aggregate(
        &mut self,
        section: &Section,
        metadata: &mut Metadata,
    ) -> Result<(), ClarityError> {
        for entry in &section.entries {
            match entry {
                SectionEntry::Project { fields } => self.project_metadata(fields, metadata),
                SectionEntry::Sample { fields } => self.sample_metadata(fields, metadata),
                SectionEntry::Artifact {
                    process_type,
                    outputs,
                    inputs,
                } => self.artifact_metadata(process_type, outputs, inputs, metadata)?,
            }
        }
        Ok(())
    }

    fn project_metadata(&self, fields: &[FieldSpec], metadata: &mut Metadata) {
        for sample in self.samples {
            let Some(project) = &sample.project else {
                debug!(sample = %sample.name, "sample has no project");
                continue;
            };
            metadata.entry(project.name.clone()).or_default();
            collect(metadata, &project.name, fields, &project.udf);
        }
    }

    fn sample_metadata(&mut self, fields: &[FieldSpec], metadata: &mut Metadata) {
        for sample in self.samples {
            metadata.entry(sample.name.clone()).or_default();
            collect(metadata, &sample.name, fields, &sample.udf);

            let Some(record) = metadata.get_mut(&sample.name) else {
                continue;
            };
            let sample_type = record
                .remove(SAMPLE_TISSUE_FIELD)
                .or_else(|| record.remove(SAMPLE_TYPE_FIELD));
            if let Some(sample_type) = sample_type {
                let link = SampleLink::new(self.lims.base_uri(), &sample.id, sample_type.text());
                record.insert(SAMPLE_TYPE_FIELD.to_string(), FieldValue::Link(link));
                self.lims_added = true;
            }
        }
    }

    fn artifact_metadata(
        &self,
        process_type: &str,
        outputs: &[FieldSpec],
        inputs: &[FieldSpec],
        metadata: &mut Metadata,
    ) -> Result<(), ClarityError> {
        for sample in self.samples {
            metadata.entry(sample.name.clone()).or_default();
            let artifacts = self
                .lims
                .artifacts_for_sample(&sample.lims_name, process_type)?;
            for artifact in &artifacts {
                collect(metadata, &sample.name, outputs, &artifact.udf);
            }
            if inputs.is_empty() {
                continue;
            }

            let processes: BTreeSet<&str> = artifacts
                .iter()
                .filter_map(|artifact| artifact.parent_process.as_deref())
                .collect();
            for process in processes {
                for input in self.lims.process_inputs(process)? {
                    if input.contains_sample(&sample.id) {
                        collect(metadata, &sample.name, inputs, &input.udf);
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
