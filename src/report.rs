use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::{DisplayOverrides, FieldSpec, Section};
use crate::error::ClarityError;
use crate::metadata::{
    FieldValue, FlatMetadata, Metadata, SAMPLE_TISSUE_FIELD, SAMPLE_TYPE_FIELD, escape_html,
    into_flat,
};

pub const DEFAULT_NAMESPACE: &str = "Clarity LIMS";
pub const DEFAULT_SCALE: &str = "YlGn";
pub const MODULE_NAME: &str = "Clarity LIMS";
pub const MODULE_ANCHOR: &str = "clarity";

const INTRO: &str = "<p>The Clarity plugin fetches data from a specified \
<a href=\"https://www.genologics.com/clarity-lims/\" target=\"_blank\">Basespace Clarity LIMS</a> instance.</p>";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "factor", rename_all = "snake_case")]
pub enum ValueTransform {
    MultiplyBy(f64),
}

impl ValueTransform {
    pub fn apply(&self, raw: &str) -> Result<f64, ClarityError> {
        let value: f64 = raw.trim().parse().map_err(|_| ClarityError::NonNumericValue {
            value: raw.to_string(),
        })?;
        match self {
            ValueTransform::MultiplyBy(factor) => Ok(value * factor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub key: String,
    pub title: String,
    pub description: String,
    pub namespace: String,
    pub scale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<ValueTransform>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ColumnDescriptor {
    /// Builds a column from schema overrides. The multiplier is copied into
    /// this column's own transform.
    pub fn from_field(field: &FieldSpec, category: &str, default_namespace: &str) -> Self {
        let DisplayOverrides {
            title,
            description,
            namespace,
            scale,
            multiply_by,
            extra,
        } = field.display.clone();
        Self {
            key: field.name.clone(),
            title: title.unwrap_or_else(|| field.name.clone()),
            description: description.unwrap_or_else(|| format!("{category} - {}", field.name)),
            namespace: namespace.unwrap_or_else(|| default_namespace.to_string()),
            scale: scale.unwrap_or_else(|| DEFAULT_SCALE.to_string()),
            transform: multiply_by.map(ValueTransform::MultiplyBy),
            extra,
        }
    }

    /// Host-facing value: transformed columns become numbers, everything else
    /// stays text. Values that cannot be transformed are passed through.
    pub fn render_value(&self, raw: &str) -> Value {
        let Some(transform) = self.transform else {
            return Value::String(raw.to_string());
        };
        match transform.apply(raw) {
            Ok(number) => serde_json::Number::from_f64(number)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string())),
            Err(err) => {
                warn!(column = %self.key, "{err}");
                Value::String(raw.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneralStats {
    pub headers: Vec<ColumnDescriptor>,
    pub data: FlatMetadata,
}

impl GeneralStats {
    pub fn header(&self, key: &str) -> Option<&ColumnDescriptor> {
        self.headers.iter().find(|column| column.key == key)
    }

    pub fn values(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        self.data
            .iter()
            .map(|(sample, fields)| {
                let fields = fields
                    .iter()
                    .map(|(field, raw)| {
                        let value = match self.header(field) {
                            Some(column) => column.render_value(raw),
                            None => Value::String(raw.clone()),
                        };
                        (field.clone(), value)
                    })
                    .collect();
                (sample.clone(), fields)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetailTab {
    pub name: String,
    pub anchor: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: FlatMetadata,
    pub html: String,
}

pub struct ReportAdapter;

impl ReportAdapter {
    /// One header block per project.
    pub fn header_info(metadata: &FlatMetadata) -> Vec<BTreeMap<String, String>> {
        metadata
            .values()
            .filter(|fields| !fields.is_empty())
            .cloned()
            .collect()
    }

    pub fn general_stats(section: &Section, metadata: FlatMetadata) -> GeneralStats {
        let mut headers: Vec<ColumnDescriptor> = Vec::new();
        for entry in &section.entries {
            for field in entry.fields() {
                if headers.iter().any(|column| column.key == field.name) {
                    continue;
                }
                headers.push(ColumnDescriptor::from_field(
                    field,
                    entry.category(),
                    DEFAULT_NAMESPACE,
                ));
            }
        }
        GeneralStats {
            headers,
            data: metadata,
        }
    }

    pub fn detail_tab(section: &Section, metadata: &Metadata) -> DetailTab {
        let mut columns: Vec<ColumnDescriptor> = Vec::new();
        for fields in metadata.values() {
            for field in fields.keys() {
                if columns.iter().any(|column| &column.key == field) {
                    continue;
                }
                columns.push(detail_column(section, field));
            }
        }

        let html = format!("{INTRO}\n{}", render_table(&columns, metadata));
        DetailTab {
            name: MODULE_NAME.to_string(),
            anchor: MODULE_ANCHOR.to_string(),
            columns,
            rows: into_flat(metadata),
            html,
        }
    }
}

/// Column for a detail-tab field. The sample link column takes its display
/// settings from whichever entry declared `Sample Tissue` or `Sample Type`.
fn detail_column(section: &Section, field: &str) -> ColumnDescriptor {
    let declared = section.entries.iter().find_map(|entry| {
        let found = entry.declares(field).or_else(|| {
            (field == SAMPLE_TYPE_FIELD)
                .then(|| entry.declares(SAMPLE_TISSUE_FIELD))
                .flatten()
        });
        found.map(|found| (entry.category(), found))
    });
    match declared {
        Some((category, found)) => {
            let spec = FieldSpec {
                name: field.to_string(),
                display: found.display.clone(),
            };
            ColumnDescriptor::from_field(&spec, category, category)
        }
        None => {
            let mut column = ColumnDescriptor::from_field(&FieldSpec::plain(field), field, field);
            column.description = field.to_string();
            column
        }
    }
}

/// Renders the detail table. Only sample links are emitted as markup; every
/// other value is escaped.
pub fn render_table(columns: &[ColumnDescriptor], rows: &Metadata) -> String {
    let mut html = String::from("<table class=\"table table-condensed clarity-table\">\n<thead><tr><th>Sample Name</th>");
    for column in columns {
        html.push_str(&format!(
            "<th title=\"{}\" data-namespace=\"{}\">{}</th>",
            escape_html(&column.description),
            escape_html(&column.namespace),
            escape_html(&column.title)
        ));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for (sample, fields) in rows {
        html.push_str(&format!("<tr><th>{}</th>", escape_html(sample)));
        for column in columns {
            let cell = match fields.get(&column.key) {
                Some(FieldValue::Link(link)) => link.html(),
                Some(value) => match column.render_value(&value.text()) {
                    Value::String(text) => escape_html(&text),
                    other => other.to_string(),
                },
                None => String::new(),
            };
            html.push_str(&format!("<td>{cell}</td>"));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    html
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportOutput {
    pub header_info: Vec<BTreeMap<String, String>>,
    pub general_stats: Option<GeneralStats>,
    pub detail_tab: Option<DetailTab>,
    pub lims_added: bool,
    pub resolved: usize,
    pub observed: usize,
    pub unresolved: Vec<String>,
    pub generated_at: String,
}

/// Host-side registries the output is merged into. Merging only appends.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostReport {
    pub report_header_info: Vec<BTreeMap<String, String>>,
    pub general_stats_headers: Vec<Vec<ColumnDescriptor>>,
    pub general_stats_data: Vec<FlatMetadata>,
    pub modules: Vec<DetailTab>,
    pub lims_added: bool,
}

impl HostReport {
    pub fn merge(&mut self, output: ReportOutput) {
        self.report_header_info.extend(output.header_info);
        if let Some(stats) = output.general_stats {
            self.general_stats_headers.push(stats.headers);
            self.general_stats_data.push(stats.data);
        }
        if let Some(tab) = output.detail_tab {
            self.modules.push(tab);
        }
        self.lims_added |= output.lims_added;
    }
}
