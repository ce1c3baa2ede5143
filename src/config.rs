use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::ClarityError;

pub const HEADER_INFO_KEY: &str = "report_header_info";
pub const GENERAL_STATS_KEY: &str = "general_stats";
pub const DETAIL_TAB_KEY: &str = "clarity_module";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub disable_clarity: Option<bool>,
    #[serde(default)]
    pub clarity: Option<Mapping>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayOverrides {
    pub title: Option<String>,
    pub description: Option<String>,
    pub namespace: Option<String>,
    pub scale: Option<String>,
    pub multiply_by: Option<f64>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub display: DisplayOverrides,
}

impl FieldSpec {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display: DisplayOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionEntry {
    Project {
        fields: Vec<FieldSpec>,
    },
    Sample {
        fields: Vec<FieldSpec>,
    },
    Artifact {
        process_type: String,
        outputs: Vec<FieldSpec>,
        inputs: Vec<FieldSpec>,
    },
}

impl SectionEntry {
    /// Label used in column descriptions and detail-tab namespaces.
    pub fn category(&self) -> &str {
        match self {
            SectionEntry::Project { .. } => "Project",
            SectionEntry::Sample { .. } => "Sample",
            SectionEntry::Artifact { process_type, .. } => process_type,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        let none: &[FieldSpec] = &[];
        let (first, second) = match self {
            SectionEntry::Project { fields } | SectionEntry::Sample { fields } => {
                (fields.as_slice(), none)
            }
            SectionEntry::Artifact {
                outputs, inputs, ..
            } => (outputs.as_slice(), inputs.as_slice()),
        };
        first.iter().chain(second.iter())
    }

    pub fn declares(&self, field: &str) -> Option<&FieldSpec> {
        self.fields().find(|candidate| candidate.name == field)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    pub entries: Vec<SectionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub header_info: Option<Section>,
    pub general_stats: Option<Section>,
    pub detail_tab: Option<Section>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub disabled: bool,
    pub schema: Option<Schema>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: &Path) -> Result<ResolvedConfig, ClarityError> {
        let content =
            fs::read_to_string(path).map_err(|_| ClarityError::ConfigRead(path.to_path_buf()))?;
        Self::resolve_str(&content)
    }

    pub fn resolve_str(content: &str) -> Result<ResolvedConfig, ClarityError> {
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content).map_err(|err| ClarityError::ConfigParse(err.to_string()))?
        };
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ClarityError> {
        let schema = config.clarity.as_ref().map(parse_schema).transpose()?;
        Ok(ResolvedConfig {
            disabled: config.disable_clarity.unwrap_or(false),
            schema,
        })
    }
}

fn parse_schema(raw: &Mapping) -> Result<Schema, ClarityError> {
    let section = |key: &str| {
        raw.get(key)
            .filter(|value| !value.is_null())
            .map(|value| parse_section(key, value))
            .transpose()
    };
    Ok(Schema {
        header_info: section(HEADER_INFO_KEY)?,
        general_stats: section(GENERAL_STATS_KEY)?,
        detail_tab: section(DETAIL_TAB_KEY)?,
    })
}

fn parse_section(section: &str, value: &Value) -> Result<Section, ClarityError> {
    let mapping = value.as_mapping().ok_or_else(|| {
        ClarityError::ConfigParse(format!("{section} must be a mapping of categories"))
    })?;

    let mut entries = Vec::new();
    for (key, value) in mapping {
        let category = key_string(key, section)?;
        let context = format!("{section}.{category}");
        let entry = match category.as_str() {
            "Project" => SectionEntry::Project {
                fields: parse_fields(&context, value)?,
            },
            "Sample" => SectionEntry::Sample {
                fields: parse_fields(&context, value)?,
            },
            _ => parse_artifact_entry(&context, category.clone(), value)?,
        };
        entries.push(entry);
    }
    Ok(Section { entries })
}

fn parse_artifact_entry(
    context: &str,
    process_type: String,
    value: &Value,
) -> Result<SectionEntry, ClarityError> {
    if value.is_null() {
        return Ok(SectionEntry::Artifact {
            process_type,
            outputs: Vec::new(),
            inputs: Vec::new(),
        });
    }
    let mapping = value.as_mapping().ok_or_else(|| {
        ClarityError::ConfigParse(format!("{context} must map `outputs`/`inputs` to fields"))
    })?;

    let mut outputs = Vec::new();
    let mut inputs = Vec::new();
    for (key, value) in mapping {
        match key_string(key, context)?.as_str() {
            "outputs" => outputs = parse_fields(&format!("{context}.outputs"), value)?,
            "inputs" => inputs = parse_fields(&format!("{context}.inputs"), value)?,
            other => {
                return Err(ClarityError::ConfigParse(format!(
                    "{context}: unknown key `{other}` (expected `outputs` or `inputs`)"
                )));
            }
        }
    }
    Ok(SectionEntry::Artifact {
        process_type,
        outputs,
        inputs,
    })
}

fn parse_fields(context: &str, value: &Value) -> Result<Vec<FieldSpec>, ClarityError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| key_string(item, context).map(FieldSpec::plain))
            .collect(),
        Value::Mapping(mapping) => mapping
            .iter()
            .map(|(key, overrides)| {
                let name = key_string(key, context)?;
                let display = parse_overrides(&format!("{context}.{name}"), overrides)?;
                Ok(FieldSpec { name, display })
            })
            .collect(),
        _ => Err(ClarityError::ConfigParse(format!(
            "{context} must be a list of field names or a mapping"
        ))),
    }
}

fn parse_overrides(context: &str, value: &Value) -> Result<DisplayOverrides, ClarityError> {
    let mut display = DisplayOverrides::default();
    let mapping = match value {
        Value::Null => return Ok(display),
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(ClarityError::ConfigParse(format!(
                "{context} overrides must be a mapping"
            )));
        }
    };

    for (key, value) in mapping {
        let key = key_string(key, context)?;
        match key.as_str() {
            "title" => display.title = Some(scalar_string(context, &key, value)?),
            "description" => display.description = Some(scalar_string(context, &key, value)?),
            "namespace" => display.namespace = Some(scalar_string(context, &key, value)?),
            "scale" => display.scale = Some(scalar_string(context, &key, value)?),
            "multiply_by" => display.multiply_by = Some(multiplier(context, value)?),
            _ => {
                let json = serde_json::to_value(value)
                    .map_err(|err| ClarityError::ConfigParse(format!("{context}.{key}: {err}")))?;
                display.extra.insert(key, json);
            }
        }
    }
    Ok(display)
}

fn multiplier(context: &str, value: &Value) -> Result<f64, ClarityError> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        ClarityError::ConfigParse(format!("{context}.multiply_by must be numeric"))
    })
}

fn scalar_string(context: &str, key: &str, value: &Value) -> Result<String, ClarityError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        _ => Err(ClarityError::ConfigParse(format!(
            "{context}.{key} must be a scalar"
        ))),
    }
}

fn key_string(value: &Value, context: &str) -> Result<String, ClarityError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        _ => Err(ClarityError::ConfigParse(format!(
            "{context}: field names must be strings"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub base_uri: String,
    pub username: String,
    pub password: String,
    pub version: String,
}

impl ConnectionConfig {
    /// Loads genologics-style credentials from `path`, or from the first
    /// default location that exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ClarityError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_connection_paths()
                .into_iter()
                .find(|candidate| candidate.is_file())
                .ok_or(ClarityError::MissingConnectionConfig)?,
        };
        let content = fs::read_to_string(&path).map_err(|_| ClarityError::ConfigRead(path.clone()))?;
        Self::parse(&content).map_err(|message| ClarityError::ConnectionConfig { path, message })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let mut section = String::new();
        let mut values = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
                section = name.trim().to_ascii_lowercase();
                continue;
            }
            if section != "genologics" {
                continue;
            }
            if let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) {
                values.insert(key.trim().to_ascii_uppercase(), value.trim().to_string());
            }
        }

        let mut take = |key: &str| {
            values
                .remove(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| format!("missing {key} in [genologics] section"))
        };
        Ok(Self {
            base_uri: take("BASEURI")?.trim_end_matches('/').to_string(),
            username: take("USERNAME")?,
            password: take("PASSWORD")?,
            version: take("VERSION").unwrap_or_else(|_| "v2".to_string()),
        })
    }
}

pub fn default_connection_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dirs) = BaseDirs::new() {
        let home = dirs.home_dir();
        paths.push(home.join(".genologicsrc"));
        paths.push(home.join(".config").join("genologics.conf"));
        paths.push(home.join(".genologics.conf"));
    }
    paths.push(PathBuf::from("genologics.conf"));
    paths
}
