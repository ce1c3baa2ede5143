use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ClarityError;

pub type Udfs = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub udf: Udfs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub id: String,
    /// Name used by the report. Starts out as the LIMS name.
    pub name: String,
    pub lims_name: String,
    pub project: Option<Project>,
    pub udf: Udfs,
}

impl Sample {
    pub fn new(id: impl Into<String>, lims_name: impl Into<String>) -> Self {
        let lims_name = lims_name.into();
        Self {
            id: id.into(),
            name: lims_name.clone(),
            lims_name,
            project: None,
            udf: Udfs::new(),
        }
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_udf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.udf.insert(key.into(), value.into());
        self
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    pub parent_process: Option<String>,
    pub sample_ids: Vec<String>,
    pub udf: Udfs,
}

impl Artifact {
    pub fn contains_sample(&self, sample_id: &str) -> bool {
        self.sample_ids.iter().any(|id| id == sample_id)
    }
}

/// Container placement such as `A:1`. Sample sheets write it as `A_1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Well(String);

impl Well {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Well {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Well {
    type Err = ClarityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().replace('_', ":");
        if normalized.is_empty() || normalized.chars().any(char::is_whitespace) {
            return Err(ClarityError::InvalidWell(value.to_string()));
        }
        Ok(Self(normalized))
    }
}
