#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use clarity_report::domain::{Artifact, Project, Sample, Well};
use clarity_report::error::ClarityError;
use clarity_report::lims::LimsClient;

#[derive(Default)]
pub struct MockLims {
    pub samples: Vec<Sample>,
    pub artifacts: Vec<(String, Artifact)>,
    pub containers: BTreeMap<String, BTreeMap<Well, Artifact>>,
    pub processes: BTreeMap<String, Vec<Artifact>>,
    pub offline: bool,
    pub status_error: Option<u16>,
    pub fail_artifacts_for: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl MockLims {
    pub fn with_samples(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), ClarityError> {
        self.calls.lock().unwrap().push(call);
        if self.offline {
            return Err(ClarityError::LimsHttp("connection refused".to_string()));
        }
        if let Some(status) = self.status_error {
            return Err(ClarityError::LimsStatus {
                status,
                message: "Unauthorized".to_string(),
            });
        }
        Ok(())
    }
}

impl LimsClient for MockLims {
    fn base_uri(&self) -> &str {
        "https://lims.example.org"
    }

    fn samples_by_name(&self, name: &str) -> Result<Vec<Sample>, ClarityError> {
        self.record(format!("samples_by_name:{name}"))?;
        Ok(self
            .samples
            .iter()
            .filter(|sample| sample.lims_name == name)
            .cloned()
            .collect())
    }

    fn sample_by_id(&self, id: &str) -> Result<Option<Sample>, ClarityError> {
        self.record(format!("sample_by_id:{id}"))?;
        Ok(self.samples.iter().find(|sample| sample.id == id).cloned())
    }

    fn project_samples(&self, project_name: &str) -> Result<Vec<Sample>, ClarityError> {
        self.record(format!("project_samples:{project_name}"))?;
        Ok(self
            .samples
            .iter()
            .filter(|sample| {
                sample
                    .project
                    .as_ref()
                    .is_some_and(|project| project.name == project_name)
            })
            .cloned()
            .collect())
    }

    fn artifacts_for_sample(
        &self,
        sample_name: &str,
        process_type: &str,
    ) -> Result<Vec<Artifact>, ClarityError> {
        self.record(format!("artifacts_for_sample:{sample_name}:{process_type}"))?;
        if self.fail_artifacts_for.as_deref() == Some(sample_name) {
            return Err(ClarityError::LimsHttp("timed out".to_string()));
        }
        let sample_ids: Vec<&str> = self
            .samples
            .iter()
            .filter(|sample| sample.lims_name == sample_name)
            .map(|sample| sample.id.as_str())
            .collect();
        Ok(self
            .artifacts
            .iter()
            .filter(|(kind, artifact)| {
                kind == process_type
                    && artifact
                        .sample_ids
                        .iter()
                        .any(|id| sample_ids.contains(&id.as_str()))
            })
            .map(|(_, artifact)| artifact.clone())
            .collect())
    }

    fn container_placements(
        &self,
        container_id: &str,
    ) -> Result<BTreeMap<Well, Artifact>, ClarityError> {
        self.record(format!("container_placements:{container_id}"))?;
        Ok(self
            .containers
            .get(container_id)
            .cloned()
            .unwrap_or_default())
    }

    fn process_inputs(&self, process_id: &str) -> Result<Vec<Artifact>, ClarityError> {
        self.record(format!("process_inputs:{process_id}"))?;
        Ok(self.processes.get(process_id).cloned().unwrap_or_default())
    }
}

pub fn project(name: &str) -> Project {
    Project {
        id: format!("{name}-ID"),
        name: name.to_string(),
        udf: BTreeMap::new(),
    }
}

pub fn artifact(id: &str, process: &str, sample_ids: &[&str], udf: &[(&str, &str)]) -> Artifact {
    Artifact {
        id: id.to_string(),
        name: id.to_string(),
        parent_process: Some(process.to_string()),
        sample_ids: sample_ids.iter().map(|id| id.to_string()).collect(),
        udf: udf
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    }
}
