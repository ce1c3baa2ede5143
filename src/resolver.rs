use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Sample, Well};
use crate::error::ClarityError;
use crate::lims::LimsClient;
use crate::names::{edit_names, normalize_sample_name};
use crate::samplesheet::{SampleSheet, read_raw_sample_names};

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub project: Option<String>,
    pub skip_name_editing: bool,
    pub samplesheet: Option<Utf8PathBuf>,
    pub raw_names_csv: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    #[serde(skip)]
    pub samples: Vec<Sample>,
    pub resolved: usize,
    pub observed: usize,
    pub unresolved: Vec<String>,
}

pub struct NameResolver<'a, L: LimsClient> {
    lims: &'a L,
    options: &'a ResolveOptions,
}

impl<'a, L: LimsClient> NameResolver<'a, L> {
    pub fn new(lims: &'a L, options: &'a ResolveOptions) -> Self {
        Self { lims, options }
    }

    pub fn resolve(&self, observed: &BTreeSet<String>) -> Result<Resolution, ClarityError> {
        if let Some(project) = &self.options.project {
            let samples = self.lims.project_samples(project)?;
            info!("Found {} samples for project {} in LIMS.", samples.len(), project);
            return Ok(Resolution {
                resolved: samples.len(),
                observed: samples.len(),
                samples,
                unresolved: Vec::new(),
            });
        }

        let names = if self.options.skip_name_editing {
            observed.clone()
        } else {
            edit_names(observed)
        };
        debug!(
            "Looking into Clarity for samples {}",
            names.iter().cloned().collect::<Vec<_>>().join(", ")
        );

        let mut resolved = BTreeMap::new();
        if let Some(path) = &self.options.samplesheet {
            self.search_by_samplesheet(path, &names, &mut resolved)?;
        }

        let pending: Vec<&String> = names
            .iter()
            .filter(|name| !resolved.contains_key(*name))
            .collect();
        let mut unresolved = Vec::new();
        for name in pending {
            match self.lookup_by_name(name)? {
                Some(sample) => {
                    resolved.insert(name.clone(), sample);
                }
                None => unresolved.push(name.clone()),
            }
        }

        let samples: Vec<Sample> = resolved
            .into_iter()
            .map(|(name, mut sample)| {
                sample.rename(name);
                sample
            })
            .collect();
        info!(
            "Found {} out of {} samples in LIMS.",
            samples.len(),
            names.len()
        );
        Ok(Resolution {
            resolved: samples.len(),
            observed: names.len(),
            samples,
            unresolved,
        })
    }

    fn lookup_by_name(&self, name: &str) -> Result<Option<Sample>, ClarityError> {
        let mut matches = self.lims.samples_by_name(name)?;
        match matches.len() {
            0 => {
                warn!("Could not find a sample matching {name}, skipping.");
                Ok(None)
            }
            1 => Ok(matches.pop()),
            count => {
                warn!("Found {count} samples matching {name}, skipping.");
                Ok(None)
            }
        }
    }

    /// Matches sample-sheet rows to local names, first by LIMS sample id and
    /// then by container placement for rows whose id is unknown. An unreadable
    /// sheet or names CSV is skipped; only LIMS errors are returned.
    fn search_by_samplesheet(
        &self,
        path: &Utf8Path,
        names: &BTreeSet<String>,
        resolved: &mut BTreeMap<String, Sample>,
    ) -> Result<(), ClarityError> {
        let sheet = match SampleSheet::from_path(path.as_std_path()) {
            Ok(sheet) => sheet,
            Err(err) => {
                warn!("Ignoring sample sheet {path}: {err}");
                return Ok(());
            }
        };

        let mut raw_names: BTreeMap<String, String> = names
            .iter()
            .map(|name| (name.clone(), name.clone()))
            .collect();
        if let Some(csv_path) = self.options.raw_names_csv.as_ref().filter(|p| p.is_file()) {
            match read_raw_sample_names(csv_path.as_std_path(), names) {
                Ok(mapping) => raw_names.extend(mapping),
                Err(err) => warn!("Ignoring raw sample names from {csv_path}: {err}"),
            }
        }
        let by_sheet_name: BTreeMap<String, String> = raw_names
            .into_iter()
            .map(|(name, raw)| (normalize_sample_name(&raw), name))
            .collect();

        let mut by_container: BTreeMap<&str, BTreeMap<Well, &str>> = BTreeMap::new();
        for row in sheet.rows() {
            let Some(name) = by_sheet_name.get(&row.sample_name) else {
                continue;
            };
            if resolved.contains_key(name) {
                continue;
            }
            if let Some(sample) = self.lims.sample_by_id(&row.sample_id)? {
                resolved.insert(name.clone(), sample);
                continue;
            }
            match &row.well {
                Some(well) => {
                    by_container
                        .entry(row.container.as_str())
                        .or_default()
                        .insert(well.clone(), name.as_str());
                }
                None => warn!(
                    "Sample sheet row {} has no well and id {} is unknown, skipping.",
                    row.sample_name, row.sample_id
                ),
            }
        }

        for (container, wells) in by_container {
            let placements = self.lims.container_placements(container)?;
            if placements.is_empty() {
                warn!("Container {container} not found in LIMS.");
                continue;
            }
            for (well, name) in wells {
                let sample_id = placements
                    .get(&well)
                    .and_then(|artifact| artifact.sample_ids.first());
                let Some(sample_id) = sample_id else {
                    warn!("Nothing placed in {container} {well} for {name}, skipping.");
                    continue;
                };
                match self.lims.sample_by_id(sample_id)? {
                    Some(sample) => {
                        resolved.insert(name.to_string(), sample);
                    }
                    None => warn!("Sample {sample_id} in {container} {well} not found."),
                }
            }
        }
        Ok(())
    }
}
