use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{ResolvedConfig, Section};
use crate::error::ClarityError;
use crate::lims::LimsClient;
use crate::metadata::{Metadata, MetadataAggregator, flatten, into_flat};
use crate::report::{ReportAdapter, ReportOutput};
use crate::resolver::{NameResolver, ResolveOptions};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub disabled: bool,
    pub resolve: ResolveOptions,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Disabled,
    NoSchema,
    Aborted { reason: String },
    Completed(Box<ReportOutput>),
}

pub struct App<L: LimsClient> {
    lims: L,
    config: ResolvedConfig,
}

impl<L: LimsClient> App<L> {
    pub fn new(lims: L, config: ResolvedConfig) -> Self {
        Self { lims, config }
    }

    /// Never fails: problems are logged and the outcome says how far it got.
    pub fn run(&self, observed: &BTreeSet<String>, options: &RunOptions) -> RunOutcome {
        if options.disabled {
            info!("Skipping Clarity metadata as disabled on command line");
            return RunOutcome::Disabled;
        }
        if self.config.disabled {
            debug!("Skipping Clarity metadata as specified in config file");
            return RunOutcome::Disabled;
        }
        let Some(schema) = &self.config.schema else {
            debug!("No config found for Clarity metadata");
            return RunOutcome::NoSchema;
        };

        let resolution = match NameResolver::new(&self.lims, &options.resolve).resolve(observed) {
            Ok(resolution) => resolution,
            Err(err) => {
                let reason = match &err {
                    ClarityError::LimsHttp(_) => format!("could not connect to Clarity LIMS: {err}"),
                    ClarityError::LimsStatus { .. } | ClarityError::LimsPayload(_) => {
                        format!("Clarity LIMS rejected the sample lookup: {err}")
                    }
                    _ => format!("could not resolve sample names: {err}"),
                };
                warn!("{reason}");
                return RunOutcome::Aborted { reason };
            }
        };

        let mut aggregator = MetadataAggregator::new(&self.lims, &resolution.samples);
        let header = Self::gather(&mut aggregator, schema.header_info.as_ref(), "report header");
        let general = Self::gather(&mut aggregator, schema.general_stats.as_ref(), "general stats");
        let detail = Self::gather(&mut aggregator, schema.detail_tab.as_ref(), "detail tab");

        let output = ReportOutput {
            header_info: header
                .map(|metadata| ReportAdapter::header_info(&into_flat(&metadata)))
                .unwrap_or_default(),
            general_stats: Self::paired(&schema.general_stats, general)
                .map(|(section, metadata)| ReportAdapter::general_stats(section, into_flat(&metadata))),
            detail_tab: Self::paired(&schema.detail_tab, detail)
                .map(|(section, metadata)| ReportAdapter::detail_tab(section, &metadata)),
            lims_added: aggregator.lims_added(),
            resolved: resolution.resolved,
            observed: resolution.observed,
            unresolved: resolution.unresolved,
            generated_at: Utc::now().to_rfc3339(),
        };
        RunOutcome::Completed(Box::new(output))
    }

    fn gather(
        aggregator: &mut MetadataAggregator<'_, L>,
        section: Option<&Section>,
        label: &str,
    ) -> Option<Metadata> {
        let section = section?;
        let mut metadata = Metadata::new();
        if let Err(err) = aggregator.aggregate(section, &mut metadata) {
            warn!("Clarity lookup for {label} stopped early: {err}");
        }
        Some(flatten(metadata))
    }

    fn paired(
        section: &Option<Section>,
        metadata: Option<Metadata>,
    ) -> Option<(&Section, Metadata)> {
        Some((section.as_ref()?, metadata?))
    }
}
