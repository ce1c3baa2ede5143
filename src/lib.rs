pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod lims;
pub mod metadata;
pub mod names;
pub mod observed;
pub mod output;
pub mod report;
pub mod resolver;
pub mod samplesheet;
