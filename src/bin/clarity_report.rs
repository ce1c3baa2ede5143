use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use clarity_report::app::{App, RunOptions, RunOutcome};
use clarity_report::config::{ConfigLoader, ConnectionConfig, ResolvedConfig};
use clarity_report::error::ClarityError;
use clarity_report::lims::ClarityHttpClient;
use clarity_report::observed::ObservedNames;
use clarity_report::output::JsonOutput;
use clarity_report::resolver::ResolveOptions;

#[derive(Parser)]
#[command(name = "clarity-report")]
#[command(about = "Fetch Clarity LIMS metadata for the samples of a QC report")]
#[command(version, author)]
struct Cli {
    /// Sample names seen in the report
    samples: Vec<String>,

    /// Disable the Clarity lookup on this run
    #[arg(long)]
    disable_clarity: bool,

    /// Use every sample of this Clarity project instead of matching names
    #[arg(long)]
    clarity_project: Option<String>,

    /// Do not strip suffixes like _1, _2, _R1, _R2 from sample names
    #[arg(long)]
    clarity_skip_name_editing: bool,

    /// Genologics connection config (default ~/.genologicsrc)
    #[arg(long)]
    clarity_config: Option<Utf8PathBuf>,

    /// Sample sheet used to match names by sample id or plate position
    #[arg(long)]
    samplesheet: Option<Utf8PathBuf>,

    /// CSV mapping report names to raw sequencer sample names
    #[arg(long)]
    bcbio_csv: Option<Utf8PathBuf>,

    /// YAML config holding the `clarity` schema
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// General-stats table (tab separated) to read sample names from
    #[arg(long)]
    general_stats: Option<Utf8PathBuf>,

    /// Raw data JSON keyed by source and sample to read sample names from
    #[arg(long)]
    raw_data: Option<Utf8PathBuf>,

    /// Write the JSON result here instead of stdout
    #[arg(long, short)]
    output: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ClarityError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ClarityError) -> u8 {
    match error {
        ClarityError::ConfigRead(_) | ClarityError::ConfigParse(_) => 2,
        ClarityError::SampleSheet(_) | ClarityError::Csv { .. } => 2,
        ClarityError::LimsHttp(_)
        | ClarityError::LimsStatus { .. }
        | ClarityError::LimsPayload(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = RunOptions {
        disabled: cli.disable_clarity,
        resolve: ResolveOptions {
            project: cli.clarity_project.clone(),
            skip_name_editing: cli.clarity_skip_name_editing,
            samplesheet: cli.samplesheet.clone(),
            raw_names_csv: cli.bcbio_csv.clone(),
        },
    };
    if options.disabled {
        warn!("Skipping Clarity metadata as disabled on command line");
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => ConfigLoader::resolve(path.as_std_path())?,
        None => ResolvedConfig::default(),
    };

    let connection_path = cli.clarity_config.as_ref().map(|path| path.as_std_path());
    let connection = match ConnectionConfig::load(connection_path) {
        Ok(connection) => connection,
        Err(err) => {
            warn!("{err}. Skipping Clarity metadata.");
            return Ok(());
        }
    };

    let mut observed = ObservedNames::new();
    observed.extend(cli.samples.iter().map(String::as_str));
    if let Some(path) = &cli.general_stats {
        observed.read_general_stats(path.as_std_path())?;
    }
    if let Some(path) = &cli.raw_data {
        observed.read_raw_data(path.as_std_path())?;
    }
    let observed = observed.into_names();

    let lims = ClarityHttpClient::new(&connection)?;
    let app = App::new(lims, config);
    match app.run(&observed, &options) {
        RunOutcome::Completed(output) => match &cli.output {
            Some(path) => JsonOutput::write_report(path.as_std_path(), &output).into_diagnostic(),
            None => JsonOutput::print_report(&output).into_diagnostic(),
        },
        RunOutcome::Disabled => Ok(()),
        RunOutcome::NoSchema => {
            warn!("No `clarity` section in the config, nothing to fetch");
            Ok(())
        }
        RunOutcome::Aborted { reason } => {
            warn!("Clarity metadata skipped: {reason}");
            Ok(())
        }
    }
}
