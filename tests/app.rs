mod common;

use std::collections::{BTreeMap, BTreeSet};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use clarity_report::app::{App, RunOptions, RunOutcome};
use clarity_report::config::ConfigLoader;
use clarity_report::domain::Sample;
use clarity_report::report::{DEFAULT_NAMESPACE, DEFAULT_SCALE, HostReport, ReportOutput};
use clarity_report::resolver::ResolveOptions;

use common::{MockLims, artifact, project};

fn observed(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn run(lims: MockLims, yaml: &str, names: &[&str]) -> RunOutcome {
    let config = ConfigLoader::resolve_str(yaml).unwrap();
    App::new(lims, config).run(&observed(names), &RunOptions::default())
}

fn completed(outcome: RunOutcome) -> ReportOutput {
    match outcome {
        RunOutcome::Completed(output) => *output,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

#[test]
fn sample_level_field_reaches_general_stats() {
    let lims = MockLims::with_samples(vec![
        Sample::new("ADM1A1", "S1").with_udf("Sex", "F"),
        Sample::new("ADM1A2", "S2").with_udf("Sex", "M"),
    ]);
    let yaml = "clarity:\n  general_stats:\n    Sample:\n      - Sex\n";
    let output = completed(run(lims, yaml, &["S1", "S2"]));

    let stats = output.general_stats.clone().unwrap();
    let expected: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::from([
        ("S1".to_string(), BTreeMap::from([("Sex".to_string(), "F".to_string())])),
        ("S2".to_string(), BTreeMap::from([("Sex".to_string(), "M".to_string())])),
    ]);
    assert_eq!(stats.data, expected);
    assert_eq!(stats.headers.len(), 1);
    let column = &stats.headers[0];
    assert_eq!(column.title, "Sex");
    assert_eq!(column.namespace, DEFAULT_NAMESPACE);
    assert_eq!(column.scale, DEFAULT_SCALE);
    assert_eq!(column.description, "Sample - Sex");

    let mut host = HostReport::default();
    host.merge(output);
    assert_eq!(host.general_stats_headers.len(), 1);
    assert_eq!(host.general_stats_headers[0][0].key, "Sex");
}

#[test]
fn project_fields_become_header_info() {
    let mut p1 = project("P1");
    p1.udf.insert("Project Type".to_string(), "WGS".to_string());
    let lims = MockLims::with_samples(vec![
        Sample::new("ADM1A1", "S1").with_project(p1.clone()),
        Sample::new("ADM1A2", "S2").with_project(p1),
    ]);
    let yaml = "clarity:\n  report_header_info:\n    Project:\n      - Project Type\n      - Sequencing Platform\n";
    let output = completed(run(lims, yaml, &["S1", "S2"]));
    assert_eq!(
        output.header_info,
        vec![BTreeMap::from([(
            "Project Type".to_string(),
            "WGS".to_string()
        )])]
    );
    assert!(output.general_stats.is_none());
    assert!(output.detail_tab.is_none());
}

#[test]
fn artifact_outputs_and_inputs_are_collected() {
    let mut lims = MockLims::with_samples(vec![
        Sample::new("ADM1A1", "S1"),
        Sample::new("ADM1A2", "S2"),
    ]);
    lims.artifacts = vec![
        (
            "Library Prep".to_string(),
            artifact("2-1", "24-7", &["ADM1A1"], &[("Conc", "5")]),
        ),
        (
            "Library Prep".to_string(),
            artifact("2-2", "24-8", &["ADM1A1"], &[("Conc", "3")]),
        ),
        (
            "Library Prep".to_string(),
            artifact("2-3", "24-7", &["ADM1A1"], &[("Conc", "5")]),
        ),
        (
            "Library Prep".to_string(),
            artifact("2-4", "24-7", &["ADM1A2"], &[]),
        ),
    ];
    lims.processes.insert(
        "24-7".to_string(),
        vec![
            artifact("1-1", "20-1", &["ADM1A1"], &[("Volume", "20")]),
            artifact("1-2", "20-1", &["ADM1A2"], &[("Volume", "15")]),
        ],
    );
    lims.processes.insert(
        "24-8".to_string(),
        vec![artifact("1-3", "20-2", &["ADM1A1"], &[("Volume", "10")])],
    );

    let yaml = "clarity:\n  clarity_module:\n    Library Prep:\n      outputs:\n        - Conc\n      inputs:\n        Volume:\n          title: Input volume\n";
    let output = completed(run(lims, yaml, &["S1", "S2"]));
    let tab = output.detail_tab.unwrap();

    assert_eq!(tab.rows["S1"]["Conc"], "3, 5");
    assert_eq!(tab.rows["S1"]["Volume"], "10, 20");
    assert_eq!(tab.rows["S2"]["Volume"], "15");
    assert!(!tab.rows["S2"].contains_key("Conc"));

    let volume = tab.columns.iter().find(|c| c.key == "Volume").unwrap();
    assert_eq!(volume.title, "Input volume");
    assert_eq!(volume.namespace, "Library Prep");
    assert!(tab.html.contains("<th>S1</th>"));
}

#[test]
fn sample_type_becomes_lims_link() {
    let lims = MockLims::with_samples(vec![
        Sample::new("ADM1A1", "S1").with_udf("Sample Tissue", "Blood"),
        Sample::new("ADM1A2", "S2").with_udf("Sample Type", "DNA"),
    ]);
    let yaml = "clarity:\n  clarity_module:\n    Sample:\n      - Sample Tissue\n      - Sample Type\n";
    let output = completed(run(lims, yaml, &["S1", "S2"]));
    assert!(output.lims_added);

    let tab = output.detail_tab.unwrap();
    assert_eq!(
        tab.rows["S1"]["Sample Type"],
        "<a href=\"https://lims.example.org/clarity/search?scope=Sample&query=ADM1A1\" target=\"_blank\">Blood</a>"
    );
    assert!(!tab.rows["S1"].contains_key("Sample Tissue"));
    assert!(tab.rows["S2"]["Sample Type"].ends_with(">DNA</a>"));
}

#[test]
fn multiply_by_override_transforms_values() {
    let lims = MockLims::with_samples(vec![Sample::new("ADM1A1", "S1").with_udf("Conc", "2.5")]);
    let yaml = "clarity:\n  general_stats:\n    Sample:\n      Conc:\n        multiply_by: 1000\n        suffix: ' ng/ml'\n";
    let output = completed(run(lims, yaml, &["S1"]));
    let stats = output.general_stats.unwrap();
    assert_eq!(stats.values()["S1"]["Conc"], serde_json::json!(2500.0));
    assert_eq!(
        stats.headers[0].extra.get("suffix"),
        Some(&serde_json::json!(" ng/ml"))
    );
}

#[test]
fn lookup_failure_keeps_partial_metadata() {
    let mut lims = MockLims::with_samples(vec![
        Sample::new("ADM1A1", "S1").with_udf("Sex", "F"),
        Sample::new("ADM1A2", "S2").with_udf("Sex", "M"),
    ]);
    lims.artifacts = vec![(
        "Library Prep".to_string(),
        artifact("2-1", "24-7", &["ADM1A1"], &[("Conc", "5")]),
    )];
    lims.fail_artifacts_for = Some("S2".to_string());

    let yaml = "clarity:\n  general_stats:\n    Sample: [Sex]\n    Library Prep:\n      outputs: [Conc]\n";
    let output = completed(run(lims, yaml, &["S1", "S2"]));
    let stats = output.general_stats.unwrap();
    assert_eq!(stats.data["S1"]["Conc"], "5");
    assert_eq!(stats.data["S2"]["Sex"], "M");
    assert!(!stats.data["S2"].contains_key("Conc"));
}

#[test]
fn disabled_runs_touch_nothing() {
    let lims = MockLims::default();
    let config = ConfigLoader::resolve_str("disable_clarity: true\nclarity:\n  general_stats:\n    Sample: [Sex]\n").unwrap();
    let app = App::new(lims, config);
    assert_matches!(
        app.run(&observed(&["S1"]), &RunOptions::default()),
        RunOutcome::Disabled
    );

    let lims = MockLims::default();
    let config = ConfigLoader::resolve_str("clarity:\n  general_stats:\n    Sample: [Sex]\n").unwrap();
    let options = RunOptions {
        disabled: true,
        ..RunOptions::default()
    };
    let app = App::new(lims, config);
    assert_matches!(app.run(&observed(&["S1"]), &options), RunOutcome::Disabled);
}

#[test]
fn missing_schema_and_offline_lims_fail_soft() {
    assert_matches!(
        run(MockLims::default(), "title: report\n", &["S1"]),
        RunOutcome::NoSchema
    );

    let lims = MockLims {
        offline: true,
        ..MockLims::default()
    };
    let outcome = run(lims, "clarity:\n  general_stats:\n    Sample: [Sex]\n", &["S1"]);
    assert_matches!(
        outcome,
        RunOutcome::Aborted { reason }
            if reason.starts_with("could not connect to Clarity LIMS") && reason.contains("connection refused")
    );
}

#[test]
fn rejected_lookup_is_reported_as_such() {
    let lims = MockLims {
        status_error: Some(401),
        ..MockLims::default()
    };
    let outcome = run(lims, "clarity:\n  general_stats:\n    Sample: [Sex]\n", &["S1"]);
    assert_matches!(
        outcome,
        RunOutcome::Aborted { reason }
            if reason.starts_with("Clarity LIMS rejected the sample lookup") && reason.contains("401")
    );
}

#[test]
fn broken_samplesheet_does_not_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let sheet_path = dir.path().join("SampleSheet.csv");
    std::fs::write(&sheet_path, "[Header]\nIEMFileVersion,4\n").unwrap();

    let lims = MockLims::with_samples(vec![Sample::new("ADM1A1", "S1").with_udf("Sex", "F")]);
    let config = ConfigLoader::resolve_str("clarity:\n  general_stats:\n    Sample: [Sex]\n").unwrap();
    let options = RunOptions {
        resolve: ResolveOptions {
            samplesheet: Some(Utf8PathBuf::from_path_buf(sheet_path).unwrap()),
            ..ResolveOptions::default()
        },
        ..RunOptions::default()
    };
    let output = completed(App::new(lims, config).run(&observed(&["S1"]), &options));
    assert_eq!(output.resolved, 1);
    assert_eq!(output.general_stats.unwrap().data["S1"]["Sex"], "F");
}

#[test]
fn lims_text_in_detail_tab_is_escaped() {
    let lims = MockLims::with_samples(vec![Sample::new("ADM1A1", "S1")
        .with_udf("Comment", "<a href=x onmouseover=alert(1)>hi</a><script>x()</script>")
        .with_udf("Sample Type", "DNA")]);
    let yaml = "clarity:\n  clarity_module:\n    Sample: [Comment, Sample Type]\n";
    let output = completed(run(lims, yaml, &["S1"]));
    let tab = output.detail_tab.unwrap();
    assert!(!tab.html.contains("<script>"));
    assert!(tab.html.contains("&lt;script&gt;"));
    assert!(tab.html.contains("query=ADM1A1\" target=\"_blank\">DNA</a></td>"));
}

#[test]
fn completed_output_serializes_for_the_host() {
    let lims = MockLims::with_samples(vec![Sample::new("ADM1A1", "S1").with_udf("Sex", "F")]);
    let yaml = "clarity:\n  general_stats:\n    Sample:\n      Sex:\n        hidden: true\n";
    let output = completed(run(lims, yaml, &["S1", "S9"]));

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["resolved"], 1);
    assert_eq!(json["observed"], 2);
    assert_eq!(json["unresolved"], serde_json::json!(["S9"]));
    let column = &json["general_stats"]["headers"][0];
    assert_eq!(column["key"], "Sex");
    assert_eq!(column["hidden"], true);
    assert!(column.get("transform").is_none());
    assert_eq!(json["general_stats"]["data"]["S1"]["Sex"], "F");
}
