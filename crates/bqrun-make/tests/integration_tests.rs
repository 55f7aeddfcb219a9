//! Integration tests for makefile generation and execution

use std::process::Command;

use bqrun_core::{Config, DependencyFact};
use bqrun_dag::Resolver;
use bqrun_make::{MakeInvocation, MarkerNamespace, RuleSynthesizer, RESET_TARGET};
use pretty_assertions::assert_eq;

const NONE: [&str; 0] = [];

fn make_available() -> bool {
    Command::new("make")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn facts() -> Vec<DependencyFact> {
    vec![
        DependencyFact::new(["p.d.t1"], ["p.raw.x"], "1.sql"),
        DependencyFact::new(["p.d.t2"], ["p.d.t1"], "2.sql"),
    ]
}

#[test]
fn regeneration_is_idempotent_and_keeps_hand_written_rules() {
    let dir = tempfile::tempdir().unwrap();
    let makefile = dir.path().join("Makefile");
    std::fs::write(&makefile, "deploy:\n\t./deploy.sh\n\n").unwrap();

    let config = Config::default();
    let synth = RuleSynthesizer::from_config(&config);
    let graph = Resolver::new(facts()).unwrap().graph().unwrap();

    synth.merge_into_file(&graph, &makefile, &config.sentinel).unwrap();
    let first = std::fs::read_to_string(&makefile).unwrap();

    synth.merge_into_file(&graph, &makefile, &config.sentinel).unwrap();
    let second = std::fs::read_to_string(&makefile).unwrap();

    assert_eq!(first, second);
    assert!(first.starts_with("deploy:\n\t./deploy.sh\n\n"));
    assert_eq!(first.matches(config.sentinel.as_str()).count(), 1);

    let generated = first.split(config.sentinel.as_str()).nth(1).unwrap();
    assert_eq!(generated, format!("\n{}", synth.emit(&graph).unwrap()));
}

#[test]
fn missing_makefile_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let makefile = dir.path().join("Makefile");

    let config = Config::default();
    let graph = Resolver::new(facts()).unwrap().graph().unwrap();
    RuleSynthesizer::from_config(&config)
        .merge_into_file(&graph, &makefile, &config.sentinel)
        .unwrap();

    let text = std::fs::read_to_string(&makefile).unwrap();
    assert!(text.starts_with(&config.sentinel));
}

#[tokio::test]
async fn make_runs_in_order_and_clean_resets() {
    if !make_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("1.sql"), "select 1").unwrap();
    std::fs::write(dir.path().join("2.sql"), "select 2").unwrap();

    // record execution order instead of querying a warehouse
    let synth = RuleSynthesizer::new(
        MarkerNamespace::new(".bqrun"),
        "cat >> run.log",
    );
    let graph = Resolver::new(facts()).unwrap().graph().unwrap();
    synth
        .merge_into_file(&graph, &dir.path().join("Makefile"), "# generated")
        .unwrap();

    let code = MakeInvocation::new("make", "Makefile")
        .jobs(4)
        .run(dir.path())
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("run.log")).unwrap(),
        "select 1select 2"
    );
    assert!(synth.markers().is_done(dir.path(), "1.sql"));
    assert!(synth.markers().is_done(dir.path(), "2.sql"));

    // up to date: nothing runs again
    MakeInvocation::new("make", "Makefile").run(dir.path()).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("run.log")).unwrap(),
        "select 1select 2"
    );

    let code = MakeInvocation::new("make", "Makefile")
        .target(RESET_TARGET)
        .run(dir.path())
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert!(!dir.path().join(".bqrun").exists());
    assert!(!synth.markers().is_done(dir.path(), "1.sql"));
}

#[tokio::test]
async fn failed_query_leaves_no_marker() {
    if !make_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("1.sql"), "select 1").unwrap();

    let synth = RuleSynthesizer::new(MarkerNamespace::new(".bqrun"), "false");
    let graph = Resolver::new(vec![DependencyFact::new(["t"], NONE, "1.sql")])
        .unwrap()
        .graph()
        .unwrap();
    synth
        .merge_into_file(&graph, &dir.path().join("Makefile"), "# generated")
        .unwrap();

    let code = MakeInvocation::new("make", "Makefile").run(dir.path()).await.unwrap();
    assert_ne!(code, 0);
    assert!(!synth.markers().is_done(dir.path(), "1.sql"));
}
