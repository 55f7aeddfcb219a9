//! Integration tests for directory extraction

use std::path::Path;

use bqrun_dag::Resolver;
use bqrun_sql::{discover_sql_files, ExtractionError, FactExtractor, SqlExtractor};
use pretty_assertions::assert_eq;

fn dump(dir: &Path, name: &str, sql: &str) {
    std::fs::write(dir.join(format!("{}.sql", name)), sql).unwrap();
}

#[test]
fn single_file() {
    let dir = tempfile::tempdir().unwrap();
    dump(
        dir.path(),
        "1",
        "create or replace table `p.d.t1` as\nselect * from `p.d.t2`\n",
    );

    let facts = SqlExtractor::new().extract(dir.path()).unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].targets(), ["p.d.t1"]);
    assert_eq!(facts[0].sources(), ["p.d.t2"]);
    assert_eq!(facts[0].origin(), "1.sql");
}

#[test]
fn chained_files() {
    let dir = tempfile::tempdir().unwrap();
    dump(dir.path(), "2", "create or replace table `p.d.t2` as select * from `p.d.t1`");
    dump(dir.path(), "1", "create or replace table `p.d.t1` as select * from `p.d.t0`");

    let facts = SqlExtractor::new().extract(dir.path()).unwrap();
    let origins: Vec<&str> = facts.iter().map(|f| f.origin()).collect();
    assert_eq!(origins, ["1.sql", "2.sql"]);
    assert_eq!(facts[0].sources(), ["p.d.t0"]);
    assert_eq!(facts[1].sources(), ["p.d.t1"]);
}

#[test]
fn multiple_sources() {
    let dir = tempfile::tempdir().unwrap();
    dump(
        dir.path(),
        "1",
        "create or replace table `p.d.t1` as select * from `p.d.t101` left join `p.d.t102` using(id)",
    );

    let facts = SqlExtractor::new().extract(dir.path()).unwrap();
    assert_eq!(facts[0].sources(), ["p.d.t101", "p.d.t102"]);
}

#[test]
fn external_and_cloned_tables_order_their_readers() {
    let dir = tempfile::tempdir().unwrap();
    dump(
        dir.path(),
        "a",
        "create or replace external table `p.d.e` options (format = 'CSV', uris = ['gs://b/e.csv'])",
    );
    dump(dir.path(), "b", "create table `p.d.snap` clone `p.d.src`");
    dump(
        dir.path(),
        "c",
        "create table `p.d.out` as select * from `p.d.e` join `p.d.snap` using (id)",
    );

    let facts = SqlExtractor::new().extract(dir.path()).unwrap();
    assert_eq!(facts[0].targets(), ["p.d.e"]);
    assert_eq!(facts[1].targets(), ["p.d.snap"]);
    assert_eq!(facts[1].sources(), ["p.d.src"]);

    let graph = Resolver::new(facts).unwrap().graph().unwrap();
    let prerequisites: Vec<&str> = graph
        .prerequisites("c.sql")
        .unwrap()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(prerequisites, ["a.sql", "b.sql"]);
    assert_eq!(
        graph.external_tables().into_iter().collect::<Vec<_>>(),
        ["p.d.src"]
    );
}

#[test]
fn only_top_level_sql_files_are_discovered() {
    let dir = tempfile::tempdir().unwrap();
    dump(dir.path(), "b", "select 1");
    dump(dir.path(), "a", "select 1");
    std::fs::write(dir.path().join("notes.txt"), "not sql").unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    dump(&dir.path().join("nested"), "c", "select 1");

    let files = discover_sql_files(dir.path()).unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["a.sql", "b.sql"]);
}

#[test]
fn syntax_errors_name_the_file() {
    let dir = tempfile::tempdir().unwrap();
    dump(dir.path(), "broken", "create or replace table (id int64)");

    let err = SqlExtractor::new().extract(dir.path()).unwrap_err();
    assert!(matches!(err, ExtractionError::Syntax { .. }));
    assert!(err.to_string().contains("broken.sql"));
}
