//! E2E tests for the `strata` binary.
//!
//! Covers default passthrough, rendering formats, scope variables from
//! files and literals, lookup_options-driven merging, the explainer
//! trace and the single-line error contract.

mod common;

use common::{fact_fixture, strata_cmd, write};
use predicates::str::contains;
use tempfile::TempDir;

// ─── Defaults & rendering ──────────────────────────────────────────

#[test]
fn default_int() {
    let tmp = TempDir::new().unwrap();
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--default", "23", "--type", "int", "foo"])
        .assert()
        .success()
        .stdout("23\n");
}

#[test]
fn default_string() {
    let tmp = TempDir::new().unwrap();
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--default", "23", "--type", "string", "foo"])
        .assert()
        .success()
        .stdout("\"23\"\n");
}

#[test]
fn default_empty_string() {
    let tmp = TempDir::new().unwrap();
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--default", "", "foo"])
        .assert()
        .success()
        .stdout("\"\"\n");
}

#[test]
fn default_hash() {
    let tmp = TempDir::new().unwrap();
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--default", "{ x: \"a\", y: 9 }", "foo"])
        .assert()
        .success()
        .stdout("x: a\ny: 9\n");
}

#[test]
fn default_hash_json() {
    let tmp = TempDir::new().unwrap();
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--default", "{ x: \"a\", y: 9 }", "--render-as", "json", "foo"])
        .assert()
        .success()
        .stdout("{\"x\":\"a\",\"y\":9}\n");
}

#[test]
fn default_string_s() {
    let tmp = TempDir::new().unwrap();
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--default", "xyz", "--render-as", "s", "foo"])
        .assert()
        .success()
        .stdout("xyz\n");
}

#[test]
fn default_string_binary() {
    let tmp = TempDir::new().unwrap();
    strata_cmd()
        .current_dir(tmp.path())
        .args([
            "--default",
            "YWJjMTIzIT8kKiYoKSctPUB+",
            "--render-as",
            "binary",
            "foo",
        ])
        .assert()
        .success()
        .stdout("abc123!?$*&()'-=@~");
}

#[test]
fn missing_key_without_default_prints_nothing() {
    let tmp = TempDir::new().unwrap();
    strata_cmd()
        .current_dir(tmp.path())
        .arg("foo")
        .assert()
        .success()
        .stdout("");
}

// ─── Scope variables & interpolated locations ──────────────────────

#[test]
fn facts_interpolate_config_and_data() {
    let tmp = TempDir::new().unwrap();
    fact_fixture(tmp.path());
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--vars", "facts.yaml", "interpolate_ca"])
        .assert()
        .success()
        .stdout("This is value of c.a\n");
}

#[test]
fn facts_flag_is_an_alias_for_vars() {
    let tmp = TempDir::new().unwrap();
    fact_fixture(tmp.path());
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--facts", "facts.yaml", "interpolate_ca"])
        .assert()
        .success()
        .stdout("This is value of c.a\n");
}

#[test]
fn var_literals_override_scope() {
    let tmp = TempDir::new().unwrap();
    fact_fixture(tmp.path());
    strata_cmd()
        .current_dir(tmp.path())
        .args([
            "--var",
            "c={a:\"the option value\"}",
            "--var",
            "data_file: by_fact",
            "interpolate_ca",
        ])
        .assert()
        .success()
        .stdout("This is the option value\n");
}

// ─── Merging ───────────────────────────────────────────────────────

#[test]
fn lookup_options_deep_merge() {
    let tmp = TempDir::new().unwrap();
    fact_fixture(tmp.path());
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--vars", "facts.yaml", "hash"])
        .assert()
        .success()
        .stdout("one: 1\ntwo: two\nthree:\n  a: A\n  c: C\n  b: B\n");
}

#[test]
fn explicit_config_path() {
    let tmp = TempDir::new().unwrap();
    fact_fixture(tmp.path());
    let config = tmp.path().join("hiera.yaml");
    strata_cmd()
        .args([
            "--config",
            &config.display().to_string(),
            "--vars",
            &tmp.path().join("facts.yaml").display().to_string(),
            "hash.three.b",
        ])
        .assert()
        .success()
        .stdout("B\n");
}

// ─── Explainer ─────────────────────────────────────────────────────

#[test]
fn explain_prints_the_lookup_trace() {
    let tmp = TempDir::new().unwrap();
    fact_fixture(tmp.path());
    let data = tmp.path().join("data");
    let expected = format!(
        "Searching for \"interpolate_ca\"\n\
        \x20 Merge strategy \"first found strategy\"\n\
        \x20   data_hash function 'yaml_data'\n\
        \x20     Path \"{common}\"\n\
        \x20       Original path: \"common.yaml\"\n\
        \x20       No such key: \"interpolate_ca\"\n\
        \x20   data_hash function 'yaml_data'\n\
        \x20     Path \"{named}\"\n\
        \x20       Original path: \"named_%{{data_file}}.yaml\"\n\
        \x20       Interpolation on \"This is %{{c.a}}\"\n\
        \x20         Sub key: \"c.a\"\n\
        \x20           Found key: \"a\" value: \"value of c.a\"\n\
        \x20       Found key: \"interpolate_ca\" value: \"This is value of c.a\"\n\
        \x20   Merged result: \"This is value of c.a\"\n",
        common = data.join("common.yaml").display(),
        named = data.join("named_by_fact.yaml").display(),
    );

    strata_cmd()
        .args([
            "--config",
            &tmp.path().join("hiera.yaml").display().to_string(),
            "--vars",
            &tmp.path().join("facts.yaml").display().to_string(),
            "--explain",
            "interpolate_ca",
        ])
        .assert()
        .success()
        .stdout(expected);
}

#[test]
fn explain_options_traces_the_bootstrap() {
    let tmp = TempDir::new().unwrap();
    fact_fixture(tmp.path());
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--vars", "facts.yaml", "--explain-options", "hash"])
        .assert()
        .success()
        .stdout(contains("Searching for \"lookup_options\""))
        .stdout(contains("Merge strategy \"deep merge strategy\""))
        .stdout(contains("Using merge options from \"lookup_options\" hash"));
}

// ─── Errors ────────────────────────────────────────────────────────

#[test]
fn interpolation_cycle_fails_with_one_line() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "hiera.yaml",
        "hierarchy:\n  - name: Main\n    path: main.yaml\n",
    );
    write(
        tmp.path(),
        "data/main.yaml",
        "a: \"%{lookup('b')}\"\nb: \"%{lookup('a')}\"\n",
    );
    strata_cmd()
        .current_dir(tmp.path())
        .arg("a")
        .assert()
        .failure()
        .stderr(contains("endless recursion"));
}

#[test]
fn unknown_merge_strategy_fails() {
    let tmp = TempDir::new().unwrap();
    strata_cmd()
        .current_dir(tmp.path())
        .args(["--merge", "bogus", "foo"])
        .assert()
        .failure()
        .stderr(contains("unknown merge strategy 'bogus'"));
}

#[test]
fn schema_error_fails() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "hiera.yaml",
        "hierarchy:\n  - name: Bad\n    options:\n      path: reserved\n",
    );
    strata_cmd()
        .current_dir(tmp.path())
        .arg("foo")
        .assert()
        .failure()
        .stderr(contains("reserved"));
}
