#![allow(dead_code)]
//! Shared E2E helpers for `strata` binary tests.
//!
//! Each test builds its hierarchy in a temp directory and runs the real
//! binary against it. Lookup values go to stdout; tracing and errors go
//! to stderr.

use std::path::Path;
use std::time::Duration;

/// Default timeout for CLI tests.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Builds a Command for the `strata` binary.
pub fn strata_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("strata").expect("strata binary builds");
    cmd.timeout(TIMEOUT);
    cmd
}

/// Writes a file under `root`, creating parent directories.
pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dirs");
    }
    std::fs::write(path, content).expect("write fixture file");
}

/// The two-layer hierarchy shared by the interpolation, merge and explain
/// tests: `common.yaml` first, then a path interpolated from the scope.
pub fn fact_fixture(root: &Path) {
    write(
        root,
        "hiera.yaml",
        "version: 5\nhierarchy:\n  - name: Common\n    path: common.yaml\n  - name: ByFact\n    path: named_%{data_file}.yaml\n",
    );
    write(
        root,
        "data/common.yaml",
        concat!(
            "lookup_options:\n",
            "  hash:\n",
            "    merge: deep\n",
            "hash:\n",
            "  one: 1\n",
            "  two: \"two\"\n",
            "  three:\n",
            "    a: A\n",
            "    c: C\n",
        ),
    );
    write(
        root,
        "data/named_by_fact.yaml",
        concat!(
            "interpolate_ca: \"This is %{c.a}\"\n",
            "hash:\n",
            "  one: \"overwritten one\"\n",
            "  three:\n",
            "    a: \"overwritten A\"\n",
            "    b: B\n",
            "    c: \"overwritten C\"\n",
        ),
    );
    write(root, "facts.yaml", "data_file: by_fact\nc:\n  a: value of c.a\n");
}
