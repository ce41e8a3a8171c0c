//! Cross-process determinism: the `search_fixture` binary prints the same
//! digests regardless of working directory, locale or unrelated environment.

use std::path::Path;
use std::process::Command;

fn binary_path() -> String {
    let mut path = std::env::current_exe()
        .expect("can resolve test binary path")
        .parent()
        .expect("binary dir exists")
        .parent()
        .expect("deps parent exists")
        .to_path_buf();
    path.push("search_fixture");
    path.to_string_lossy().to_string()
}

fn workspace_root() -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("tests/ exists")
        .parent()
        .expect("workspace root exists")
        .to_string_lossy()
        .to_string()
}

fn run_variant(work_dir: &str, env_overrides: &[(&str, &str)]) -> String {
    let bin = binary_path();
    let mut command = Command::new(&bin);
    command
        .current_dir(work_dir)
        .env_remove("LC_ALL")
        .env_remove("LANG")
        .env_remove("RUST_LOG");
    for &(key, val) in env_overrides {
        command.env(key, val);
    }
    let output = command.output().unwrap_or_else(|e| {
        panic!("failed to spawn {bin} (work_dir={work_dir}, overrides={env_overrides:?}): {e}")
    });
    assert!(
        output.status.success(),
        "search_fixture exited with {}: stderr={}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout is valid UTF-8")
}

#[test]
fn fixture_output_is_stable_across_processes() {
    let root = workspace_root();
    let baseline = run_variant(&root, &[]);

    for key in [
        "tree_report_digest=sha256:",
        "tree_search_graph_digest=sha256:",
        "grid_report_digest=sha256:",
        "dichotomy_report_digest=sha256:",
        "rollout_completions_digest=sha256:",
    ] {
        assert!(baseline.contains(key), "baseline output missing {key}");
    }
    assert!(baseline.contains("tree_solutions=27"));
    assert!(baseline.contains("tree_termination=exhausted"));
    assert!(baseline.contains("dichotomy_solution_graphs=15"));
    assert!(baseline.contains("rollout_solutions=27"));

    let alt_cwd = if cfg!(target_os = "windows") { "C:\\" } else { "/tmp" };
    assert_eq!(baseline, run_variant(alt_cwd, &[]), "output differs when cwd is {alt_cwd}");

    assert_eq!(
        baseline,
        run_variant(&root, &[("LC_ALL", "C"), ("LANG", "C")]),
        "output differs when LC_ALL=C LANG=C"
    );

    // Verbose logging must stay on stderr.
    assert_eq!(
        baseline,
        run_variant(&root, &[("RUST_LOG", "trace"), ("ARBOR_NOISE", "1")]),
        "output differs with RUST_LOG=trace"
    );
}
