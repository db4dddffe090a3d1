//! Process runner behaviour against real child processes.
//! Requires a POSIX `sh`, `true`, `false` and `sleep`.

use spanseq::tools::{Invocation, ProcessRunner, ToolError, ToolRunner};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const FAIL_ONCE: &str =
    "if [ -f marker ]; then echo recovered; else touch marker; echo first >&2; exit 3; fi";

#[test]
fn test_success_captures_stdout() {
    let runner = ProcessRunner::default();
    let output = runner
        .run(&Invocation::new("sh").args(["-c", "echo hello; echo noise >&2"]))
        .unwrap();
    assert_eq!(output.stdout_text(), "hello\n");
    assert_eq!(String::from_utf8_lossy(&output.stderr), "noise\n");

    assert!(runner.run(&Invocation::new("true")).is_ok());
}

#[test]
fn test_non_zero_exit_is_reported() {
    let runner = ProcessRunner::default();
    match runner.run(&Invocation::new("false")) {
        Err(ToolError::Failed { command, code, .. }) => {
            assert_eq!(command, "false");
            assert_eq!(code, Some(1));
        }
        other => panic!("expected a failed status, got {other:?}"),
    }
}

#[test]
fn test_missing_program_fails_to_spawn() {
    let runner = ProcessRunner::default();
    let result = runner.run(&Invocation::new("definitely-not-a-real-program-4821"));
    assert!(matches!(result, Err(ToolError::Spawn { .. })));
}

#[test]
fn test_timeout_kills_the_child() {
    let runner = ProcessRunner::new(Some(Duration::from_millis(200)), 0);
    let started = Instant::now();
    let result = runner.run(&Invocation::new("sleep").arg("5"));
    assert!(matches!(result, Err(ToolError::TimedOut { .. })));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn test_retries_recover_a_flaky_tool() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let invocation = Invocation::new("sh")
        .args(["-c", FAIL_ONCE])
        .current_dir(temp_dir.path());

    let output = ProcessRunner::new(None, 1).run(&invocation).unwrap();
    assert_eq!(output.stdout_text(), "recovered\n");

    let fresh_dir = TempDir::new()?;
    let invocation = Invocation::new("sh")
        .args(["-c", FAIL_ONCE])
        .current_dir(fresh_dir.path());
    match ProcessRunner::new(None, 0).run(&invocation) {
        Err(ToolError::Failed { code, stderr, .. }) => {
            assert_eq!(code, Some(3));
            assert_eq!(stderr.trim(), "first");
        }
        other => panic!("expected a failed status, got {other:?}"),
    }
    Ok(())
}
