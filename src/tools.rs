//! External collaborators: region subsetting, indexing, reference slicing,
//! tandem-repeat detection and haplotype calling.
//!
//! Every invocation goes through [`ToolRunner`] so exit status is always
//! checked and tests can substitute canned output.

use log::{debug, warn};
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A program with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Invocation {
            program: program.to_string(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[derive(Debug)]
pub enum ToolError {
    Spawn { command: String, source: io::Error },
    Failed { command: String, code: Option<i32>, stderr: String },
    TimedOut { command: String, timeout: Duration },
    EmptyOutput { command: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Spawn { command, source } => {
                write!(f, "failed to start `{command}`: {source}")
            }
            ToolError::Failed {
                command,
                code,
                stderr,
            } => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                write!(f, "`{command}` exited with {code}")?;
                if !stderr.trim().is_empty() {
                    write!(f, ": {}", stderr.trim())?;
                }
                Ok(())
            }
            ToolError::TimedOut { command, timeout } => {
                write!(f, "`{command}` did not finish within {}s", timeout.as_secs_f64())
            }
            ToolError::EmptyOutput { command } => write!(f, "`{command}` produced no output"),
        }
    }
}

impl std::error::Error for ToolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ToolError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ToolError> for io::Error {
    fn from(e: ToolError) -> Self {
        io::Error::other(e.to_string())
    }
}

/// Runs an external program to completion
pub trait ToolRunner: Sync {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;
}

/// Runs programs as child processes with an optional timeout and retry budget
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    pub timeout: Option<Duration>,
    pub retries: u32,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>, retries: u32) -> Self {
        ProcessRunner { timeout, retries }
    }

    fn run_once(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        let command_line = invocation.to_string();
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ToolError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        // Drain both pipes concurrently so a chatty child never blocks on a full pipe
        let stdout_reader = child.stdout.take().map(drain_in_background);
        let stderr_reader = child.stderr.take().map(drain_in_background);

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    return Err(ToolError::Spawn {
                        command: command_line,
                        source,
                    })
                }
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::TimedOut {
                        command: command_line,
                        timeout,
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout_reader.map(join_drain).unwrap_or_default();
        let stderr = stderr_reader.map(join_drain).unwrap_or_default();

        if !status.success() {
            return Err(ToolError::Failed {
                command: command_line,
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }
        Ok(ToolOutput { stdout, stderr })
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        let mut attempt = 0;
        loop {
            debug!("Running: {invocation}");
            match self.run_once(invocation) {
                Ok(output) => return Ok(output),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!("{e}; retrying ({attempt}/{})", self.retries);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn drain_in_background<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

fn join_drain(handle: thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

/// Whether a `.bai` or `.csi` index sits next to `alignment`
pub fn has_alignment_index(alignment: &Path) -> bool {
    let with_suffix = |suffix: &str| {
        let mut name = alignment.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    with_suffix(".bai").is_file()
        || with_suffix(".csi").is_file()
        || alignment.with_extension("bai").is_file()
}

/// Subset `alignment` to reads overlapping `regions` and index the result.
/// An input without an index is indexed first, since region retrieval needs one.
/// Returns the path of the indexed subset file in `out_dir`.
pub fn subset_alignment(
    runner: &dyn ToolRunner,
    samtools: &str,
    alignment: &Path,
    regions: &Path,
    out_dir: &Path,
    threads: usize,
) -> Result<PathBuf, ToolError> {
    let file_name = alignment
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "alignment.bam".to_string());
    let subset = out_dir.join(format!("tmp_{file_name}"));

    if !has_alignment_index(alignment) {
        debug!("No index found for {}, building one", alignment.display());
        runner.run(&Invocation::new(samtools).arg("index").arg(alignment))?;
    }

    let view = Invocation::new(samtools)
        .args(["view", "-M", "-@"])
        .arg(threads.to_string())
        .args(["-b", "-L"])
        .arg(regions)
        .arg("-o")
        .arg(&subset)
        .arg(alignment);
    runner.run(&view)?;

    let index = Invocation::new(samtools).arg("index").arg(&subset);
    runner.run(&index)?;

    Ok(subset)
}

/// Run the tandem-repeat detector on `fasta` and return its report
pub fn run_repeat_finder(
    runner: &dyn ToolRunner,
    trf: &str,
    params: &[String],
    fasta: &Path,
) -> Result<String, ToolError> {
    // The detector may drop side files in its working directory
    let invocation = match (fasta.parent(), fasta.file_name()) {
        (Some(dir), Some(name)) if !dir.as_os_str().is_empty() => Invocation::new(trf)
            .arg(name)
            .args(params)
            .current_dir(dir),
        _ => Invocation::new(trf).arg(fasta).args(params),
    };
    Ok(runner.run(&invocation)?.stdout_text())
}

/// Parameters forwarded to the downstream haplotype caller
#[derive(Debug, Clone)]
pub struct HaplotypeCallerParams {
    pub program: String,
    pub deviation: f64,
    pub min_support: u32,
    pub min_coverage: u32,
}

/// Invoke the haplotype caller on the merged table. Its output is not read back.
pub fn call_haplotypes(
    runner: &dyn ToolRunner,
    params: &HaplotypeCallerParams,
    table: &Path,
    out_dir: &Path,
    threads: usize,
) -> Result<(), ToolError> {
    let invocation = Invocation::new(&params.program)
        .arg(table)
        .arg(out_dir)
        .arg(threads.to_string())
        .arg(params.deviation.to_string())
        .arg("reads")
        .arg(params.min_support.to_string())
        .arg(params.min_coverage.to_string());
    runner.run(&invocation)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records invocations and replies with canned stdout
    struct ScriptedRunner {
        seen: Mutex<Vec<Invocation>>,
    }

    impl ToolRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
            self.seen.lock().unwrap().push(invocation.clone());
            Ok(ToolOutput::default())
        }
    }

    #[test]
    fn test_subset_alignment_invocations() {
        let runner = ScriptedRunner {
            seen: Mutex::new(Vec::new()),
        };
        let subset = subset_alignment(
            &runner,
            "samtools",
            Path::new("/data/HG002.bam"),
            Path::new("/data/regions.bed"),
            Path::new("/out"),
            8,
        )
        .unwrap();
        assert_eq!(subset, PathBuf::from("/out/tmp_HG002.bam"));

        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].to_string(), "samtools index /data/HG002.bam");
        assert_eq!(
            seen[1].to_string(),
            "samtools view -M -@ 8 -b -L /data/regions.bed -o /out/tmp_HG002.bam /data/HG002.bam"
        );
        assert_eq!(seen[2].to_string(), "samtools index /out/tmp_HG002.bam");
    }

    #[test]
    fn test_indexed_input_is_not_reindexed() {
        let dir = tempfile::TempDir::new().unwrap();
        let bam = dir.path().join("s1.bam");
        std::fs::write(&bam, b"").unwrap();
        assert!(!has_alignment_index(&bam));
        std::fs::write(dir.path().join("s1.bam.csi"), b"").unwrap();
        assert!(has_alignment_index(&bam));

        let runner = ScriptedRunner {
            seen: Mutex::new(Vec::new()),
        };
        subset_alignment(&runner, "samtools", &bam, Path::new("r.bed"), dir.path(), 1).unwrap();
        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].to_string().starts_with("samtools view"));
    }

    #[test]
    fn test_haplotype_caller_arguments() {
        let runner = ScriptedRunner {
            seen: Mutex::new(Vec::new()),
        };
        let params = HaplotypeCallerParams {
            program: "call_haplotypes".to_string(),
            deviation: 0.1,
            min_support: 2,
            min_coverage: 5,
        };
        call_haplotypes(&runner, &params, Path::new("t.txt"), Path::new("out"), 4).unwrap();
        assert_eq!(
            runner.seen.lock().unwrap()[0].to_string(),
            "call_haplotypes t.txt out 4 0.1 reads 2 5"
        );
    }

    #[test]
    fn test_tool_error_messages() {
        let failed = ToolError::Failed {
            command: "trf x.fa".to_string(),
            code: Some(2),
            stderr: "boom\n".to_string(),
        };
        assert_eq!(failed.to_string(), "`trf x.fa` exited with 2: boom");
        let empty = ToolError::EmptyOutput {
            command: "samtools faidx".to_string(),
        };
        assert_eq!(empty.to_string(), "`samtools faidx` produced no output");
    }
}
