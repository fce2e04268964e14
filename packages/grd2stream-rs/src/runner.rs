use crate::error::{FlowlineError, Result};
use crate::types::ExecutionResult;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// A fully resolved external invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub env_remove: Vec<String>,
    pub current_dir: Option<PathBuf>,
    /// Host file that receives the captured stdout, rendered as `> file`
    pub stdout_file: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Human-readable rendering used in logs and status output
    pub fn display(&self) -> String {
        let mut parts = vec![display_word(&self.program)];
        parts.extend(self.args.iter().map(|a| display_word(a)));
        if let Some(ref file) = self.stdout_file {
            parts.push(">".to_string());
            parts.push(display_word(&file.to_string_lossy()));
        }
        parts.join(" ")
    }
}

fn display_word(word: &str) -> String {
    if word.is_empty() || word.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("{:?}", word)
    } else {
        word.to_string()
    }
}

/// Executes external commands on behalf of the pipeline
///
/// `execute` only fails when the process cannot be started; a non-zero exit is
/// returned as a regular `ExecutionResult` so callers can tell "tool ran and
/// reported an error" apart from "tool could not be started".
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult>;

    /// Execute and require exit code 0
    async fn execute_checked(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        let result = self.execute(spec).await?;
        if !result.success() {
            log::error!("Command failed ({:?}): {}", result.exit_code, spec.display());
            log::error!("stdout: {}", result.stdout);
            log::error!("stderr: {}", result.stderr);
        }
        result.into_checked()
    }
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        for key in &spec.env_remove {
            command.env_remove(key);
        }
        if let Some(ref dir) = spec.current_dir {
            command.current_dir(dir);
        }

        log::debug!("Spawning: {}", spec.display());
        let start_time = std::time::Instant::now();

        let output = command.output().await.map_err(|e| {
            FlowlineError::SpawnFailed(format!("Failed to execute {}: {}", spec.program, e))
        })?;

        log::debug!(
            "{} finished with {} in {:.2}s",
            spec.program,
            output.status,
            start_time.elapsed().as_secs_f64()
        );

        if let Some(ref file) = spec.stdout_file {
            tokio::fs::write(file, &output.stdout).await?;
        }

        Ok(ExecutionResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_words_with_spaces() {
        let mut spec = CommandSpec::new("/opt/conda/bin/conda")
            .args(["run", "-n", "GMT6", "grd2stream", "/data/my grid.nc"]);
        spec.stdout_file = Some(PathBuf::from("/tmp/out.txt"));
        assert_eq!(
            spec.display(),
            "/opt/conda/bin/conda run -n GMT6 grd2stream \"/data/my grid.nc\" > /tmp/out.txt"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_streams_separately() {
        let spec = CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let result = SystemRunner::new().execute(&spec).await.unwrap();
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(!result.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_execute_error() {
        let spec = CommandSpec::new("sh").args(["-c", "echo 1 2 3; exit 1"]);
        let runner = SystemRunner::new();
        assert!(runner.execute(&spec).await.is_ok());
        match runner.execute_checked(&spec).await {
            Err(FlowlineError::ExternalToolFailed { code, .. }) => assert_eq!(code, Some(1)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_and_stdout_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("captured.txt");
        let mut spec = CommandSpec::new("sh")
            .args(["-c", "echo \"$FLOWLINE_TEST_VALUE\""])
            .env("FLOWLINE_TEST_VALUE", "42");
        spec.stdout_file = Some(out.clone());

        let result = SystemRunner::new().execute(&spec).await.unwrap();
        assert!(result.success());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "42\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let spec = CommandSpec::new("/nonexistent/grd2stream-binary");
        let result = SystemRunner::new().execute(&spec).await;
        assert!(matches!(result, Err(FlowlineError::SpawnFailed(_))));
    }
}
