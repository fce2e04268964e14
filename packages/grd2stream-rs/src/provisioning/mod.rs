//! Idempotent setup of conda, the GMT environment and the grd2stream binary.
//!
//! Four stages, each skipped when its postcondition already holds:
//! runtime present, environment present, tool present, tool verified.
//! State is re-probed on every call and never persisted.

pub mod source;
pub mod strategy;

pub use strategy::{select_strategy, shell_word, NativeConda, ProvisioningStrategy, WslBridge};

use crate::config::ToolchainConfig;
use crate::download::{Downloader, HttpDownloader};
use crate::env_guard::EnvGuard;
use crate::error::{FlowlineError, Result};
use crate::host::RetryPrompt;
use crate::platform::ExecContext;
use crate::runner::{CommandSpec, ProcessRunner, SystemRunner};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Runtime,
    Environment,
    Tool,
    Verification,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Runtime => "conda runtime",
            Stage::Environment => "GMT environment",
            Stage::Tool => "grd2stream binary",
            Stage::Verification => "grd2stream verification",
        })
    }
}

/// Snapshot of what is installed, recomputed on every probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProvisioningState {
    pub runtime_present: bool,
    pub environment_present: bool,
    pub tool_present: bool,
    pub tool_verified: bool,
}

impl ProvisioningState {
    pub fn is_ready(&self) -> bool {
        self.first_missing().is_none()
    }

    pub fn first_missing(&self) -> Option<Stage> {
        if !self.runtime_present {
            Some(Stage::Runtime)
        } else if !self.environment_present {
            Some(Stage::Environment)
        } else if !self.tool_present {
            Some(Stage::Tool)
        } else if !self.tool_verified {
            Some(Stage::Verification)
        } else {
            None
        }
    }
}

/// Which missing stages the user agreed to install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionOptions {
    pub install_runtime: bool,
    pub create_environment: bool,
    pub build_tool: bool,
    pub max_verification_retries: u32,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            install_runtime: true,
            create_environment: true,
            build_tool: true,
            max_verification_retries: 2,
        }
    }
}

impl ProvisionOptions {
    /// Only check, install nothing
    pub fn check_only() -> Self {
        Self {
            install_runtime: false,
            create_environment: false,
            build_tool: false,
            max_verification_retries: 0,
        }
    }
}

/// True when `conda env list` output names the environment
pub fn env_listed(stdout: &str, env_name: &str) -> bool {
    let posix_suffix = format!("/envs/{}", env_name);
    let windows_suffix = format!("\\envs\\{}", env_name);
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(|line| {
            let mut tokens = line.split_whitespace();
            tokens.next() == Some(env_name)
                || line
                    .split_whitespace()
                    .any(|t| t.ends_with(&posix_suffix) || t.ends_with(&windows_suffix))
        })
}

pub struct ProvisioningManager {
    strategy: Box<dyn ProvisioningStrategy>,
    config: ToolchainConfig,
    runner: Arc<dyn ProcessRunner>,
    downloader: Arc<dyn Downloader>,
}

impl ProvisioningManager {
    /// Detect the execution context and use real processes and downloads
    pub fn new(config: ToolchainConfig) -> Self {
        let context = ExecContext::detect(config.bridge);
        log::info!("Provisioning context: {}", context);
        let strategy = select_strategy(context, &config);
        Self::with_parts(
            strategy,
            config,
            Arc::new(SystemRunner::new()),
            Arc::new(HttpDownloader::new()),
        )
    }

    pub fn with_parts(
        strategy: Box<dyn ProvisioningStrategy>,
        config: ToolchainConfig,
        runner: Arc<dyn ProcessRunner>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            strategy,
            config,
            runner,
            downloader,
        }
    }

    pub fn strategy(&self) -> &dyn ProvisioningStrategy {
        self.strategy.as_ref()
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        self.runner.clone()
    }

    /// Check every stage without installing anything
    pub async fn probe(&self) -> ProvisioningState {
        let mut state = ProvisioningState {
            runtime_present: self.strategy.runtime_present(self.runner.as_ref()).await,
            ..Default::default()
        };
        if !state.runtime_present {
            return state;
        }
        state.environment_present = self.environment_present().await;
        if !state.environment_present {
            return state;
        }
        state.tool_present = self.strategy.tool_present(self.runner.as_ref()).await;
        if !state.tool_present {
            return state;
        }
        state.tool_verified = self.verify().await.is_ok();
        state
    }

    /// Bring every stage to its postcondition, installing what is missing
    ///
    /// Safe to call on every run: when everything is in place only the probes
    /// execute. A failed verification rebuilds the tool as long as `prompt`
    /// agrees and the retry budget lasts.
    pub async fn ensure_ready(
        &self,
        options: &ProvisionOptions,
        prompt: &dyn RetryPrompt,
    ) -> Result<ProvisioningState> {
        let mut session = EnvGuard::new();
        self.strategy.activate_session(&mut session)?;

        let mut state = ProvisioningState::default();

        // Stage 1: conda
        state.runtime_present = self.strategy.runtime_present(self.runner.as_ref()).await;
        if !state.runtime_present {
            if !options.install_runtime {
                return Err(FlowlineError::RuntimeMissing(format!(
                    "{} not found and installation was declined",
                    self.strategy.conda_executable()
                )));
            }
            log::info!("Installing conda into {}", self.root_display());
            self.strategy
                .install_runtime(self.runner.as_ref(), self.downloader.as_ref())
                .await
                .map_err(|e| FlowlineError::RuntimeMissing(e.to_string()))?;

            if !self.strategy.runtime_present(self.runner.as_ref()).await {
                return Err(FlowlineError::RuntimeMissing(format!(
                    "installer finished but {} is still missing",
                    self.strategy.conda_executable()
                )));
            }
            state.runtime_present = true;
        }

        // Stage 2: GMT environment
        state.environment_present = self.environment_present().await;
        if !state.environment_present {
            if !options.create_environment {
                return Err(FlowlineError::EnvironmentSetupFailed(format!(
                    "environment '{}' not found and creation was declined",
                    self.config.env_name
                )));
            }
            self.create_environment().await?;
            state.environment_present = true;
        }

        // Stages 3 and 4: build, then verify with retries
        let mut attempt = 0u32;
        let mut force_build = false;
        loop {
            state.tool_present = self.strategy.tool_present(self.runner.as_ref()).await;
            if force_build || !state.tool_present {
                if !options.build_tool {
                    return Err(FlowlineError::BuildFailed(format!(
                        "{} not found and building was declined",
                        self.strategy.tool_executable()
                    )));
                }
                self.build_tool().await?;
                state.tool_present = true;
            }

            match self.verify().await {
                Ok(()) => {
                    state.tool_verified = true;
                    break;
                }
                Err(err) => {
                    attempt += 1;
                    log::warn!("Verification attempt {} failed: {}", attempt, err);
                    if attempt > options.max_verification_retries
                        || !prompt.confirm_retry(attempt, &err)
                    {
                        return Err(err);
                    }
                    force_build = true;
                }
            }
        }

        log::info!("grd2stream is ready at {}", self.strategy.tool_executable());
        Ok(state)
    }

    async fn environment_present(&self) -> bool {
        let spec = self.strategy.conda(&args(&["env", "list"]));
        match self.runner.execute(&spec).await {
            Ok(result) if result.success() => env_listed(&result.stdout, &self.config.env_name),
            Ok(result) => {
                log::debug!("conda env list exited with {:?}", result.exit_code);
                false
            }
            Err(e) => {
                log::debug!("conda env list could not run: {}", e);
                false
            }
        }
    }

    async fn create_environment(&self) -> Result<()> {
        log::info!("Creating conda environment '{}'", self.config.env_name);

        let mut create = args(&["create", "-y", "-n"]);
        create.push(self.config.env_name.clone());
        create.extend(self.config.packages.iter().cloned());

        let steps = [
            args(&["config", "--add", "channels", &self.config.channel]),
            args(&["config", "--set", "channel_priority", "strict"]),
            create,
        ];
        for step in &steps {
            self.run_stage(self.strategy.conda(step), FlowlineError::EnvironmentSetupFailed)
                .await?;
        }

        if !self.environment_present().await {
            return Err(FlowlineError::EnvironmentSetupFailed(format!(
                "'{}' is not listed by conda after creation",
                self.config.env_name
            )));
        }
        Ok(())
    }

    async fn build_tool(&self) -> Result<()> {
        log::info!("Building {} from source", self.config.tool_name);

        let scratch = tempfile::Builder::new()
            .prefix("grd2stream-build-")
            .tempdir()
            .map_err(|e| FlowlineError::BuildFailed(format!("Cannot create build dir: {}", e)))?;
        let source_dir =
            source::locate_or_fetch(&self.config, self.downloader.as_ref(), scratch.path()).await?;

        for spec in self.strategy.build_commands(&source_dir) {
            self.run_stage(spec, FlowlineError::BuildFailed).await?;
        }
        for spec in self.strategy.post_install_commands() {
            self.run_stage(spec, FlowlineError::BuildFailed).await?;
        }

        if !self.strategy.tool_present(self.runner.as_ref()).await {
            return Err(FlowlineError::BuildFailed(format!(
                "make install did not produce {}",
                self.strategy.tool_executable()
            )));
        }
        Ok(())
    }

    async fn verify(&self) -> Result<()> {
        let spec = self
            .strategy
            .in_environment(&self.strategy.tool_executable(), &args(&["-h"]));
        let result = self
            .runner
            .execute(&spec)
            .await
            .map_err(|e| FlowlineError::VerificationFailed(e.to_string()))?;
        if result.success() {
            Ok(())
        } else {
            Err(FlowlineError::VerificationFailed(format!(
                "'{}' exited with {:?}: {}",
                spec.display(),
                result.exit_code,
                result.stderr.trim()
            )))
        }
    }

    async fn run_stage(&self, spec: CommandSpec, wrap: fn(String) -> FlowlineError) -> Result<()> {
        log::info!("Running: {}", spec.display());
        self.runner
            .execute_checked(&spec)
            .await
            .map(|_| ())
            .map_err(|e| wrap(e.to_string()))
    }

    fn root_display(&self) -> String {
        match self.strategy.context() {
            ExecContext::WslBridge => self.config.wsl_conda_root.clone(),
            ExecContext::Native(_) => self.config.conda_root.display().to_string(),
        }
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{AlwaysRetry, NeverRetry};
    use crate::platform::HostPlatform;
    use crate::types::ExecutionResult;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&CommandSpec) -> ExecutionResult + Send + Sync>;

    struct ScriptedRunner {
        calls: Mutex<Vec<CommandSpec>>,
        handler: Handler,
    }

    impl ScriptedRunner {
        fn new(handler: impl Fn(&CommandSpec) -> ExecutionResult + Send + Sync + 'static) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                handler: Box::new(handler),
            }
        }

        fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }

        fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
            self.calls.lock().unwrap().push(spec.clone());
            Ok((self.handler)(spec))
        }
    }

    struct NoDownloads;

    #[async_trait]
    impl Downloader for NoDownloads {
        async fn download(&self, url: &str, _dest: &Path) -> Result<u64> {
            Err(FlowlineError::Download(format!("unexpected download of {}", url)))
        }
    }

    /// Writes a stand-in installer and remembers where it went
    #[derive(Default)]
    struct RecordingDownloader {
        fetched: Mutex<Vec<(String, PathBuf)>>,
    }

    impl RecordingDownloader {
        fn fetched(&self) -> Vec<(String, PathBuf)> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Downloader for RecordingDownloader {
        async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
            std::fs::write(dest, b"#!/bin/sh\n")?;
            self.fetched
                .lock()
                .unwrap()
                .push((url.to_string(), dest.to_path_buf()));
            Ok(10)
        }
    }

    fn ok(stdout: &str) -> ExecutionResult {
        ExecutionResult {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn failed(stderr: &str) -> ExecutionResult {
        ExecutionResult {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        config: ToolchainConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("miniconda3");
            let archive = dir.path().join("grd2stream-0.2.14.tar.gz");
            source::write_test_archive(&archive, "grd2stream-0.2.14");
            let config = ToolchainConfig {
                conda_root: root.clone(),
                source_archive: archive,
                source_url: None,
                ..ToolchainConfig::default()
            };
            Self {
                _dir: dir,
                root,
                config,
            }
        }

        fn install_conda(&self) {
            touch(&self.root.join("bin").join("conda"));
        }

        fn tool_path(&self) -> PathBuf {
            self.root.join("envs/GMT6/bin/grd2stream")
        }

        fn manager_downloading(
            &self,
            runner: Arc<ScriptedRunner>,
            downloader: Arc<RecordingDownloader>,
        ) -> ProvisioningManager {
            ProvisioningManager::with_parts(
                Box::new(NativeConda::new(HostPlatform::Linux, self.config.clone())),
                self.config.clone(),
                runner,
                downloader,
            )
        }

        fn manager(&self, runner: Arc<ScriptedRunner>) -> ProvisioningManager {
            ProvisioningManager::with_parts(
                Box::new(NativeConda::new(HostPlatform::Linux, self.config.clone())),
                self.config.clone(),
                runner,
                Arc::new(NoDownloads),
            )
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    fn is_env_list(spec: &CommandSpec) -> bool {
        spec.has_arg("env") && spec.has_arg("list")
    }

    #[test]
    fn test_env_listed() {
        let output = "# conda environments:\n#\nbase                  *  /home/u/miniconda3\nGMT6                     /home/u/miniconda3/envs/GMT6\n";
        assert!(env_listed(output, "GMT6"));
        assert!(!env_listed(output, "GMT"));
        assert!(!env_listed("base * /opt/conda\n", "GMT6"));
        assert!(env_listed("                         /opt/conda/envs/GMT6\n", "GMT6"));
        assert!(env_listed("GMT6  C:\\Users\\u\\miniconda3\\envs\\GMT6\r\n", "GMT6"));
    }

    #[test]
    fn test_first_missing() {
        let mut state = ProvisioningState::default();
        assert_eq!(state.first_missing(), Some(Stage::Runtime));
        state.runtime_present = true;
        state.environment_present = true;
        assert_eq!(state.first_missing(), Some(Stage::Tool));
        state.tool_present = true;
        state.tool_verified = true;
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_second_call_only_probes() {
        let fixture = Fixture::new();
        fixture.install_conda();

        let env_created = Arc::new(Mutex::new(false));
        let tool = fixture.tool_path();
        let created = env_created.clone();
        let runner = Arc::new(ScriptedRunner::new(move |spec| {
            if is_env_list(spec) {
                if *created.lock().unwrap() {
                    ok("base  /x/miniconda3\nGMT6  /x/miniconda3/envs/GMT6\n")
                } else {
                    ok("base  /x/miniconda3\n")
                }
            } else if spec.has_arg("create") {
                *created.lock().unwrap() = true;
                ok("")
            } else if spec.has_arg("install") {
                touch(&tool);
                ok("")
            } else {
                ok("")
            }
        }));
        let manager = fixture.manager(runner.clone());

        let state = manager
            .ensure_ready(&ProvisionOptions::default(), &NeverRetry)
            .await
            .unwrap();
        assert!(state.is_ready());
        let first = runner.calls();
        assert!(first.iter().any(|c| c.has_arg("create")));
        assert!(first.iter().any(|c| c.has_arg("./configure")));
        assert!(fixture.tool_path().is_file());

        runner.clear();
        let state = manager
            .ensure_ready(&ProvisionOptions::default(), &NeverRetry)
            .await
            .unwrap();
        assert!(state.is_ready());

        let second = runner.calls();
        assert_eq!(second.len(), 2, "expected only probes, got {:?}", second);
        assert!(is_env_list(&second[0]));
        assert!(second[1].has_arg("-h"));
    }

    #[tokio::test]
    async fn test_environment_creation_order() {
        let fixture = Fixture::new();
        fixture.install_conda();
        touch(&fixture.tool_path());

        let created = Arc::new(Mutex::new(false));
        let flag = created.clone();
        let runner = Arc::new(ScriptedRunner::new(move |spec| {
            if is_env_list(spec) {
                if *flag.lock().unwrap() {
                    ok("GMT6 /x/envs/GMT6\n")
                } else {
                    ok("")
                }
            } else {
                if spec.has_arg("create") {
                    *flag.lock().unwrap() = true;
                }
                ok("")
            }
        }));
        let manager = fixture.manager(runner.clone());
        manager
            .ensure_ready(&ProvisionOptions::default(), &NeverRetry)
            .await
            .unwrap();

        let conda_calls: Vec<Vec<String>> = runner
            .calls()
            .into_iter()
            .filter(|c| !is_env_list(c) && !c.has_arg("-h"))
            .map(|c| c.args)
            .collect();
        assert_eq!(
            conda_calls,
            vec![
                args(&["config", "--add", "channels", "conda-forge"]),
                args(&["config", "--set", "channel_priority", "strict"]),
                args(&["create", "-y", "-n", "GMT6", "gmt=6*", "gdal", "hdf5", "netcdf4"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_environment_not_listed_after_create_fails() {
        let fixture = Fixture::new();
        fixture.install_conda();

        let runner = Arc::new(ScriptedRunner::new(|spec| {
            if is_env_list(spec) {
                ok("base /x\n")
            } else {
                ok("")
            }
        }));
        let manager = fixture.manager(runner.clone());
        let err = manager
            .ensure_ready(&ProvisionOptions::default(), &NeverRetry)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlineError::EnvironmentSetupFailed(_)));
        assert!(!runner.calls().iter().any(|c| c.has_arg("./configure")));
    }

    #[tokio::test]
    async fn test_declined_runtime_stops_before_later_stages() {
        let fixture = Fixture::new();
        let runner = Arc::new(ScriptedRunner::new(|_| ok("")));
        let manager = fixture.manager(runner.clone());

        let options = ProvisionOptions {
            install_runtime: false,
            ..ProvisionOptions::default()
        };
        let err = manager.ensure_ready(&options, &NeverRetry).await.unwrap_err();
        assert!(matches!(err, FlowlineError::RuntimeMissing(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_build_failure_keeps_stderr() {
        let fixture = Fixture::new();
        fixture.install_conda();

        let runner = Arc::new(ScriptedRunner::new(|spec| {
            if is_env_list(spec) {
                ok("GMT6 /x/envs/GMT6\n")
            } else if spec.has_arg("./configure") {
                failed("configure: error: gmt-config not found")
            } else {
                ok("")
            }
        }));
        let manager = fixture.manager(runner.clone());
        let err = manager
            .ensure_ready(&ProvisionOptions::default(), &NeverRetry)
            .await
            .unwrap_err();
        match err {
            FlowlineError::BuildFailed(msg) => assert!(msg.contains("gmt-config not found")),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!runner.calls().iter().any(|c| c.has_arg("-h")));
    }

    #[tokio::test]
    async fn test_verification_retry_rebuilds() {
        let fixture = Fixture::new();
        fixture.install_conda();
        touch(&fixture.tool_path());

        let verifications = Arc::new(AtomicUsize::new(0));
        let counter = verifications.clone();
        let runner = Arc::new(ScriptedRunner::new(move |spec| {
            if is_env_list(spec) {
                ok("GMT6 /x/envs/GMT6\n")
            } else if spec.has_arg("-h") {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    failed("libgmt.so.6: cannot open shared object file")
                } else {
                    ok("usage: grd2stream")
                }
            } else {
                ok("")
            }
        }));
        let manager = fixture.manager(runner.clone());
        let state = manager
            .ensure_ready(&ProvisionOptions::default(), &AlwaysRetry)
            .await
            .unwrap();
        assert!(state.tool_verified);
        assert_eq!(verifications.load(Ordering::SeqCst), 2);
        assert!(runner.calls().iter().any(|c| c.has_arg("./configure")));
    }

    #[tokio::test]
    async fn test_verification_failure_without_retry() {
        let fixture = Fixture::new();
        fixture.install_conda();
        touch(&fixture.tool_path());

        let runner = Arc::new(ScriptedRunner::new(|spec| {
            if is_env_list(spec) {
                ok("GMT6 /x/envs/GMT6\n")
            } else {
                failed("broken")
            }
        }));
        let manager = fixture.manager(runner.clone());
        let err = manager
            .ensure_ready(&ProvisionOptions::default(), &NeverRetry)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlineError::VerificationFailed(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_probe_installs_nothing() {
        let fixture = Fixture::new();
        fixture.install_conda();
        let runner = Arc::new(ScriptedRunner::new(|_| ok("base /x\n")));
        let manager = fixture.manager(runner.clone());

        let state = manager.probe().await;
        assert!(state.runtime_present);
        assert!(!state.environment_present);
        assert_eq!(state.first_missing(), Some(Stage::Environment));
        assert_eq!(runner.calls().len(), 1);
    }

    fn is_installer(spec: &CommandSpec) -> bool {
        spec.program == "bash" && spec.has_arg("-b")
    }

    #[tokio::test]
    async fn test_runtime_install_runs_installer_then_reprobes() {
        let fixture = Fixture::new();
        let conda = fixture.root.join("bin").join("conda");
        let runner = Arc::new(ScriptedRunner::new(move |spec| {
            if is_installer(spec) {
                touch(&conda);
            }
            ok("")
        }));
        let downloader = Arc::new(RecordingDownloader::default());
        let manager = fixture.manager_downloading(runner.clone(), downloader.clone());

        let options = ProvisionOptions {
            create_environment: false,
            ..ProvisionOptions::default()
        };
        let err = manager.ensure_ready(&options, &NeverRetry).await.unwrap_err();
        // conda is in place, the declined environment stops the run
        assert!(matches!(err, FlowlineError::EnvironmentSetupFailed(_)));

        let fetched = downloader.fetched();
        assert_eq!(fetched.len(), 1);
        let (url, installer) = &fetched[0];
        assert!(url.contains("/Miniforge3-Linux-"));
        assert!(url.ends_with(".sh"));

        let calls = runner.calls();
        assert!(is_installer(&calls[0]));
        assert_eq!(
            calls[0].args,
            vec![
                installer.to_string_lossy().into_owned(),
                "-b".to_string(),
                "-u".to_string(),
                "-p".to_string(),
                fixture.root.to_string_lossy().into_owned(),
            ]
        );
        assert!(!installer.exists());
        assert!(calls[1..].iter().any(is_env_list));
    }

    #[tokio::test]
    async fn test_runtime_still_missing_after_install() {
        let fixture = Fixture::new();
        let runner = Arc::new(ScriptedRunner::new(|_| ok("")));
        let downloader = Arc::new(RecordingDownloader::default());
        let manager = fixture.manager_downloading(runner.clone(), downloader.clone());

        let err = manager
            .ensure_ready(&ProvisionOptions::default(), &NeverRetry)
            .await
            .unwrap_err();
        match err {
            FlowlineError::RuntimeMissing(msg) => assert!(msg.contains("still missing")),
            other => panic!("expected RuntimeMissing, got {:?}", other),
        }
        assert_eq!(runner.calls().len(), 1);
        assert!(!downloader.fetched()[0].1.exists());
    }

    #[tokio::test]
    async fn test_installer_failure_is_runtime_missing() {
        let fixture = Fixture::new();
        let runner = Arc::new(ScriptedRunner::new(|spec| {
            if is_installer(spec) {
                failed("ERROR: File or directory already exists")
            } else {
                ok("")
            }
        }));
        let downloader = Arc::new(RecordingDownloader::default());
        let manager = fixture.manager_downloading(runner.clone(), downloader);

        let err = manager
            .ensure_ready(&ProvisionOptions::default(), &NeverRetry)
            .await
            .unwrap_err();
        match err {
            FlowlineError::RuntimeMissing(msg) => {
                assert!(msg.contains("File or directory already exists"))
            }
            other => panic!("expected RuntimeMissing, got {:?}", other),
        }
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_windows_installer_is_silent() {
        let fixture = Fixture::new();
        let runner = ScriptedRunner::new(|_| ok(""));
        let downloader = RecordingDownloader::default();
        let strategy = NativeConda::new(HostPlatform::Windows, fixture.config.clone());

        strategy.install_runtime(&runner, &downloader).await.unwrap();

        let (url, installer) = downloader.fetched().remove(0);
        assert!(url.ends_with("Miniconda3-latest-Windows-x86_64.exe"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, installer.to_string_lossy());
        assert!(calls[0].program.ends_with(".exe"));
        assert_eq!(
            calls[0].args,
            vec![
                "/InstallationType=JustMe".to_string(),
                "/RegisterPython=0".to_string(),
                "/S".to_string(),
                format!("/D={}", fixture.root.display()),
            ]
        );
        assert!(!installer.exists());
    }

    #[tokio::test]
    async fn test_wsl_installer_downloads_inside_wsl() {
        let fixture = Fixture::new();
        let runner = ScriptedRunner::new(|_| ok(""));
        let strategy = WslBridge::new(fixture.config.clone());

        // NoDownloads fails the test if the host tries to fetch anything
        strategy.install_runtime(&runner, &NoDownloads).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "wsl");
        assert_eq!(calls[0].args[..3], ["-e", "bash", "-lc"]);
        let script = &calls[0].args[3];
        assert!(script.contains("curl -fsSL"));
        assert!(script.contains("/Miniforge3-Linux-$(uname -m).sh"));
        assert!(script.contains("-b -u -p \"$HOME/miniconda3\""));
        assert!(script.contains("rm -f \"$HOME/miniconda3/miniforge.sh\""));
    }
}
