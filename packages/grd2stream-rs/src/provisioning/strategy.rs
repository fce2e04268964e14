//! Platform-specific halves of provisioning.
//!
//! The manager drives the stages; a strategy knows where conda and the tool
//! live in its execution context, how to wrap a command in the GMT
//! environment, and how to install the runtime and build the tool there.

use crate::config::ToolchainConfig;
use crate::download::Downloader;
use crate::env_guard::EnvGuard;
use crate::error::Result;
use crate::path_translator::PathTranslator;
use crate::platform::{ExecContext, HostPlatform};
use crate::runner::{CommandSpec, ProcessRunner};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait ProvisioningStrategy: Send + Sync {
    fn context(&self) -> ExecContext;

    fn translator(&self) -> PathTranslator {
        self.context().translator()
    }

    /// Conda executable, in the execution context's path convention
    fn conda_executable(&self) -> String;

    /// Prefix of the scientific environment
    fn env_prefix(&self) -> String;

    fn tool_executable(&self) -> String;

    /// Invoke conda itself
    fn conda(&self, args: &[String]) -> CommandSpec;

    /// Invoke `program` with the scientific environment active
    fn in_environment(&self, program: &str, args: &[String]) -> CommandSpec;

    /// Process-wide variables needed while provisioning
    fn activate_session(&self, session: &mut EnvGuard) -> Result<()>;

    async fn runtime_present(&self, runner: &dyn ProcessRunner) -> bool;

    async fn tool_present(&self, runner: &dyn ProcessRunner) -> bool;

    async fn install_runtime(
        &self,
        runner: &dyn ProcessRunner,
        downloader: &dyn Downloader,
    ) -> Result<()>;

    /// configure / make / make install, run from the unpacked source tree
    fn build_commands(&self, source_dir: &Path) -> Vec<CommandSpec>;

    fn post_install_commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
}

/// Pick the strategy matching the detected execution context
pub fn select_strategy(
    context: ExecContext,
    config: &ToolchainConfig,
) -> Box<dyn ProvisioningStrategy> {
    match context {
        ExecContext::Native(host) => Box::new(NativeConda::new(host, config.clone())),
        ExecContext::WslBridge => Box::new(WslBridge::new(config.clone())),
    }
}

fn to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

// =============================================================================
// NATIVE (Linux, macOS, Windows)
// =============================================================================

/// Conda installed directly on the host
pub struct NativeConda {
    host: HostPlatform,
    config: ToolchainConfig,
}

impl NativeConda {
    pub fn new(host: HostPlatform, config: ToolchainConfig) -> Self {
        Self { host, config }
    }

    fn root(&self) -> &Path {
        &self.config.conda_root
    }

    fn conda_path(&self) -> PathBuf {
        match self.host {
            HostPlatform::Windows => self.root().join("Scripts").join("conda.exe"),
            _ => self.root().join("bin").join("conda"),
        }
    }

    fn prefix_path(&self) -> PathBuf {
        self.root().join("envs").join(&self.config.env_name)
    }

    fn tool_path(&self) -> PathBuf {
        self.prefix_path().join("bin").join(format!(
            "{}{}",
            self.config.tool_name,
            self.host.exe_suffix()
        ))
    }

    fn installer_url(&self) -> String {
        match self.host {
            HostPlatform::Windows => self.config.miniconda_windows_url.clone(),
            host => format!(
                "{}/Miniforge3-{}-{}.sh",
                self.config.miniforge_base_url.trim_end_matches('/'),
                host.miniforge_os(),
                host.miniforge_arch()
            ),
        }
    }

    fn run_in_env(&self, args: &[String]) -> CommandSpec {
        self.conda(&[
            vec!["run".to_string(), "-n".to_string(), self.config.env_name.clone()],
            args.to_vec(),
        ]
        .concat())
    }
}

#[async_trait]
impl ProvisioningStrategy for NativeConda {
    fn context(&self) -> ExecContext {
        ExecContext::Native(self.host)
    }

    fn conda_executable(&self) -> String {
        self.conda_path().to_string_lossy().into_owned()
    }

    fn env_prefix(&self) -> String {
        self.prefix_path().to_string_lossy().into_owned()
    }

    fn tool_executable(&self) -> String {
        self.tool_path().to_string_lossy().into_owned()
    }

    fn conda(&self, args: &[String]) -> CommandSpec {
        CommandSpec::new(self.conda_executable())
            .args(args.iter().cloned())
            .env_remove("PYTHONHOME")
    }

    fn in_environment(&self, program: &str, args: &[String]) -> CommandSpec {
        let mut all = vec![program.to_string()];
        all.extend(args.iter().cloned());
        self.run_in_env(&all)
    }

    fn activate_session(&self, session: &mut EnvGuard) -> Result<()> {
        session.remove("PYTHONHOME");
        session.set("CONDA_PREFIX", self.root());
        match self.host {
            HostPlatform::Windows => {
                let scripts = self.root().join("Scripts");
                let library = self.root().join("Library").join("bin");
                session.prepend_paths("PATH", &[scripts.as_path(), library.as_path()])
            }
            _ => {
                let bin = self.root().join("bin");
                session.prepend_paths("PATH", &[bin.as_path()])
            }
        }
    }

    async fn runtime_present(&self, _runner: &dyn ProcessRunner) -> bool {
        self.conda_path().is_file()
    }

    async fn tool_present(&self, _runner: &dyn ProcessRunner) -> bool {
        self.tool_path().is_file()
    }

    async fn install_runtime(
        &self,
        runner: &dyn ProcessRunner,
        downloader: &dyn Downloader,
    ) -> Result<()> {
        let root = self.root();
        if let Some(parent) = root.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let suffix = match self.host {
            HostPlatform::Windows => ".exe",
            _ => ".sh",
        };
        // Closed handle, removed when `installer` drops on any path out of here.
        let installer = tempfile::Builder::new()
            .prefix("conda-installer-")
            .suffix(suffix)
            .tempfile()?
            .into_temp_path();

        downloader
            .download(&self.installer_url(), &installer)
            .await?;

        let installer_path = installer.to_string_lossy().into_owned();
        let spec = match self.host {
            HostPlatform::Windows => CommandSpec::new(installer_path).args([
                "/InstallationType=JustMe".to_string(),
                "/RegisterPython=0".to_string(),
                "/S".to_string(),
                format!("/D={}", root.display()),
            ]),
            _ => CommandSpec::new("bash").args([
                installer_path,
                "-b".to_string(),
                "-u".to_string(),
                "-p".to_string(),
                root.to_string_lossy().into_owned(),
            ]),
        };

        log::info!("Running conda installer: {}", spec.display());
        runner.execute_checked(&spec).await?;
        Ok(())
    }

    fn build_commands(&self, source_dir: &Path) -> Vec<CommandSpec> {
        let prefix = self.env_prefix();
        match self.host {
            HostPlatform::Windows => {
                let prefix = prefix.replace('\\', "/");
                let script = format!(
                    "./configure --prefix=\"{}\" --enable-gmt-api && make && make install",
                    prefix
                );
                vec![self
                    .run_in_env(&to_strings(&["bash", "-c", &script]))
                    .current_dir(source_dir)]
            }
            _ => {
                let ldflags = format!("-Wl,-rpath,{}/lib", prefix);
                let configure = self
                    .run_in_env(&[
                        "./configure".to_string(),
                        format!("--prefix={}", prefix),
                        "--enable-gmt-api".to_string(),
                    ])
                    .env("LDFLAGS", ldflags)
                    .current_dir(source_dir);
                let make = self
                    .run_in_env(&to_strings(&["make"]))
                    .current_dir(source_dir);
                let install = self
                    .run_in_env(&to_strings(&["make", "install"]))
                    .current_dir(source_dir);
                vec![configure, make, install]
            }
        }
    }

    fn post_install_commands(&self) -> Vec<CommandSpec> {
        match self.host {
            // The dylib search path is not baked in by the conda toolchain on macOS.
            HostPlatform::MacOs => vec![CommandSpec::new("install_name_tool").args([
                "-add_rpath".to_string(),
                format!("{}/lib", self.env_prefix()),
                self.tool_executable(),
            ])],
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// WSL BRIDGE (Windows host, Linux toolchain)
// =============================================================================

/// Conda installed inside the Windows Subsystem for Linux
pub struct WslBridge {
    config: ToolchainConfig,
}

impl WslBridge {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    fn root(&self) -> &str {
        self.config.wsl_conda_root.trim_end_matches('/')
    }

    fn script(&self, script: String) -> CommandSpec {
        CommandSpec::new("wsl").args(["-e".to_string(), "bash".to_string(), "-lc".to_string(), script])
    }

    fn probe_executable(&self, path: &str) -> CommandSpec {
        self.script(format!("test -x {}", shell_word(path)))
    }
}

#[async_trait]
impl ProvisioningStrategy for WslBridge {
    fn context(&self) -> ExecContext {
        ExecContext::WslBridge
    }

    fn conda_executable(&self) -> String {
        format!("{}/bin/conda", self.root())
    }

    fn env_prefix(&self) -> String {
        format!("{}/envs/{}", self.root(), self.config.env_name)
    }

    fn tool_executable(&self) -> String {
        format!("{}/bin/{}", self.env_prefix(), self.config.tool_name)
    }

    fn conda(&self, args: &[String]) -> CommandSpec {
        let mut words = vec![shell_word(&self.conda_executable())];
        words.extend(args.iter().map(|a| shell_word(a)));
        self.script(words.join(" "))
    }

    fn in_environment(&self, program: &str, args: &[String]) -> CommandSpec {
        let mut all = vec![
            "run".to_string(),
            "-n".to_string(),
            self.config.env_name.clone(),
            program.to_string(),
        ];
        all.extend(args.iter().cloned());
        self.conda(&all)
    }

    fn activate_session(&self, _session: &mut EnvGuard) -> Result<()> {
        // Everything runs inside WSL, the host environment stays untouched.
        Ok(())
    }

    async fn runtime_present(&self, runner: &dyn ProcessRunner) -> bool {
        let spec = self.probe_executable(&self.conda_executable());
        matches!(runner.execute(&spec).await, Ok(result) if result.success())
    }

    async fn tool_present(&self, runner: &dyn ProcessRunner) -> bool {
        let spec = self.probe_executable(&self.tool_executable());
        matches!(runner.execute(&spec).await, Ok(result) if result.success())
    }

    async fn install_runtime(
        &self,
        runner: &dyn ProcessRunner,
        _downloader: &dyn Downloader,
    ) -> Result<()> {
        let root = shell_word(self.root());
        let installer = shell_word(&format!("{}/miniforge.sh", self.root()));
        let url = format!(
            "{}/Miniforge3-Linux-$(uname -m).sh",
            self.config.miniforge_base_url.trim_end_matches('/')
        );
        let script = format!(
            "mkdir -p {root} && curl -fsSL \"{url}\" -o {installer} && bash {installer} -b -u -p {root}; \
             status=$?; rm -f {installer}; exit $status"
        );
        runner.execute_checked(&self.script(script)).await?;
        Ok(())
    }

    fn build_commands(&self, source_dir: &Path) -> Vec<CommandSpec> {
        let source = self.translator().translate_path(source_dir);
        let prefix = self.env_prefix();
        let in_env = format!(
            "{} run -n {}",
            shell_word(&self.conda_executable()),
            shell_word(&self.config.env_name)
        );
        let script = format!(
            "cd {source} && export LDFLAGS=-Wl,-rpath,{lib} && \
             {in_env} ./configure --prefix={prefix} --enable-gmt-api && \
             {in_env} make && {in_env} make install",
            source = shell_word(&source),
            lib = shell_word(&format!("{}/lib", prefix)),
            prefix = shell_word(&prefix),
            in_env = in_env,
        );
        vec![self.script(script)]
    }
}

/// Quote one word for `bash -lc`, expanding a leading `~/` to `$HOME`
pub fn shell_word(word: &str) -> String {
    if let Some(rest) = word.strip_prefix("~/") {
        let escaped: String = rest
            .chars()
            .flat_map(|c| match c {
                '"' | '\\' | '$' | '`' => vec!['\\', c],
                c => vec![c],
            })
            .collect();
        return format!("\"$HOME/{}\"", escaped);
    }

    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}
