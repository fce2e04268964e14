use crate::config::BridgeMode;
use crate::path_translator::PathTranslator;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPlatform {
    Linux,
    MacOs,
    Windows,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            HostPlatform::Windows
        } else if cfg!(target_os = "macos") {
            HostPlatform::MacOs
        } else {
            HostPlatform::Linux
        }
    }

    pub fn exe_suffix(&self) -> &'static str {
        match self {
            HostPlatform::Windows => ".exe",
            _ => "",
        }
    }

    /// Platform part of the Miniforge installer name
    pub fn miniforge_os(&self) -> &'static str {
        match self {
            HostPlatform::MacOs => "MacOSX",
            HostPlatform::Windows => "Windows",
            HostPlatform::Linux => "Linux",
        }
    }

    /// Architecture part of the Miniforge installer name, as `uname -m` reports it
    pub fn miniforge_arch(&self) -> &'static str {
        match (self, std::env::consts::ARCH) {
            (HostPlatform::MacOs, "aarch64") => "arm64",
            (_, "aarch64") => "aarch64",
            (_, "powerpc64") => "ppc64le",
            _ => "x86_64",
        }
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostPlatform::Linux => "linux",
            HostPlatform::MacOs => "macos",
            HostPlatform::Windows => "windows",
        })
    }
}

/// Where grd2stream actually runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecContext {
    Native(HostPlatform),
    /// Windows host, tool runs inside the Linux subsystem
    WslBridge,
}

impl ExecContext {
    /// Pick the execution context from the configured mode and what the host offers
    pub fn detect(mode: BridgeMode) -> Self {
        Self::resolve(mode, HostPlatform::current(), wsl_available())
    }

    pub fn resolve(mode: BridgeMode, host: HostPlatform, has_wsl: bool) -> Self {
        match (mode, host) {
            (BridgeMode::Native, host) => ExecContext::Native(host),
            (BridgeMode::Wsl, HostPlatform::Windows) => ExecContext::WslBridge,
            (BridgeMode::Wsl, host) => {
                log::warn!("WSL bridging requested on {}, running natively", host);
                ExecContext::Native(host)
            }
            (BridgeMode::Auto, HostPlatform::Windows) if has_wsl => ExecContext::WslBridge,
            (BridgeMode::Auto, host) => ExecContext::Native(host),
        }
    }

    pub fn translator(&self) -> PathTranslator {
        match self {
            ExecContext::Native(_) => PathTranslator::Identity,
            ExecContext::WslBridge => PathTranslator::WslMount,
        }
    }
}

impl fmt::Display for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecContext::Native(host) => write!(f, "native ({})", host),
            ExecContext::WslBridge => f.write_str("wsl bridge"),
        }
    }
}

fn wsl_available() -> bool {
    cfg!(target_os = "windows") && which::which("wsl").is_ok()
}
