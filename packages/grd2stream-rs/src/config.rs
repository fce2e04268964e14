use crate::error::{FlowlineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONDA_ROOT_ENV: &str = "GRD2STREAM_CONDA_ROOT";
pub const ENV_NAME_ENV: &str = "GRD2STREAM_ENV";
pub const SOURCE_ARCHIVE_ENV: &str = "GRD2STREAM_SOURCE_ARCHIVE";
pub const BRIDGE_ENV: &str = "GRD2STREAM_BRIDGE";

const SOURCE_VERSION: &str = "0.2.14";

/// How grd2stream is executed on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// WSL on Windows when available, native otherwise
    #[default]
    Auto,
    Native,
    Wsl,
}

impl FromStr for BridgeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BridgeMode::Auto),
            "native" => Ok(BridgeMode::Native),
            "wsl" => Ok(BridgeMode::Wsl),
            other => Err(format!(
                "Unknown bridge mode '{}'. Valid modes: auto, native, wsl",
                other
            )),
        }
    }
}

impl fmt::Display for BridgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BridgeMode::Auto => "auto",
            BridgeMode::Native => "native",
            BridgeMode::Wsl => "wsl",
        })
    }
}

/// Where conda, the GMT environment and the grd2stream sources live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Conda install root on the host (native execution)
    pub conda_root: PathBuf,
    /// Conda install root inside WSL; a leading `~/` expands to the WSL user's home
    pub wsl_conda_root: String,
    pub env_name: String,
    pub tool_name: String,
    /// Package specs passed to `conda create`
    pub packages: Vec<String>,
    pub channel: String,
    /// Bundled grd2stream source tarball
    pub source_archive: PathBuf,
    /// Top-level directory inside the tarball
    pub source_dir_name: String,
    /// Fallback download location when the bundled tarball is missing
    pub source_url: Option<String>,
    pub miniforge_base_url: String,
    pub miniconda_windows_url: String,
    pub bridge: BridgeMode,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        let archive_name = format!("grd2stream-{}.tar.gz", SOURCE_VERSION);
        Self {
            conda_root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("miniconda3"),
            wsl_conda_root: "~/miniconda3".to_string(),
            env_name: "GMT6".to_string(),
            tool_name: "grd2stream".to_string(),
            packages: vec![
                "gmt=6*".to_string(),
                "gdal".to_string(),
                "hdf5".to_string(),
                "netcdf4".to_string(),
            ],
            channel: "conda-forge".to_string(),
            source_archive: executable_dir().join(&archive_name),
            source_dir_name: format!("grd2stream-{}", SOURCE_VERSION),
            source_url: Some(format!(
                "https://github.com/tkleiner/grd2stream/releases/download/v{}/{}",
                SOURCE_VERSION, archive_name
            )),
            miniforge_base_url: "https://github.com/conda-forge/miniforge/releases/latest/download"
                .to_string(),
            miniconda_windows_url:
                "https://repo.anaconda.com/miniconda/Miniconda3-latest-Windows-x86_64.exe"
                    .to_string(),
            bridge: BridgeMode::Auto,
        }
    }
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl ToolchainConfig {
    /// Defaults, then the optional JSON file, then `GRD2STREAM_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowlineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            FlowlineError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply overrides from a variable lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(CONDA_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.conda_root = PathBuf::from(root);
        }
        if let Some(name) = lookup(ENV_NAME_ENV).filter(|v| !v.is_empty()) {
            self.env_name = name;
        }
        if let Some(archive) = lookup(SOURCE_ARCHIVE_ENV).filter(|v| !v.is_empty()) {
            self.source_archive = PathBuf::from(archive);
        }
        if let Some(mode) = lookup(BRIDGE_ENV).filter(|v| !v.is_empty()) {
            self.bridge = mode.parse().map_err(FlowlineError::Config)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_gmt6_environment() {
        let config = ToolchainConfig::default();
        assert_eq!(config.env_name, "GMT6");
        assert_eq!(config.tool_name, "grd2stream");
        assert_eq!(config.packages, vec!["gmt=6*", "gdal", "hdf5", "netcdf4"]);
        assert!(config.conda_root.ends_with("miniconda3"));
        assert_eq!(config.source_dir_name, "grd2stream-0.2.14");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowline.json");
        std::fs::write(&path, r#"{ "env_name": "GMT6-test", "bridge": "native" }"#).unwrap();

        let config = ToolchainConfig::from_file(&path).unwrap();
        assert_eq!(config.env_name, "GMT6-test");
        assert_eq!(config.bridge, BridgeMode::Native);
        assert_eq!(config.tool_name, "grd2stream");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ToolchainConfig::from_file(&path),
            Err(FlowlineError::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (CONDA_ROOT_ENV, "/opt/conda"),
            (ENV_NAME_ENV, "gmt"),
            (BRIDGE_ENV, "wsl"),
        ]
        .into_iter()
        .collect();

        let mut config = ToolchainConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.conda_root, PathBuf::from("/opt/conda"));
        assert_eq!(config.env_name, "gmt");
        assert_eq!(config.bridge, BridgeMode::Wsl);
    }

    #[test]
    fn test_bad_bridge_override_is_rejected() {
        let mut config = ToolchainConfig::default();
        let result = config.apply_overrides(|k| (k == BRIDGE_ENV).then(|| "docker".to_string()));
        assert!(result.is_err());
    }
}
