pub mod batch;
pub mod parse;
pub mod run;
pub mod setup;
pub mod status;

use crate::cli::ToolchainArgs;
use crate::interactive::StdinPrompt;
use grd2stream_rs::{ProvisionOptions, ProvisioningManager, Result, ToolchainConfig};
use std::path::{Path, PathBuf};

/// Defaults, config file, `GRD2STREAM_*` variables, then command-line flags
pub fn load_config(args: &ToolchainArgs) -> Result<ToolchainConfig> {
    let mut config = ToolchainConfig::load(args.config.as_deref().map(Path::new))?;
    if let Some(ref root) = args.conda_root {
        config.conda_root = PathBuf::from(root);
    }
    if let Some(ref name) = args.env_name {
        config.env_name = name.clone();
    }
    if let Some(bridge) = args.bridge {
        config.bridge = bridge;
    }
    Ok(config)
}

/// Stages the user refused up front
#[derive(Debug, Clone, Copy, Default)]
pub struct Skip {
    pub runtime: bool,
    pub environment: bool,
    pub tool: bool,
}

/// Ask before installing each missing stage
pub async fn provision_options(
    manager: &ProvisioningManager,
    prompt: &StdinPrompt,
    skip: Skip,
    max_retries: u32,
) -> ProvisionOptions {
    let state = manager.probe().await;
    let config = manager.config();
    let strategy = manager.strategy();

    let ask = |missing: bool, skipped: bool, question: String| {
        if !missing {
            true
        } else if skipped {
            false
        } else {
            prompt.confirm(&question)
        }
    };

    let install_runtime = ask(
        !state.runtime_present,
        skip.runtime,
        format!("conda was not found at {}. Install it?", strategy.conda_executable()),
    );
    let create_environment = install_runtime
        && ask(
            !state.environment_present,
            skip.environment,
            format!(
                "Create the conda environment '{}' with {}?",
                config.env_name,
                config.packages.join(" ")
            ),
        );
    let build_tool = create_environment
        && ask(
            !state.tool_present,
            skip.tool,
            format!("Build {} into {}?", config.tool_name, strategy.env_prefix()),
        );

    ProvisionOptions {
        install_runtime,
        create_environment,
        build_tool,
        max_verification_retries: max_retries,
    }
}
