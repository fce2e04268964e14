use super::load_config;
use crate::cli::{StatusArgs, ToolchainArgs};
use crate::exit_codes;
use crate::output;
use grd2stream_rs::{HostPlatform, ProvisioningManager, ProvisioningState};
use serde::Serialize;

#[derive(Serialize)]
struct StatusOutput {
    cli_version: String,
    platform: String,
    arch: String,
    exec_context: String,
    conda_executable: String,
    env_name: String,
    env_prefix: String,
    tool_executable: String,
    source_archive: String,
    source_archive_present: bool,
    state: ProvisioningState,
    ready: bool,
}

pub async fn execute(args: StatusArgs, toolchain: &ToolchainArgs) -> i32 {
    let config = match load_config(toolchain) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };
    let manager = ProvisioningManager::new(config);
    let strategy = manager.strategy();
    let state = manager.probe().await;

    let status = StatusOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        platform: HostPlatform::current().to_string(),
        arch: std::env::consts::ARCH.to_string(),
        exec_context: strategy.context().to_string(),
        conda_executable: strategy.conda_executable(),
        env_name: manager.config().env_name.clone(),
        env_prefix: strategy.env_prefix(),
        tool_executable: strategy.tool_executable(),
        source_archive: manager.config().source_archive.display().to_string(),
        source_archive_present: manager.config().source_archive.is_file(),
        state,
        ready: state.is_ready(),
    };

    if args.json {
        if let Err(e) = output::print_json(&status, false) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!("flowline CLI v{}", status.cli_version);
        println!("Platform: {} ({})", status.platform, status.arch);
        println!("Execution: {}", status.exec_context);
        println!();
        println!("conda:       {}", status.conda_executable);
        println!("environment: {} ({})", status.env_name, status.env_prefix);
        println!("grd2stream:  {}", status.tool_executable);
        println!(
            "sources:     {}{}",
            status.source_archive,
            if status.source_archive_present { "" } else { " (not found, will download)" }
        );
        println!();
        match state.first_missing() {
            None => println!("Ready"),
            Some(stage) => println!("Not ready: {} missing", stage),
        }
    }

    exit_codes::SUCCESS
}
