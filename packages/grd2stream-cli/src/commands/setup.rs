use super::{load_config, provision_options, Skip};
use crate::cli::{SetupArgs, ToolchainArgs};
use crate::exit_codes;
use crate::interactive::StdinPrompt;
use crate::output;
use grd2stream_rs::{ProvisioningManager, ProvisioningState};

pub async fn execute(args: SetupArgs, toolchain: &ToolchainArgs) -> i32 {
    let config = match load_config(toolchain) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };
    let manager = ProvisioningManager::new(config);

    if args.check {
        let state = manager.probe().await;
        if let Err(e) = report(&state, args.json) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
        return if state.is_ready() {
            exit_codes::SUCCESS
        } else {
            exit_codes::PROVISIONING_ERROR
        };
    }

    let prompt = StdinPrompt::new(args.yes);
    let skip = Skip {
        runtime: args.skip_runtime,
        environment: args.skip_env,
        tool: args.skip_build,
    };
    let options = provision_options(&manager, &prompt, skip, args.max_retries).await;

    match manager.ensure_ready(&options, &prompt).await {
        Ok(state) => {
            if let Err(e) = report(&state, args.json) {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
            exit_codes::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::for_error(&e)
        }
    }
}

fn report(state: &ProvisioningState, json: bool) -> Result<(), String> {
    if json {
        return output::print_json(state, false);
    }

    let mark = |ok: bool| if ok { "ok" } else { "missing" };
    println!("conda runtime:      {}", mark(state.runtime_present));
    println!("GMT environment:    {}", mark(state.environment_present));
    println!("grd2stream binary:  {}", mark(state.tool_present));
    println!("verified:           {}", mark(state.tool_verified));
    if let Some(stage) = state.first_missing() {
        println!();
        println!("Next step: install the {}", stage);
    }
    Ok(())
}
