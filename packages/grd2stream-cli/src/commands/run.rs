use super::{load_config, provision_options, Skip};
use crate::cli::{RunArgs, ToolchainArgs};
use crate::exit_codes;
use crate::interactive::{ConsoleReporter, StdinPicker, StdinPrompt};
use crate::output;
use grd2stream_rs::geojson::{feature_collection, GeoJsonSink};
use grd2stream_rs::host::{pick_seed, FeatureSink, MemoryLayerStore};
use grd2stream_rs::{
    FlowlinePipeline, GridRef, HostServices, ParseMode, ProvisionOptions, RunParameters,
};
use std::path::Path;

pub fn build_parameters(args: &RunArgs) -> RunParameters {
    let mut params = RunParameters::new(
        GridRef::from_path(&args.grid1),
        GridRef::from_path(&args.grid2),
    )
    .with_backward(args.backward)
    .with_step_size(args.step_size)
    .with_max_integration_time(args.max_time)
    .with_max_steps(args.max_steps)
    .with_output_format(args.format);
    if let Some(seed) = args.seed {
        params = params.with_seed(seed);
    }
    params
}

pub async fn execute(args: RunArgs, toolchain: &ToolchainArgs) -> i32 {
    let config = match load_config(toolchain) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    for grid in [&args.grid1, &args.grid2] {
        if !Path::new(grid).exists() {
            log::warn!("{} is not a local file, passing it to grd2stream as is", grid);
        }
    }

    // Seed and parameter checks happen before anything is installed or spawned.
    let mut params = build_parameters(&args);
    if params.seed.is_none() && params.grid_1.source_uri != params.grid_2.source_uri {
        match pick_seed(&StdinPicker).await {
            Ok(seed) => params.seed = Some(seed),
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::INPUT_ERROR;
            }
        }
    }
    if let Err(e) = params.validate() {
        eprintln!("Error: {}", e);
        return exit_codes::for_error(&e);
    }

    let prompt = StdinPrompt::new(args.yes);
    let reporter = ConsoleReporter::new(args.quiet);

    let mut pipeline = FlowlinePipeline::new(config)
        .with_provisioning(!args.no_provision)
        .with_layer_name(args.name.clone());
    if args.strict {
        pipeline = pipeline.with_parse_mode(ParseMode::Strict);
    }
    if let Some(ref raw) = args.raw_output {
        pipeline = pipeline.with_output_file(raw);
    }
    if !args.no_provision {
        let options =
            provision_options(pipeline.manager(), &prompt, Skip::default(), args.max_retries)
                .await;
        pipeline = pipeline.with_options(options);
    } else {
        pipeline = pipeline.with_options(ProvisionOptions::check_only());
    }

    if !args.quiet {
        if let Some(seed) = params.seed {
            eprintln!("Tracing streamline from ({}, {})...", seed.x, seed.y);
        }
        eprintln!(
            "  Grids: {} / {}",
            params.grid_1.source_uri, params.grid_2.source_uri
        );
        eprintln!("  Format: {}", params.output_format);
    }

    let file_sink;
    let memory_sink;
    let sink: &dyn FeatureSink = match args.output {
        Some(ref path) => {
            file_sink = GeoJsonSink::new(path).compact(args.compact);
            &file_sink
        }
        None => {
            memory_sink = MemoryLayerStore::new();
            &memory_sink
        }
    };

    let host = HostServices {
        sink,
        reporter: &reporter,
        prompt: &prompt,
        picker: None,
    };

    let outcome = match pipeline.run(params, &host).await {
        Ok(outcome) => outcome,
        Err(e) => return exit_codes::for_error(&e),
    };

    if args.output.is_none() {
        let collection = feature_collection(&args.name, &outcome.dataset);
        if let Err(e) = output::print_json(&collection, args.compact) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else if !args.quiet {
        eprintln!("Results written to {}", outcome.layer_id);
    }

    exit_codes::SUCCESS
}
