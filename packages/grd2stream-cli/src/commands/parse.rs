use crate::cli::ParseArgs;
use crate::exit_codes;
use crate::output;
use grd2stream_rs::geojson::{feature_collection, GeoJsonSink};
use grd2stream_rs::host::FeatureSink;
use grd2stream_rs::pipeline::DEFAULT_LAYER_NAME;
use grd2stream_rs::{ParseMode, ParsedDataset, Result, StreamlineParser};
use std::io::Read;
use std::path::Path;

pub fn execute(args: ParseArgs) -> i32 {
    let parser = StreamlineParser::new(args.format).with_mode(if args.strict {
        ParseMode::Strict
    } else {
        ParseMode::Tolerant
    });

    let dataset = match read_dataset(&parser, &args.input) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    if dataset.is_empty() {
        eprintln!("Error: No streamline points found in {}", args.input);
        return exit_codes::EXECUTION_ERROR;
    }
    if dataset.is_partial() && !args.quiet {
        eprintln!(
            "Warning: skipped {} malformed row(s)",
            dataset.dropped_rows
        );
    }

    let name = layer_name(&args);
    match args.output {
        Some(ref path) => {
            let sink = GeoJsonSink::new(path).compact(args.compact);
            match sink.load(&name, &dataset) {
                Ok(written) => {
                    if !args.quiet {
                        eprintln!("{} points written to {}", dataset.len(), written);
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
        }
        None => {
            let collection = feature_collection(&name, &dataset);
            if let Err(e) = output::print_json(&collection, args.compact) {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    }

    exit_codes::SUCCESS
}

fn read_dataset(parser: &StreamlineParser, input: &str) -> Result<ParsedDataset> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return parser.parse_checked(&text);
    }
    parser.parse_file(Path::new(input))
}

fn layer_name(args: &ParseArgs) -> String {
    if let Some(ref name) = args.name {
        return name.clone();
    }
    Path::new(&args.input)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| *s != "-")
        .unwrap_or(DEFAULT_LAYER_NAME)
        .to_string()
}
