use crate::cli::BatchArgs;
use crate::exit_codes;
use crate::output;
use grd2stream_rs::geojson::{feature_collection, write_json};
use grd2stream_rs::StreamlineParser;
use std::path::Path;
use std::time::Instant;

pub fn execute(args: BatchArgs) -> i32 {
    let files = match resolve_glob(&args.pattern) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if files.is_empty() {
        eprintln!("Error: No matching files found");
        return exit_codes::INPUT_ERROR;
    }

    if args.dry_run {
        for f in &files {
            println!("{}", f);
        }
        if !args.quiet {
            eprintln!("Found {} file(s)", files.len());
        }
        return exit_codes::SUCCESS;
    }

    if let Some(ref dir) = args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error: Failed to create output directory '{}': {}", dir, e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    let parser = StreamlineParser::new(args.format);
    let total = files.len();
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let start_time = Instant::now();

    for (i, file_path) in files.iter().enumerate() {
        if !args.quiet {
            eprintln!("[{}/{}] {}...", i + 1, total, file_path);
        }

        match convert_file(&parser, file_path, &args) {
            Ok(points) => {
                log::debug!("{}: {} points", file_path, points);
                succeeded += 1;
            }
            Err(msg) => {
                eprintln!("  Error: {}", msg);
                failed += 1;
                if !args.continue_on_error {
                    break;
                }
            }
        }
    }

    if !args.quiet {
        eprintln!(
            "Batch complete: {}/{} succeeded, {}/{} failed, {:.1}s",
            succeeded,
            total,
            failed,
            total,
            start_time.elapsed().as_secs_f64()
        );
    }

    if failed == 0 {
        exit_codes::SUCCESS
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

/// Parse one file and write its feature collection; returns the point count
fn convert_file(
    parser: &StreamlineParser,
    file_path: &str,
    args: &BatchArgs,
) -> Result<usize, String> {
    let dataset = parser
        .parse_file(Path::new(file_path))
        .map_err(|e| e.to_string())?;
    if dataset.is_empty() {
        return Err("no streamline points".to_string());
    }

    let stem = Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("streamline");
    let collection = feature_collection(stem, &dataset);

    match args.output_dir {
        Some(ref dir) => {
            let out_path = Path::new(dir).join(format!("{}.geojson", stem));
            write_json(&out_path, &collection, args.compact).map_err(|e| e.to_string())?;
        }
        // JSONL to stdout
        None => output::print_json(&collection, true)?,
    }
    Ok(dataset.len())
}

fn resolve_glob(pattern: &str) -> Result<Vec<String>, String> {
    let paths =
        glob::glob(pattern).map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<String> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    if let Some(s) = path.to_str() {
                        files.push(s.to_string());
                    }
                }
            }
            Err(e) => {
                eprintln!("Warning: glob error: {}", e);
            }
        }
    }
    files.sort();
    Ok(files)
}
