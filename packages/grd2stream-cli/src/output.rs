use grd2stream_rs::geojson::to_json;
use serde::Serialize;
use std::io::Write;

/// Print a value as JSON on stdout, one document per line when compact
pub fn print_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<(), String> {
    let json = to_json(value, compact).map_err(|e| e.to_string())?;
    let mut handle = std::io::stdout().lock();
    writeln!(handle, "{}", json).map_err(|e| format!("Failed to write to stdout: {}", e))
}
