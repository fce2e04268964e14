use crate::error::{FlowlineError, Result};
use crate::host::FeatureSink;
use crate::types::ParsedDataset;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// Render a dataset as a GeoJSON FeatureCollection of points
///
/// The schema travels along as a foreign member so typed empty values survive.
pub fn feature_collection(name: &str, dataset: &ParsedDataset) -> Value {
    let features: Vec<Value> = dataset
        .records
        .iter()
        .map(|record| {
            let mut properties = Map::new();
            for (key, value) in &record.attributes {
                properties.insert(key.clone(), json!(value));
            }
            // A declared attribute of the same name wins over the segment index.
            properties
                .entry("segment")
                .or_insert_with(|| json!(record.segment));
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [record.x, record.y],
                },
                "properties": properties,
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "name": name,
        "id": dataset.id,
        "created_at": dataset.created_at,
        "fields": dataset.schema.fields,
        "dropped_rows": dataset.dropped_rows,
        "features": features,
    })
}

/// Writes each loaded layer to a `.geojson` file
///
/// When the target is a directory every load gets its own file named after
/// the layer, otherwise the target file is written.
#[derive(Debug, Clone)]
pub struct GeoJsonSink {
    target: PathBuf,
    compact: bool,
}

impl GeoJsonSink {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            compact: false,
        }
    }

    pub fn compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    fn file_for(&self, layer_name: &str, dataset: &ParsedDataset) -> PathBuf {
        if !self.target.is_dir() {
            return self.target.clone();
        }
        let stem: String = layer_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let short_id: String = dataset.id.chars().take(8).collect();
        self.target.join(format!("{}_{}.geojson", stem, short_id))
    }
}

impl FeatureSink for GeoJsonSink {
    fn load(&self, layer_name: &str, dataset: &ParsedDataset) -> Result<String> {
        if dataset.is_empty() {
            return Err(FlowlineError::OutputMalformed(format!(
                "'{}' has no features",
                layer_name
            )));
        }

        let path = self.file_for(layer_name, dataset);
        write_json(&path, &feature_collection(layer_name, dataset), self.compact)?;
        log::info!("Wrote {} features to {}", dataset.len(), path.display());
        Ok(path.display().to_string())
    }
}

pub fn write_json(path: &Path, value: &Value, compact: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_json(value, compact)?)?;
    Ok(())
}

/// Serialize a value to JSON (pretty or compact)
pub fn to_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<String> {
    if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
    .map_err(|e| FlowlineError::OutputMalformed(format!("JSON serialization failed: {}", e)))
}
