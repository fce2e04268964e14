use crate::error::{FlowlineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A grid dataset selected by the host, identified by its source URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRef {
    pub name: String,
    pub source_uri: String,
}

impl GridRef {
    pub fn new(name: impl Into<String>, source_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_uri: source_uri.into(),
        }
    }

    /// Build a reference from a file path, naming it after the file stem
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("grid")
            .to_string();
        Self::new(name, path.to_string_lossy())
    }
}

/// Seed coordinate in the grid's coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedPoint {
    pub x: f64,
    pub y: f64,
}

impl SeedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl FromStr for SeedPoint {
    type Err = String;

    /// Accepts "x,y" or "x y"
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 2 {
            return Err(format!(
                "Invalid seed '{}': expected 'x,y' or 'x y'",
                s.trim()
            ));
        }
        let x = parts[0]
            .parse::<f64>()
            .map_err(|_| format!("Invalid seed '{}': '{}' is not a number", s.trim(), parts[0]))?;
        let y = parts[1]
            .parse::<f64>()
            .map_err(|_| format!("Invalid seed '{}': '{}' is not a number", s.trim(), parts[1]))?;
        Ok(Self::new(x, y))
    }
}

/// Output layout requested from grd2stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// x y dist
    #[default]
    Default,
    /// x y dist v_x v_y (`-l`)
    Extended,
    /// x y dist v_x v_y time (`-t`)
    ExtendedWithTime,
}

impl OutputFormat {
    /// Command-line flag selecting this format, if any
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Default => None,
            OutputFormat::Extended => Some("-l"),
            OutputFormat::ExtendedWithTime => Some("-t"),
        }
    }

    /// Column names used when the output carries no names directive
    pub fn fallback_fields(&self) -> &'static [&'static str] {
        match self {
            OutputFormat::Default => &["longitude", "latitude", "distance"],
            OutputFormat::Extended => &["longitude", "latitude", "distance", "v_x", "v_y"],
            OutputFormat::ExtendedWithTime => {
                &["longitude", "latitude", "distance", "v_x", "v_y", "time"]
            }
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "" => Ok(OutputFormat::Default),
            "extended" | "-l" | "l" => Ok(OutputFormat::Extended),
            "extended_with_time" | "extended-with-time" | "-t" | "t" => {
                Ok(OutputFormat::ExtendedWithTime)
            }
            other => Err(format!(
                "Unknown output format '{}'. Valid formats: default, extended, extended-with-time",
                other
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Default => "default",
            OutputFormat::Extended => "extended",
            OutputFormat::ExtendedWithTime => "extended_with_time",
        };
        f.write_str(name)
    }
}

/// Parameters of a single grd2stream run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParameters {
    pub grid_1: GridRef,
    pub grid_2: GridRef,
    pub seed: Option<SeedPoint>,
    pub backward: bool,
    pub step_size: Option<f64>,
    pub max_integration_time: Option<f64>,
    pub max_steps: Option<u64>,
    pub output_format: OutputFormat,
}

impl RunParameters {
    pub fn new(grid_1: GridRef, grid_2: GridRef) -> Self {
        Self {
            grid_1,
            grid_2,
            seed: None,
            backward: false,
            step_size: None,
            max_integration_time: None,
            max_steps: None,
            output_format: OutputFormat::Default,
        }
    }

    pub fn with_seed(mut self, seed: SeedPoint) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_backward(mut self, backward: bool) -> Self {
        self.backward = backward;
        self
    }

    pub fn with_step_size(mut self, step_size: Option<f64>) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn with_max_integration_time(mut self, max_time: Option<f64>) -> Self {
        self.max_integration_time = max_time;
        self
    }

    pub fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Reject parameter sets grd2stream must never see
    pub fn validate(&self) -> Result<()> {
        if self.grid_1.source_uri == self.grid_2.source_uri {
            return Err(FlowlineError::InvalidParameters(format!(
                "Please select two different grid layers (both are '{}')",
                self.grid_1.source_uri
            )));
        }

        let seed = self.seed.ok_or_else(|| {
            FlowlineError::InvalidParameters("A seed coordinate must be selected".to_string())
        })?;
        if !seed.is_finite() {
            return Err(FlowlineError::InvalidParameters(format!(
                "Seed coordinate ({}, {}) is not finite",
                seed.x, seed.y
            )));
        }

        check_positive("step size", self.step_size)?;
        check_positive("maximum integration time", self.max_integration_time)?;
        if self.max_steps == Some(0) {
            return Err(FlowlineError::InvalidParameters(
                "Maximum number of steps must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_positive(label: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 => Err(FlowlineError::InvalidParameters(format!(
            "The {} must be a positive number, got {}",
            label, v
        ))),
        _ => Ok(()),
    }
}

/// Captured outcome of one external process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// None when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a non-zero exit into `ExternalToolFailed`, keeping stderr verbatim
    pub fn into_checked(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(FlowlineError::ExternalToolFailed {
                code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// Attribute type of a parsed field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Double,
}

impl FieldType {
    /// Map a types-directive entry, unknown spellings fall back to string
    pub fn from_directive(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => FieldType::Integer,
            "double" | "float" | "real" => FieldType::Double,
            _ => FieldType::String,
        }
    }
}

/// Typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Double(f64),
    String(String),
    Null,
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            FieldValue::Integer(_) => Some(FieldType::Integer),
            FieldValue::Double(_) => Some(FieldType::Double),
            FieldValue::String(_) => Some(FieldType::String),
            FieldValue::Null => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Where a schema came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    Declared,
    Fallback(OutputFormat),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
    pub source: SchemaSource,
}

impl Schema {
    pub fn fallback(format: OutputFormat) -> Self {
        Self {
            fields: format
                .fallback_fields()
                .iter()
                .map(|name| Field::new(*name, FieldType::Double))
                .collect(),
            source: SchemaSource::Fallback(format),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_declared(&self) -> bool {
        self.source == SchemaSource::Declared
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// One output row: a point plus its attributes in schema order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamlineRecord {
    pub x: f64,
    pub y: f64,
    /// Index of the `>`-separated segment the row belongs to
    pub segment: usize,
    pub attributes: Vec<(String, FieldValue)>,
}

impl StreamlineRecord {
    pub fn attribute(&self, name: &str) -> Option<&FieldValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Result of one parse call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDataset {
    pub id: String,
    pub schema: Schema,
    pub records: Vec<StreamlineRecord>,
    /// Coordinate rows rejected by the tolerant parsing policy
    pub dropped_rows: usize,
    pub created_at: String,
}

impl ParsedDataset {
    pub fn new(schema: Schema, records: Vec<StreamlineRecord>, dropped_rows: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            schema,
            records,
            dropped_rows,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Some rows loaded, some dropped
    pub fn is_partial(&self) -> bool {
        !self.records.is_empty() && self.dropped_rows > 0
    }
}
