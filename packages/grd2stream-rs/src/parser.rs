use crate::error::{FlowlineError, Result};
use crate::mmap_utils::mmap_file;
use crate::types::{
    Field, FieldType, FieldValue, OutputFormat, ParsedDataset, Schema, SchemaSource,
    StreamlineRecord,
};
use std::path::Path;

/// What to do with coordinate rows that cannot be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Drop them and count them in `dropped_rows`
    #[default]
    Tolerant,
    /// Fail the parse with `OutputMalformed`
    Strict,
}

/// Parser for grd2stream text output
///
/// Understands plain whitespace-separated rows as well as the OGR-GMT header
/// directives (`# @N` names, `# @T` types, `# @D` values) and `>` segment
/// separators. Every call starts from an empty schema.
#[derive(Debug, Clone, Copy)]
pub struct StreamlineParser {
    format: OutputFormat,
    mode: ParseMode,
}

#[derive(Debug, Clone, PartialEq)]
enum Directive {
    Names(Vec<String>),
    Types(Vec<String>),
    Data(Vec<String>),
    Other,
}

impl StreamlineParser {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            mode: ParseMode::Tolerant,
        }
    }

    pub fn with_mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Parse captured output, dropping unusable rows
    pub fn parse(&self, text: &str) -> ParsedDataset {
        let schema = self.derive_schema(text);

        let mut records = Vec::new();
        let mut dropped = 0;
        let mut segment = 0;
        let mut rows_in_segment = 0;
        let mut active_data: Option<Vec<String>> = None;

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('>') {
                if rows_in_segment > 0 {
                    segment += 1;
                    rows_in_segment = 0;
                }
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                for directive in directives(comment) {
                    if let Directive::Data(values) = directive {
                        active_data = Some(values);
                    }
                }
                continue;
            }

            rows_in_segment += 1;
            let fields: Vec<&str> = line.split_whitespace().collect();
            match parse_row(&fields, &schema, active_data.as_deref()) {
                Some((x, y, attributes)) => records.push(StreamlineRecord {
                    x,
                    y,
                    segment,
                    attributes,
                }),
                None => {
                    dropped += 1;
                    log::debug!("Dropping line {}: {}", line_no + 1, line);
                }
            }
        }

        if dropped > 0 {
            log::warn!(
                "Parsed {} streamline points, dropped {} malformed rows",
                records.len(),
                dropped
            );
        } else {
            log::debug!("Parsed {} streamline points", records.len());
        }

        ParsedDataset::new(schema, records, dropped)
    }

    /// Parse and apply the configured mode
    pub fn parse_checked(&self, text: &str) -> Result<ParsedDataset> {
        let dataset = self.parse(text);
        if self.mode == ParseMode::Strict && dataset.dropped_rows > 0 {
            return Err(FlowlineError::OutputMalformed(format!(
                "{} rows could not be parsed",
                dataset.dropped_rows
            )));
        }
        Ok(dataset)
    }

    /// Parse an output file written by grd2stream
    pub fn parse_file(&self, path: &Path) -> Result<ParsedDataset> {
        match mmap_file(path)? {
            None => self.parse_checked(""),
            Some(map) => self.parse_checked(&String::from_utf8_lossy(&map)),
        }
    }

    /// First pass: the first names and types directives define the schema
    fn derive_schema(&self, text: &str) -> Schema {
        let mut names: Option<Vec<String>> = None;
        let mut types: Option<Vec<String>> = None;

        for line in text.lines() {
            let Some(comment) = line.trim().strip_prefix('#') else {
                continue;
            };
            for directive in directives(comment) {
                match directive {
                    Directive::Names(n) if names.is_none() => names = Some(n),
                    Directive::Names(_) => log::warn!("Ignoring repeated names directive"),
                    Directive::Types(t) if types.is_none() => types = Some(t),
                    Directive::Types(_) => log::warn!("Ignoring repeated types directive"),
                    _ => {}
                }
            }
        }

        match names {
            Some(names) if !names.is_empty() => {
                let types = types.unwrap_or_default();
                let fields = names
                    .into_iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let field_type = types
                            .get(i)
                            .map(|t| FieldType::from_directive(t))
                            .unwrap_or(FieldType::String);
                        Field::new(name, field_type)
                    })
                    .collect();
                Schema {
                    fields,
                    source: SchemaSource::Declared,
                }
            }
            _ => {
                if types.is_some() {
                    log::debug!("Types directive without names, using the fallback schema");
                }
                Schema::fallback(self.format)
            }
        }
    }
}

type Row = (f64, f64, Vec<(String, FieldValue)>);

fn parse_row(fields: &[&str], schema: &Schema, data: Option<&[String]>) -> Option<Row> {
    let x = parse_finite(fields.first()?)?;
    let y = parse_finite(fields.get(1)?)?;

    let attributes = match (schema.source, data) {
        (SchemaSource::Declared, Some(values)) => schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let value = values
                    .get(i)
                    .filter(|v| !v.is_empty())
                    .and_then(|v| convert(v, field.field_type))
                    .unwrap_or(FieldValue::Null);
                (field.name.clone(), value)
            })
            .collect(),
        // Fallback columns start with x/y themselves (longitude, latitude, ...).
        (SchemaSource::Fallback(_), _) => {
            if fields.len() < schema.len().max(2) {
                return None;
            }
            columns_to_attributes(schema, fields)?
        }
        // Declared attributes follow the geometry.
        (SchemaSource::Declared, None) => {
            if fields.len() < 2 + schema.len() {
                return None;
            }
            columns_to_attributes(schema, &fields[2..])?
        }
    };

    Some((x, y, attributes))
}

fn columns_to_attributes(schema: &Schema, columns: &[&str]) -> Option<Vec<(String, FieldValue)>> {
    schema
        .fields
        .iter()
        .zip(columns)
        .map(|(field, raw)| Some((field.name.clone(), convert(raw, field.field_type)?)))
        .collect()
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn convert(raw: &str, field_type: FieldType) -> Option<FieldValue> {
    match field_type {
        FieldType::String => Some(FieldValue::String(raw.to_string())),
        FieldType::Integer => raw.parse::<i64>().ok().map(FieldValue::Integer),
        FieldType::Double => parse_finite(raw).map(FieldValue::Double),
    }
}

/// Directives in the text after a leading `#`
///
/// Several may share a line (`# @VGMT1.0 @GPOINT @Nname|id`), and the space
/// after the key letter is optional. An `@` only starts a directive at the
/// beginning of a token and outside double quotes.
fn directives(comment: &str) -> Vec<Directive> {
    let mut starts = Vec::new();
    let mut in_quotes = false;
    let mut prev: Option<char> = None;
    let mut chars = comment.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '@' if !in_quotes && prev.map_or(true, char::is_whitespace) => {
                if let Some((_, key)) = chars.peek() {
                    if key.is_ascii_alphabetic() {
                        starts.push(i);
                    }
                }
            }
            _ => {}
        }
        prev = Some(c);
    }

    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(comment.len());
            let key = comment.as_bytes()[start + 1];
            let value = comment[start + 2..end].trim();
            match key {
                b'N' => Directive::Names(split_values(value)),
                b'T' => Directive::Types(split_values(value)),
                b'D' => Directive::Data(split_values(value)),
                _ => Directive::Other,
            }
        })
        .collect()
}

/// Split a pipe-delimited directive value, stripping double quotes
fn split_values(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }

    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in value.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '|' if !in_quotes => values.push(std::mem::take(&mut current).trim().to_string()),
            c => current.push(c),
        }
    }
    values.push(current.trim().to_string());
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_rows() {
        let output = "12.5 48.3 0\n12.6 48.4 200\n12.7 48.5 400\n";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.dropped_rows, 0);
        assert_eq!(dataset.schema.names(), vec!["longitude", "latitude", "distance"]);
        let first = &dataset.records[0];
        assert_eq!((first.x, first.y), (12.5, 48.3));
        assert_eq!(first.attribute("distance"), Some(&FieldValue::Double(0.0)));
        assert_eq!(
            dataset.records[2].attribute("longitude"),
            Some(&FieldValue::Double(12.7))
        );
    }

    #[test]
    fn test_short_row_dropped() {
        let output = "\
1 2 3 4 5 6
1.1 2.1 3 4 5 6
1 2 3 4
1.2 2.2 3 4 5 6
";
        let dataset = StreamlineParser::new(OutputFormat::ExtendedWithTime).parse(output);
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.dropped_rows, 1);
        assert!(dataset.is_partial());
        assert!(dataset.records.iter().all(|r| r.attributes.len() == 6));
        assert_eq!(
            dataset.records[2].attribute("time"),
            Some(&FieldValue::Double(6.0))
        );
    }

    #[test]
    fn test_declared_schema_overrides_fallback() {
        let output = "\
# @VGMT1.0 @GPOINT
# @Nname|id
# @Tstring|integer
# @D\"Flowline A\"|7
12.5 48.3
12.6 48.4
";
        let dataset = StreamlineParser::new(OutputFormat::Extended).parse(output);
        assert!(dataset.schema.is_declared());
        assert_eq!(
            dataset.schema.fields,
            vec![
                Field::new("name", FieldType::String),
                Field::new("id", FieldType::Integer)
            ]
        );
        assert_eq!(dataset.len(), 2);
        for record in &dataset.records {
            assert_eq!(
                record.attribute("name"),
                Some(&FieldValue::String("Flowline A".to_string()))
            );
            assert_eq!(record.attribute("id"), Some(&FieldValue::Integer(7)));
        }
    }

    #[test]
    fn test_directives_with_space_after_key() {
        let output = "# @N name|id\n# @T string|integer\n# @D a|1\n0 0\n";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);
        assert_eq!(dataset.schema.names(), vec!["name", "id"]);
        assert_eq!(
            dataset.records[0].attribute("id"),
            Some(&FieldValue::Integer(1))
        );
    }

    #[test]
    fn test_declared_schema_from_columns() {
        let output = "\
# @Ndist|speed|time
# @Tdouble|double|double
10 20 0 1.5 0
11 21 250 2.5 100
12 22 500 3.5 200
13 23 750
";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.dropped_rows, 1);
        for record in &dataset.records {
            assert_eq!(record.attributes.len(), 3);
            assert!(record
                .attributes
                .iter()
                .all(|(_, v)| v.field_type() == Some(FieldType::Double)));
        }
        let second = &dataset.records[1];
        assert_eq!((second.x, second.y), (11.0, 21.0));
        assert_eq!(second.attribute("dist").and_then(FieldValue::as_f64), Some(250.0));
        assert_eq!(second.attribute("speed").and_then(FieldValue::as_f64), Some(2.5));
    }

    #[test]
    fn test_declared_columns_follow_geometry() {
        let output = "# @Nname|id\n# @Tstring|integer\n12.5 48.3 A 7\n12.6 48.4\n";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.dropped_rows, 1);
        let record = &dataset.records[0];
        assert_eq!((record.x, record.y), (12.5, 48.3));
        assert_eq!(
            record.attribute("name"),
            Some(&FieldValue::String("A".to_string()))
        );
        assert_eq!(record.attribute("id"), Some(&FieldValue::Integer(7)));
    }

    #[test]
    fn test_schema_applies_to_rows_before_directives() {
        let output = "1 2 x\n# @Nlabel\n# @Tstring\n3 4 y\n";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);
        assert_eq!(dataset.len(), 2);
        assert_eq!(
            dataset.records[0].attribute("label"),
            Some(&FieldValue::String("x".to_string()))
        );
    }

    #[test]
    fn test_first_names_directive_wins() {
        let output = "# @Nfirst\n1 2 a\n# @Nsecond\n3 4 b\n";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);
        assert_eq!(dataset.schema.names(), vec!["first"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.schema.fields[0].field_type, FieldType::String);
    }

    #[test]
    fn test_missing_and_unknown_types_default_to_string() {
        let output = "# @Na|b|c\n# @Tinteger|blob\n";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);
        let types: Vec<FieldType> = dataset.schema.fields.iter().map(|f| f.field_type).collect();
        assert_eq!(types, vec![FieldType::Integer, FieldType::String, FieldType::String]);
    }

    #[test]
    fn test_segments() {
        let output = "> first\n1 2 0\n2 3 10\n>\n5 6 0\n>\n>\n7 8 0\n";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);
        let segments: Vec<usize> = dataset.records.iter().map(|r| r.segment).collect();
        assert_eq!(segments, vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_data_directive_per_segment() {
        let output = "\
# @Nname
# @Tstring
>
# @D\"up\"
0 0
>
# @D\"down\"
1 1
";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);
        let names: Vec<&str> = dataset
            .records
            .iter()
            .filter_map(|r| r.attribute("name").and_then(FieldValue::as_str))
            .collect();
        assert_eq!(names, vec!["up", "down"]);
    }

    #[test]
    fn test_quoted_pipe_and_empty_values() {
        let output = "# @Nlabel|id|score\n# @Tstring|integer|double\n# @D\"a|b\"||oops\n1 1\n";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);
        let record = &dataset.records[0];
        assert_eq!(
            record.attribute("label"),
            Some(&FieldValue::String("a|b".to_string()))
        );
        assert_eq!(record.attribute("id"), Some(&FieldValue::Null));
        assert_eq!(record.attribute("score"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_at_sign_inside_quotes_is_not_a_directive() {
        let found = directives(" @D\"user @Nfake\"|3");
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0],
            Directive::Data(vec!["user @Nfake".to_string(), "3".to_string()])
        );
    }

    #[test]
    fn test_zero_data_lines_is_empty_not_error() {
        let parser = StreamlineParser::new(OutputFormat::Default).with_mode(ParseMode::Strict);
        let dataset = parser.parse_checked("# grd2stream\n\n# @Nname\n>\n").unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.dropped_rows, 0);
        assert!(parser.parse_checked("").unwrap().is_empty());
    }

    #[test]
    fn test_non_numeric_rows_dropped() {
        let output = "1 2 3\nNaN 2 3\nfoo bar baz\n4 5 six\n";
        let dataset = StreamlineParser::new(OutputFormat::Default).parse(output);
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.dropped_rows, 3);
    }

    #[test]
    fn test_strict_mode_rejects_dropped_rows() {
        let parser = StreamlineParser::new(OutputFormat::Default).with_mode(ParseMode::Strict);
        let err = parser.parse_checked("1 2 3\n1 2\n").unwrap_err();
        assert!(matches!(err, FlowlineError::OutputMalformed(_)));

        let tolerant = StreamlineParser::new(OutputFormat::Default);
        assert_eq!(tolerant.parse_checked("1 2 3\n1 2\n").unwrap().len(), 1);
    }

    #[test]
    fn test_each_parse_starts_fresh() {
        let parser = StreamlineParser::new(OutputFormat::Default);
        let declared = parser.parse("# @Nname\n# @D\"x\"\n1 2\n");
        let plain = parser.parse("1 2 3\n");
        assert!(declared.schema.is_declared());
        assert!(!plain.schema.is_declared());
        assert_eq!(plain.len(), 1);
        assert_ne!(declared.id, plain.id);
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowline.txt");
        std::fs::write(&path, "1 2 3\r\n4 5 6\r\n").unwrap();
        let dataset = StreamlineParser::new(OutputFormat::Default)
            .parse_file(&path)
            .unwrap();
        assert_eq!(dataset.len(), 2);

        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "").unwrap();
        assert!(StreamlineParser::new(OutputFormat::Default)
            .parse_file(&empty)
            .unwrap()
            .is_empty());
    }
}
