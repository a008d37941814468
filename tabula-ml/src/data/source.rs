//! Dataset sources: resolve an opaque dataset id to a [`RawDataset`].

use crate::data::frame::{Cell, RawDataset};
use crate::error::MlError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tokens read as missing values.
const NA_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "<NA>",
];

/// Provides raw datasets by identifier.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Load the dataset with the given id.
    async fn load(&self, dataset_id: &str) -> Result<RawDataset, MlError>;

    /// Raw bytes of the dataset, for blob upload. `None` when the source has no file form.
    async fn read_bytes(&self, _dataset_id: &str) -> Result<Option<Vec<u8>>, MlError> {
        Ok(None)
    }

    /// Human-readable location of this source.
    fn describe(&self) -> String;
}

/// How a file's text is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Delimited(char),
    /// A JSON array of records.
    JsonRecords,
}

impl FileFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("tsv") | Some("tab") => FileFormat::Delimited('\t'),
            Some("json") => FileFormat::JsonRecords,
            _ => FileFormat::Delimited(','),
        }
    }
}

/// A single tabular file: delimited text or JSON records.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub format: FileFormat,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = FileFormat::for_path(&path);
        Self { path, format }
    }

    pub async fn read(&self) -> Result<RawDataset, MlError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let dataset = match self.format {
            FileFormat::Delimited(delimiter) => parse_delimited(&content, delimiter)?,
            FileFormat::JsonRecords => parse_json_records(&content)?,
        };
        debug!(
            path = %self.path.display(),
            format = ?self.format,
            rows = dataset.n_rows(),
            columns = dataset.n_cols(),
            "Loaded dataset file"
        );
        Ok(dataset)
    }
}

/// Resolves `<root>/<id>.csv` (or `.tsv`, `.json`, or `<root>/<id>` when it already names a file).
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, dataset_id: &str) -> Result<PathBuf, MlError> {
        if dataset_id.contains("..") || dataset_id.contains('/') || dataset_id.contains('\\') {
            return Err(MlError::dataset(format!("invalid dataset id '{}'", dataset_id)));
        }
        let candidates = [
            self.root.join(format!("{}.csv", dataset_id)),
            self.root.join(format!("{}.tsv", dataset_id)),
            self.root.join(format!("{}.json", dataset_id)),
            self.root.join(dataset_id),
        ];
        candidates
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| {
                MlError::dataset(format!(
                    "dataset '{}' not found in {}",
                    dataset_id,
                    self.root.display()
                ))
            })
    }
}

#[async_trait]
impl DatasetSource for DirectorySource {
    async fn load(&self, dataset_id: &str) -> Result<RawDataset, MlError> {
        CsvSource::new(self.resolve(dataset_id)?).read().await
    }

    async fn read_bytes(&self, dataset_id: &str) -> Result<Option<Vec<u8>>, MlError> {
        let path = self.resolve(dataset_id)?;
        Ok(Some(tokio::fs::read(path).await?))
    }

    fn describe(&self) -> String {
        format!("directory:{}", self.root.display())
    }
}

/// Datasets held in memory, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    datasets: HashMap<String, RawDataset>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, dataset_id: impl Into<String>, dataset: RawDataset) -> Self {
        self.datasets.insert(dataset_id.into(), dataset);
        self
    }
}

#[async_trait]
impl DatasetSource for InMemorySource {
    async fn load(&self, dataset_id: &str) -> Result<RawDataset, MlError> {
        self.datasets
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| MlError::dataset(format!("dataset '{}' not found", dataset_id)))
    }

    fn describe(&self) -> String {
        format!("memory:{} datasets", self.datasets.len())
    }
}

/// Parse delimited text into a raw dataset. The first record is the header.
pub fn parse_delimited(content: &str, delimiter: char) -> Result<RawDataset, MlError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = split_records(content, delimiter).into_iter();
    let header = records
        .next()
        .ok_or_else(|| MlError::dataset("Empty CSV file"))?;
    let headers = dedupe_headers(header.into_iter().map(|h| h.trim().to_string()).collect());

    let rows = records
        .filter(|record| !(record.len() == 1 && record[0].trim().is_empty()))
        .map(|record| record.iter().map(|field| typed_cell(field)).collect())
        .collect();
    Ok(RawDataset::from_rows(headers, rows))
}

/// Parse a JSON array of objects. Columns follow first appearance across
/// records; keys missing from a record read as null.
pub fn parse_json_records(content: &str) -> Result<RawDataset, MlError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let value: Value = serde_json::from_str(content)
        .map_err(|e| MlError::dataset(format!("Invalid JSON dataset: {}", e)))?;
    let Value::Array(items) = value else {
        return Err(MlError::dataset("JSON dataset must be an array of records"));
    };
    if items.is_empty() {
        return Err(MlError::dataset("Empty JSON dataset"));
    }

    let mut headers: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let Value::Object(map) = item else {
            return Err(MlError::dataset(format!("JSON record {} is not an object", i)));
        };
        for key in map.keys() {
            if !positions.contains_key(key) {
                positions.insert(key.clone(), headers.len());
                headers.push(key.clone());
            }
        }
        records.push(map);
    }

    let rows = records
        .into_iter()
        .map(|map| {
            let mut row = vec![Cell::Null; headers.len()];
            for (key, value) in map {
                if let Some(&pos) = positions.get(&key) {
                    row[pos] = json_cell(value);
                }
            }
            row
        })
        .collect();
    Ok(RawDataset::from_rows(headers, rows))
}

fn json_cell(value: Value) -> Cell {
    match value {
        Value::Null => Cell::Null,
        Value::Bool(b) => Cell::Bool(b),
        Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Null),
        Value::String(s) if NA_TOKENS.contains(&s.trim()) => Cell::Null,
        Value::String(s) => Cell::Text(s),
        nested => Cell::Text(nested.to_string()),
    }
}

/// Split text into records of fields, honoring double-quoted fields with
/// embedded delimiters, newlines and `""` escapes.
fn split_records(content: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            c if c == delimiter => record.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

/// Rename repeated headers `a, a` to `a, a.1`.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if h.is_empty() { format!("Unnamed: {}", i) } else { h };
            let count = seen.entry(h.clone()).or_insert(0);
            let name = if *count == 0 { h.clone() } else { format!("{}.{}", h, count) };
            *count += 1;
            name
        })
        .collect()
}

/// Type a field: missing token, boolean, number, or text.
pub fn typed_cell(field: &str) -> Cell {
    let trimmed = field.trim();
    if NA_TOKENS.contains(&trimmed) {
        return Cell::Null;
    }
    match trimmed {
        "true" | "True" | "TRUE" => return Cell::Bool(true),
        "false" | "False" | "FALSE" => return Cell::Bool(false),
        _ => {}
    }
    match trimmed.parse::<f64>() {
        Ok(v) => Cell::Number(v),
        Err(_) => Cell::Text(field.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_typed_cells() {
        assert_eq!(typed_cell(""), Cell::Null);
        assert_eq!(typed_cell("N/A"), Cell::Null);
        assert_eq!(typed_cell(" 12.5 "), Cell::Number(12.5));
        assert_eq!(typed_cell("TRUE"), Cell::Bool(true));
        assert_eq!(typed_cell("$1,200"), Cell::text("$1,200"));
        assert_eq!(typed_cell(" padded "), Cell::text(" padded "));
    }

    #[test]
    fn test_quoted_fields() {
        let raw = parse_delimited(
            "name,amount,note\n\"Smith, J\",\"1,200\",\"said \"\"hi\"\"\"\nDoe,5,\"two\nlines\"\n",
            ',',
        )
        .unwrap();
        assert_eq!(raw.n_rows(), 2);
        assert_eq!(raw.column("name").unwrap().cells[0], Cell::text("Smith, J"));
        assert_eq!(raw.column("amount").unwrap().cells[0], Cell::text("1,200"));
        assert_eq!(raw.column("amount").unwrap().cells[1], Cell::Number(5.0));
        assert_eq!(raw.column("note").unwrap().cells[0], Cell::text("said \"hi\""));
        assert_eq!(raw.column("note").unwrap().cells[1], Cell::text("two\nlines"));
    }

    #[test]
    fn test_crlf_bom_and_blank_lines() {
        let raw = parse_delimited("\u{feff}a,b\r\n1,2\r\n\r\n3,4\r\n", ',').unwrap();
        assert_eq!(raw.column_names(), vec!["a", "b"]);
        assert_eq!(raw.n_rows(), 2);
    }

    #[test]
    fn test_duplicate_headers() {
        let raw = parse_delimited("a,a,,a\n1,2,3,4\n", ',').unwrap();
        assert_eq!(raw.column_names(), vec!["a", "a.1", "Unnamed: 2", "a.2"]);
    }

    #[test]
    fn test_empty_file_errors() {
        assert!(parse_delimited("", ',').is_err());
    }

    #[tokio::test]
    async fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sales.csv"), "Date,Revenue\n2024-01-01,10\n").unwrap();
        std::fs::write(dir.path().join("costs.tsv"), "Date\tCost\n2024-01-01\t4\n").unwrap();

        let source = DirectorySource::new(dir.path());
        let sales = source.load("sales").await.unwrap();
        assert_eq!(sales.column("Revenue").unwrap().cells[0], Cell::Number(10.0));
        let costs = source.load("costs").await.unwrap();
        assert_eq!(costs.column("Cost").unwrap().cells[0], Cell::Number(4.0));

        let bytes = source.read_bytes("sales").await.unwrap().unwrap();
        assert!(bytes.starts_with(b"Date,Revenue"));
        assert!(source.load("missing").await.is_err());
        assert!(source.load("../etc/passwd").await.is_err());
    }

    #[test]
    fn test_json_records() {
        let raw = parse_json_records(
            r#"[{"Date": "2024-01-31", "Revenue": 2500, "Active": true},
                {"Date": "2024-02-29", "Revenue": "$1,500", "Region": "North"},
                {"Date": null, "Revenue": "N/A", "tags": ["a"]}]"#,
        )
        .unwrap();
        assert_eq!(
            raw.column_names(),
            vec!["Date", "Revenue", "Active", "Region", "tags"]
        );
        assert_eq!(raw.n_rows(), 3);
        assert_eq!(raw.column("Revenue").unwrap().cells[0], Cell::Number(2500.0));
        assert_eq!(raw.column("Revenue").unwrap().cells[1], Cell::text("$1,500"));
        assert_eq!(raw.column("Revenue").unwrap().cells[2], Cell::Null);
        assert_eq!(raw.column("Active").unwrap().cells[1], Cell::Null);
        assert_eq!(raw.column("Region").unwrap().cells[0], Cell::Null);
        assert_eq!(raw.column("Date").unwrap().cells[2], Cell::Null);
        assert_eq!(raw.column("tags").unwrap().cells[2], Cell::text(r#"["a"]"#));
    }

    #[test]
    fn test_json_shape_errors() {
        assert!(parse_json_records("[]").is_err());
        assert!(parse_json_records(r#"{"a": [1, 2]}"#).is_err());
        assert!(parse_json_records(r#"[{"a": 1}, 2]"#).is_err());
        assert!(parse_json_records("not json").is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(FileFormat::for_path(Path::new("a.csv")), FileFormat::Delimited(','));
        assert_eq!(FileFormat::for_path(Path::new("a.tsv")), FileFormat::Delimited('\t'));
        assert_eq!(FileFormat::for_path(Path::new("a.json")), FileFormat::JsonRecords);
        assert_eq!(FileFormat::for_path(Path::new("a")), FileFormat::Delimited(','));
    }

    #[tokio::test]
    async fn test_directory_source_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("orders.json"),
            r#"[{"order_date": "2024-01-02", "amount": 10}, {"order_date": "2024-01-03", "amount": 12}]"#,
        )
        .unwrap();
        let source = DirectorySource::new(dir.path());
        let orders = source.load("orders").await.unwrap();
        assert_eq!(orders.n_rows(), 2);
        assert_eq!(orders.column("amount").unwrap().cells[1], Cell::Number(12.0));
        let bytes = source.read_bytes("orders").await.unwrap().unwrap();
        assert!(bytes.starts_with(b"[{"));
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let raw = parse_delimited("a\n1\n", ',').unwrap();
        let source = InMemorySource::new().with_dataset("x", raw.clone());
        assert_eq!(source.load("x").await.unwrap(), raw);
        assert!(source.read_bytes("x").await.unwrap().is_none());
        assert!(source.load("y").await.is_err());
    }
}
