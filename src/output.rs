use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{BuildTrendsError, Result};

/// Incrementally writes a JSON array, one element per line.
///
/// Elements are flushed as they arrive, so a run that stops early still
/// leaves a complete document once `finish` is called.
pub struct JsonArrayWriter<W: Write> {
    inner: W,
    pretty: bool,
    written: usize,
}

impl<W: Write> JsonArrayWriter<W> {
    pub fn new(mut inner: W, pretty: bool) -> Result<Self> {
        inner.write_all(b"[\n")?;

        Ok(Self {
            inner,
            pretty,
            written: 0,
        })
    }

    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<()> {
        if self.written > 0 {
            self.inner.write_all(b",\n")?;
        }

        if self.pretty {
            serde_json::to_writer_pretty(&mut self.inner, value)?;
        } else {
            serde_json::to_writer(&mut self.inner, value)?;
        }
        self.inner.flush()?;
        self.written += 1;

        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> Result<W> {
        self.inner.write_all(b"\n]\n")?;
        self.inner.flush()?;

        Ok(self.inner)
    }
}

/// Columns that lead every CSV header, in this order, when the first row has them.
pub const LEADING_CSV_COLUMNS: [&str; 7] = [
    "number",
    "started_at",
    "finished_at",
    "duration",
    "state",
    "event_type",
    "pull_request_number",
];

/// Writes records as CSV rows.
///
/// The header comes from the keys of the first record: the leading columns
/// first, then the rest sorted by name. Keys that later records add are not
/// written. Nested values are JSON-encoded and null becomes an empty cell.
pub struct CsvBuildWriter<W: Write> {
    inner: csv::Writer<W>,
    columns: Option<Vec<String>>,
    written: usize,
}

impl<W: Write> CsvBuildWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: csv::Writer::from_writer(inner),
            columns: None,
            written: 0,
        }
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let fields = match serde_json::to_value(record)? {
            Value::Object(fields) => fields,
            other => {
                return Err(BuildTrendsError::ConfigError(format!(
                    "Only objects can be written as CSV rows, got {other}"
                )))
            }
        };

        if self.columns.is_none() {
            let columns = csv_columns(&fields);
            self.inner.write_record(&columns)?;
            self.columns = Some(columns);
        }

        let columns = self.columns.as_deref().unwrap_or_default();
        let row = columns
            .iter()
            .map(|column| fields.get(column).map(csv_cell).unwrap_or_default());
        self.inner.write_record(row)?;
        self.inner.flush()?;
        self.written += 1;

        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

fn csv_columns(fields: &Map<String, Value>) -> Vec<String> {
    let mut columns: Vec<String> = LEADING_CSV_COLUMNS
        .iter()
        .filter(|column| fields.contains_key(**column))
        .map(ToString::to_string)
        .collect();

    let mut rest: Vec<&String> = fields
        .keys()
        .filter(|key| !LEADING_CSV_COLUMNS.contains(&key.as_str()))
        .collect();
    rest.sort();
    columns.extend(rest.into_iter().cloned());

    columns
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Output writer for a chosen format.
pub enum RecordWriter<W: Write> {
    Json(JsonArrayWriter<W>),
    Csv(CsvBuildWriter<W>),
}

impl<W: Write> RecordWriter<W> {
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        match self {
            Self::Json(writer) => writer.write(record),
            Self::Csv(writer) => writer.write(record),
        }
    }

    pub fn written(&self) -> usize {
        match self {
            Self::Json(writer) => writer.written(),
            Self::Csv(writer) => writer.written(),
        }
    }

    pub fn finish(self) -> Result<()> {
        match self {
            Self::Json(writer) => writer.finish().map(drop),
            Self::Csv(writer) => writer.finish(),
        }
    }
}

/// Open the output destination, falling back to stdout.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
        None => Ok(Box::new(io::stdout().lock())),
    }
}

/// Like [`open_output`], but never replaces an existing file.
pub fn open_new_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    let Some(path) = path else {
        return open_output(None);
    };

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => BuildTrendsError::OutputExists(path.to_path_buf()),
            _ => BuildTrendsError::IoError(e),
        })?;

    Ok(Box::new(BufWriter::new(file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_empty_array_is_valid_json() {
        let writer = JsonArrayWriter::new(Vec::new(), false).unwrap();
        let bytes = writer.finish().unwrap();

        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, json!([]));
    }

    #[test]
    fn test_one_element_per_line() {
        let mut writer = JsonArrayWriter::new(Vec::new(), false).unwrap();
        writer.write(&json!({"number": 2})).unwrap();
        writer.write(&json!({"number": 1})).unwrap();
        assert_eq!(writer.written(), 2);

        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(text, "[\n{\"number\":2},\n{\"number\":1}\n]\n");
    }

    #[test]
    fn test_pretty_output_parses() {
        let mut writer = JsonArrayWriter::new(Vec::new(), true).unwrap();
        writer.write(&json!({"number": 1, "state": "passed"})).unwrap();

        let bytes = writer.finish().unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, json!([{"number": 1, "state": "passed"}]));
    }

    fn csv_text(records: &[Value]) -> String {
        let mut buffer = Vec::new();
        let mut writer = CsvBuildWriter::new(&mut buffer);
        for record in records {
            writer.write(record).unwrap();
        }
        assert_eq!(writer.written(), records.len());
        writer.finish().unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_csv_leading_columns_then_sorted() {
        let text = csv_text(&[json!({
            "state": "passed",
            "id": 98765,
            "number": 12,
            "commit_id": 5551212,
            "event_type": "pull_request",
            "duration": 60.5,
            "started_at": "2016-03-01T10:00:00Z",
            "finished_at": null,
            "pull_request_number": 42,
            "config": {"language": "python"},
            "job_ids": [1, 2],
            "message": "Fix, then \"test\""
        })]);

        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some(
                "number,started_at,finished_at,duration,state,event_type,pull_request_number,\
                 commit_id,config,id,job_ids,message"
            )
        );
        assert_eq!(
            lines.next(),
            Some(
                "12,2016-03-01T10:00:00Z,,60.5,passed,pull_request,42,5551212,\
                 \"{\"\"language\"\":\"\"python\"\"}\",98765,\"[1,2]\",\
                 \"Fix, then \"\"test\"\"\""
            )
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_csv_header_comes_from_first_record() {
        let text = csv_text(&[
            json!({"number": 2, "state": "passed"}),
            json!({"number": 1, "extra": "dropped"}),
        ]);

        assert_eq!(text, "number,state\n2,passed\n1,\n");
    }

    #[test]
    fn test_csv_without_records_is_empty() {
        assert_eq!(csv_text(&[]), "");
    }

    #[test]
    fn test_record_writer_closes_json_array() {
        let mut buffer = Vec::new();
        {
            let mut writer =
                RecordWriter::Json(JsonArrayWriter::new(&mut buffer, false).unwrap());
            writer.write(&json!({"number": 1})).unwrap();
            assert_eq!(writer.written(), 1);
            writer.finish().unwrap();
        }

        let parsed: Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed, json!([{"number": 1}]));
    }

    #[test]
    fn test_open_new_output_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.json");
        std::fs::write(&path, "[]").unwrap();

        let result = open_new_output(Some(&path));

        assert!(matches!(result, Err(BuildTrendsError::OutputExists(p)) if p == path));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_open_new_output_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.json");

        {
            let mut out = open_new_output(Some(&path)).unwrap();
            out.write_all(b"[]").unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }
}
