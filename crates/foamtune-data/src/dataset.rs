//! Raw records and the loaders that produce them.
//!
//! A [`Record`] is a flat mapping from field name to string value. Records
//! come from JSONL, JSON (row or columnar) or Parquet files; hub datasets
//! arrive as Parquet shards.

use arrow::array::{Array as ArrowArray, LargeStringArray, StringArray};
use arrow::datatypes::DataType;
use foamtune_core::{FoamTuneError, Result};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One raw training input before formatting.
///
/// Field order follows the source. Records are immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Build a record from `(name, value)` pairs. Later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut record = Self::default();
        for (name, value) in pairs {
            record.insert(name.into(), value.into());
        }
        record
    }

    /// Build a record from a JSON object.
    ///
    /// Strings are taken verbatim, other scalars and nested values are
    /// rendered as JSON text, and nulls are dropped.
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let mut record = Self::default();
        for (name, value) in object {
            if let Some(value) = json_cell(value) {
                record.insert(name.clone(), value);
            }
        }
        record
    }

    fn insert(&mut self, name: String, value: String) {
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    /// Value of `name`, or a [`FoamTuneError::MissingField`] naming it.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| FoamTuneError::missing_field(name))
    }

    /// Field names in source order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate over `(name, value)` pairs in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn json_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// On-disk record formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// One JSON object per line.
    Jsonl,
    /// A JSON array of objects, or a columnar object of equal-length arrays.
    Json,
    /// Apache Parquet with UTF-8 columns.
    Parquet,
}

impl RecordFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("jsonl" | "ndjson") => Ok(Self::Jsonl),
            Some("json") => Ok(Self::Json),
            Some("parquet") => Ok(Self::Parquet),
            _ => Err(FoamTuneError::config(format!(
                "cannot infer dataset format from '{}'; expected .jsonl, .json or .parquet",
                path.display()
            ))),
        }
    }
}

/// Load records from a local file, detecting the format from its extension.
///
/// `max_records` keeps only the first N records.
pub fn load_records(path: impl AsRef<Path>, max_records: Option<usize>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let format = RecordFormat::from_path(path)?;
    let mut records = match format {
        RecordFormat::Jsonl => load_jsonl(path)?,
        RecordFormat::Json => load_json(path)?,
        RecordFormat::Parquet => load_parquet(path)?,
    };
    if let Some(limit) = max_records {
        records.truncate(limit);
    }
    tracing::debug!(path = %path.display(), ?format, records = records.len(), "Loaded records");
    Ok(records)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        FoamTuneError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open dataset file '{}': {e}", path.display()),
        ))
    })
}

/// Load records from a JSONL file. Blank lines are skipped.
pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let reader = BufReader::new(open(path.as_ref())?);
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line).map_err(|e| {
            FoamTuneError::Serialization(format!("line {}: {e}", line_num + 1))
        })?;
        let Value::Object(object) = value else {
            return Err(FoamTuneError::Serialization(format!(
                "line {}: expected a JSON object",
                line_num + 1
            )));
        };
        records.push(Record::from_json_object(&object));
    }

    Ok(records)
}

/// Load records from a JSON file.
///
/// Accepts an array of objects or a columnar object such as
/// `{"text": ["a", "b"]}`.
pub fn load_json(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_reader(BufReader::new(open(path.as_ref())?))?;
    records_from_json(value)
}

fn records_from_json(value: Value) -> Result<Vec<Record>> {
    match value {
        Value::Array(rows) => rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| match row {
                Value::Object(object) => Ok(Record::from_json_object(&object)),
                _ => Err(FoamTuneError::Serialization(format!(
                    "row {index}: expected a JSON object"
                ))),
            })
            .collect(),
        Value::Object(columns) => records_from_columns(&columns),
        _ => Err(FoamTuneError::Serialization(
            "expected a JSON array of rows or an object of columns".into(),
        )),
    }
}

fn records_from_columns(columns: &Map<String, Value>) -> Result<Vec<Record>> {
    let mut arrays = Vec::with_capacity(columns.len());
    for (name, column) in columns {
        let Value::Array(values) = column else {
            return Err(FoamTuneError::config(format!(
                "column '{name}' is not an array"
            )));
        };
        arrays.push((name, values));
    }

    let num_rows = arrays.first().map_or(0, |(_, values)| values.len());
    if let Some((name, values)) = arrays.iter().find(|(_, values)| values.len() != num_rows) {
        return Err(FoamTuneError::config(format!(
            "column '{name}' has {} values, expected {num_rows}",
            values.len()
        )));
    }

    Ok((0..num_rows)
        .map(|row| {
            Record::from_pairs(
                arrays
                    .iter()
                    .filter_map(|(name, values)| json_cell(&values[row]).map(|v| (*name, v))),
            )
        })
        .collect())
}

/// Load records from a Parquet file.
///
/// Every UTF-8 column becomes a field; other column types are skipped and
/// null cells are omitted.
pub fn load_parquet(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let builder = ParquetRecordBatchReaderBuilder::try_new(open(path)?)
        .map_err(|e| FoamTuneError::Parquet(format!("Failed to create Parquet reader: {e}")))?;

    let schema = builder.schema().clone();
    let text_columns: Vec<(usize, String)> = schema
        .fields()
        .iter()
        .enumerate()
        .filter_map(|(idx, field)| match field.data_type() {
            DataType::Utf8 | DataType::LargeUtf8 => Some((idx, field.name().clone())),
            other => {
                tracing::debug!(column = %field.name(), data_type = ?other, "Skipping non-string column");
                None
            }
        })
        .collect();

    if text_columns.is_empty() {
        return Err(FoamTuneError::Parquet(format!(
            "'{}' has no string columns. Available columns: {:?}",
            path.display(),
            schema.fields().iter().map(|f| f.name()).collect::<Vec<_>>()
        )));
    }

    let reader = builder
        .build()
        .map_err(|e| FoamTuneError::Parquet(format!("Failed to build Parquet reader: {e}")))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch =
            batch.map_err(|e| FoamTuneError::Parquet(format!("Failed to read Parquet batch: {e}")))?;

        let mut columns = Vec::with_capacity(text_columns.len());
        for (idx, name) in &text_columns {
            columns.push((name.as_str(), StringColumn::new(batch.column(*idx).as_ref(), name)?));
        }

        for row in 0..batch.num_rows() {
            records.push(Record::from_pairs(
                columns
                    .iter()
                    .filter_map(|(name, column)| column.value(row).map(|v| (*name, v))),
            ));
        }
    }

    Ok(records)
}

#[derive(Clone, Copy)]
enum StringColumn<'a> {
    Small(&'a StringArray),
    Large(&'a LargeStringArray),
}

impl<'a> StringColumn<'a> {
    fn new(array: &'a dyn ArrowArray, name: &str) -> Result<Self> {
        if let Some(array) = array.as_any().downcast_ref::<StringArray>() {
            return Ok(Self::Small(array));
        }
        if let Some(array) = array.as_any().downcast_ref::<LargeStringArray>() {
            return Ok(Self::Large(array));
        }
        Err(FoamTuneError::Parquet(format!(
            "Column '{name}' is not a string type"
        )))
    }

    fn value(self, row: usize) -> Option<&'a str> {
        match self {
            Self::Small(array) => (!array.is_null(row)).then(|| array.value(row)),
            Self::Large(array) => (!array.is_null(row)).then(|| array.value(row)),
        }
    }
}

/// Shuffle items in place with a seeded RNG.
pub fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
}

/// Split items into `(train, test)` after a seeded shuffle.
///
/// The test split holds `ceil(len * test_ratio)` items.
pub fn train_test_split<T>(mut items: Vec<T>, test_ratio: f64, seed: u64) -> Result<(Vec<T>, Vec<T>)> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(FoamTuneError::config(format!(
            "test_ratio must be in (0, 1), got {test_ratio}"
        )));
    }
    let test_len = (items.len() as f64 * test_ratio).ceil() as usize;
    if !items.is_empty() && test_len >= items.len() {
        return Err(FoamTuneError::config(format!(
            "test_ratio {test_ratio} leaves no training records out of {}",
            items.len()
        )));
    }

    shuffle(&mut items, seed);
    let train = items.split_off(test_len);
    Ok((train, items))
}

/// Write one JSON document per line.
pub fn write_jsonl<T: Serialize>(path: impl AsRef<Path>, items: &[T]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read one JSON document per line, skipping blank lines.
pub fn read_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let reader = BufReader::new(open(path.as_ref())?);
    let mut items = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(serde_json::from_str(&line).map_err(|e| {
            FoamTuneError::Serialization(format!("line {}: {e}", line_num + 1))
        })?);
    }
    Ok(items)
}
