//! Watermark document persistence
//!
//! The document is always read and written whole. Saves go to a temporary
//! sibling file that is renamed over the document, so a failed run leaves the
//! previous document untouched.

use super::types::{Watermark, Watermarks};
use crate::error::{Error, Result};
use crate::types::MissingWatermarkPolicy;
use arrow::array::{Array, AsArray, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::fs::{self, File};
use std::io::{ErrorKind, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the timestamp column in the legacy tabular form
pub const LEGACY_DATE_COLUMN: &str = "Date";

/// Name written for the index column when saving the legacy form
const LEGACY_INDEX_COLUMN: &str = "symbol";

/// On-disk representation of a watermark document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `{ "entity": "YYYY-MM-DD HH:MM:SS.fff", ... }`
    Json,
    /// CSV with the entity as first (index) column and a `Date` column
    LegacyCsv,
}

impl DocumentFormat {
    /// Pick the format from the document's extension (JSON unless `.csv`)
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let is_csv = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            Self::LegacyCsv
        } else {
            Self::Json
        }
    }
}

/// Handle on one watermark document
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    /// Path to the document
    path: PathBuf,
    /// Representation used for reads and writes
    format: DocumentFormat,
}

impl WatermarkStore {
    /// Create a store for the document at `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = DocumentFormat::from_path(&path);
        Self { path, format }
    }

    /// Get the document path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the document format
    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    /// Check whether the document exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the whole document
    ///
    /// Fails with [`Error::NotFound`] when the document does not exist.
    pub fn load(&self) -> Result<Watermarks> {
        match self.format {
            DocumentFormat::Json => self.load_json(),
            DocumentFormat::LegacyCsv => self.load_legacy_csv(),
        }
    }

    /// Load the document, applying `policy` when it does not exist
    pub fn load_or(&self, policy: MissingWatermarkPolicy) -> Result<Watermarks> {
        match self.load() {
            Err(e) if e.is_not_found() && policy == MissingWatermarkPolicy::SeedEmpty => {
                tracing::info!(
                    "No watermark document at {}, starting empty",
                    self.path.display()
                );
                Ok(Watermarks::new())
            }
            other => other,
        }
    }

    /// Replace the whole document
    pub fn save(&self, watermarks: &Watermarks) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = match self.format {
            DocumentFormat::Json => {
                serde_json::to_vec_pretty(watermarks).map_err(|e| Error::Watermark {
                    message: format!("Failed to serialize watermarks: {e}"),
                })?
            }
            DocumentFormat::LegacyCsv => encode_legacy_csv(watermarks)?,
        };

        let temp_path = self.temp_path();
        fs::write(&temp_path, &contents).map_err(|e| Error::Watermark {
            message: format!("Failed to write watermark file: {e}"),
        })?;

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::Watermark {
                message: format!("Failed to rename watermark file: {e}"),
            });
        }

        tracing::debug!(
            "Saved {} watermarks to {}",
            watermarks.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Sibling file written before it is renamed over the document
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn open(&self) -> Result<File> {
        File::open(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::not_found(&self.path),
            _ => Error::Io(e),
        })
    }

    fn load_json(&self) -> Result<Watermarks> {
        let file = self.open()?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| Error::Watermark {
            message: format!("Failed to parse {}: {e}", self.path.display()),
        })
    }

    fn load_legacy_csv(&self) -> Result<Watermarks> {
        let mut file = self.open()?;
        if file.metadata()?.len() == 0 {
            return Ok(Watermarks::new());
        }

        let format = Format::default().with_header(true);
        let (header, _) = format.infer_schema(&mut file, Some(0))?;
        file.rewind()?;

        let date_idx = header.index_of(LEGACY_DATE_COLUMN).map_err(|_| {
            Error::column(&self.path, LEGACY_DATE_COLUMN, "legacy document has no such column")
        })?;
        if date_idx == 0 {
            return Err(Error::column(
                &self.path,
                LEGACY_DATE_COLUMN,
                "first column must be the entity index",
            ));
        }

        // Read every column as text; dates are parsed with the watermark rules
        let fields: Vec<Field> = header
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect();
        let reader = ReaderBuilder::new(Arc::new(Schema::new(fields)))
            .with_format(format)
            .build(file)?;

        let mut watermarks = Watermarks::new();
        for batch in reader {
            let batch = batch?;
            let entities = batch.column(0).as_string::<i32>();
            let dates = batch.column(date_idx).as_string::<i32>();
            for row in 0..batch.num_rows() {
                if entities.is_null(row) {
                    continue;
                }
                let watermark = if dates.is_null(row) {
                    Watermark::sentinel()
                } else {
                    Watermark::parse_optional(dates.value(row))?.unwrap_or_default()
                };
                watermarks.set(entities.value(row), watermark);
            }
        }
        Ok(watermarks)
    }
}

fn encode_legacy_csv(watermarks: &Watermarks) -> Result<Vec<u8>> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(LEGACY_INDEX_COLUMN, DataType::Utf8, false),
        Field::new(LEGACY_DATE_COLUMN, DataType::Utf8, false),
    ]));
    let entities: StringArray = watermarks.iter().map(|(e, _)| Some(e)).collect();
    let dates: StringArray = watermarks
        .iter()
        .map(|(_, w)| Some(w.to_string()))
        .collect();
    let batch = RecordBatch::try_new(schema, vec![Arc::new(entities), Arc::new(dates)])?;

    let mut buf = Vec::new();
    {
        let mut writer = WriterBuilder::new().with_header(true).build(&mut buf);
        writer.write(&batch)?;
    }
    Ok(buf)
}

/// Load the watermark document at `path`
pub fn load(path: impl AsRef<Path>) -> Result<Watermarks> {
    WatermarkStore::new(path).load()
}

/// Replace the watermark document at `path`
pub fn save(path: impl AsRef<Path>, watermarks: &Watermarks) -> Result<()> {
    WatermarkStore::new(path).save(watermarks)
}
