//! Arrow IPC execution store
//!
//! Writes execution records to files in Arrow IPC Streaming format with
//! size-based rotation and age-based cleanup. One persistent `StreamWriter`
//! is kept per open file; the stream is only finished when the file rotates
//! or the store is closed.

use anyhow::Result;
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use super::ExecutionStore;
use crate::config::StorageConfig;
use crate::error::SinkError;
use crate::extract::{ExecutionRecord, SystemDescriptor};

/// Subdirectory of the configured output directory holding execution files
pub const EXECUTIONS_DIR: &str = "executions";
const FILE_EXTENSION: &str = "arrows";

/// Identifier assigned to a stored execution record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution store backed by rotating Arrow IPC stream files
#[derive(Clone)]
pub struct ArrowExecutionStore {
    writer: Arc<Mutex<ExecutionWriter>>,
    output_dir: PathBuf,
    max_file_size: u64,
    schema: SchemaRef,
}

impl fmt::Debug for ArrowExecutionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrowExecutionStore")
            .field("output_dir", &self.output_dir)
            .field("max_file_size", &self.max_file_size)
            .finish_non_exhaustive()
    }
}

struct ExecutionWriter {
    current_writer: Option<StreamWriter<BufWriter<File>>>,
    current_path: Option<PathBuf>,
    current_size: u64,
    sequence: u64,
    next_id: u64,
}

impl ArrowExecutionStore {
    /// Open the store under `<output_dir>/executions`
    pub fn new(config: &StorageConfig) -> Result<Self, SinkError> {
        Self::open(
            config.output_dir.join(EXECUTIONS_DIR),
            config.max_file_size_mb.saturating_mul(1024 * 1024),
        )
    }

    /// Open the store writing directly into `output_dir`
    ///
    /// Identifiers continue after the highest id found in existing files.
    pub fn open(output_dir: impl Into<PathBuf>, max_file_size: u64) -> Result<Self, SinkError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            SinkError::Storage(format!(
                "Failed to create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;

        let last_id = highest_stored_id(&output_dir);
        let sequence = next_file_sequence(&output_dir);

        info!(
            output_dir = %output_dir.display(),
            max_file_size_bytes = max_file_size,
            next_id = last_id + 1,
            "Initializing Arrow execution store"
        );

        Ok(Self {
            writer: Arc::new(Mutex::new(ExecutionWriter {
                current_writer: None,
                current_path: None,
                current_size: 0,
                sequence,
                next_id: last_id + 1,
            })),
            output_dir,
            max_file_size: max_file_size.max(1),
            schema: execution_schema(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the file currently being appended to, if any
    pub async fn current_file(&self) -> Option<PathBuf> {
        self.writer.lock().await.current_path.clone()
    }

    /// Write records as one Arrow batch, returning their identifiers
    pub async fn write_records(
        &self,
        records: Vec<ExecutionRecord>,
    ) -> Result<Vec<RecordId>, SinkError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut writer = self.writer.lock().await;
        let first_id = writer.next_id;
        let ids: Vec<u64> = (first_id..first_id + records.len() as u64).collect();

        let batch = records_to_batch(&self.schema, &ids, &records, Utc::now())
            .map_err(|e| SinkError::Arrow(e.to_string()))?;
        let estimated_size = batch.get_array_memory_size() as u64;

        if writer.current_writer.is_some()
            && writer.current_size + estimated_size > self.max_file_size
        {
            writer.rotate_file()?;
        }

        if writer.current_writer.is_none() {
            writer.open_new_file(&self.output_dir, self.schema.clone())?;
        }

        if let Err(e) = writer.write_batch(&batch) {
            // A partially written stream is not appendable; start fresh next time
            writer.abandon_file();
            return Err(e);
        }

        writer.next_id += ids.len() as u64;
        debug!(
            records = ids.len(),
            first_id = first_id,
            file_size_bytes = writer.current_size,
            "Stored execution records"
        );

        Ok(ids.into_iter().map(RecordId).collect())
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().await;
        if let Some(ref mut stream_writer) = writer.current_writer {
            stream_writer
                .get_mut()
                .flush()
                .map_err(|e| SinkError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    /// Finish the current stream so the file is complete on disk
    pub async fn close(&self) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().await;
        if writer.current_writer.is_some() {
            writer.rotate_file()?;
        }
        Ok(())
    }

    /// Delete execution files not modified within `retention_secs`
    ///
    /// The file currently being written is never removed. Returns the number
    /// of deleted files.
    pub async fn cleanup(&self, retention_secs: u64) -> Result<usize, SinkError> {
        let active = self.writer.lock().await.current_path.clone();

        let cutoff_time = SystemTime::now()
            .checked_sub(Duration::from_secs(retention_secs))
            .ok_or_else(|| SinkError::Storage("Invalid retention period".to_string()))?;

        let entries = std::fs::read_dir(&self.output_dir)
            .map_err(|e| SinkError::Storage(e.to_string()))?;

        let mut deleted_count = 0;
        let mut error_count = 0;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    error_count += 1;
                    continue;
                }
            };

            let path = entry.path();
            if !is_execution_file(&path) || active.as_deref() == Some(path.as_path()) {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Failed to get modification time for {}: {}", path.display(), e);
                    error_count += 1;
                    continue;
                }
            };

            if modified < cutoff_time {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        deleted_count += 1;
                        trace!(file = %path.display(), "Deleted old execution file");
                    }
                    Err(e) => {
                        warn!("Failed to delete old file {}: {}", path.display(), e);
                        error_count += 1;
                    }
                }
            }
        }

        if deleted_count > 0 {
            info!(
                deleted = deleted_count,
                errors = error_count,
                "Cleaned up old execution files"
            );
        }

        if error_count > 0 {
            warn!(errors = error_count, "Encountered errors during execution file cleanup");
        }

        Ok(deleted_count)
    }
}

impl ExecutionStore for ArrowExecutionStore {
    fn save_batch(
        &self,
        records: Vec<ExecutionRecord>,
    ) -> BoxFuture<'_, Result<Vec<RecordId>, SinkError>> {
        self.write_records(records).boxed()
    }
}

impl ExecutionWriter {
    fn open_new_file(&mut self, output_dir: &Path, schema: SchemaRef) -> Result<()> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");

        // Existing files are never reopened; a taken name moves on to the next sequence
        let (file, file_path) = loop {
            let filename = format!(
                "executions_{}_{:04}.{}",
                timestamp, self.sequence, FILE_EXTENSION
            );
            let file_path = output_dir.join(&filename);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&file_path)
            {
                Ok(file) => break (file, file_path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(file = %file_path.display(), "Execution file exists, trying next sequence");
                    self.sequence += 1;
                }
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "Failed to create execution file {}: {}",
                        file_path.display(),
                        e
                    ));
                }
            }
        };

        let stream_writer = StreamWriter::try_new(BufWriter::new(file), &schema)
            .map_err(|e| anyhow::anyhow!("Failed to create Arrow StreamWriter: {}", e))?;

        self.current_writer = Some(stream_writer);
        self.current_path = Some(file_path.clone());
        self.current_size = 0;

        info!(file = %file_path.display(), "Opened new execution file");

        Ok(())
    }

    fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), SinkError> {
        let Some(ref mut stream_writer) = self.current_writer else {
            return Err(SinkError::Storage("No open execution file".to_string()));
        };

        stream_writer
            .write(batch)
            .map_err(|e| SinkError::Arrow(format!("Failed to write Arrow batch: {}", e)))?;

        let buffered = stream_writer.get_mut();
        buffered
            .flush()
            .map_err(|e| SinkError::Storage(e.to_string()))?;
        self.current_size = buffered
            .get_ref()
            .metadata()
            .map(|m| m.len())
            .map_err(|e| SinkError::Storage(e.to_string()))?;

        Ok(())
    }

    fn rotate_file(&mut self) -> Result<()> {
        if let Some(ref mut stream_writer) = self.current_writer {
            stream_writer
                .finish()
                .map_err(|e| anyhow::anyhow!("Failed to finish Arrow StreamWriter: {}", e))?;
        }

        if let Some(path) = self.current_path.take() {
            info!(
                file = %path.display(),
                size_bytes = self.current_size,
                "Rotated execution file"
            );
        }

        self.current_writer = None;
        self.current_size = 0;
        self.sequence += 1;
        Ok(())
    }

    fn abandon_file(&mut self) {
        if let Some(path) = self.current_path.take() {
            warn!(file = %path.display(), "Abandoning execution file after failed write");
        }
        self.current_writer = None;
        self.current_size = 0;
        self.sequence += 1;
    }
}

/// Arrow schema of stored execution records
pub fn execution_schema() -> SchemaRef {
    let timestamp = || DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()));

    let mut fields = vec![
        Field::new("id", DataType::UInt64, false),
        Field::new("host_name", DataType::Utf8, false),
        Field::new("platform_type", DataType::Utf8, false),
        Field::new("group_name", DataType::Utf8, false),
        Field::new("process_name", DataType::Utf8, false),
        Field::new("script_name", DataType::Utf8, false),
        Field::new("success", DataType::Boolean, false),
        Field::new("error_type", DataType::Utf8, true),
        Field::new("error_message", DataType::Utf8, true),
        Field::new("start_time", timestamp(), false),
        Field::new("end_time", timestamp(), false),
        Field::new("duration_seconds", DataType::Float64, false),
    ];
    for side in ["source", "target"] {
        fields.extend([
            Field::new(format!("{}_system_type", side), DataType::Utf8, true),
            Field::new(format!("{}_system_name", side), DataType::Utf8, true),
            Field::new(format!("{}_endpoint", side), DataType::Utf8, true),
            Field::new(format!("{}_object_name", side), DataType::Utf8, true),
            Field::new(format!("{}_count", side), DataType::Int64, true),
        ]);
    }
    fields.push(Field::new("auto_json", DataType::Utf8, true));
    fields.push(Field::new("created_at", timestamp(), false));

    Arc::new(Schema::new(fields))
}

fn records_to_batch(
    schema: &SchemaRef,
    ids: &[u64],
    records: &[ExecutionRecord],
    created_at: DateTime<Utc>,
) -> Result<RecordBatch> {
    let text = |f: fn(&ExecutionRecord) -> &str| -> ArrayRef {
        Arc::new(StringArray::from_iter_values(records.iter().map(f)))
    };
    let optional_text = |f: fn(&ExecutionRecord) -> Option<&str>| -> ArrayRef {
        Arc::new(records.iter().map(f).collect::<StringArray>())
    };
    let micros = |f: fn(&ExecutionRecord) -> DateTime<Utc>| -> ArrayRef {
        Arc::new(
            TimestampMicrosecondArray::from_iter_values(
                records.iter().map(|r| f(r).timestamp_micros()),
            )
            .with_timezone("UTC"),
        )
    };

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(ids.to_vec())),
        text(|r| &r.host_name),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.platform_type.as_str()),
        )),
        text(|r| &r.group_name),
        text(|r| &r.process_name),
        text(|r| &r.script_name),
        Arc::new(BooleanArray::from(
            records.iter().map(|r| r.success).collect::<Vec<_>>(),
        )),
        optional_text(|r| r.error_type.as_deref()),
        optional_text(|r| r.error_message.as_deref()),
        micros(|r| r.start_time),
        micros(|r| r.end_time),
        Arc::new(Float64Array::from_iter_values(
            records.iter().map(|r| r.duration_seconds),
        )),
    ];
    columns.extend(descriptor_columns(records, |r| &r.source));
    columns.extend(descriptor_columns(records, |r| &r.target));
    columns.push(optional_text(|r| r.auto_json.as_deref()));
    columns.push(Arc::new(
        TimestampMicrosecondArray::from_iter_values(
            std::iter::repeat_n(created_at.timestamp_micros(), records.len()),
        )
        .with_timezone("UTC"),
    ));

    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

fn descriptor_columns(
    records: &[ExecutionRecord],
    side: fn(&ExecutionRecord) -> &SystemDescriptor,
) -> [ArrayRef; 5] {
    let field = |f: fn(&SystemDescriptor) -> Option<&str>| -> ArrayRef {
        Arc::new(records.iter().map(|r| f(side(r))).collect::<StringArray>())
    };
    [
        field(|d| d.system_type.as_deref()),
        field(|d| d.system_name.as_deref()),
        field(|d| d.endpoint.as_deref()),
        field(|d| d.object_name.as_deref()),
        Arc::new(records.iter().map(|r| side(r).count).collect::<Int64Array>()),
    ]
}

/// Read every batch of an execution file
///
/// Streams that were not finished (the active file) are read up to the last
/// complete batch.
pub fn read_execution_file(path: impl AsRef<Path>) -> Result<Vec<RecordBatch>, SinkError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        SinkError::Storage(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let reader = StreamReader::try_new(BufReader::new(file), None)
        .map_err(|e| SinkError::Arrow(e.to_string()))?;
    reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SinkError::Arrow(e.to_string()))
}

fn is_execution_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|s| s.to_str()) == Some(FILE_EXTENSION)
}

/// One past the highest file sequence number already used in `dir`
fn next_file_sequence(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| is_execution_file(p))
        .filter_map(|p| {
            let stem = p.file_stem()?.to_str()?.to_string();
            stem.rsplit('_').next()?.parse::<u64>().ok()
        })
        .max()
        .map_or(0, |highest| highest + 1)
}

fn highest_stored_id(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut highest = 0;
    for path in entries.flatten().map(|e| e.path()) {
        if !is_execution_file(&path) {
            continue;
        }
        match read_execution_file(&path) {
            Ok(batches) => {
                for batch in batches {
                    let max_id = batch
                        .column_by_name("id")
                        .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
                        .and_then(arrow::compute::max);
                    highest = highest.max(max_id.unwrap_or_default());
                }
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable execution file");
            }
        }
    }
    highest
}
