//! Reshaping raw records into segment-indexed tables
//!
//! Each retained record becomes one segment. The compact form keeps one row
//! per record with the waveform array as a column; the long form explodes
//! the array into one row per sample.

use eeg_core::{string_to_utc_seconds, EegError, EegResult, RawRecord, DEFAULT_WAVEFORM_KEY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which record fields flow into the tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Key of the waveform array
    pub waveform_key: String,
    /// Metadata copied through when present
    pub passthrough_fields: Vec<String>,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            waveform_key: DEFAULT_WAVEFORM_KEY.to_string(),
            passthrough_fields: ["focus_type", "session_type", "document_name", "session_id"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Table layout produced by the reshaper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableForm {
    Compact,
    Long,
}

/// Record dropped before segmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// Position in the input sequence
    pub record_index: usize,
    pub reason: String,
}

/// Record-level values shared by every sample of a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowContext {
    pub timestamp: String,
    pub utc_ts: f64,
    pub metadata: BTreeMap<String, String>,
}

/// One retained record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactRow {
    pub record_index: usize,
    pub waveform: Vec<f64>,
    pub timestamp: String,
    pub utc_ts: f64,
    pub metadata: BTreeMap<String, String>,
}

/// One row per retained record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactTable {
    pub rows: Vec<CompactRow>,
    passthrough_fields: Vec<String>,
}

impl CompactTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `waveform`, `timestamp`, `utc_ts` and the whitelisted fields that occur
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![
            "waveform".to_string(),
            "timestamp".to_string(),
            "utc_ts".to_string(),
        ];
        columns.extend(present_fields(
            &self.passthrough_fields,
            self.rows.iter().map(|r| &r.metadata),
        ));
        columns
    }

    /// Explode into the long form
    pub fn to_long(&self, sampling_rate: u32) -> LongTable {
        let fs = f64::from(sampling_rate);
        let mut rows = Vec::with_capacity(self.rows.len() * sampling_rate as usize);

        for (n, record) in self.rows.iter().enumerate() {
            let context = Arc::new(RowContext {
                timestamp: record.timestamp.clone(),
                utc_ts: record.utc_ts,
                metadata: record.metadata.clone(),
            });
            let label = segment_label(n);

            rows.extend(record.waveform.iter().enumerate().map(|(i, &value)| LongRow {
                segment: label.clone(),
                sample_index: i,
                time_sample: i as f64 / fs,
                waveform: value,
                context: Arc::clone(&context),
            }));
        }

        LongTable {
            rows,
            passthrough_fields: self.passthrough_fields.clone(),
        }
    }

    pub fn segments(&self) -> Vec<Segment> {
        self.rows
            .iter()
            .enumerate()
            .map(|(n, row)| Segment {
                index: n,
                samples: row.waveform.clone(),
                timestamp: row.timestamp.clone(),
                utc_ts: row.utc_ts,
                metadata: row.metadata.clone(),
            })
            .collect()
    }
}

/// One sample of one segment
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    /// Segment label, `seg_<n>`
    pub segment: String,
    pub sample_index: usize,
    /// In-segment time in seconds, `i / fs`
    pub time_sample: f64,
    pub waveform: f64,
    pub context: Arc<RowContext>,
}

/// One row per (segment, sample), samples in order, segments in record order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LongTable {
    pub rows: Vec<LongRow>,
    passthrough_fields: Vec<String>,
}

impl LongTable {
    pub const INDEX_COLUMNS: [&'static str; 2] = ["segment", "time_sample"];

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Data columns; the index columns are reported separately
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![
            "waveform".to_string(),
            "timestamp".to_string(),
            "utc_ts".to_string(),
        ];
        columns.extend(present_fields(
            &self.passthrough_fields,
            self.rows.iter().map(|r| &r.context.metadata),
        ));
        columns
    }

    /// Index columns followed by data columns
    pub fn header(&self) -> Vec<String> {
        Self::INDEX_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.columns())
            .collect()
    }

    /// Rows rendered as text, aligned with `header()`
    pub fn rows_as_strings(&self) -> Vec<Vec<String>> {
        let fields: Vec<String> = self.columns().into_iter().skip(3).collect();
        self.rows
            .iter()
            .map(|row| {
                let mut cells = vec![
                    row.segment.clone(),
                    row.time_sample.to_string(),
                    row.waveform.to_string(),
                    row.context.timestamp.clone(),
                    row.context.utc_ts.to_string(),
                ];
                cells.extend(
                    fields
                        .iter()
                        .map(|f| row.context.metadata.get(f).cloned().unwrap_or_default()),
                );
                cells
            })
            .collect()
    }

    /// Regroup consecutive rows into segments
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut current_label: Option<&str> = None;

        for row in &self.rows {
            if current_label == Some(row.segment.as_str()) {
                if let Some(current) = segments.last_mut() {
                    current.samples.push(row.waveform);
                }
                continue;
            }

            current_label = Some(&row.segment);
            segments.push(Segment {
                index: segments.len(),
                samples: vec![row.waveform],
                timestamp: row.context.timestamp.clone(),
                utc_ts: row.context.utc_ts,
                metadata: row.context.metadata.clone(),
            });
        }

        segments
    }
}

/// One second of samples from a retained record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Position among retained records
    pub index: usize,
    pub samples: Vec<f64>,
    pub timestamp: String,
    pub utc_ts: f64,
    /// Whitelisted passthrough fields
    pub metadata: BTreeMap<String, String>,
}

impl Segment {
    pub fn label(&self) -> String {
        segment_label(self.index)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Table produced by `process_records`
#[derive(Debug, Clone, PartialEq)]
pub enum ReshapedTable {
    Compact(CompactTable),
    Long(LongTable),
}

impl ReshapedTable {
    pub fn segments(&self) -> Vec<Segment> {
        match self {
            ReshapedTable::Compact(table) => table.segments(),
            ReshapedTable::Long(table) => table.segments(),
        }
    }
}

/// Reshaped table plus the records that did not make it
#[derive(Debug, Clone, PartialEq)]
pub struct ReshapeOutput {
    pub table: ReshapedTable,
    pub rejected: Vec<RejectedRecord>,
}

pub fn segment_label(index: usize) -> String {
    format!("seg_{}", index)
}

fn present_fields<'a>(
    whitelist: &[String],
    rows: impl Iterator<Item = &'a BTreeMap<String, String>> + Clone,
) -> Vec<String> {
    whitelist
        .iter()
        .filter(|field| rows.clone().any(|m| m.contains_key(field.as_str())))
        .cloned()
        .collect()
}

/// Validate one record and extract its row
fn compact_row(
    index: usize,
    record: &RawRecord,
    sampling_rate: u32,
    config: &RecordConfig,
) -> EegResult<CompactRow> {
    let waveform = record.waveform(&config.waveform_key)?;
    if waveform.len() != sampling_rate as usize {
        return Err(EegError::MalformedRecord {
            reason: format!(
                "waveform has {} samples, expected {}",
                waveform.len(),
                sampling_rate
            ),
        });
    }
    if let Some(i) = waveform.iter().position(|x| !x.is_finite()) {
        return Err(EegError::MalformedRecord {
            reason: format!("waveform sample {} is not finite", i),
        });
    }

    let timestamp = record.timestamp().ok_or_else(|| EegError::MalformedRecord {
        reason: "missing timestamp".to_string(),
    })?;
    let utc_ts = string_to_utc_seconds(timestamp).map_err(|e| EegError::MalformedRecord {
        reason: e.to_string(),
    })?;

    let metadata = config
        .passthrough_fields
        .iter()
        .filter_map(|field| record.text_field(field).map(|v| (field.clone(), v)))
        .collect();

    Ok(CompactRow {
        record_index: index,
        waveform,
        timestamp: timestamp.to_string(),
        utc_ts,
        metadata,
    })
}

/// Keep records whose waveform is exactly one second long
pub fn compact_records(
    records: &[RawRecord],
    sampling_rate: u32,
    config: &RecordConfig,
) -> EegResult<(CompactTable, Vec<RejectedRecord>)> {
    if sampling_rate == 0 {
        return Err(EegError::InvalidSamplingRate { rate: 0.0 });
    }

    let mut rows = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match compact_row(index, record, sampling_rate, config) {
            Ok(row) => rows.push(row),
            Err(EegError::MalformedRecord { reason }) => {
                warn!(record = index, %reason, "dropping record");
                rejected.push(RejectedRecord {
                    record_index: index,
                    reason,
                });
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        retained = rows.len(),
        rejected = rejected.len(),
        "records reshaped"
    );

    Ok((
        CompactTable {
            rows,
            passthrough_fields: config.passthrough_fields.clone(),
        },
        rejected,
    ))
}

/// Reshape raw records into the requested table form
pub fn process_records(
    records: &[RawRecord],
    sampling_rate: u32,
    config: &RecordConfig,
    form: TableForm,
) -> EegResult<ReshapeOutput> {
    let (compact, rejected) = compact_records(records, sampling_rate, config)?;

    let table = match form {
        TableForm::Compact => ReshapedTable::Compact(compact),
        TableForm::Long => ReshapedTable::Long(compact.to_long(sampling_rate)),
    };

    Ok(ReshapeOutput { table, rejected })
}
