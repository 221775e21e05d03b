use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{EegError, Result};
use crate::io::raw::ReaderOptions;

/// Electrode order of the g.tec Unicorn Hybrid Black export.
pub const UNICORN_CHANNELS: [&str; 8] = ["Fz", "C3", "Cz", "C4", "Pz", "PO7", "Oz", "PO8"];
pub const UNICORN_SAMPLING_RATE_HZ: f64 = 250.0;

/// Where the sampling rate of a recording comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SamplingRate {
    /// Constant supplied by the caller.
    Fixed { hz: f64 },
    /// First number found in metadata row `row`, field `column`.
    Metadata { row: usize, column: usize },
    /// Median positive step of the timestamp column.
    FromTimestamps,
}

/// Half-open column range holding signal values. `end = None` runs to the end of the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub start: usize,
    #[serde(default)]
    pub end: Option<usize>,
}

impl ColumnRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn open(start: usize) -> Self {
        Self { start, end: None }
    }
}

/// Description of a device-specific CSV export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceLayout {
    /// Number of leading non-data rows; `None` sniffs for the first numeric row.
    #[serde(default)]
    pub metadata_row_count: Option<usize>,
    /// Metadata row holding channel names.
    #[serde(default)]
    pub channel_label_row_index: Option<usize>,
    /// Explicit channel names; take precedence over the label row.
    #[serde(default)]
    pub channel_labels: Option<Vec<String>>,
    pub sampling_rate: SamplingRate,
    pub data_columns: ColumnRange,
    #[serde(default)]
    pub timestamp_column: Option<usize>,
    /// Multiplier converting raw timestamps to seconds.
    #[serde(default = "default_timestamp_scale")]
    pub timestamp_scale: f64,
    /// Marker/trigger columns passed through untouched.
    #[serde(default)]
    pub aux_columns: Vec<usize>,
    /// Abort instead of warning when timestamps go backwards.
    #[serde(default)]
    pub strict_timestamps: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub comment: Option<char>,
}

fn default_timestamp_scale() -> f64 {
    1.0
}

fn default_delimiter() -> char {
    ','
}

impl DeviceLayout {
    /// Unicorn Recorder export: one header row, eight EEG columns, 250 Hz.
    pub fn unicorn() -> Self {
        Self {
            metadata_row_count: Some(1),
            channel_label_row_index: None,
            channel_labels: Some(UNICORN_CHANNELS.iter().map(|s| s.to_string()).collect()),
            sampling_rate: SamplingRate::Fixed {
                hz: UNICORN_SAMPLING_RATE_HZ,
            },
            data_columns: ColumnRange::new(0, UNICORN_CHANNELS.len()),
            timestamp_column: None,
            timestamp_scale: 1.0,
            aux_columns: Vec::new(),
            strict_timestamps: false,
            delimiter: ',',
            comment: None,
        }
    }

    /// One label row followed by numeric rows, every column a channel.
    pub fn generic(sampling_rate_hz: f64) -> Self {
        Self {
            metadata_row_count: Some(1),
            channel_label_row_index: Some(0),
            channel_labels: None,
            sampling_rate: SamplingRate::Fixed {
                hz: sampling_rate_hz,
            },
            data_columns: ColumnRange::open(0),
            timestamp_column: None,
            timestamp_scale: 1.0,
            aux_columns: Vec::new(),
            strict_timestamps: false,
            delimiter: ',',
            comment: None,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let layout: DeviceLayout =
            toml::from_str(text).map_err(|err| EegError::InvalidLayout(err.to_string()))?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => EegError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => EegError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the layout for self-contradictions before touching any data.
    pub fn validate(&self) -> Result<()> {
        if let Some(end) = self.data_columns.end {
            if end <= self.data_columns.start {
                return Err(EegError::InvalidLayout(format!(
                    "data column range {}..{} is empty",
                    self.data_columns.start, end
                )));
            }
        }
        if let Some(labels) = &self.channel_labels {
            if labels.is_empty() {
                return Err(EegError::InvalidLayout(
                    "channel_labels must not be empty".into(),
                ));
            }
        }
        if let (Some(count), Some(label_row)) =
            (self.metadata_row_count, self.channel_label_row_index)
        {
            if label_row >= count {
                return Err(EegError::InvalidLayout(format!(
                    "label row {} is outside the {} metadata rows",
                    label_row, count
                )));
            }
        }
        match self.sampling_rate {
            SamplingRate::Metadata { row, .. } => {
                if let Some(count) = self.metadata_row_count {
                    if row >= count {
                        return Err(EegError::InvalidLayout(format!(
                            "sampling rate row {} is outside the {} metadata rows",
                            row, count
                        )));
                    }
                }
            }
            SamplingRate::FromTimestamps if self.timestamp_column.is_none() => {
                return Err(EegError::InvalidLayout(
                    "sampling rate from timestamps requires timestamp_column".into(),
                ));
            }
            _ => {}
        }
        if !(self.timestamp_scale.is_finite() && self.timestamp_scale > 0.0) {
            return Err(EegError::InvalidLayout(format!(
                "timestamp_scale must be positive, got {}",
                self.timestamp_scale
            )));
        }
        self.reader_options().map(|_| ())
    }

    pub fn reader_options(&self) -> Result<ReaderOptions> {
        Ok(ReaderOptions {
            delimiter: ascii_byte(self.delimiter, "delimiter")?,
            comment: self
                .comment
                .map(|c| ascii_byte(c, "comment"))
                .transpose()?,
        })
    }

    /// Signal column indices for a row of `width` fields. Timestamp and aux
    /// columns are never treated as signal.
    pub fn data_column_indices(&self, width: usize) -> Vec<usize> {
        let end = self.data_columns.end.unwrap_or(width);
        (self.data_columns.start..end)
            .filter(|col| Some(*col) != self.timestamp_column)
            .filter(|col| !self.aux_columns.contains(col))
            .collect()
    }
}

fn ascii_byte(c: char, what: &str) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(EegError::InvalidLayout(format!(
            "{} '{}' must be a single ASCII character",
            what, c
        )))
    }
}
