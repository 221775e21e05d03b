use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{EegError, Result, ValidationError};

/// Identity of one signal channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub label: String,
    /// Column position in the raw table.
    pub column: usize,
}

/// Dense row-major matrix; rows are time steps, columns are channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl SampleMatrix {
    /// Build from equal-length rows. `lines` gives the source line of each row
    /// for error reporting; when absent, 1-based row positions are used.
    pub fn from_rows(rows: Vec<Vec<f64>>, lines: Option<&[u64]>) -> Result<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != cols {
                let line = lines
                    .and_then(|l| l.get(idx).copied())
                    .unwrap_or(idx as u64 + 1);
                return Err(ValidationError::RaggedMatrix {
                    line,
                    expected: cols,
                    found: row.len(),
                }
                .into());
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Build from per-channel columns of equal length.
    pub fn from_columns(columns: &[Vec<f64>]) -> Result<Self> {
        let rows = columns.first().map(Vec::len).unwrap_or(0);
        for (idx, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(ValidationError::RaggedMatrix {
                    line: idx as u64 + 1,
                    expected: rows,
                    found: column.len(),
                }
                .into());
            }
        }
        let cols = columns.len();
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            data.extend(columns.iter().map(|column| column[r]));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Samples of one time step, in channel order.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.rows()`; use [`SampleMatrix::get`] for checked access.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        self.data
            .iter()
            .skip(col)
            .step_by(self.cols.max(1))
            .copied()
            .collect()
    }

    pub fn columns(&self) -> Vec<Vec<f64>> {
        (0..self.cols).map(|col| self.column(col)).collect()
    }
}

/// Auxiliary (marker/trigger) column carried alongside the signal, untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxColumn {
    pub label: String,
    pub column: usize,
    pub values: Vec<String>,
}

/// Non-fatal conditions found while reconstructing a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionWarning {
    TimestampOrder {
        line: u64,
        previous: f64,
        current: f64,
    },
}

/// A validated, immutable multichannel recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    channels: Vec<ChannelSpec>,
    sampling_rate_hz: f64,
    samples: SampleMatrix,
    start_timestamp: Option<f64>,
    timestamps: Option<Vec<f64>>,
    auxiliary: Vec<AuxColumn>,
    warnings: Vec<SessionWarning>,
}

/// Builder-style inputs for `Session::new`.
#[derive(Debug, Clone, Default)]
pub struct SessionParts {
    pub channels: Vec<ChannelSpec>,
    pub sampling_rate_hz: f64,
    pub samples: Option<SampleMatrix>,
    pub start_timestamp: Option<f64>,
    pub timestamps: Option<Vec<f64>>,
    pub auxiliary: Vec<AuxColumn>,
    pub warnings: Vec<SessionWarning>,
}

impl Session {
    pub fn new(parts: SessionParts) -> Result<Self> {
        let samples = parts.samples.ok_or(ValidationError::EmptySession)?;
        validate(&parts.channels, parts.sampling_rate_hz, &samples)?;
        if let Some(ts) = &parts.timestamps {
            if ts.len() != samples.rows() {
                return Err(ValidationError::RaggedMatrix {
                    line: 0,
                    expected: samples.rows(),
                    found: ts.len(),
                }
                .into());
            }
        }
        Ok(Self {
            channels: parts.channels,
            sampling_rate_hz: parts.sampling_rate_hz,
            samples,
            start_timestamp: parts.start_timestamp,
            timestamps: parts.timestamps,
            auxiliary: parts.auxiliary,
            warnings: parts.warnings,
        })
    }

    pub fn channels(&self) -> &[ChannelSpec] {
        &self.channels
    }

    pub fn labels(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn sampling_rate_hz(&self) -> f64 {
        self.sampling_rate_hz
    }

    pub fn samples(&self) -> &SampleMatrix {
        &self.samples
    }

    pub fn start_timestamp(&self) -> Option<f64> {
        self.start_timestamp
    }

    pub fn timestamps(&self) -> Option<&[f64]> {
        self.timestamps.as_deref()
    }

    pub fn auxiliary(&self) -> &[AuxColumn] {
        &self.auxiliary
    }

    pub fn warnings(&self) -> &[SessionWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.samples.rows()
    }

    /// Always false for a constructed session.
    pub fn is_empty(&self) -> bool {
        self.samples.rows() == 0
    }

    pub fn duration_s(&self) -> f64 {
        self.samples.rows() as f64 / self.sampling_rate_hz
    }

    pub fn time_axis(&self) -> Vec<f64> {
        crate::plot::time_axis(self.samples.rows(), self.sampling_rate_hz)
    }

    pub fn channel_index(&self, label: &str) -> Result<usize> {
        self.channels
            .iter()
            .position(|c| c.label == label)
            .ok_or_else(|| EegError::UnknownChannel {
                label: label.to_string(),
            })
    }

    pub fn channel_data(&self, label: &str) -> Result<Vec<f64>> {
        let idx = self.channel_index(label)?;
        Ok(self.samples.column(idx))
    }

    /// Same channels and metadata, new sample values. Used by derived stages
    /// such as filtering; `self` is left untouched.
    pub fn with_samples(&self, samples: SampleMatrix) -> Result<Session> {
        let samples_rows = samples.rows();
        let timestamps = self
            .timestamps
            .as_ref()
            .filter(|ts| ts.len() == samples_rows)
            .cloned();
        Session::new(SessionParts {
            channels: self.channels.clone(),
            sampling_rate_hz: self.sampling_rate_hz,
            samples: Some(samples),
            start_timestamp: self.start_timestamp,
            timestamps,
            auxiliary: self
                .auxiliary
                .iter()
                .filter(|aux| aux.values.len() == samples_rows)
                .cloned()
                .collect(),
            warnings: self.warnings.clone(),
        })
    }

    /// New session restricted to `labels`, in the requested order.
    pub fn select_channels(&self, labels: &[&str]) -> Result<Session> {
        let indices = labels
            .iter()
            .map(|label| self.channel_index(label))
            .collect::<Result<Vec<_>>>()?;
        let columns: Vec<Vec<f64>> = indices.iter().map(|&i| self.samples.column(i)).collect();
        Session::new(SessionParts {
            channels: indices.iter().map(|&i| self.channels[i].clone()).collect(),
            sampling_rate_hz: self.sampling_rate_hz,
            samples: Some(SampleMatrix::from_columns(&columns)?),
            start_timestamp: self.start_timestamp,
            timestamps: self.timestamps.clone(),
            auxiliary: self.auxiliary.clone(),
            warnings: self.warnings.clone(),
        })
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            channels: self.channels.iter().map(|c| c.label.clone()).collect(),
            sampling_rate_hz: self.sampling_rate_hz,
            rows: self.samples.rows(),
            duration_s: self.duration_s(),
            start_timestamp: self.start_timestamp,
            auxiliary: self.auxiliary.iter().map(|a| a.label.clone()).collect(),
            warnings: self.warnings.clone(),
        }
    }
}

fn validate(channels: &[ChannelSpec], rate: f64, samples: &SampleMatrix) -> Result<()> {
    if samples.rows() == 0 {
        return Err(ValidationError::EmptySession.into());
    }
    if samples.cols() != channels.len() {
        return Err(ValidationError::ChannelCountMismatch {
            labels: channels.len(),
            columns: samples.cols(),
        }
        .into());
    }
    if !(rate.is_finite() && rate > 0.0) {
        return Err(ValidationError::NonPositiveRate { rate }.into());
    }
    let mut seen = HashSet::new();
    for channel in channels {
        if !seen.insert(channel.label.as_str()) {
            return Err(ValidationError::DuplicateLabel {
                label: channel.label.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Serializable overview of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub channels: Vec<String>,
    pub sampling_rate_hz: f64,
    pub rows: usize,
    pub duration_s: f64,
    pub start_timestamp: Option<f64>,
    pub auxiliary: Vec<String>,
    pub warnings: Vec<SessionWarning>,
}
