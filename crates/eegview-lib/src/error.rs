use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Invariant violations detected while building a `Session`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("duplicate channel label '{label}'")]
    DuplicateLabel { label: String },

    #[error("sampling rate must be positive, got {rate}")]
    NonPositiveRate { rate: f64 },

    #[error("session contains no samples")]
    EmptySession,

    #[error("ragged data at line {line}: expected {expected} columns, found {found}")]
    RaggedMatrix {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("{labels} channel labels for {columns} data columns")]
    ChannelCountMismatch { labels: usize, columns: usize },
}

#[derive(Debug, Error)]
pub enum EegError {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed input {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    #[error("line {line}, column {column}: '{value}' is not a number")]
    Parse {
        line: u64,
        column: usize,
        value: String,
    },

    #[error("invalid session: {0}")]
    SessionValidation(#[from] ValidationError),

    #[error("timestamp decreases at line {line} ({previous} -> {current})")]
    TimestampOrder {
        line: u64,
        previous: f64,
        current: f64,
    },

    #[error("unknown channel '{label}'")]
    UnknownChannel { label: String },

    #[error("invalid device layout: {0}")]
    InvalidLayout(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid epoch: {0}")]
    InvalidEpoch(String),

    #[error("none of the selected channels has a 10-20 position")]
    NoMontagePositions,
}

impl EegError {
    /// Stable short name of the error kind, suitable for logs and exit reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EegError::FileNotFound { .. } => "file-not-found",
            EegError::Io { .. } => "io",
            EegError::MalformedInput { .. } => "malformed-input",
            EegError::Parse { .. } => "parse",
            EegError::SessionValidation(inner) => match inner {
                ValidationError::DuplicateLabel { .. } => "duplicate-label",
                ValidationError::NonPositiveRate { .. } => "non-positive-rate",
                ValidationError::EmptySession => "empty-session",
                ValidationError::RaggedMatrix { .. } => "ragged-matrix",
                ValidationError::ChannelCountMismatch { .. } => "channel-count-mismatch",
            },
            EegError::TimestampOrder { .. } => "timestamp-order",
            EegError::UnknownChannel { .. } => "unknown-channel",
            EegError::InvalidLayout(_) => "invalid-layout",
            EegError::InvalidFilter(_) => "invalid-filter",
            EegError::InvalidEpoch(_) => "invalid-epoch",
            EegError::NoMontagePositions => "no-montage-positions",
        }
    }
}

pub type Result<T> = std::result::Result<T, EegError>;
