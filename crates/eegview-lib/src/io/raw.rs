use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::error::{EegError, Result};

/// One non-blank line of the source file, split into trimmed text fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line number in the source file.
    pub line: u64,
    pub fields: Vec<String>,
}

impl RawRow {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, column: usize) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Parse a single field as `f64`. Missing or non-numeric fields yield `None`.
    pub fn numeric(&self, column: usize) -> Option<f64> {
        self.get(column).and_then(|value| value.parse::<f64>().ok())
    }

    fn from_record(record: &StringRecord, fallback_line: u64) -> Self {
        let line = record
            .position()
            .map(|pos| pos.line())
            .unwrap_or(fallback_line);
        Self {
            line,
            fields: record.iter().map(|field| field.to_string()).collect(),
        }
    }

    /// A line with no content at all. Delimiter-only lines such as `,,` are
    /// rows of empty cells and are kept.
    fn is_blank(&self) -> bool {
        self.fields.len() <= 1 && self.fields.iter().all(|field| field.is_empty())
    }
}

/// Untyped rows of a delimited file, in file order.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub source: PathBuf,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Low-level tokenizer settings, usually derived from a `DeviceLayout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub delimiter: u8,
    pub comment: Option<u8>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            comment: None,
        }
    }
}

/// Read a delimited text file into a `RawTable`. Blank lines are skipped and no
/// column count is enforced.
pub fn read_raw_table(path: &Path, options: &ReaderOptions) -> Result<RawTable> {
    let file = File::open(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => EegError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => EegError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    })?;
    parse_raw_table(file, options, path)
}

/// Tokenize any reader into a `RawTable`; `source` is only used for error messages.
pub fn parse_raw_table<R: Read>(
    reader: R,
    options: &ReaderOptions,
    source: &Path,
) -> Result<RawTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(options.delimiter)
        .comment(options.comment)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|err| csv_error(err, source))?;
        let row = RawRow::from_record(&record, idx as u64 + 1);
        if row.is_blank() {
            continue;
        }
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(EegError::MalformedInput {
            path: source.to_path_buf(),
            reason: "file contains no rows".into(),
        });
    }
    debug!("read {} raw rows from {}", rows.len(), source.display());
    Ok(RawTable {
        source: source.to_path_buf(),
        rows,
    })
}

fn csv_error(err: csv::Error, source: &Path) -> EegError {
    let reason = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(io_err) => EegError::Io {
            path: source.to_path_buf(),
            source: io_err,
        },
        _ => EegError::MalformedInput {
            path: source.to_path_buf(),
            reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(text: &[u8]) -> Result<RawTable> {
        parse_raw_table(text, &ReaderOptions::default(), Path::new("memory.csv"))
    }

    #[test]
    fn keeps_short_header_rows_and_skips_blank_lines() {
        let table = parse(b"Unicorn Export\nCh1,Ch2\n\n1.0,2.0\n   \n1.1,2.1\n\n").unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.rows[0].fields, vec!["Unicorn Export"]);
        assert_eq!(table.rows[1].fields, vec!["Ch1", "Ch2"]);
        assert_eq!(table.rows[3].numeric(1), Some(2.1));
    }

    #[test]
    fn keeps_delimiter_only_rows() {
        let table = parse(b"Ch1,Ch2\n1,2\n,\n  \n3,4\n").unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.rows[2].fields, vec!["", ""]);
        assert_eq!(table.rows[2].line, 3);
    }

    #[test]
    fn records_source_line_numbers() {
        let table = parse(b"a,b\n\n\n1,2\n").unwrap();
        assert_eq!(table.rows[0].line, 1);
        assert_eq!(table.rows[1].line, 4);
    }

    #[test]
    fn trims_fields() {
        let table = parse(b" Fz , Cz \n 1.5 ,2\n").unwrap();
        assert_eq!(table.rows[0].fields, vec!["Fz", "Cz"]);
        assert_eq!(table.rows[1].numeric(0), Some(1.5));
    }

    #[test]
    fn honours_comment_and_delimiter() {
        let options = ReaderOptions {
            delimiter: b'\t',
            comment: Some(b'%'),
        };
        let table =
            parse_raw_table(&b"%OpenBCI header\nA\tB\n1\t2\n"[..], &options, Path::new("x")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1].fields, vec!["1", "2"]);
    }

    #[test]
    fn empty_input_is_malformed() {
        let err = parse(b"").unwrap_err();
        assert!(matches!(err, EegError::MalformedInput { .. }));
        let err = parse(b"\n\n  \n").unwrap_err();
        assert!(matches!(err, EegError::MalformedInput { .. }));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let err = parse(b"Ch1,Ch2\n\xff\xfe,1\n").unwrap_err();
        assert_eq!(err.kind(), "malformed-input");
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_raw_table(
            Path::new("/definitely/not/here.csv"),
            &ReaderOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EegError::FileNotFound { .. }));
    }

    #[test]
    fn reads_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Ch1,Ch2").unwrap();
        writeln!(file, "1,2").unwrap();
        let table = read_raw_table(file.path(), &ReaderOptions::default()).unwrap();
        assert_eq!(table.source, file.path());
        assert_eq!(table.len(), 2);
    }
}
