//! Turns the untyped rows of a device export into a validated [`Session`].
//!
//! The layout descriptor decides which rows are metadata, where channel names
//! and the sampling rate live, and which columns carry signal. Everything past
//! the metadata region is data: every data row must have the same width as the
//! first one and every signal cell must be a finite number. Row order is the
//! time order.

use log::{debug, warn};
use std::path::Path;

use crate::error::{EegError, Result, ValidationError};
use crate::io::raw::{read_raw_table, RawRow, RawTable};
use crate::layout::{DeviceLayout, SamplingRate};
use crate::session::{AuxColumn, ChannelSpec, SampleMatrix, Session, SessionParts, SessionWarning};

/// Read `path` and reconstruct it with `layout`.
pub fn load_session(path: &Path, layout: &DeviceLayout) -> Result<Session> {
    layout.validate()?;
    let table = read_raw_table(path, &layout.reader_options()?)?;
    reconstruct(&table, layout)
}

pub fn reconstruct(table: &RawTable, layout: &DeviceLayout) -> Result<Session> {
    layout.validate()?;
    let split = metadata_split(&table.rows, layout).min(table.rows.len());
    let (metadata, data) = table.rows.split_at(split);
    debug!(
        "{}: {} metadata rows, {} data rows",
        table.source.display(),
        metadata.len(),
        data.len()
    );
    let first = data.first().ok_or(ValidationError::EmptySession)?;

    let width = first.len();
    let columns = layout.data_column_indices(width);
    let needed = required_width(layout);
    if width < needed || columns.is_empty() {
        return Err(ValidationError::RaggedMatrix {
            line: first.line,
            expected: needed,
            found: width,
        }
        .into());
    }

    let channels = channel_specs(metadata, layout, &columns)?;

    let mut rows = Vec::with_capacity(data.len());
    let mut lines = Vec::with_capacity(data.len());
    let mut raw_timestamps = layout.timestamp_column.map(|_| Vec::with_capacity(data.len()));
    for row in data {
        if row.len() != width {
            return Err(ValidationError::RaggedMatrix {
                line: row.line,
                expected: width,
                found: row.len(),
            }
            .into());
        }
        let values = columns
            .iter()
            .map(|&col| parse_cell(row, col))
            .collect::<Result<Vec<f64>>>()?;
        if let (Some(col), Some(ts)) = (layout.timestamp_column, raw_timestamps.as_mut()) {
            ts.push(parse_cell(row, col)? * layout.timestamp_scale);
        }
        rows.push(values);
        lines.push(row.line);
    }

    let warnings = match &raw_timestamps {
        Some(ts) => check_timestamp_order(ts, &lines, layout.strict_timestamps)?,
        None => Vec::new(),
    };

    let sampling_rate_hz = match &layout.sampling_rate {
        SamplingRate::Fixed { hz } => *hz,
        SamplingRate::Metadata { row, column } => metadata_rate(metadata, *row, *column)?,
        SamplingRate::FromTimestamps => rate_from_timestamps(raw_timestamps.as_deref())?,
    };

    let auxiliary = layout
        .aux_columns
        .iter()
        .map(|&col| AuxColumn {
            label: label_row(metadata, layout)
                .and_then(|row| row.get(col))
                .filter(|label| !label.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Aux{}", col)),
            column: col,
            values: data
                .iter()
                .map(|row| row.get(col).unwrap_or_default().to_string())
                .collect(),
        })
        .collect();

    let samples = SampleMatrix::from_rows(rows, Some(&lines))?;
    let session = Session::new(SessionParts {
        channels,
        sampling_rate_hz,
        samples: Some(samples),
        start_timestamp: raw_timestamps.as_ref().and_then(|ts| ts.first().copied()),
        timestamps: raw_timestamps,
        auxiliary,
        warnings,
    })?;
    debug!(
        "reconstructed {} x {} session at {} Hz",
        session.len(),
        session.channels().len(),
        session.sampling_rate_hz()
    );
    Ok(session)
}

/// Index of the first data row.
fn metadata_split(rows: &[RawRow], layout: &DeviceLayout) -> usize {
    match layout.metadata_row_count {
        Some(count) => count,
        None => rows
            .iter()
            .position(|row| looks_like_data(row, layout))
            .unwrap_or(rows.len()),
    }
}

fn looks_like_data(row: &RawRow, layout: &DeviceLayout) -> bool {
    let columns = layout.data_column_indices(row.len());
    let timestamp_ok = layout
        .timestamp_column
        .map_or(true, |col| row.numeric(col).is_some());
    !columns.is_empty() && timestamp_ok && columns.iter().all(|&col| row.numeric(col).is_some())
}

/// Smallest row width the layout can address.
fn required_width(layout: &DeviceLayout) -> usize {
    let range_end = layout
        .data_columns
        .end
        .unwrap_or(layout.data_columns.start + 1);
    let timestamp_end = layout.timestamp_column.map_or(0, |col| col + 1);
    let aux_end = layout.aux_columns.iter().map(|col| col + 1).max().unwrap_or(0);
    range_end.max(timestamp_end).max(aux_end)
}

fn label_row<'a>(metadata: &'a [RawRow], layout: &DeviceLayout) -> Option<&'a RawRow> {
    layout
        .channel_label_row_index
        .and_then(|idx| metadata.get(idx))
}

fn channel_specs(
    metadata: &[RawRow],
    layout: &DeviceLayout,
    columns: &[usize],
) -> Result<Vec<ChannelSpec>> {
    let labels: Vec<String> = if let Some(labels) = &layout.channel_labels {
        labels.iter().map(|label| label.trim().to_string()).collect()
    } else if let Some(idx) = layout.channel_label_row_index {
        let row = metadata.get(idx).ok_or_else(|| {
            EegError::InvalidLayout(format!(
                "channel label row {} is not part of the {} metadata rows",
                idx,
                metadata.len()
            ))
        })?;
        columns
            .iter()
            .map_while(|&col| row.get(col))
            .enumerate()
            .map(|(idx, label)| {
                if label.is_empty() {
                    format!("Ch{}", idx + 1)
                } else {
                    label.to_string()
                }
            })
            .collect()
    } else {
        (1..=columns.len()).map(|n| format!("Ch{}", n)).collect()
    };
    if labels.len() != columns.len() {
        return Err(ValidationError::ChannelCountMismatch {
            labels: labels.len(),
            columns: columns.len(),
        }
        .into());
    }
    Ok(labels
        .into_iter()
        .zip(columns)
        .map(|(label, &column)| ChannelSpec { label, column })
        .collect())
}

fn parse_cell(row: &RawRow, column: usize) -> Result<f64> {
    let text = row.get(column).unwrap_or_default();
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(EegError::Parse {
            line: row.line,
            column,
            value: text.to_string(),
        }),
    }
}

fn metadata_rate(metadata: &[RawRow], row: usize, column: usize) -> Result<f64> {
    let source = metadata.get(row).ok_or_else(|| {
        EegError::InvalidLayout(format!(
            "sampling rate row {} is not part of the {} metadata rows",
            row,
            metadata.len()
        ))
    })?;
    let text = source.get(column).unwrap_or_default();
    first_number(text).ok_or_else(|| EegError::Parse {
        line: source.line,
        column,
        value: text.to_string(),
    })
}

/// Rate from free text, e.g. `"Sample Rate: 250 Hz"` -> 250. A number
/// followed by `Hz` wins; otherwise the first number is used.
fn first_number(text: &str) -> Option<f64> {
    let numbers = numeric_tokens(text);
    numbers
        .iter()
        .find(|(_, end)| {
            text[*end..]
                .trim_start()
                .get(..2)
                .map_or(false, |unit| unit.eq_ignore_ascii_case("hz"))
        })
        .or_else(|| numbers.first())
        .map(|(value, _)| *value)
}

/// Unsigned numbers starting at a digit, with the byte offset where each ends.
fn numeric_tokens(text: &str) -> Vec<(f64, usize)> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        if !bytes[pos].is_ascii_digit() {
            pos += 1;
            continue;
        }
        let start = pos;
        let mut run_end = pos;
        while run_end < bytes.len()
            && (bytes[run_end].is_ascii_digit()
                || matches!(bytes[run_end], b'.' | b'e' | b'E' | b'+' | b'-'))
        {
            run_end += 1;
        }
        // Longest prefix of the run that is a valid number; a single digit always is.
        match (start + 1..=run_end)
            .rev()
            .find_map(|end| text[start..end].parse::<f64>().ok().map(|v| (v, end)))
        {
            Some((value, end)) => {
                tokens.push((value, end));
                pos = end;
            }
            None => pos = run_end,
        }
    }
    tokens
}

fn rate_from_timestamps(timestamps: Option<&[f64]>) -> Result<f64> {
    let ts = timestamps.unwrap_or_default();
    let mut steps: Vec<f64> = ts
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|step| *step > 0.0)
        .collect();
    if steps.is_empty() {
        return Err(ValidationError::NonPositiveRate { rate: 0.0 }.into());
    }
    steps.sort_by(|a, b| a.total_cmp(b));
    let median = steps[steps.len() / 2];
    Ok(1.0 / median)
}

fn check_timestamp_order(
    timestamps: &[f64],
    lines: &[u64],
    strict: bool,
) -> Result<Vec<SessionWarning>> {
    let mut warnings = Vec::new();
    for (idx, pair) in timestamps.windows(2).enumerate() {
        if pair[1] < pair[0] {
            let line = lines[idx + 1];
            if strict {
                return Err(EegError::TimestampOrder {
                    line,
                    previous: pair[0],
                    current: pair[1],
                });
            }
            warn!(
                "timestamp decreases at line {} ({} -> {})",
                line, pair[0], pair[1]
            );
            warnings.push(SessionWarning::TimestampOrder {
                line,
                previous: pair[0],
                current: pair[1],
            });
        }
    }
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::raw::{parse_raw_table, ReaderOptions};
    use crate::layout::ColumnRange;
    use std::path::PathBuf;

    fn table(text: &str) -> RawTable {
        parse_raw_table(
            text.as_bytes(),
            &ReaderOptions::default(),
            Path::new("inline.csv"),
        )
        .expect("raw table")
    }

    fn two_row_header_layout() -> DeviceLayout {
        DeviceLayout {
            metadata_row_count: Some(2),
            channel_label_row_index: Some(1),
            ..DeviceLayout::generic(250.0)
        }
    }

    const UNICORN_EXPORT: &str = "Unicorn Export\nCh1,Ch2\n1.0,2.0\n1.1,2.1\n1.2,2.2\n";

    #[test]
    fn reconstructs_labelled_export() {
        let session = reconstruct(&table(UNICORN_EXPORT), &two_row_header_layout()).unwrap();
        assert_eq!(session.labels(), vec!["Ch1", "Ch2"]);
        assert_eq!(session.sampling_rate_hz(), 250.0);
        assert_eq!(session.samples().rows(), 3);
        assert_eq!(session.samples().cols(), 2);
        assert_eq!(session.samples().row(0), &[1.0, 2.0]);
        assert_eq!(session.samples().row(1), &[1.1, 2.1]);
        assert_eq!(session.samples().row(2), &[1.2, 2.2]);
        assert!(session.warnings().is_empty());
        assert_eq!(session.start_timestamp(), None);
    }

    #[test]
    fn reconstruction_is_idempotent() {
        let raw = table(UNICORN_EXPORT);
        let layout = two_row_header_layout();
        let a = reconstruct(&raw, &layout).unwrap();
        let b = reconstruct(&raw, &layout).unwrap();
        assert_eq!(a.channels(), b.channels());
        assert_eq!(a.sampling_rate_hz(), b.sampling_rate_hz());
        assert_eq!(a.samples(), b.samples());
    }

    #[test]
    fn sniffing_finds_first_numeric_row() {
        let layout = DeviceLayout {
            metadata_row_count: None,
            channel_label_row_index: Some(1),
            ..DeviceLayout::generic(250.0)
        };
        let session = reconstruct(&table(UNICORN_EXPORT), &layout).unwrap();
        assert_eq!(session.len(), 3);
        assert_eq!(session.labels(), vec!["Ch1", "Ch2"]);
    }

    #[test]
    fn fixed_metadata_count_does_not_resniff() {
        let err = reconstruct(
            &table("Ch1,Ch2\n1,2\nnote,here\n"),
            &DeviceLayout::generic(250.0),
        )
        .unwrap_err();
        match err {
            EegError::Parse { line, column, value } => {
                assert_eq!((line, column, value.as_str()), (3, 0, "note"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_row_is_ragged() {
        let err = reconstruct(
            &table("Unicorn Export\nCh1,Ch2\n1.0,2.0\n1.1\n1.2,2.2\n"),
            &two_row_header_layout(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EegError::SessionValidation(ValidationError::RaggedMatrix {
                line: 4,
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn long_row_is_ragged_even_with_closed_range() {
        let layout = DeviceLayout {
            data_columns: ColumnRange::new(0, 2),
            ..two_row_header_layout()
        };
        let err = reconstruct(
            &table("Unicorn Export\nCh1,Ch2\n1.0,2.0\n1.1,2.1,9\n"),
            &layout,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ragged-matrix");
    }

    #[test]
    fn duplicate_labels_fail() {
        let err = reconstruct(
            &table("Unicorn Export\nCz,Cz\n1,2\n"),
            &two_row_header_layout(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EegError::SessionValidation(ValidationError::DuplicateLabel { ref label }) if label == "Cz"
        ));
    }

    #[test]
    fn header_only_file_is_empty_session() {
        let err = reconstruct(&table("Unicorn Export\nCh1,Ch2\n"), &two_row_header_layout())
            .unwrap_err();
        assert!(matches!(
            err,
            EegError::SessionValidation(ValidationError::EmptySession)
        ));
    }

    #[test]
    fn explicit_labels_must_match_column_count() {
        let layout = DeviceLayout {
            channel_labels: Some(vec!["Fz".into()]),
            ..two_row_header_layout()
        };
        let err = reconstruct(&table(UNICORN_EXPORT), &layout).unwrap_err();
        assert_eq!(err.kind(), "channel-count-mismatch");
    }

    #[test]
    fn generates_labels_without_label_row() {
        let layout = DeviceLayout {
            metadata_row_count: Some(0),
            channel_label_row_index: None,
            ..DeviceLayout::generic(128.0)
        };
        let session = reconstruct(&table("1,2,3\n4,5,6\n"), &layout).unwrap();
        assert_eq!(session.labels(), vec!["Ch1", "Ch2", "Ch3"]);
        assert_eq!(session.channels()[2].column, 2);
    }

    #[test]
    fn non_finite_cells_are_parse_errors() {
        let err = reconstruct(
            &table("Unicorn Export\nCh1,Ch2\n1.0,NaN\n"),
            &two_row_header_layout(),
        )
        .unwrap_err();
        assert!(matches!(err, EegError::Parse { line: 3, column: 1, .. }));
    }

    #[test]
    fn reads_rate_from_metadata() {
        let layout = DeviceLayout {
            sampling_rate: SamplingRate::Metadata { row: 0, column: 1 },
            ..two_row_header_layout()
        };
        let session = reconstruct(
            &table("Device,Sample Rate: 125 Hz\nCh1,Ch2\n1,2\n3,4\n"),
            &layout,
        )
        .unwrap();
        assert_eq!(session.sampling_rate_hz(), 125.0);

        let err = reconstruct(&table("Device,unknown\nCh1,Ch2\n1,2\n"), &layout).unwrap_err();
        assert!(matches!(err, EegError::Parse { line: 1, column: 1, .. }));
    }

    #[test]
    fn zero_metadata_rate_is_rejected() {
        let layout = DeviceLayout {
            sampling_rate: SamplingRate::Metadata { row: 0, column: 1 },
            ..two_row_header_layout()
        };
        let err = reconstruct(&table("Device,rate 0\nCh1,Ch2\n1,2\n"), &layout).unwrap_err();
        assert_eq!(err.kind(), "non-positive-rate");
    }

    #[test]
    fn zero_fixed_rate_is_rejected() {
        let err = reconstruct(&table("Ch1,Ch2\n1,2\n"), &DeviceLayout::generic(0.0)).unwrap_err();
        assert_eq!(err.kind(), "non-positive-rate");
        let err =
            reconstruct(&table("Ch1,Ch2\n1,2\n"), &DeviceLayout::generic(f64::NAN)).unwrap_err();
        assert!(matches!(
            err,
            EegError::SessionValidation(ValidationError::NonPositiveRate { .. })
        ));
    }

    #[test]
    fn delimiter_only_row_is_a_parse_error() {
        let err = reconstruct(&table("Ch1,Ch2\n1,2\n,\n3,4\n"), &DeviceLayout::generic(250.0))
            .unwrap_err();
        assert!(matches!(err, EegError::Parse { line: 3, column: 0, .. }));
    }

    #[test]
    fn empty_labels_fall_back_to_generated_names() {
        let session =
            reconstruct(&table("Fz,,Cz\n1,2,3\n"), &DeviceLayout::generic(250.0)).unwrap();
        assert_eq!(session.labels(), vec!["Fz", "Ch2", "Cz"]);
        assert_eq!(session.channel_data("Ch2").unwrap(), vec![2.0]);
    }

    #[test]
    fn rate_text_prefers_number_with_unit() {
        assert_eq!(first_number("Sample Rate: 250 Hz"), Some(250.0));
        assert_eq!(first_number("rate-250"), Some(250.0));
        assert_eq!(first_number("fw 1.2, 250 Hz"), Some(250.0));
        assert_eq!(first_number("fw 1.2, 250hz"), Some(250.0));
        assert_eq!(first_number("fs=1e3"), Some(1000.0));
        assert_eq!(first_number("rate 0"), Some(0.0));
        assert_eq!(first_number("unknown"), None);
    }

    fn timestamped_layout() -> DeviceLayout {
        DeviceLayout {
            metadata_row_count: Some(1),
            channel_label_row_index: Some(0),
            timestamp_column: Some(0),
            aux_columns: vec![3],
            sampling_rate: SamplingRate::FromTimestamps,
            ..DeviceLayout::generic(1.0)
        }
    }

    #[test]
    fn timestamps_drive_rate_and_start() {
        let session = reconstruct(
            &table("time,Fz,Cz,marker\n10.000,1,2,0\n10.004,3,4,0\n10.008,5,6,1\n"),
            &timestamped_layout(),
        )
        .unwrap();
        assert_eq!(session.labels(), vec!["Fz", "Cz"]);
        assert!((session.sampling_rate_hz() - 250.0).abs() < 1e-6);
        assert_eq!(session.start_timestamp(), Some(10.0));
        assert_eq!(session.timestamps().map(<[f64]>::len), Some(3));
        assert_eq!(session.auxiliary()[0].label, "marker");
        assert_eq!(session.auxiliary()[0].values, vec!["0", "0", "1"]);
    }

    #[test]
    fn out_of_order_timestamp_is_a_warning() {
        let text = "time,Fz,Cz,marker\n1.0,1,2,0\n2.0,3,4,0\n1.5,5,6,0\n3.0,7,8,0\n";
        let session = reconstruct(&table(text), &timestamped_layout()).unwrap();
        assert_eq!(session.len(), 4);
        assert_eq!(
            session.warnings(),
            &[SessionWarning::TimestampOrder {
                line: 4,
                previous: 2.0,
                current: 1.5
            }]
        );
        // Row order is authoritative.
        assert_eq!(session.samples().row(2), &[5.0, 6.0]);

        let strict = DeviceLayout {
            strict_timestamps: true,
            ..timestamped_layout()
        };
        let err = reconstruct(&table(text), &strict).unwrap_err();
        assert!(matches!(err, EegError::TimestampOrder { line: 4, .. }));
    }

    #[test]
    fn loads_fixture_files() {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace root")
            .join("test_data");
        let session = load_session(&root.join("unicorn_sample.csv"), &DeviceLayout::unicorn())
            .expect("read unicorn sample");
        assert_eq!(session.labels(), crate::layout::UNICORN_CHANNELS.to_vec());
        assert_eq!(session.sampling_rate_hz(), 250.0);
        assert_eq!(session.len(), 10);

        let err = load_session(&root.join("empty.csv"), &DeviceLayout::unicorn()).unwrap_err();
        assert_eq!(err.kind(), "malformed-input");
    }
}
