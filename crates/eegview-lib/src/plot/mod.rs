//! Backend-neutral figures built from a `Session`.
//!
//! The adapter never modifies the session; each call builds a fresh `Figure`
//! that a `PlotBackend` can draw.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{EegError, Result};
use crate::montage::standard_1020_position;
use crate::session::Session;
use crate::spectrum::{session_psd, to_db, Band, WelchConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

const PALETTE: [u32; 8] = [
    0x1F77B4, 0xFF7F0E, 0x2CA02C, 0xD62728, 0x9467BD, 0x8C564B, 0xE377C2, 0x17BECF,
];

fn palette(idx: usize) -> Color {
    Color(PALETTE[idx % PALETTE.len()])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Scalar value per electrode for one frequency band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopoSeries {
    pub band: String,
    pub labels: Vec<String>,
    pub positions: Vec<[f64; 2]>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Topo(TopoSeries),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn with_axes(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    pub fn lines(&self) -> impl Iterator<Item = &LineSeries> {
        self.series.iter().filter_map(|series| match series {
            Series::Line(line) => Some(line),
            Series::Topo(_) => None,
        })
    }

    pub fn topos(&self) -> impl Iterator<Item = &TopoSeries> {
        self.series.iter().filter_map(|series| match series {
            Series::Topo(topo) => Some(topo),
            Series::Line(_) => None,
        })
    }
}

/// Rendering collaborator: accepts a figure and produces a visual artifact.
pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelSelection {
    All,
    Labels(Vec<String>),
}

impl ChannelSelection {
    /// Parse a comma separated list; an empty string selects everything.
    pub fn parse(list: &str) -> Self {
        let labels: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if labels.is_empty() {
            ChannelSelection::All
        } else {
            ChannelSelection::Labels(labels)
        }
    }

    /// Column indices of the selected channels, in selection order.
    pub fn resolve(&self, session: &Session) -> Result<Vec<usize>> {
        match self {
            ChannelSelection::All => Ok((0..session.channels().len()).collect()),
            ChannelSelection::Labels(labels) => labels
                .iter()
                .map(|label| session.channel_index(label))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlotKind {
    /// All selected channels overlaid on one time axis.
    Trace,
    /// Channels offset vertically; `None` spaces them by the largest peak-to-peak.
    Stacked { spacing: Option<f64> },
    /// Welch PSD up to `fmax`.
    Psd { fmax: f64, db: bool, average: bool },
    /// Band power per electrode.
    Topomap { bands: Vec<Band> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRequest {
    pub kind: PlotKind,
    pub channels: ChannelSelection,
    pub title: Option<String>,
    pub max_points: usize,
}

impl PlotRequest {
    pub fn new(kind: PlotKind) -> Self {
        Self {
            kind,
            channels: ChannelSelection::All,
            title: None,
            max_points: 4096,
        }
    }

    pub fn channels(mut self, channels: ChannelSelection) -> Self {
        self.channels = channels;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// `[0, 1/R, ..., (N-1)/R]`
pub fn time_axis(rows: usize, sampling_rate_hz: f64) -> Vec<f64> {
    (0..rows).map(|i| i as f64 / sampling_rate_hz).collect()
}

/// Arrays handed to a plotting collaborator: one time axis, one amplitude
/// vector per selected channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceInput {
    pub time: Vec<f64>,
    pub labels: Vec<String>,
    pub amplitudes: Vec<Vec<f64>>,
}

pub fn prepare_traces(session: &Session, selection: &ChannelSelection) -> Result<TraceInput> {
    let indices = selection.resolve(session)?;
    Ok(TraceInput {
        time: session.time_axis(),
        labels: indices
            .iter()
            .map(|&i| session.channels()[i].label.clone())
            .collect(),
        amplitudes: indices
            .iter()
            .map(|&i| session.samples().column(i))
            .collect(),
    })
}

pub fn build_figure(session: &Session, request: &PlotRequest) -> Result<Figure> {
    match &request.kind {
        PlotKind::Trace => trace_figure(session, request),
        PlotKind::Stacked { spacing } => stacked_figure(session, request, *spacing),
        PlotKind::Psd { fmax, db, average } => psd_figure(session, request, *fmax, *db, *average),
        PlotKind::Topomap { bands } => topomap_figure(session, request, bands),
    }
}

/// Build the requested figure and hand it to `backend`. Nothing is drawn when
/// the request cannot be satisfied.
pub fn render(
    session: &Session,
    request: &PlotRequest,
    backend: &mut dyn PlotBackend,
) -> anyhow::Result<Figure> {
    let fig = build_figure(session, request)?;
    backend.draw(&fig)?;
    Ok(fig)
}

fn trace_figure(session: &Session, request: &PlotRequest) -> Result<Figure> {
    let input = prepare_traces(session, &request.channels)?;
    let mut fig = Figure::new(request.title.clone().or_else(|| Some("EEG traces".into())))
        .with_axes("Time (s)", "Amplitude");
    for (idx, (label, values)) in input.labels.iter().zip(&input.amplitudes).enumerate() {
        fig.add_series(line(label, &input.time, values, 0.0, request.max_points, idx));
    }
    Ok(fig)
}

fn stacked_figure(
    session: &Session,
    request: &PlotRequest,
    spacing: Option<f64>,
) -> Result<Figure> {
    let input = prepare_traces(session, &request.channels)?;
    let centered: Vec<Vec<f64>> = input
        .amplitudes
        .iter()
        .map(|values| {
            let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
            values.iter().map(|v| v - mean).collect()
        })
        .collect();
    let spacing = spacing
        .filter(|s| *s > 0.0)
        .unwrap_or_else(|| {
            centered
                .iter()
                .map(|values| peak_to_peak(values))
                .fold(0.0, f64::max)
        });
    let spacing = if spacing > 0.0 { spacing } else { 1.0 };
    let count = centered.len();
    let mut fig = Figure::new(request.title.clone().or_else(|| Some("Raw EEG".into())))
        .with_axes("Time (s)", "Channel");
    for (idx, (label, values)) in input.labels.iter().zip(&centered).enumerate() {
        let offset = (count - 1 - idx) as f64 * spacing;
        fig.add_series(line(label, &input.time, values, offset, request.max_points, idx));
    }
    Ok(fig)
}

fn psd_figure(
    session: &Session,
    request: &PlotRequest,
    fmax: f64,
    db: bool,
    average: bool,
) -> Result<Figure> {
    let subset = selected_session(session, &request.channels)?;
    let spectra = session_psd(&subset, Some(fmax), &WelchConfig::default());
    let unit = if db { "Power (dB)" } else { "Power (units²/Hz)" };
    let mut fig = Figure::new(
        request
            .title
            .clone()
            .or_else(|| Some("Power spectral density".into())),
    )
    .with_axes("Frequency (Hz)", unit);
    let curves = if average {
        vec![("mean".to_string(), spectra.average().power)]
    } else {
        spectra
            .labels
            .iter()
            .cloned()
            .zip(spectra.power.iter().cloned())
            .collect()
    };
    for (idx, (name, power)) in curves.into_iter().enumerate() {
        let values: Vec<f64> = if db {
            power.iter().map(|p| to_db(*p)).collect()
        } else {
            power
        };
        fig.add_series(line(&name, &spectra.freqs, &values, 0.0, usize::MAX, idx));
    }
    Ok(fig)
}

fn topomap_figure(session: &Session, request: &PlotRequest, bands: &[Band]) -> Result<Figure> {
    let subset = selected_session(session, &request.channels)?;
    let positioned: Vec<(usize, [f64; 2])> = subset
        .channels()
        .iter()
        .enumerate()
        .filter_map(|(idx, channel)| match standard_1020_position(&channel.label) {
            Some((x, y)) => Some((idx, [x, y])),
            None => {
                warn!("no 10-20 position for channel '{}'", channel.label);
                None
            }
        })
        .collect();
    if positioned.is_empty() {
        return Err(EegError::NoMontagePositions);
    }
    let fmax = bands.iter().map(|b| b.hi).fold(0.0, f64::max);
    let spectra = session_psd(&subset, Some(fmax), &WelchConfig::default());
    let powers = spectra.band_powers(bands);
    let mut fig = Figure::new(
        request
            .title
            .clone()
            .or_else(|| Some("Band power topography".into())),
    );
    for (band, per_channel) in bands.iter().zip(powers) {
        fig.add_series(Series::Topo(TopoSeries {
            band: band.name.clone(),
            labels: positioned
                .iter()
                .map(|(idx, _)| spectra.labels[*idx].clone())
                .collect(),
            positions: positioned.iter().map(|(_, pos)| *pos).collect(),
            values: positioned.iter().map(|(idx, _)| per_channel[*idx]).collect(),
        }));
    }
    Ok(fig)
}

fn selected_session(session: &Session, selection: &ChannelSelection) -> Result<Session> {
    match selection {
        ChannelSelection::All => Ok(session.clone()),
        ChannelSelection::Labels(labels) => {
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            session.select_channels(&labels)
        }
    }
}

fn line(
    name: &str,
    xs: &[f64],
    ys: &[f64],
    offset: f64,
    max_points: usize,
    idx: usize,
) -> Series {
    let points: Vec<[f64; 2]> = xs.iter().zip(ys).map(|(x, y)| [*x, y + offset]).collect();
    Series::Line(LineSeries {
        name: name.into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 1.4,
            dash: None,
            color: palette(idx),
        },
    })
}

fn peak_to_peak(values: &[f64]) -> f64 {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    if hi >= lo {
        hi - lo
    } else {
        0.0
    }
}

/// Keep at most `max_points` evenly spaced points. Display only; the session
/// itself is never thinned.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}
