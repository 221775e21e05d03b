use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use eegview_lib::{
    epochs::{average_epochs, fixed_length_epochs},
    filter::{apply_filters, FilterSpec},
    layout::SamplingRate,
    load_session,
    plot::{render, ChannelSelection, Figure, PlotBackend, PlotKind, PlotRequest, TopoSeries},
    spectrum::{session_psd, Band, WelchConfig},
    DeviceLayout, Session,
};
use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "eegview",
    version,
    about = "Inspect, filter and plot CSV exports of EEG headsets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Device {
    /// g.tec Unicorn Recorder export (8 channels, 250 Hz)
    #[value(name = "unicorn")]
    Unicorn,
    /// Label row followed by numeric rows, every column a channel
    #[value(name = "generic")]
    Generic,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Kind {
    Trace,
    Stacked,
    Psd,
    Topomap,
}

#[derive(Args)]
struct InputArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, value_enum, default_value = "unicorn")]
    device: Device,
    /// TOML device layout; overrides --device
    #[arg(long)]
    layout: Option<PathBuf>,
    /// Sampling rate in Hz; overrides the layout's rate
    #[arg(long)]
    rate: Option<f64>,
}

impl InputArgs {
    fn device_layout(&self) -> Result<DeviceLayout> {
        let mut layout = match (&self.layout, self.device) {
            (Some(path), _) => DeviceLayout::from_toml_file(path)
                .with_context(|| format!("loading layout {}", path.display()))?,
            (None, Device::Unicorn) => DeviceLayout::unicorn(),
            (None, Device::Generic) => DeviceLayout::generic(250.0),
        };
        if let Some(hz) = self.rate {
            layout.sampling_rate = SamplingRate::Fixed { hz };
        }
        Ok(layout)
    }

    fn load(&self) -> Result<Session> {
        let layout = self.device_layout()?;
        let session = load_session(&self.input, &layout)
            .with_context(|| format!("loading {}", self.input.display()))?;
        info!(
            "loaded {} rows x {} channels from {}",
            session.len(),
            session.channels().len(),
            self.input.display()
        );
        Ok(session)
    }
}

#[derive(Args)]
struct FilterArgs {
    /// High-pass cutoff in Hz
    #[arg(long)]
    l_freq: Option<f64>,
    /// Low-pass cutoff in Hz
    #[arg(long)]
    h_freq: Option<f64>,
    /// Line-noise notch in Hz
    #[arg(long)]
    notch: Option<f64>,
}

impl FilterArgs {
    fn spec(&self) -> FilterSpec {
        FilterSpec {
            l_freq: self.l_freq,
            h_freq: self.h_freq,
            notch: self.notch,
            ..FilterSpec::default()
        }
    }

    fn apply(&self, session: Session) -> Result<Session> {
        let spec = self.spec();
        if spec.is_empty() {
            return Ok(session);
        }
        apply_filters(&session, &spec).context("filtering session")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print a JSON summary of a recording
    Info {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Render one figure to PNG/SVG, or to JSON with --json
    Plot {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value = "trace")]
        kind: Kind,
        /// Comma separated channel labels; all channels when omitted
        #[arg(long, default_value = "")]
        channels: String,
        #[arg(long, default_value_t = 30.0)]
        fmax: f64,
        /// Plot the channel mean instead of one PSD curve per channel
        #[arg(long)]
        average: bool,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print per-channel band powers as JSON
    Psd {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = 30.0)]
        fmax: f64,
    },
    /// Filter 1-30 Hz with a 50 Hz notch and write raw, PSD, evoked and topomap figures
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        out_dir: PathBuf,
        /// Epoch length used for the evoked average
        #[arg(long, default_value_t = 1.0)]
        epoch_s: f64,
        /// Write figures as JSON instead of PNG
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Info { input } => cmd_info(&input)?,
        Commands::Plot {
            input,
            filter,
            out,
            kind,
            channels,
            fmax,
            average,
            title,
            json,
        } => {
            let mut request = PlotRequest::new(plot_kind(kind, fmax, average))
                .channels(ChannelSelection::parse(&channels));
            if let Some(title) = title {
                request = request.title(title);
            }
            cmd_plot(&input, &filter, &request, &out, json)?
        }
        Commands::Psd {
            input,
            filter,
            fmax,
        } => cmd_psd(&input, &filter, fmax)?,
        Commands::Analyze {
            input,
            out_dir,
            epoch_s,
            json,
        } => cmd_analyze(&input, &out_dir, epoch_s, json)?,
    }
    Ok(())
}

fn plot_kind(kind: Kind, fmax: f64, average: bool) -> PlotKind {
    match kind {
        Kind::Trace => PlotKind::Trace,
        Kind::Stacked => PlotKind::Stacked { spacing: None },
        Kind::Psd => PlotKind::Psd {
            fmax,
            db: true,
            average,
        },
        Kind::Topomap => PlotKind::Topomap {
            bands: Band::standard()
                .into_iter()
                .filter(|band| band.lo < fmax)
                .collect(),
        },
    }
}

fn cmd_info(input: &InputArgs) -> Result<()> {
    let session = input.load()?;
    println!("{}", serde_json::to_string(&session.summary())?);
    Ok(())
}

fn cmd_plot(
    input: &InputArgs,
    filter: &FilterArgs,
    request: &PlotRequest,
    out: &Path,
    json: bool,
) -> Result<()> {
    let session = filter.apply(input.load()?)?;
    let mut backend = figure_backend(out, json);
    render(&session, request, backend.as_mut())
        .with_context(|| format!("rendering {}", out.display()))?;
    Ok(())
}

#[derive(Serialize)]
struct ChannelBandPower {
    label: String,
    /// One value per entry of `bands`, in units²
    powers: Vec<f64>,
}

#[derive(Serialize)]
struct PsdOutput {
    sampling_rate_hz: f64,
    resolution_hz: f64,
    bands: Vec<Band>,
    channels: Vec<ChannelBandPower>,
}

fn cmd_psd(input: &InputArgs, filter: &FilterArgs, fmax: f64) -> Result<()> {
    let session = filter.apply(input.load()?)?;
    let bands: Vec<Band> = Band::standard()
        .into_iter()
        .filter(|band| band.lo < fmax)
        .collect();
    let spectra = session_psd(&session, Some(fmax), &WelchConfig::default());
    let per_band = spectra.band_powers(&bands);
    let channels = spectra
        .labels
        .iter()
        .enumerate()
        .map(|(idx, label)| ChannelBandPower {
            label: label.clone(),
            powers: per_band.iter().map(|band| band[idx]).collect(),
        })
        .collect();
    let output = PsdOutput {
        sampling_rate_hz: session.sampling_rate_hz(),
        resolution_hz: spectra.channel(0).resolution(),
        bands,
        channels,
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

#[derive(Serialize)]
struct AnalyzeOutput {
    summary: eegview_lib::SessionSummary,
    epochs: usize,
    figures: Vec<PathBuf>,
}

fn cmd_analyze(input: &InputArgs, out_dir: &Path, epoch_s: f64, json: bool) -> Result<()> {
    let raw = input.load()?;
    let filtered = apply_filters(&raw, &FilterSpec::standard()).context("filtering session")?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let epochs = fixed_length_epochs(&filtered, epoch_s)?;
    let evoked = average_epochs(&filtered, &epochs)
        .with_context(|| format!("averaging {} s epochs", epoch_s))?;
    info!("averaged {} epochs of {} s", epochs.len(), epoch_s);

    let ext = if json { "json" } else { "png" };
    let plan = [
        (
            "raw",
            &filtered,
            PlotRequest::new(PlotKind::Stacked { spacing: None }).title("Filtered EEG"),
        ),
        (
            "psd",
            &filtered,
            PlotRequest::new(PlotKind::Psd {
                fmax: 30.0,
                db: true,
                average: true,
            }),
        ),
        (
            "evoked",
            &evoked,
            PlotRequest::new(PlotKind::Trace).title("Average of fixed-length epochs"),
        ),
        (
            "topomap",
            &filtered,
            PlotRequest::new(PlotKind::Topomap {
                bands: Band::standard(),
            }),
        ),
    ];
    let mut figures = Vec::with_capacity(plan.len());
    for (name, session, request) in plan {
        let path = out_dir.join(format!("{}.{}", name, ext));
        let mut backend = figure_backend(&path, json);
        render(session, &request, backend.as_mut())
            .with_context(|| format!("rendering {}", path.display()))?;
        info!("wrote {}", path.display());
        figures.push(path);
    }

    let output = AnalyzeOutput {
        summary: raw.summary(),
        epochs: epochs.len(),
        figures,
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn figure_backend(path: &Path, json: bool) -> Box<dyn PlotBackend> {
    if json {
        Box::new(JsonBackend {
            path: path.to_path_buf(),
        })
    } else {
        Box::new(PlottersBackend {
            path: path.to_path_buf(),
            size: (1000, 600),
        })
    }
}

/// Writes the figure description itself.
struct JsonBackend {
    path: PathBuf,
}

impl PlotBackend for JsonBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let text = serde_json::to_string_pretty(fig)?;
        fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

/// PNG through `BitMapBackend`, or SVG when the path ends in `.svg`.
struct PlottersBackend {
    path: PathBuf,
    size: (u32, u32),
}

impl PlotBackend for PlottersBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let svg = self
            .path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("svg"));
        if svg {
            draw_plotters_figure(SVGBackend::new(&self.path, self.size).into_drawing_area(), fig)
        } else {
            draw_plotters_figure(
                BitMapBackend::new(&self.path, self.size).into_drawing_area(),
                fig,
            )
        }
    }
}

fn draw_plotters_figure<DB>(root: DrawingArea<DB, Shift>, fig: &Figure) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let topos: Vec<&TopoSeries> = fig.topos().collect();
    if topos.is_empty() {
        draw_lines(&root, fig)?;
    } else {
        draw_topomaps(&root, fig, &topos)?;
    }
    root.present()?;
    Ok(())
}

fn draw_lines<DB>(root: &DrawingArea<DB, Shift>, fig: &Figure) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let points = fig.lines().flat_map(|line| line.points.iter());
    let (x_range, y_range) = bounds(points).ok_or_else(|| anyhow!("figure has no points"))?;
    let mut chart = ChartBuilder::on(root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;
    for line in fig.lines() {
        let (r, g, b) = line.style.color.rgb();
        let color = RGBColor(r, g, b);
        chart
            .draw_series(LineSeries::new(
                line.points.iter().map(|p| (p[0], p[1])),
                color.stroke_width(line.style.width.round().max(1.0) as u32),
            ))?
            .label(line.name.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], color));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

fn draw_topomaps<DB>(
    root: &DrawingArea<DB, Shift>,
    fig: &Figure,
    topos: &[&TopoSeries],
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let root = match &fig.title {
        Some(title) => root.titled(title, ("sans-serif", 24))?,
        None => root.clone(),
    };
    let panels = root.split_evenly((1, topos.len()));
    for (panel, topo) in panels.iter().zip(topos) {
        let mut chart = ChartBuilder::on(panel)
            .margin(8)
            .caption(&topo.band, ("sans-serif", 18))
            .build_cartesian_2d(-1.1f64..1.1f64, -1.1f64..1.1f64)?;

        let outline = (0..=72).map(|i| {
            let theta = i as f64 * std::f64::consts::TAU / 72.0;
            (0.9 * theta.cos(), 0.9 * theta.sin())
        });
        chart.draw_series(std::iter::once(PathElement::new(
            outline.collect::<Vec<_>>(),
            BLACK,
        )))?;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(-0.12, 0.89), (0.0, 1.04), (0.12, 0.89)],
            BLACK,
        )))?;

        let (lo, hi) = topo
            .values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        let span = if hi > lo { hi - lo } else { 1.0 };
        chart.draw_series(topo.positions.iter().zip(&topo.values).map(|(pos, value)| {
            Circle::new((pos[0], pos[1]), 10, heat((value - lo) / span).filled())
        }))?;
        chart.draw_series(topo.positions.iter().zip(&topo.labels).map(|(pos, label)| {
            Text::new(label.clone(), (pos[0] - 0.08, pos[1] - 0.12), ("sans-serif", 11))
        }))?;
    }
    Ok(())
}

/// Blue for the band minimum, red for the maximum.
fn heat(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    RGBColor(
        (255.0 * t).round() as u8,
        (80.0 * (1.0 - (2.0 * t - 1.0).abs())).round() as u8,
        (255.0 * (1.0 - t)).round() as u8,
    )
}

type Range = std::ops::Range<f64>;

fn bounds<'a>(points: impl Iterator<Item = &'a [f64; 2]>) -> Option<(Range, Range)> {
    let mut acc: Option<[f64; 4]> = None;
    for p in points.filter(|p| p[0].is_finite() && p[1].is_finite()) {
        let b = acc.get_or_insert([p[0], p[0], p[1], p[1]]);
        b[0] = b[0].min(p[0]);
        b[1] = b[1].max(p[0]);
        b[2] = b[2].min(p[1]);
        b[3] = b[3].max(p[1]);
    }
    acc.map(|[x0, x1, y0, y1]| (widen(x0, x1), widen(y0, y1)))
}

fn widen(lo: f64, hi: f64) -> Range {
    if hi > lo {
        lo..hi
    } else {
        (lo - 0.5)..(hi + 0.5)
    }
}
