use log::warn;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::session::Session;

/// Welch estimator settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WelchConfig {
    /// Samples per segment; `None` uses two seconds of data.
    pub segment_len: Option<usize>,
    /// Fraction of a segment shared with the next one.
    pub overlap: f64,
}

impl Default for WelchConfig {
    fn default() -> Self {
        Self {
            segment_len: None,
            overlap: 0.5,
        }
    }
}

/// One-sided power spectral density in units²/Hz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

impl Psd {
    pub fn resolution(&self) -> f64 {
        if self.freqs.len() > 1 {
            self.freqs[1] - self.freqs[0]
        } else {
            0.0
        }
    }

    /// Keep bins up to and including `fmax`.
    pub fn truncate(&self, fmax: f64) -> Psd {
        let keep = self.freqs.iter().take_while(|f| **f <= fmax).count();
        Psd {
            freqs: self.freqs[..keep].to_vec(),
            power: self.power[..keep].to_vec(),
        }
    }

    pub fn band_power(&self, band: &Band) -> f64 {
        let df = self.resolution();
        self.freqs
            .iter()
            .zip(&self.power)
            .filter(|(f, _)| **f >= band.lo && **f < band.hi)
            .map(|(_, p)| *p * df)
            .sum()
    }
}

/// Named frequency band, half-open `[lo, hi)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub lo: f64,
    pub hi: f64,
}

impl Band {
    pub fn new(name: &str, lo: f64, hi: f64) -> Self {
        Self {
            name: name.to_string(),
            lo,
            hi,
        }
    }

    /// Delta, theta, alpha and beta.
    pub fn standard() -> Vec<Band> {
        vec![
            Band::new("Delta", 0.0, 4.0),
            Band::new("Theta", 4.0, 8.0),
            Band::new("Alpha", 8.0, 12.0),
            Band::new("Beta", 12.0, 30.0),
        ]
    }
}

pub fn welch_psd(data: &[f64], fs: f64, cfg: &WelchConfig) -> Psd {
    let n = data.len();
    if n == 0 {
        return Psd {
            freqs: Vec::new(),
            power: Vec::new(),
        };
    }
    let window = cfg
        .segment_len
        .unwrap_or((2.0 * fs).round() as usize)
        .clamp(1, n);
    let step = ((window as f64 * (1.0 - cfg.overlap.clamp(0.0, 0.95))).round() as usize).max(1);
    let taper = hann(window);
    let taper_power: f64 = taper.iter().map(|w| w * w).sum();
    let scale = 1.0 / (fs * taper_power.max(f64::EPSILON));

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(window);
    let mut spectrum = r2c.make_output_vec();
    let bins = spectrum.len();
    let freqs: Vec<f64> = (0..bins).map(|k| k as f64 * fs / window as f64).collect();
    let mut power = vec![0.0; bins];

    let mut pos = 0;
    let mut segments = 0;
    while pos + window <= n {
        let slice = &data[pos..pos + window];
        let mean = slice.iter().sum::<f64>() / window as f64;
        let mut frame: Vec<f64> = slice
            .iter()
            .zip(&taper)
            .map(|(x, w)| (x - mean) * w)
            .collect();
        if let Err(err) = r2c.process(&mut frame, &mut spectrum) {
            warn!("skipping PSD segment at {}: {}", pos, err);
            pos += step;
            continue;
        }
        for (k, val) in spectrum.iter().enumerate() {
            let one_sided = if k == 0 || (window % 2 == 0 && k == window / 2) {
                1.0
            } else {
                2.0
            };
            power[k] += one_sided * val.norm_sqr() * scale;
        }
        segments += 1;
        pos += step;
    }
    if segments > 0 {
        for p in power.iter_mut() {
            *p /= segments as f64;
        }
    }
    Psd { freqs, power }
}

/// Per-channel spectra of a session, sharing one frequency axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPsd {
    pub labels: Vec<String>,
    pub freqs: Vec<f64>,
    pub power: Vec<Vec<f64>>,
}

impl SessionPsd {
    pub fn channel(&self, idx: usize) -> Psd {
        Psd {
            freqs: self.freqs.clone(),
            power: self.power[idx].clone(),
        }
    }

    pub fn average(&self) -> Psd {
        let mut mean = vec![0.0; self.freqs.len()];
        for channel in &self.power {
            for (acc, p) in mean.iter_mut().zip(channel) {
                *acc += p;
            }
        }
        let count = self.power.len().max(1) as f64;
        Psd {
            freqs: self.freqs.clone(),
            power: mean.into_iter().map(|p| p / count).collect(),
        }
    }

    /// `result[band][channel]`
    pub fn band_powers(&self, bands: &[Band]) -> Vec<Vec<f64>> {
        bands
            .iter()
            .map(|band| {
                (0..self.labels.len())
                    .map(|idx| self.channel(idx).band_power(band))
                    .collect()
            })
            .collect()
    }
}

pub fn session_psd(session: &Session, fmax: Option<f64>, cfg: &WelchConfig) -> SessionPsd {
    let fs = session.sampling_rate_hz();
    let spectra: Vec<Psd> = session
        .samples()
        .columns()
        .iter()
        .map(|column| {
            let psd = welch_psd(column, fs, cfg);
            match fmax {
                Some(limit) => psd.truncate(limit),
                None => psd,
            }
        })
        .collect();
    SessionPsd {
        labels: session.labels().iter().map(|s| s.to_string()).collect(),
        freqs: spectra.first().map(|p| p.freqs.clone()).unwrap_or_default(),
        power: spectra.into_iter().map(|p| p.power).collect(),
    }
}

pub fn to_db(power: f64) -> f64 {
    10.0 * power.max(1e-30).log10()
}

fn hann(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}
