use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_1_SQRT_2, PI};

use crate::error::{EegError, Result};
use crate::session::{SampleMatrix, Session};

/// Zero-phase band-pass / notch settings. `None` disables a stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// High-pass cutoff in Hz.
    pub l_freq: Option<f64>,
    /// Low-pass cutoff in Hz.
    pub h_freq: Option<f64>,
    /// Line-noise frequency to remove in Hz.
    pub notch: Option<f64>,
    pub notch_q: f64,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            l_freq: None,
            h_freq: None,
            notch: None,
            notch_q: 30.0,
        }
    }
}

impl FilterSpec {
    /// 1–30 Hz band-pass with a 50 Hz notch.
    pub fn standard() -> Self {
        Self {
            l_freq: Some(1.0),
            h_freq: Some(30.0),
            notch: Some(50.0),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.l_freq.is_none() && self.h_freq.is_none() && self.notch.is_none()
    }

    fn validate(&self, fs: f64) -> Result<()> {
        let nyquist = fs * 0.5;
        for (name, freq) in [("l_freq", self.l_freq), ("h_freq", self.h_freq), ("notch", self.notch)] {
            if let Some(f) = freq {
                if !(f > 0.0 && f < nyquist) {
                    return Err(EegError::InvalidFilter(format!(
                        "{} = {} Hz must lie in (0, {}) Hz",
                        name, f, nyquist
                    )));
                }
            }
        }
        if let (Some(lo), Some(hi)) = (self.l_freq, self.h_freq) {
            if lo >= hi {
                return Err(EegError::InvalidFilter(format!(
                    "l_freq {} Hz must be below h_freq {} Hz",
                    lo, hi
                )));
            }
        }
        if !(self.notch_q > 0.0) {
            return Err(EegError::InvalidFilter(format!(
                "notch_q must be positive, got {}",
                self.notch_q
            )));
        }
        Ok(())
    }

    fn sections(&self, fs: f64) -> Vec<Biquad> {
        let mut sections = Vec::new();
        if let Some(f) = self.l_freq {
            sections.push(Biquad::highpass(f, fs, FRAC_1_SQRT_2));
        }
        if let Some(f) = self.h_freq {
            sections.push(Biquad::lowpass(f, fs, FRAC_1_SQRT_2));
        }
        if let Some(f) = self.notch {
            sections.push(Biquad::notch(f, fs, self.notch_q));
        }
        sections
    }
}

/// Filter every channel of `session` and return the result as a new session.
pub fn apply_filters(session: &Session, spec: &FilterSpec) -> Result<Session> {
    let fs = session.sampling_rate_hz();
    spec.validate(fs)?;
    if spec.is_empty() {
        return Ok(session.clone());
    }
    let sections = spec.sections(fs);
    let pad = fs.round() as usize;
    let columns: Vec<Vec<f64>> = session
        .samples()
        .columns()
        .iter()
        .map(|column| filtfilt(&sections, column, pad))
        .collect();
    session.with_samples(SampleMatrix::from_columns(&columns)?)
}

/// Forward-backward filtering with odd reflection at both ends.
pub fn filtfilt(sections: &[Biquad], data: &[f64], pad: usize) -> Vec<f64> {
    let n = data.len();
    if n < 2 || sections.is_empty() {
        return data.to_vec();
    }
    let pad = pad.min(n - 1);
    let first = data[0];
    let last = data[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - data[i]));
    ext.extend_from_slice(data);
    ext.extend((1..=pad).map(|i| 2.0 * last - data[n - 1 - i]));

    let forward = run_sections(sections, ext.iter().copied());
    let mut backward = run_sections(sections, forward.into_iter().rev());
    backward.reverse();
    backward[pad..pad + n].to_vec()
}

fn run_sections(sections: &[Biquad], input: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut states = vec![BiquadState::default(); sections.len()];
    input
        .map(|mut value| {
            for (section, state) in sections.iter().zip(states.iter_mut()) {
                value = section.process(state, value);
            }
            value
        })
        .collect()
}

/// Second-order section with normalized coefficients (a0 = 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

impl Biquad {
    pub fn lowpass(freq_hz: f64, fs: f64, q: f64) -> Self {
        let (cos_w0, alpha) = angular(freq_hz, fs, q);
        let b0 = (1.0 - cos_w0) * 0.5;
        Self::normalize(b0, 1.0 - cos_w0, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    pub fn highpass(freq_hz: f64, fs: f64, q: f64) -> Self {
        let (cos_w0, alpha) = angular(freq_hz, fs, q);
        let b0 = (1.0 + cos_w0) * 0.5;
        Self::normalize(b0, -(1.0 + cos_w0), b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    pub fn notch(freq_hz: f64, fs: f64, q: f64) -> Self {
        let (cos_w0, alpha) = angular(freq_hz, fs, q);
        Self::normalize(1.0, -2.0 * cos_w0, 1.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        let inv = 1.0 / a0;
        Self {
            b0: b0 * inv,
            b1: b1 * inv,
            b2: b2 * inv,
            a1: a1 * inv,
            a2: a2 * inv,
        }
    }

    fn process(&self, state: &mut BiquadState, input: f64) -> f64 {
        // Transposed direct form II
        let y = self.b0 * input + state.z1;
        state.z1 = self.b1 * input - self.a1 * y + state.z2;
        state.z2 = self.b2 * input - self.a2 * y;
        y
    }
}

fn angular(freq_hz: f64, fs: f64, q: f64) -> (f64, f64) {
    let w0 = 2.0 * PI * freq_hz / fs;
    (w0.cos(), w0.sin() / (2.0 * q))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ChannelSpec, SessionParts};

    fn sine_session(fs: f64, seconds: f64, components: &[(f64, f64)]) -> Session {
        let n = (fs * seconds) as usize;
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                vec![components
                    .iter()
                    .map(|(freq, amp)| amp * (2.0 * PI * freq * t).sin())
                    .sum::<f64>()]
            })
            .collect();
        Session::new(SessionParts {
            channels: vec![ChannelSpec {
                label: "Cz".into(),
                column: 0,
            }],
            sampling_rate_hz: fs,
            samples: Some(SampleMatrix::from_rows(rows, None).unwrap()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn standard_filter_removes_line_noise() {
        let fs = 250.0;
        let session = sine_session(fs, 8.0, &[(10.0, 1.0), (50.0, 1.0)]);
        let before = session.clone();
        let filtered = apply_filters(&session, &FilterSpec::standard()).unwrap();
        assert_eq!(filtered.len(), session.len());
        assert_eq!(filtered.labels(), session.labels());

        let out = filtered.samples().column(0);
        let middle = 500..1500;
        let residual: f64 = middle
            .clone()
            .map(|i| {
                let clean = (2.0 * PI * 10.0 * i as f64 / fs).sin();
                (out[i] - clean).powi(2)
            })
            .sum::<f64>()
            / middle.len() as f64;
        assert!(residual.sqrt() < 0.05, "residual rms {}", residual.sqrt());
        assert_eq!(session, before);
    }

    #[test]
    fn high_pass_removes_offset() {
        let fs = 100.0;
        let session = sine_session(fs, 10.0, &[(5.0, 1.0)]);
        let shifted: Vec<Vec<f64>> = session
            .samples()
            .column(0)
            .into_iter()
            .map(|v| vec![v + 100.0])
            .collect();
        let shifted = session
            .with_samples(SampleMatrix::from_rows(shifted, None).unwrap())
            .unwrap();
        let spec = FilterSpec {
            l_freq: Some(1.0),
            ..FilterSpec::default()
        };
        let out = apply_filters(&shifted, &spec).unwrap().samples().column(0);
        let mean = out[200..800].iter().sum::<f64>() / 600.0;
        assert!(mean.abs() < 0.5, "mean {}", mean);
    }

    #[test]
    fn rejects_cutoffs_beyond_nyquist() {
        let session = sine_session(100.0, 1.0, &[(5.0, 1.0)]);
        let spec = FilterSpec {
            notch: Some(60.0),
            ..FilterSpec::default()
        };
        assert!(matches!(
            apply_filters(&session, &spec),
            Err(EegError::InvalidFilter(_))
        ));
        let spec = FilterSpec {
            l_freq: Some(20.0),
            h_freq: Some(10.0),
            ..FilterSpec::default()
        };
        assert!(apply_filters(&session, &spec).is_err());
    }

    #[test]
    fn empty_spec_is_identity() {
        let session = sine_session(100.0, 1.0, &[(5.0, 1.0)]);
        let out = apply_filters(&session, &FilterSpec::default()).unwrap();
        assert_eq!(out, session);
    }
}
