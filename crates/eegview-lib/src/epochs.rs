use serde::{Deserialize, Serialize};

use crate::error::{EegError, Result};
use crate::session::{SampleMatrix, Session};

/// A window of `len` rows starting at row `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub start: usize,
    pub len: usize,
}

impl Epoch {
    pub fn onset_s(&self, fs: f64) -> f64 {
        self.start as f64 / fs
    }
}

/// Split a session into back-to-back epochs of `duration_s`; a trailing partial
/// window is dropped.
pub fn fixed_length_epochs(session: &Session, duration_s: f64) -> Result<Vec<Epoch>> {
    let len = (duration_s * session.sampling_rate_hz()).round() as usize;
    if !(duration_s.is_finite() && duration_s > 0.0) || len == 0 {
        return Err(EegError::InvalidEpoch(format!(
            "epoch duration {} s is shorter than one sample",
            duration_s
        )));
    }
    Ok((0..session.len() / len)
        .map(|i| Epoch { start: i * len, len })
        .collect())
}

/// Average epochs sample by sample into a new (evoked) session.
pub fn average_epochs(session: &Session, epochs: &[Epoch]) -> Result<Session> {
    let len = epochs.first().map(|e| e.len).unwrap_or(0);
    let cols = session.samples().cols();
    let mut acc = vec![vec![0.0; cols]; len];
    for epoch in epochs {
        if epoch.len != len || epoch.start + epoch.len > session.len() {
            return Err(EegError::InvalidEpoch(format!(
                "epoch at row {} with {} rows does not fit the session",
                epoch.start, epoch.len
            )));
        }
        for (offset, row) in acc.iter_mut().enumerate() {
            for (sum, value) in row.iter_mut().zip(session.samples().row(epoch.start + offset)) {
                *sum += value;
            }
        }
    }
    let count = epochs.len().max(1) as f64;
    let rows = acc
        .into_iter()
        .map(|row| row.into_iter().map(|v| v / count).collect())
        .collect();
    session.with_samples(SampleMatrix::from_rows(rows, None)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ChannelSpec, SessionParts};

    fn ramp_session(rows: usize, fs: f64) -> Session {
        Session::new(SessionParts {
            channels: vec![ChannelSpec {
                label: "Pz".into(),
                column: 0,
            }],
            sampling_rate_hz: fs,
            samples: Some(
                SampleMatrix::from_rows((0..rows).map(|i| vec![(i % 4) as f64]).collect(), None)
                    .unwrap(),
            ),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn drops_partial_trailing_epoch() {
        let session = ramp_session(10, 4.0);
        let epochs = fixed_length_epochs(&session, 1.0).unwrap();
        assert_eq!(epochs.len(), 2);
        assert_eq!(epochs[1], Epoch { start: 4, len: 4 });
        assert_eq!(epochs[1].onset_s(4.0), 1.0);
    }

    #[test]
    fn averages_into_evoked_session() {
        let session = ramp_session(8, 4.0);
        let epochs = fixed_length_epochs(&session, 1.0).unwrap();
        let evoked = average_epochs(&session, &epochs).unwrap();
        assert_eq!(evoked.len(), 4);
        assert_eq!(evoked.samples().column(0), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(evoked.labels(), vec!["Pz"]);
    }

    #[test]
    fn rejects_degenerate_requests() {
        let session = ramp_session(8, 4.0);
        assert!(fixed_length_epochs(&session, 0.0).is_err());
        assert_eq!(
            average_epochs(&session, &[]).unwrap_err().kind(),
            "empty-session"
        );
        let too_long = [Epoch { start: 6, len: 4 }];
        assert!(average_epochs(&session, &too_long).is_err());
    }
}
