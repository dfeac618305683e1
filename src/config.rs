//! Estimator configuration.

use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

use crate::Bitrate;

const DEFAULT_LOW_LOSS_THRESHOLD: f32 = 0.02;
const DEFAULT_HIGH_LOSS_THRESHOLD: f32 = 0.1;

/// Customized config for creating a
/// [`SendSideBandwidthEstimator`][crate::SendSideBandwidthEstimator].
///
/// This is the injected stand-in for the process-wide field-trial registry
/// the original estimator consults: every value is read exactly once, at
/// construction time, which keeps the estimator deterministic under test.
///
/// ```
/// use sendside_bwe::EstimatorConfig;
///
/// let config = EstimatorConfig::new()
///     .set_loss_experiment("Enabled-0.05,0.2,300")
///     .set_feedback_timeout(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EstimatorConfig {
    pub(crate) loss_experiment: Option<String>,
    pub(crate) feedback_timeout: bool,
}

impl EstimatorConfig {
    /// Creates a new default config: loss thresholds at 2% / 10%, no bitrate
    /// threshold, feedback timeout off.
    pub fn new() -> Self {
        EstimatorConfig::default()
    }

    /// Set the loss experiment string (the `WebRTC-BweLossExperiment` field
    /// trial).
    ///
    /// The experiment is enabled iff the string starts with `Enabled`. A
    /// string of the exact form `Enabled-<low>,<high>,<kbps>` with
    /// `0 < low <= high <= 1` overrides the loss thresholds and sets the
    /// bitrate below which loss-based decreases are suppressed. Any other
    /// enabled string logs a warning and keeps the defaults.
    pub fn set_loss_experiment(mut self, trial: impl Into<String>) -> Self {
        self.loss_experiment = Some(trial.into());
        self
    }

    /// Enable the feedback-timeout experiment (the `WebRTC-FeedbackTimeout`
    /// field trial): decay the estimate by 0.8x while RTCP feedback is
    /// starved.
    pub fn set_feedback_timeout(mut self, enabled: bool) -> Self {
        self.feedback_timeout = enabled;
        self
    }

    pub(crate) fn loss_thresholds(&self) -> LossThresholds {
        let enabled = self
            .loss_experiment
            .as_deref()
            .filter(|t| t.starts_with("Enabled"));

        let Some(trial) = enabled else {
            return LossThresholds::default();
        };

        match parse_loss_experiment(trial) {
            Ok(thresholds) => {
                info!(
                    "Enabled loss experiment with parameters {}, {}, {}",
                    thresholds.low, thresholds.high, thresholds.bitrate_threshold
                );
                thresholds
            }
            Err(e) => {
                warn!("Failed to parse loss experiment parameters ({}). Using defaults.", e);
                LossThresholds::default()
            }
        }
    }
}

/// Thresholds steering the loss-based control branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LossThresholds {
    /// Loss at or below this fraction allows the rate to increase.
    pub low: f32,
    /// Loss above this fraction forces the rate to decrease.
    pub high: f32,
    /// Below this bitrate, loss never causes a decrease.
    pub bitrate_threshold: Bitrate,
}

impl Default for LossThresholds {
    fn default() -> Self {
        LossThresholds {
            low: DEFAULT_LOW_LOSS_THRESHOLD,
            high: DEFAULT_HIGH_LOSS_THRESHOLD,
            bitrate_threshold: Bitrate::ZERO,
        }
    }
}

#[derive(Debug, Error)]
enum ParseError {
    #[error("expected Enabled-<low>,<high>,<kbps>")]
    Format,

    #[error("{0}")]
    Float(#[from] ParseFloatError),

    #[error("{0}")]
    Int(#[from] ParseIntError),

    #[error("loss thresholds must satisfy 0 < low <= high <= 1")]
    ThresholdRange,

    #[error("bitrate threshold too large")]
    BitrateRange,
}

/// Deterministic replacement for the original's `sscanf("Enabled-%f,%f,%u")`.
/// Trailing input is rejected rather than ignored.
fn parse_loss_experiment(trial: &str) -> Result<LossThresholds, ParseError> {
    let params = trial.strip_prefix("Enabled-").ok_or(ParseError::Format)?;

    let mut split = params.split(',');
    let (Some(low), Some(high), Some(kbps), None) =
        (split.next(), split.next(), split.next(), split.next())
    else {
        return Err(ParseError::Format);
    };

    let low: f32 = low.trim().parse()?;
    let high: f32 = high.trim().parse()?;
    let kbps: u32 = kbps.trim().parse()?;

    if !(low > 0.0 && low <= high && high <= 1.0) {
        return Err(ParseError::ThresholdRange);
    }
    if kbps >= i32::MAX as u32 / 1000 {
        return Err(ParseError::BitrateRange);
    }

    Ok(LossThresholds {
        low,
        high,
        bitrate_threshold: Bitrate::kbps(kbps as u64),
    })
}
