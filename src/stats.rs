//! Outbound sinks: the event log and the metrics aggregator.
//!
//! The estimator never performs I/O itself. Everything observable beyond the
//! returned estimate goes through these traits; aggregation and storage are
//! the embedder's concern. Sinks must bring their own interior mutability,
//! and their own thread safety if the embedder shares them across
//! subsystems.

use crate::Bitrate;

/// Sink for loss-based estimator updates.
///
/// The reference to the sink is held for the estimator's whole lifetime.
pub trait EventLog {
    fn loss_based_update(&self, update: LossBasedUpdate);
}

/// One loss-based update of the output estimate.
///
/// Emitted when the cap changed the value, when the loss fraction changed
/// since the last emission, and otherwise at most every 5 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossBasedUpdate {
    /// The capped output bitrate.
    pub bitrate: Bitrate,
    /// Loss fraction in Q8 (loss = `fraction_loss` / 256).
    pub fraction_loss: u8,
    /// Expected packets accumulated since the last loss recomputation.
    pub expected_packets: i64,
}

/// No-op event log.
impl EventLog for () {
    fn loss_based_update(&self, _update: LossBasedUpdate) {}
}

/// Sink for one-shot ramp-up and startup histograms.
pub trait Metrics {
    /// Record `sample` under `name` in a counts histogram spanning
    /// `min..=max` with `buckets` buckets.
    fn counts(&self, name: &'static str, sample: i64, min: i64, max: i64, buckets: usize);
}

/// No-op metrics sink.
impl Metrics for () {
    fn counts(&self, _name: &'static str, _sample: i64, _min: i64, _max: i64, _buckets: usize) {}
}
