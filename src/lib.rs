//! Send-side bandwidth estimation for real-time media.
//!
//! This crate implements the loss-anchored send-side estimator a congestion
//! controller consults to decide the target bitrate of an adaptive media
//! stream. Three signals are fused into a single capped output:
//!
//! - Periodic RTCP receiver blocks (loss fraction, RTT, packet counts),
//!   accumulated in Q8 fixed point and driving increase/hold/decrease.
//! - A delay-based bandwidth estimate computed elsewhere on the sender.
//! - A receiver-side REMB estimate.
//!
//! The estimator is a plain single-owner state machine: it performs no I/O,
//! never reads a clock (callers supply `Instant`s), and holds no locks. The
//! owning controller pushes inputs as they arrive, ticks
//! [`SendSideBandwidthEstimator::update_estimate`] periodically, and reads
//! the result with [`SendSideBandwidthEstimator::current_estimate`].
//!
//! ```
//! use std::time::{Duration, Instant};
//! use sendside_bwe::{Bitrate, EstimatorConfig, SendSideBandwidthEstimator};
//!
//! let config = EstimatorConfig::new();
//! let mut bwe = SendSideBandwidthEstimator::new(config, Box::new(()), Box::new(()));
//!
//! let now = Instant::now();
//! bwe.set_bitrates(Some(Bitrate::kbps(300)), Bitrate::kbps(30), Some(Bitrate::mbps(2)));
//! bwe.update_receiver_block(0, Duration::from_millis(40), 25, now);
//!
//! let estimate = bwe.current_estimate();
//! assert!(estimate.bitrate >= Bitrate::kbps(30));
//! ```

#[macro_use]
extern crate tracing;

mod bandwidth;
pub use bandwidth::Bitrate;

mod config;
pub use config::EstimatorConfig;

mod estimator;
pub use estimator::{Estimate, SendSideBandwidthEstimator, MIN_BITRATE};

pub(crate) mod macros;

mod stats;
pub use stats::{EventLog, LossBasedUpdate, Metrics};
