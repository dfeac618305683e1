//! The send-side bandwidth estimator core.
//!
//! A single stateful estimator owned by the congestion controller. It fuses
//! three signals into one target send bitrate: periodic RTCP receiver-block
//! summaries (packet loss and RTT), an externally computed delay-based
//! estimate, and a receiver-side REMB estimate. Loss drives the control loop
//! proper; the external estimates act both as ceilings when capping and as
//! promotion sources during the startup phase.
//!
//! The estimator never reads a clock: every operation takes `now` from the
//! caller, which makes all behavior deterministic under test. The owner is
//! expected to serialize calls and to tick [`update_estimate`][SendSideBandwidthEstimator::update_estimate]
//! periodically.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::EstimatorConfig;
use crate::macros::{log_bitrate_estimate, log_loss};
use crate::stats::{EventLog, LossBasedUpdate, Metrics};
use crate::Bitrate;

const BWE_INCREASE_INTERVAL: Duration = Duration::from_millis(1000);
const BWE_DECREASE_INTERVAL: Duration = Duration::from_millis(300);
const START_PHASE: Duration = Duration::from_millis(2000);
const BWE_CONVERGENCE_TIME: Duration = Duration::from_millis(20_000);
const LIMIT_NUM_PACKETS: i64 = 20;
const DEFAULT_MAX_BITRATE: Bitrate = Bitrate::new(1_000_000_000);
const LOW_BITRATE_LOG_PERIOD: Duration = Duration::from_millis(10_000);
const EVENT_LOG_PERIOD: Duration = Duration::from_millis(5000);
// Expecting that RTCP feedback is sent uniformly within [0.5, 1.5]s intervals.
const FEEDBACK_INTERVAL: Duration = Duration::from_millis(1500);
const FEEDBACK_TIMEOUT_INTERVALS: u32 = 3;
const TIMEOUT_INTERVAL: Duration = Duration::from_millis(1000);

/// Lowest bitrate the congestion controller ever paces at. Configured
/// minimums below this are raised to it.
pub const MIN_BITRATE: Bitrate = Bitrate::new(5000);

struct RampUpMilestone {
    metric: &'static str,
    kbps: u64,
}

const RAMP_UP_MILESTONES: [RampUpMilestone; 3] = [
    RampUpMilestone {
        metric: "RampUpTimeTo500kbpsInMs",
        kbps: 500,
    },
    RampUpMilestone {
        metric: "RampUpTimeTo1000kbpsInMs",
        kbps: 1000,
    },
    RampUpMilestone {
        metric: "RampUpTimeTo2000kbpsInMs",
        kbps: 2000,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricsState {
    NoUpdate,
    FirstDone,
    Done,
}

/// A snapshot of the current estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    /// The target send bitrate.
    pub bitrate: Bitrate,
    /// Loss fraction in Q8 (loss = `fraction_loss` / 256).
    pub fraction_loss: u8,
    /// The last reported round-trip time.
    pub round_trip_time: Duration,
}

/// Send-side bandwidth estimator.
pub struct SendSideBandwidthEstimator {
    event_log: Box<dyn EventLog>,
    metrics: Box<dyn Metrics>,

    bitrate: Bitrate,
    min_bitrate_configured: Bitrate,
    max_bitrate_configured: Bitrate,

    /// Latest REMB value. ZERO means no estimate has been received.
    bwe_incoming: Bitrate,
    /// Latest delay-based estimate. ZERO means no estimate is available.
    delay_based_bitrate: Bitrate,

    lost_packets_since_last_loss_update_q8: i64,
    expected_packets_since_last_loss_update: i64,

    last_fraction_loss: u8,
    last_logged_fraction_loss: u8,
    last_round_trip_time: Duration,

    first_report_time: Option<Instant>,
    last_feedback: Option<Instant>,
    last_packet_report: Option<Instant>,
    last_timeout: Option<Instant>,
    last_low_bitrate_log: Option<Instant>,
    last_event_log: Option<Instant>,
    time_last_decrease: Option<Instant>,

    has_decreased_since_last_fraction_loss: bool,
    /// Monotone deque. front() is the min bitrate over the last
    /// BWE_INCREASE_INTERVAL, nondecreasing in both time and bitrate.
    min_bitrate_history: VecDeque<(Instant, Bitrate)>,

    metrics_state: MetricsState,
    rampup_reported: [bool; 3],
    initially_lost_packets: i64,
    bitrate_at_2_seconds_kbps: i64,

    low_loss_threshold: f32,
    high_loss_threshold: f32,
    /// Below this bitrate, loss never causes a decrease. Crude way of
    /// handling loss which is uncorrelated to congestion.
    bitrate_threshold: Bitrate,
    in_timeout_experiment: bool,
}

impl SendSideBandwidthEstimator {
    /// Create an estimator. Experiment parameters are read from `config`
    /// once, here; no events are emitted.
    pub fn new(
        config: EstimatorConfig,
        event_log: Box<dyn EventLog>,
        metrics: Box<dyn Metrics>,
    ) -> Self {
        let thresholds = config.loss_thresholds();

        SendSideBandwidthEstimator {
            event_log,
            metrics,
            bitrate: Bitrate::ZERO,
            min_bitrate_configured: MIN_BITRATE,
            max_bitrate_configured: DEFAULT_MAX_BITRATE,
            bwe_incoming: Bitrate::ZERO,
            delay_based_bitrate: Bitrate::ZERO,
            lost_packets_since_last_loss_update_q8: 0,
            expected_packets_since_last_loss_update: 0,
            last_fraction_loss: 0,
            last_logged_fraction_loss: 0,
            last_round_trip_time: Duration::ZERO,
            first_report_time: None,
            last_feedback: None,
            last_packet_report: None,
            last_timeout: None,
            last_low_bitrate_log: None,
            last_event_log: None,
            time_last_decrease: None,
            has_decreased_since_last_fraction_loss: false,
            min_bitrate_history: VecDeque::new(),
            metrics_state: MetricsState::NoUpdate,
            rampup_reported: [false; 3],
            initially_lost_packets: 0,
            bitrate_at_2_seconds_kbps: 0,
            low_loss_threshold: thresholds.low,
            high_loss_threshold: thresholds.high,
            bitrate_threshold: thresholds.bitrate_threshold,
            in_timeout_experiment: config.feedback_timeout,
        }
    }

    /// Configure send, min and max bitrate in one call. `None` for `send`
    /// leaves the current estimate unchanged; `None` for `max` restores the
    /// default maximum.
    pub fn set_bitrates(&mut self, send: Option<Bitrate>, min: Bitrate, max: Option<Bitrate>) {
        if let Some(send) = send {
            self.set_send_bitrate(send);
        }
        self.set_min_max_bitrate(min, max);
    }

    /// Force the current estimate to `bitrate`. Must be nonzero.
    pub fn set_send_bitrate(&mut self, bitrate: Bitrate) {
        assert!(bitrate > Bitrate::ZERO);
        self.bitrate = bitrate;

        // Clear last sent bitrate history so the new value can be used
        // directly and not capped.
        self.min_bitrate_history.clear();
    }

    /// Configure the output bounds. The min is floored by [`MIN_BITRATE`];
    /// the max, when set, is raised to at least the effective min.
    pub fn set_min_max_bitrate(&mut self, min: Bitrate, max: Option<Bitrate>) {
        self.min_bitrate_configured = min.max(MIN_BITRATE);
        match max {
            Some(max) if max > Bitrate::ZERO => {
                self.max_bitrate_configured = self.min_bitrate_configured.max(max);
            }
            _ => {
                self.max_bitrate_configured = DEFAULT_MAX_BITRATE;
            }
        }
    }

    /// The effective configured minimum bitrate.
    pub fn min_bitrate(&self) -> Bitrate {
        self.min_bitrate_configured
    }

    /// The current estimate, loss fraction and RTT. Pure read.
    pub fn current_estimate(&self) -> Estimate {
        Estimate {
            bitrate: self.bitrate,
            fraction_loss: self.last_fraction_loss,
            round_trip_time: self.last_round_trip_time,
        }
    }

    /// Call when an RTCP message with REMB arrives. ZERO means no estimate.
    pub fn update_receiver_estimate(&mut self, now: Instant, bandwidth: Bitrate) {
        self.bwe_incoming = bandwidth;
        self.bitrate = self.cap_to_thresholds(now, self.bitrate);
    }

    /// Call when a new delay-based estimate is available. ZERO means no
    /// estimate.
    pub fn update_delay_based_estimate(&mut self, now: Instant, bitrate: Bitrate) {
        self.delay_based_bitrate = bitrate;
        self.bitrate = self.cap_to_thresholds(now, self.bitrate);
    }

    /// Call when an RTCP receiver block arrives. `fraction_loss` is the Q8
    /// loss fraction over the `packet_count` packets the block covers (zero
    /// packets is legal and means none were observed).
    ///
    /// A new loss fraction is only computed once reports for at least 20
    /// packets have accumulated, so the loss ratio is never based on a
    /// statistically thin sample. Since the freshness of loss feedback is
    /// judged by when a fraction was last computed, flows too small to ever
    /// accumulate 20 packets per interval stay outside loss-based control.
    pub fn update_receiver_block(
        &mut self,
        fraction_loss: u8,
        rtt: Duration,
        packet_count: u32,
        now: Instant,
    ) {
        self.last_feedback = Some(now);
        if self.first_report_time.is_none() {
            self.first_report_time = Some(now);
        }
        self.last_round_trip_time = rtt;

        let lost_packets_q8 = fraction_loss as i64 * packet_count as i64;

        if packet_count > 0 {
            // Accumulate reports.
            self.lost_packets_since_last_loss_update_q8 += lost_packets_q8;
            self.expected_packets_since_last_loss_update += packet_count as i64;

            // Don't generate a loss rate until it can be based on enough packets.
            if self.expected_packets_since_last_loss_update >= LIMIT_NUM_PACKETS {
                self.has_decreased_since_last_fraction_loss = false;
                self.last_fraction_loss = (self.lost_packets_since_last_loss_update_q8
                    / self.expected_packets_since_last_loss_update)
                    .min(255) as u8;
                log_loss!(self.last_fraction_loss as f64 / 256.0);

                // Reset accumulators.
                self.lost_packets_since_last_loss_update_q8 = 0;
                self.expected_packets_since_last_loss_update = 0;
                self.last_packet_report = Some(now);
                self.update_estimate(now);
            }
        }

        self.update_metrics(now, rtt, lost_packets_q8 >> 8);
    }

    /// Periodic tick driven by the owner.
    pub fn update_estimate(&mut self, now: Instant) {
        // We trust the REMB and/or delay-based estimate during the first 2
        // seconds if we haven't had any packet loss reported, to allow
        // startup bitrate probing.
        if self.last_fraction_loss == 0 && self.is_in_start_phase(now) {
            let prev_bitrate = self.bitrate;
            if self.bwe_incoming > self.bitrate {
                self.bitrate = self.cap_to_thresholds(now, self.bwe_incoming);
            }
            if self.delay_based_bitrate > self.bitrate {
                self.bitrate = self.cap_to_thresholds(now, self.delay_based_bitrate);
            }
            if self.bitrate != prev_bitrate {
                self.min_bitrate_history.clear();
                self.min_bitrate_history.push_back((now, self.bitrate));
                return;
            }
        }

        self.update_min_history(now);

        let Some(last_packet_report) = self.last_packet_report else {
            // No feedback received.
            self.bitrate = self.cap_to_thresholds(now, self.bitrate);
            return;
        };

        let time_since_packet_report = now - last_packet_report;
        let time_since_feedback = self
            .last_feedback
            .map(|t| now - t)
            .expect("feedback time is set with every packet report");

        if time_since_packet_report.as_secs_f64() < 1.2 * FEEDBACK_INTERVAL.as_secs_f64() {
            let loss = self.last_fraction_loss as f32 / 256.0;

            if self.bitrate < self.bitrate_threshold || loss <= self.low_loss_threshold {
                // Low loss: increase the rate by 8% of the min bitrate over
                // the last BWE_INCREASE_INTERVAL. Anchoring on the window
                // minimum lets a constant sender ramp a full interval faster
                // than compounding from the current value would.
                let mut new_bitrate = self.min_bitrate_history.front().unwrap().1 * 1.08;

                // 1 kbps extra to not get stuck near zero (negligible at
                // higher rates).
                new_bitrate += Bitrate::new(1000);
                self.bitrate = new_bitrate;
            } else if self.bitrate > self.bitrate_threshold {
                if loss <= self.high_loss_threshold {
                    // Moderate loss: hold.
                } else {
                    // High loss: decrease at most once per
                    // BWE_DECREASE_INTERVAL + rtt, and once per computed
                    // fraction.
                    let interval = BWE_DECREASE_INTERVAL + self.last_round_trip_time;
                    let ready = self
                        .time_last_decrease
                        .map(|t| now - t >= interval)
                        .unwrap_or(true);

                    if !self.has_decreased_since_last_fraction_loss && ready {
                        self.time_last_decrease = Some(now);

                        // new_rate = rate * (1 - 0.5 * loss), with loss
                        // carried as fraction/256.
                        self.bitrate = Bitrate::new(
                            self.bitrate.as_u64() * (512 - self.last_fraction_loss as u64) / 512,
                        );
                        self.has_decreased_since_last_fraction_loss = true;
                    }
                }
            }
        } else if time_since_feedback > FEEDBACK_INTERVAL * FEEDBACK_TIMEOUT_INTERVALS
            && self
                .last_timeout
                .map(|t| now - t > TIMEOUT_INTERVAL)
                .unwrap_or(true)
        {
            if self.in_timeout_experiment {
                warn!(
                    "Feedback timed out ({:?}), reducing bitrate.",
                    time_since_feedback
                );
                // Truncating scale, unlike the rounding increase rule.
                self.bitrate = Bitrate::new((self.bitrate.as_f64() * 0.8) as u64);

                // We already acted on the missing feedback; the stale
                // accumulated losses must not trigger another cut on the
                // next block.
                self.lost_packets_since_last_loss_update_q8 = 0;
                self.expected_packets_since_last_loss_update = 0;
                self.last_timeout = Some(now);
            }
        }

        let capped = self.cap_to_thresholds(now, self.bitrate);

        if capped != self.bitrate
            || self.last_fraction_loss != self.last_logged_fraction_loss
            || self
                .last_event_log
                .map(|t| now - t > EVENT_LOG_PERIOD)
                .unwrap_or(true)
        {
            self.event_log.loss_based_update(LossBasedUpdate {
                bitrate: capped,
                fraction_loss: self.last_fraction_loss,
                expected_packets: self.expected_packets_since_last_loss_update,
            });
            self.last_logged_fraction_loss = self.last_fraction_loss;
            self.last_event_log = Some(now);
        }

        self.bitrate = capped;
        log_bitrate_estimate!(self.bitrate.as_f64());
    }

    fn is_in_start_phase(&self, now: Instant) -> bool {
        self.first_report_time
            .map(|t| now - t < START_PHASE)
            .unwrap_or(true)
    }

    /// Updates the history of min bitrates. After this returns, front() is
    /// the min bitrate used during the last BWE_INCREASE_INTERVAL.
    fn update_min_history(&mut self, now: Instant) {
        // Remove old data points. History precision is in ms; add one so the
        // increase rule can fire even when the window is off by as little as
        // 0.5 ms.
        while self
            .min_bitrate_history
            .front()
            .is_some_and(|(t, _)| now - *t + Duration::from_millis(1) > BWE_INCREASE_INTERVAL)
        {
            self.min_bitrate_history.pop_front();
        }

        // Typical minimum sliding-window algorithm: pop values higher than
        // the current bitrate before pushing it.
        while self
            .min_bitrate_history
            .back()
            .is_some_and(|(_, b)| self.bitrate <= *b)
        {
            self.min_bitrate_history.pop_back();
        }

        self.min_bitrate_history.push_back((now, self.bitrate));
    }

    /// Cap `bitrate` to the external ceilings and the configured bounds.
    /// REMB and the delay-based estimate apply before the configured max;
    /// the min clamp comes last and overrides both ceilings.
    fn cap_to_thresholds(&mut self, now: Instant, mut bitrate: Bitrate) -> Bitrate {
        if self.bwe_incoming > Bitrate::ZERO && bitrate > self.bwe_incoming {
            bitrate = self.bwe_incoming;
        }
        if self.delay_based_bitrate > Bitrate::ZERO && bitrate > self.delay_based_bitrate {
            bitrate = self.delay_based_bitrate;
        }
        if bitrate > self.max_bitrate_configured {
            bitrate = self.max_bitrate_configured;
        }
        if bitrate < self.min_bitrate_configured {
            let should_log = self
                .last_low_bitrate_log
                .map(|t| now - t > LOW_BITRATE_LOG_PERIOD)
                .unwrap_or(true);

            if should_log {
                warn!(
                    "Estimated available bandwidth {} is below configured min bitrate {}.",
                    bitrate, self.min_bitrate_configured
                );
                self.last_low_bitrate_log = Some(now);
            }
            bitrate = self.min_bitrate_configured;
        }
        bitrate
    }

    fn update_metrics(&mut self, now: Instant, rtt: Duration, lost_packets: i64) {
        let Some(first_report_time) = self.first_report_time else {
            return;
        };

        let bitrate_kbps = self.bitrate.as_kbps_rounded() as i64;
        for (i, milestone) in RAMP_UP_MILESTONES.iter().enumerate() {
            if !self.rampup_reported[i] && bitrate_kbps as u64 >= milestone.kbps {
                self.metrics.counts(
                    milestone.metric,
                    (now - first_report_time).as_millis() as i64,
                    0,
                    100_000,
                    50,
                );
                self.rampup_reported[i] = true;
            }
        }

        if self.is_in_start_phase(now) {
            self.initially_lost_packets += lost_packets;
        } else if self.metrics_state == MetricsState::NoUpdate {
            self.metrics_state = MetricsState::FirstDone;
            self.bitrate_at_2_seconds_kbps = bitrate_kbps;
            self.metrics
                .counts("InitiallyLostPackets", self.initially_lost_packets, 0, 100, 50);
            self.metrics
                .counts("InitialRtt", rtt.as_millis() as i64, 0, 2000, 50);
            self.metrics.counts(
                "InitialBandwidthEstimate",
                self.bitrate_at_2_seconds_kbps,
                0,
                2000,
                50,
            );
        } else if self.metrics_state == MetricsState::FirstDone
            && now - first_report_time >= BWE_CONVERGENCE_TIME
        {
            self.metrics_state = MetricsState::Done;
            let diff_kbps = (self.bitrate_at_2_seconds_kbps - bitrate_kbps).max(0);
            self.metrics
                .counts("InitialVsConvergedDiff", diff_kbps, 0, 2000, 50);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_estimator() -> SendSideBandwidthEstimator {
        make_estimator_with(EstimatorConfig::default())
    }

    fn make_estimator_with(config: EstimatorConfig) -> SendSideBandwidthEstimator {
        SendSideBandwidthEstimator::new(config, Box::new(()), Box::new(()))
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn new_estimator_has_no_estimate() {
        let bwe = make_estimator();
        let estimate = bwe.current_estimate();

        assert_eq!(estimate.bitrate, Bitrate::ZERO);
        assert_eq!(estimate.fraction_loss, 0);
        assert_eq!(estimate.round_trip_time, Duration::ZERO);
        assert_eq!(bwe.min_bitrate(), MIN_BITRATE);
    }

    #[test]
    fn min_bitrate_is_floored_by_system_minimum() {
        let mut bwe = make_estimator();

        bwe.set_min_max_bitrate(Bitrate::new(2000), Some(Bitrate::mbps(2)));
        assert_eq!(bwe.min_bitrate(), MIN_BITRATE);

        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        assert_eq!(bwe.min_bitrate(), Bitrate::kbps(10));
    }

    #[test]
    fn unset_max_restores_default() {
        let now = Instant::now();
        let mut bwe = make_estimator();

        bwe.set_min_max_bitrate(Bitrate::kbps(10), None);
        bwe.set_send_bitrate(Bitrate::gbps(2));
        bwe.update_estimate(now);

        assert_eq!(bwe.current_estimate().bitrate, DEFAULT_MAX_BITRATE);
    }

    fn remb_applies_in_start_phase(use_delay_based: bool) {
        let now = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::new(100_000), Some(Bitrate::new(1_500_000)));
        bwe.set_send_bitrate(Bitrate::new(200_000));

        let remb = Bitrate::new(1_000_000);
        let second_remb = Bitrate::new(1_500_000);

        bwe.update_receiver_block(0, ms(50), 1, now);

        // The initial estimate applies immediately.
        if use_delay_based {
            bwe.update_delay_based_estimate(now, remb);
        } else {
            bwe.update_receiver_estimate(now, remb);
        }
        bwe.update_estimate(now);
        assert_eq!(bwe.current_estimate().bitrate, remb);

        // A second estimate past the start phase does not apply.
        let later = now + ms(2001);
        if use_delay_based {
            bwe.update_delay_based_estimate(later, second_remb);
        } else {
            bwe.update_receiver_estimate(later, second_remb);
        }
        bwe.update_estimate(later);
        assert_eq!(bwe.current_estimate().bitrate, remb);
    }

    #[test]
    fn initial_remb_applies_in_start_phase() {
        remb_applies_in_start_phase(false);
    }

    #[test]
    fn initial_delay_based_estimate_applies_in_start_phase() {
        remb_applies_in_start_phase(true);
    }

    #[test]
    fn start_phase_promotion_is_capped_by_other_hint() {
        let now = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        bwe.set_send_bitrate(Bitrate::new(100_000));

        bwe.update_delay_based_estimate(now, Bitrate::new(500_000));
        bwe.update_estimate(now);
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(500_000));

        // The REMB exceeds the current value, but the live delay-based
        // estimate still acts as a ceiling while promoting it.
        let later = now + ms(500);
        bwe.update_receiver_estimate(later, Bitrate::new(800_000));
        bwe.update_estimate(later);
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(500_000));
    }

    #[test]
    fn start_phase_hints_only_raise_the_estimate() {
        let now = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        bwe.set_send_bitrate(Bitrate::new(400_000));

        // A hint below the current value does not drag the estimate down in
        // the trust branch. It still applies as a ceiling when capping.
        bwe.update_receiver_estimate(now, Bitrate::new(300_000));
        bwe.update_estimate(now);
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(300_000));

        bwe.update_receiver_estimate(now, Bitrate::new(350_000));
        bwe.update_estimate(now);
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(350_000));
    }

    #[test]
    fn low_loss_increases_from_window_minimum() {
        let start = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        bwe.set_send_bitrate(Bitrate::new(100_000));

        // ~0.78% loss over 30 packets, well below the 2% threshold.
        let now = start + ms(3000);
        bwe.update_receiver_block(2, ms(100), 30, now);

        let estimate = bwe.current_estimate();
        assert_eq!(estimate.bitrate, Bitrate::new(109_000));
        assert_eq!(estimate.fraction_loss, 2);
        assert_eq!(estimate.round_trip_time, ms(100));
    }

    #[test]
    fn increase_is_anchored_on_window_minimum() {
        let start = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        bwe.set_send_bitrate(Bitrate::new(100_000));

        bwe.update_receiver_block(0, ms(50), 30, start + ms(3000));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(109_000));

        // Within the window the 100 kbps entry is still the minimum, so a
        // second report does not compound.
        bwe.update_receiver_block(0, ms(50), 30, start + ms(3500));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(109_000));

        // Once it expires, the ramp continues from 109 kbps.
        bwe.update_receiver_block(0, ms(50), 30, start + ms(4100));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(118_720));
    }

    #[test]
    fn moderate_loss_holds_the_estimate() {
        let start = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        bwe.set_send_bitrate(Bitrate::new(500_000));

        // 5% loss: between the 2% and 10% thresholds.
        bwe.update_receiver_block(13, ms(100), 40, start + ms(3000));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(500_000));
    }

    #[test]
    fn high_loss_decreases_once_per_fraction() {
        let start = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        bwe.set_send_bitrate(Bitrate::new(500_000));

        // 25% loss over 40 packets.
        bwe.update_receiver_block(64, ms(100), 40, start + ms(5000));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(437_500));

        // Same loss again 200 ms later: inside BWE_DECREASE_INTERVAL + rtt,
        // so no further decrease.
        bwe.update_receiver_block(64, ms(100), 40, start + ms(5200));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(437_500));
    }

    #[test]
    fn decrease_is_not_reapplied_without_new_fraction() {
        let start = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::new(100_000), Some(Bitrate::new(1_500_000)));
        bwe.set_send_bitrate(Bitrate::new(1_000_000));

        // 50% loss.
        let now = start + ms(10_000);
        bwe.update_receiver_block(128, ms(50), 100, now);

        let decreased = bwe.current_estimate().bitrate;
        assert!(decreased < Bitrate::new(1_000_000));
        assert!(decreased > Bitrate::new(100_000));
        assert_eq!(bwe.current_estimate().fraction_loss, 128);

        // Ticks without an intermediate receiver block neither decrease nor
        // increase the estimate.
        bwe.update_estimate(now + ms(1000));
        assert_eq!(bwe.current_estimate().bitrate, decreased);
        bwe.update_estimate(now + ms(2000));
        assert_eq!(bwe.current_estimate().bitrate, decreased);
        assert_eq!(bwe.current_estimate().fraction_loss, 128);
    }

    #[test]
    fn loss_is_not_computed_on_thin_samples() {
        let start = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        bwe.set_send_bitrate(Bitrate::new(500_000));

        // 50% loss, but only 10 packets: below the 20 packet minimum.
        bwe.update_receiver_block(128, ms(100), 10, start);
        assert_eq!(bwe.current_estimate().fraction_loss, 0);
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(500_000));

        // The second thin report completes the sample. The fraction is the
        // Q8 average over both.
        bwe.update_receiver_block(128, ms(100), 10, start + ms(500));
        assert_eq!(bwe.current_estimate().fraction_loss, 128);

        // Accumulators were reset: another thin report computes nothing.
        bwe.update_receiver_block(0, ms(100), 10, start + ms(1000));
        assert_eq!(bwe.current_estimate().fraction_loss, 128);
    }

    #[test]
    fn below_bitrate_threshold_loss_does_not_decrease() {
        let start = Instant::now();
        let config = EstimatorConfig::new().set_loss_experiment("Enabled-0.03,0.2,500");
        let mut bwe = make_estimator_with(config);
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        bwe.set_send_bitrate(Bitrate::new(100_000));

        // 25% loss, but 100 kbps is below the 500 kbps threshold: the
        // increase branch still applies.
        bwe.update_receiver_block(64, ms(100), 40, start + ms(3000));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(109_000));
    }

    #[test]
    fn feedback_timeout_decays_bitrate() {
        let start = Instant::now();
        let config = EstimatorConfig::new().set_feedback_timeout(true);
        let mut bwe = make_estimator_with(config);
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::new(1_000_000)));
        bwe.set_send_bitrate(Bitrate::new(1_000_000));

        bwe.update_receiver_block(0, ms(50), 25, start);
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(1_000_000));

        // 5 s without feedback: past both the packet-report freshness window
        // and the feedback timeout.
        bwe.update_estimate(start + ms(5000));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(800_000));

        // Within the timeout log interval nothing further happens.
        bwe.update_estimate(start + ms(5500));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(800_000));

        // Past it, the decay applies again.
        bwe.update_estimate(start + ms(6100));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(640_000));
    }

    #[test]
    fn feedback_timeout_decay_truncates() {
        let start = Instant::now();
        let config = EstimatorConfig::new().set_feedback_timeout(true);
        let mut bwe = make_estimator_with(config);
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::new(1_000_001)));
        bwe.set_send_bitrate(Bitrate::new(1_000_001));

        bwe.update_receiver_block(0, ms(50), 25, start);
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(1_000_001));

        // 1_000_001 * 0.8 = 800_000.8 truncates to 800_000.
        bwe.update_estimate(start + ms(5000));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(800_000));
    }

    #[test]
    fn feedback_timeout_requires_experiment() {
        let start = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::new(1_000_000)));
        bwe.set_send_bitrate(Bitrate::new(1_000_000));

        bwe.update_receiver_block(0, ms(50), 25, start);
        bwe.update_estimate(start + ms(5000));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(1_000_000));
    }

    #[test]
    fn cap_applies_ceilings_before_configured_bounds() {
        let now = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::new(100_000), Some(Bitrate::new(800_000)));

        bwe.update_receiver_estimate(now, Bitrate::new(600_000));
        bwe.update_delay_based_estimate(now, Bitrate::new(400_000));
        bwe.set_send_bitrate(Bitrate::new(900_000));

        bwe.update_estimate(now);
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(400_000));
    }

    #[test]
    fn min_clamp_overrides_external_ceilings() {
        let now = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::new(100_000), Some(Bitrate::new(800_000)));

        // A REMB below the configured min is overridden by the min clamp.
        bwe.update_receiver_estimate(now, Bitrate::new(50_000));
        bwe.set_send_bitrate(Bitrate::new(900_000));

        bwe.update_estimate(now);
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(100_000));
    }

    #[test]
    fn capping_is_idempotent() {
        let now = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::new(100_000), Some(Bitrate::new(800_000)));
        bwe.update_receiver_estimate(now, Bitrate::new(600_000));
        bwe.update_delay_based_estimate(now, Bitrate::new(400_000));

        for bitrate in [0_u64, 50_000, 100_000, 400_000, 500_000, 900_000] {
            let once = bwe.cap_to_thresholds(now, Bitrate::new(bitrate));
            let twice = bwe.cap_to_thresholds(now, once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn ticks_without_feedback_only_cap() {
        let now = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        bwe.set_send_bitrate(Bitrate::new(300_000));

        for i in 0..10 {
            bwe.update_estimate(now + ms(500 * i));
            assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(300_000));
        }
    }

    #[test]
    fn set_send_bitrate_clears_history() {
        let start = Instant::now();
        let mut bwe = make_estimator();
        bwe.set_min_max_bitrate(Bitrate::kbps(10), Some(Bitrate::mbps(2)));
        bwe.set_send_bitrate(Bitrate::new(100_000));

        bwe.update_receiver_block(0, ms(50), 25, start);
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(109_000));

        // The forced value is not capped by the stale window minimum: the
        // next increase anchors on 300 kbps, not 109 kbps.
        bwe.set_send_bitrate(Bitrate::new(300_000));
        bwe.update_receiver_block(0, ms(50), 25, start + ms(200));
        assert_eq!(bwe.current_estimate().bitrate, Bitrate::new(325_000));
    }

    #[test]
    #[should_panic]
    fn zero_send_bitrate_panics() {
        let mut bwe = make_estimator();
        bwe.set_send_bitrate(Bitrate::ZERO);
    }
}
