//! Data-point logging for offline analysis of estimator behavior.
//!
//! Compiled to no-ops unless the `_internal_dont_use_log_stats` feature is
//! enabled, in which case each data point is written as a line on stdout.

#[cfg(feature = "_internal_dont_use_log_stats")]
macro_rules! log_stat {
    ($name:expr, $($arg:expr),+) => {
        {
            use std::time::SystemTime;
            use std::io::{self, Write};

            let now = SystemTime::now();
            let since_epoch = now.duration_since(SystemTime::UNIX_EPOCH).unwrap();
            let unix_time_ms = since_epoch.as_millis();
            let mut lock = io::stdout().lock();
            write!(lock, "{} ", $name).expect("Failed to write to stdout");

            $(
                write!(lock, "{},", $arg).expect("Failed to write to stdout");
            )+
            writeln!(lock, "{}", unix_time_ms).expect("Failed to write to stdout");
        }
    };
}

#[cfg(not(feature = "_internal_dont_use_log_stats"))]
macro_rules! log_stat {
    ($name:expr, $($arg:expr),+) => {
        {
            let _ = $name;
            $(
                let _ = $arg;
            )+
        }
    };
}

macro_rules! log_loss {
    ($($arg:expr),+) => {
        crate::macros::log_stat!("LOSS", $($arg),+);
    }
}

macro_rules! log_bitrate_estimate {
    ($($arg:expr),+) => {
        crate::macros::log_stat!("BITRATE_ESTIMATE", $($arg),+);
    }
}

pub(crate) use log_bitrate_estimate;
pub(crate) use log_loss;
pub(crate) use log_stat;
