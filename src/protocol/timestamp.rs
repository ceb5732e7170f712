//! Port agent timestamps.
//!
//! The header carries a 64-bit fixed-point value: 32 bits of seconds and 32
//! bits of fraction scaled by 2^32. The port agent fills the seconds with Unix
//! epoch time even though the field is described as NTP, and this client does
//! the same so both sides agree on the wire.

use std::time::{SystemTime, UNIX_EPOCH};

const FRACTION_SCALE: f64 = 4_294_967_296.0; // 2^32

/// Fixed-point timestamp as carried in the packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    /// Whole seconds since the Unix epoch.
    pub seconds: u32,
    /// Fractional second scaled by 2^32.
    pub fraction: u32,
}

impl Timestamp {
    /// The all-zero timestamp.
    pub const ZERO: Timestamp = Timestamp {
        seconds: 0,
        fraction: 0,
    };

    /// Sample the system clock.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self::from_unix_secs(secs)
    }

    /// Convert fractional Unix seconds.
    ///
    /// ```
    /// use port_agent_client::protocol::Timestamp;
    ///
    /// let ts = Timestamp::from_unix_secs(10.5);
    /// assert_eq!(ts.seconds, 10);
    /// assert_eq!(ts.fraction, 1 << 31);
    /// ```
    pub fn from_unix_secs(unix: f64) -> Self {
        let seconds = unix.floor();
        let fraction = ((unix - seconds) * FRACTION_SCALE).round();
        Self {
            seconds: seconds as u32,
            // Rounding can land on 2^32 for values just below the next second.
            fraction: fraction.min(u32::MAX as f64) as u32,
        }
    }

    /// Fractional Unix seconds.
    pub fn as_unix_secs(&self) -> f64 {
        self.seconds as f64 + self.fraction as f64 / FRACTION_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_unix_secs_rounds_fraction() {
        let ts = Timestamp::from_unix_secs(1.25);
        assert_eq!(ts.seconds, 1);
        assert_eq!(ts.fraction, 1 << 30);
    }

    #[test]
    fn test_round_trip_precision() {
        let unix = 1_700_000_000.123_456;
        let ts = Timestamp::from_unix_secs(unix);
        assert!((ts.as_unix_secs() - unix).abs() < 1e-6);
    }

    #[test]
    fn test_fraction_saturates_below_next_second() {
        let ts = Timestamp::from_unix_secs(5.0 + 0.999_999_999_99);
        assert_eq!(ts.seconds, 5);
        assert_eq!(ts.fraction, u32::MAX);
    }

    #[test]
    fn test_now_uses_unix_epoch() {
        let ts = Timestamp::now();
        // Seconds after 2020-01-01 rules out a 1900-based NTP epoch.
        assert!(ts.seconds > 1_577_836_800);
        assert!(ts.seconds < 2_208_988_800);
    }
}
