//! Replay filtering for message transports.
//!
//! MQTT brokers redeliver retained messages on every subscribe and may
//! redeliver QoS 1 messages after a reconnect.  Each shaker message carries
//! its own `(seq, ts)` pair; a delivery whose pair is not newer than the last
//! delivered one is a replay and is dropped.
//!
//! The timestamp orders deliveries and the sequence number breaks ties
//! between messages stamped in the same millisecond.  A device that rebooted
//! and restarted its counter at 0 still gets through, since its fresh
//! messages carry fresh timestamps.

#[derive(Debug, Clone, Default)]
pub struct ReplayFilter {
    last: Option<(u64, u64)>,
}

impl ReplayFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the message should be delivered, recording it as the
    /// newest one.
    pub fn admit(&mut self, seq: u64, ts: u64) -> bool {
        match self.last {
            Some((last_seq, last_ts)) if (ts, seq) <= (last_ts, last_seq) => false,
            _ => {
                self.last = Some((seq, ts));
                true
            }
        }
    }

    /// The last delivered `(seq, ts)` pair.
    pub fn last(&self) -> Option<(u64, u64)> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_is_admitted() {
        let mut filter = ReplayFilter::new();
        assert!(filter.admit(5, 100));
        assert_eq!(filter.last(), Some((5, 100)));
    }

    #[test]
    fn test_retained_replay_is_dropped() {
        // Arrange
        let mut filter = ReplayFilter::new();
        filter.admit(5, 100);
        filter.admit(6, 110);

        // Act / Assert
        assert!(!filter.admit(6, 110), "exact redelivery");
        assert!(!filter.admit(5, 100), "older retained message");
        assert!(filter.admit(7, 120));
        assert!(filter.admit(8, 120), "same millisecond, higher seq");
    }

    #[test]
    fn test_device_reboot_with_fresh_timestamp_is_admitted() {
        let mut filter = ReplayFilter::new();
        filter.admit(900, 1_000);
        assert!(filter.admit(0, 2_000));
        assert!(!filter.admit(900, 1_000), "pre-reboot message is now stale");
    }
}
