use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct FailureWindow {
    reported_at: Instant,
    suppressed: u64,
}

/// Rate-limits failure logs per (label, url).
///
/// The first failure of a pair is reported, later ones within `cooldown` are
/// counted and suppressed. A success clears the pair.
#[derive(Debug)]
pub struct FailureThrottle {
    cooldown: Duration,
    windows: HashMap<(String, String), FailureWindow>,
}

impl FailureThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            windows: HashMap::new(),
        }
    }

    /// Returns `Some(suppressed)` when this failure should be logged, with the
    /// number of failures swallowed since the previous report.
    pub fn report(&mut self, label: &str, url: &str) -> Option<u64> {
        self.report_at(label, url, Instant::now())
    }

    pub fn report_at(&mut self, label: &str, url: &str, now: Instant) -> Option<u64> {
        let key = (label.to_string(), url.to_string());
        match self.windows.get_mut(&key) {
            Some(window) if now.saturating_duration_since(window.reported_at) < self.cooldown => {
                window.suppressed += 1;
                None
            }
            Some(window) => {
                let suppressed = window.suppressed;
                window.reported_at = now;
                window.suppressed = 0;
                Some(suppressed)
            }
            None => {
                self.windows.insert(
                    key,
                    FailureWindow {
                        reported_at: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }

    pub fn record_success(&mut self, label: &str, url: &str) {
        self.windows.remove(&(label.to_string(), url.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_failures_are_suppressed_within_cooldown() {
        let mut throttle = FailureThrottle::new(Duration::from_secs(60));
        let start = Instant::now();

        assert_eq!(throttle.report_at("a", "http://a/", start), Some(0));
        assert_eq!(
            throttle.report_at("a", "http://a/", start + Duration::from_secs(1)),
            None
        );
        assert_eq!(
            throttle.report_at("a", "http://a/", start + Duration::from_secs(30)),
            None
        );
        assert_eq!(
            throttle.report_at("a", "http://a/", start + Duration::from_secs(61)),
            Some(2)
        );
    }

    #[test]
    fn test_pairs_are_independent() {
        let mut throttle = FailureThrottle::new(Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(throttle.report_at("a", "http://a/", now), Some(0));
        assert_eq!(throttle.report_at("b", "http://a/", now), Some(0));
        assert_eq!(throttle.report_at("a", "http://b/", now), Some(0));
        assert_eq!(throttle.report_at("a", "http://a/", now), None);
    }

    #[test]
    fn test_success_resets_pair() {
        let mut throttle = FailureThrottle::new(Duration::from_secs(60));
        let now = Instant::now();

        throttle.report_at("a", "http://a/", now);
        throttle.record_success("a", "http://a/");
        assert_eq!(throttle.report_at("a", "http://a/", now), Some(0));
    }
}
