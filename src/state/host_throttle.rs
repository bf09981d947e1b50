use std::time::{Duration, Instant};

/// Enforces the politeness delay between requests to one source's host
///
/// Every request attempt, retries included, goes through [`HostThrottle::wait_turn`],
/// so retry backoff never shortens the interval between two requests.
#[derive(Debug, Clone)]
pub struct HostThrottle {
    /// Minimum time between two requests
    min_delay: Duration,

    /// Timestamp of the last request
    last_request_time: Option<Instant>,

    /// Number of requests issued through this throttle
    request_count: u32,
}

impl HostThrottle {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request_time: None,
            request_count: 0,
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    /// Raises the delay (e.g. from a robots.txt `Crawl-delay`); never lowers it
    pub fn raise_delay(&mut self, delay: Duration) {
        if delay > self.min_delay {
            tracing::debug!(
                "Politeness delay raised from {:?} to {:?}",
                self.min_delay,
                delay
            );
            self.min_delay = delay;
        }
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        if let Some(last) = self.last_request_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_delay {
                return Some(self.min_delay - elapsed);
            }
        }
        None
    }

    /// Records that a request was made at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Sleeps until the delay has elapsed, then records the request
    pub async fn wait_turn(&mut self) {
        if let Some(wait) = self.time_until_next_request(Instant::now()) {
            tracing::trace!("Politeness wait {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.record_request(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_throttle() {
        let throttle = HostThrottle::new(Duration::from_secs(1));
        assert_eq!(throttle.request_count(), 0);
        assert!(throttle.time_until_next_request(Instant::now()).is_none());
    }

    #[test]
    fn test_minimum_delay_enforced() {
        let mut throttle = HostThrottle::new(Duration::from_millis(1000));
        let now = Instant::now();
        throttle.record_request(now);

        assert!(throttle
            .time_until_next_request(now + Duration::from_millis(500))
            .is_some());
        assert!(throttle
            .time_until_next_request(now + Duration::from_millis(1000))
            .is_none());
        assert!(throttle
            .time_until_next_request(now + Duration::from_millis(1500))
            .is_none());
    }

    #[test]
    fn test_time_until_next_request() {
        let mut throttle = HostThrottle::new(Duration::from_millis(1000));
        let now = Instant::now();

        assert!(throttle.time_until_next_request(now).is_none());

        throttle.record_request(now);
        let wait = throttle
            .time_until_next_request(now + Duration::from_millis(300))
            .unwrap();
        assert_eq!(wait, Duration::from_millis(700));
    }

    #[test]
    fn test_raise_delay_only_raises() {
        let mut throttle = HostThrottle::new(Duration::from_millis(1000));
        throttle.raise_delay(Duration::from_millis(200));
        assert_eq!(throttle.min_delay(), Duration::from_millis(1000));
        throttle.raise_delay(Duration::from_secs(5));
        assert_eq!(throttle.min_delay(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_wait_turn_spaces_requests() {
        let mut throttle = HostThrottle::new(Duration::from_millis(50));
        let start = Instant::now();
        throttle.wait_turn().await;
        throttle.wait_turn().await;
        throttle.wait_turn().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(throttle.request_count(), 3);
    }
}
