//! Pool-wide statistics: the nine counters the borrow/return algorithms
//! maintain, and the immutable snapshot/status report built from them.

use std::fmt;
use std::time::Duration;

/// Mutable counters, written only while the pool's mutex is held.
#[derive(Debug, Default, Clone)]
pub(crate) struct Counters {
    pub(crate) request_count: u64,
    pub(crate) accumulated_request_time: Duration,
    pub(crate) accumulated_checkout_time: Duration,
    pub(crate) overdue_count: u64,
    pub(crate) accumulated_overdue_checkout_time: Duration,
    pub(crate) accumulated_wait_time: Duration,
    pub(crate) had_to_wait_count: u64,
    pub(crate) bad_connection_count: u64,
}

/// An immutable snapshot of the pool's statistics, taken inside the
/// pool's mutex so the counters it reports are mutually consistent at
/// the instant of capture, rather than read field-by-field off a live,
/// concurrently-mutated pool.
#[derive(Debug, Clone)]
pub struct PoolStatistics {
    /// Current number of idle connections.
    pub idle_count: u32,
    /// Current number of active (checked-out) connections.
    pub active_count: u32,
    /// Configured maximum active connections.
    pub max_active: u32,
    /// Configured maximum idle connections.
    pub max_idle: u32,
    /// Total successful `borrow` calls.
    pub request_count: u64,
    /// Sum of wall-clock time spent inside `borrow`, across all calls.
    pub accumulated_request_time: Duration,
    /// Sum of checkout durations across all returned/reclaimed connections.
    pub accumulated_checkout_time: Duration,
    /// Number of overdue reclaims performed.
    pub overdue_count: u64,
    /// Sum of checkout durations specifically for overdue reclaims.
    pub accumulated_overdue_checkout_time: Duration,
    /// Sum of time spent waiting on the condition variable.
    pub accumulated_wait_time: Duration,
    /// Number of `borrow` calls that had to wait at least once.
    pub had_to_wait_count: u64,
    /// Number of connections discarded for failing validation.
    pub bad_connection_count: u64,
}

impl PoolStatistics {
    /// Average time spent inside `borrow`, across all requests.
    ///
    /// Zero when `request_count` is zero.
    #[must_use]
    pub fn average_request_time(&self) -> Duration {
        average(self.accumulated_request_time, self.request_count)
    }

    /// Average checkout duration, across all returns and reclaims.
    #[must_use]
    pub fn average_checkout_time(&self) -> Duration {
        average(self.accumulated_checkout_time, self.request_count)
    }

    /// Average checkout duration among overdue reclaims specifically.
    #[must_use]
    pub fn average_overdue_checkout_time(&self) -> Duration {
        average(self.accumulated_overdue_checkout_time, self.overdue_count)
    }

    /// Average time spent waiting on the condition variable, among
    /// calls that had to wait.
    #[must_use]
    pub fn average_wait_time(&self) -> Duration {
        average(self.accumulated_wait_time, self.had_to_wait_count)
    }
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        total / u32::try_from(count.min(u64::from(u32::MAX))).unwrap_or(u32::MAX)
    }
}

impl fmt::Display for PoolStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PooledDataSource status")?;
        writeln!(f, "  active connections:          {} / {}", self.active_count, self.max_active)?;
        writeln!(f, "  idle connections:            {} / {}", self.idle_count, self.max_idle)?;
        writeln!(f, "  request count:               {}", self.request_count)?;
        writeln!(f, "  average request time:        {:?}", self.average_request_time())?;
        writeln!(f, "  average checkout time:       {:?}", self.average_checkout_time())?;
        writeln!(f, "  had to wait count:           {}", self.had_to_wait_count)?;
        writeln!(f, "  average wait time:           {:?}", self.average_wait_time())?;
        writeln!(f, "  overdue connection count:    {}", self.overdue_count)?;
        writeln!(f, "  average overdue checkout:    {:?}", self.average_overdue_checkout_time())?;
        write!(f, "  bad connection count:        {}", self.bad_connection_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_denominators_yield_zero_averages() {
        let stats = PoolStatistics {
            idle_count: 0,
            active_count: 0,
            max_active: 10,
            max_idle: 5,
            request_count: 0,
            accumulated_request_time: Duration::ZERO,
            accumulated_checkout_time: Duration::ZERO,
            overdue_count: 0,
            accumulated_overdue_checkout_time: Duration::ZERO,
            accumulated_wait_time: Duration::ZERO,
            had_to_wait_count: 0,
            bad_connection_count: 0,
        };
        assert_eq!(stats.average_request_time(), Duration::ZERO);
        assert_eq!(stats.average_checkout_time(), Duration::ZERO);
        assert_eq!(stats.average_overdue_checkout_time(), Duration::ZERO);
        assert_eq!(stats.average_wait_time(), Duration::ZERO);
    }

    #[test]
    fn averages_divide_accumulated_by_count() {
        let stats = PoolStatistics {
            idle_count: 1,
            active_count: 0,
            max_active: 10,
            max_idle: 5,
            request_count: 4,
            accumulated_request_time: Duration::from_millis(400),
            accumulated_checkout_time: Duration::from_millis(800),
            overdue_count: 2,
            accumulated_overdue_checkout_time: Duration::from_millis(100),
            accumulated_wait_time: Duration::from_millis(50),
            had_to_wait_count: 1,
            bad_connection_count: 0,
        };
        assert_eq!(stats.average_request_time(), Duration::from_millis(100));
        assert_eq!(stats.average_checkout_time(), Duration::from_millis(200));
        assert_eq!(stats.average_overdue_checkout_time(), Duration::from_millis(50));
        assert_eq!(stats.average_wait_time(), Duration::from_millis(50));
    }
}
