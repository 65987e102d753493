//! Wall clock used to compare against due instants

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// System time expressed in a configured zone
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.timezone).fixed_offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_uses_zone_offset() {
        let now = SystemClock::new(chrono_tz::Asia::Tbilisi).now();
        assert_eq!(now.offset().local_minus_utc(), 4 * 3600);
        assert!((Utc::now() - now.with_timezone(&Utc)).num_seconds().abs() < 5);
    }
}
