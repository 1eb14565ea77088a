use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use chrono_tz::Tz;

#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Wall-clock time in the dashboard's local offset.
    fn now(&self) -> DateTime<FixedOffset>;
    fn instant(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
enum Zone {
    #[default]
    Host,
    Fixed(FixedOffset),
    Named(Tz),
}

#[derive(Debug, Default, Clone)]
pub struct SystemClock {
    zone: Zone,
}

impl SystemClock {
    /// A clock pinned to a fixed UTC offset instead of the host's local zone.
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            zone: Zone::Fixed(offset),
        }
    }

    /// A clock reading local time in an IANA zone such as `America/Mexico_City`.
    pub fn with_zone(zone: Tz) -> Self {
        Self {
            zone: Zone::Named(zone),
        }
    }

    fn at(&self, utc: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self.zone {
            Zone::Host => utc.with_timezone(&Local).fixed_offset(),
            Zone::Fixed(offset) => utc.with_timezone(&offset),
            Zone::Named(tz) => {
                let local = utc.with_timezone(&tz);
                local.with_timezone(&local.offset().fix())
            }
        }
    }
}

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.at(Utc::now())
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    #[test]
    fn named_zone_reads_local_wall_time() {
        let clock = SystemClock::with_zone(chrono_tz::America::Mexico_City);
        let utc = Utc.with_ymd_and_hms(2026, 10, 18, 15, 0, 0).single().expect("date");

        let local = clock.at(utc);

        assert_eq!(local.hour(), 9);
        assert_eq!(local.offset().local_minus_utc(), -6 * 3600);
        assert_eq!(local, utc);
    }

    #[test]
    fn fixed_offset_is_used_verbatim() {
        let offset = FixedOffset::east_opt(2 * 3600).expect("offset");
        let utc = Utc.with_ymd_and_hms(2026, 10, 18, 23, 30, 0).single().expect("date");

        let local = SystemClock::with_offset(offset).at(utc);

        assert_eq!(local.date_naive().to_string(), "2026-10-19");
        assert_eq!(local.hour(), 1);
    }
}
