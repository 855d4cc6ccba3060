use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cdshim_sys::cdtime_t;

/// Nanoseconds, convertible to and from collectd's `cdtime_t`
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct CdTime(pub u64);

impl From<SystemTime> for CdTime {
    fn from(t: SystemTime) -> Self {
        // Times before the epoch can't be expressed in cdtime_t
        let since = t.duration_since(UNIX_EPOCH).unwrap_or_default();
        CdTime::from(since)
    }
}

impl From<CdTime> for SystemTime {
    fn from(v: CdTime) -> SystemTime {
        UNIX_EPOCH + Duration::from(v)
    }
}

impl From<Duration> for CdTime {
    fn from(d: Duration) -> Self {
        CdTime(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<CdTime> for Duration {
    fn from(v: CdTime) -> Self {
        Duration::from_nanos(v.0)
    }
}

impl From<cdtime_t> for CdTime {
    fn from(d: cdtime_t) -> Self {
        CdTime(collectd_to_nanos(d))
    }
}

impl From<CdTime> for cdtime_t {
    fn from(v: CdTime) -> cdtime_t {
        nanos_to_collectd(v.0)
    }
}

/// collectd stores time at a 2^-30 second resolution: the upper 34 bits
/// hold seconds, the lower 30 bits the fraction of a second. Rounds half up.
pub fn nanos_to_collectd(nanos: u64) -> cdtime_t {
    ((nanos / 1_000_000_000) << 30)
        | ((((nanos % 1_000_000_000) << 30) + 500_000_000) / 1_000_000_000)
}

pub fn collectd_to_nanos(cd: cdtime_t) -> u64 {
    ((cd >> 30) * 1_000_000_000) + (((cd & 0x3fff_ffff) * 1_000_000_000 + (1 << 29)) >> 30)
}
