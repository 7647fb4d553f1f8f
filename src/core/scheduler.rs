//! Timing scheduler: next permissible send instant in recipient-local time.
//!
//! Business windows, exclusions and weekend rules come from the channel
//! profile. Jitter is drawn from a skewed distribution (product of two
//! uniforms, dense near zero) and never leaves the open segment it starts in.
//! Randomness is injected so tests can seed it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ChannelProfile, ChannelProfiles, WeekendPolicy};
use crate::core::channel::Channel;
use crate::core::error::EngineError;
use crate::util::serde::ResourceId;

/// Days searched ahead for an open window.
pub(crate) const HORIZON_DAYS: i64 = 14;

/// Start of the UTC day after `at`.
pub(crate) fn next_utc_midnight(at: DateTime<Utc>) -> DateTime<Utc> {
    let next = at.date_naive() + Duration::days(1);
    next.and_hms_opt(0, 0, 0)
        .map_or(at + Duration::days(1), |midnight| midnight.and_utc())
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, EngineError> {
    name.parse::<Tz>()
        .map_err(|e| EngineError::InvalidTimezone(format!("{name}: {e}")))
}

/// Whether `at` falls on a Saturday for the recipient.
#[must_use]
pub fn is_recipient_saturday(tz: &Tz, at: DateTime<Utc>) -> bool {
    at.with_timezone(tz).weekday() == Weekday::Sat
}

/// Per-resource sends per clock hour.
#[derive(Default)]
pub struct HourlyLedger {
    slots: RwLock<HashMap<(ResourceId, i64), Arc<AtomicU32>>>,
}

impl HourlyLedger {
    fn hour_of(at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(3600)
    }

    fn counter(&self, resource_id: &ResourceId, hour: i64) -> Arc<AtomicU32> {
        let key = (resource_id.clone(), hour);
        if let Some(counter) = self.slots.read().get(&key) {
            return Arc::clone(counter);
        }
        Arc::clone(self.slots.write().entry(key).or_default())
    }

    /// Reserve one action in the hour containing `at` if below `ceiling`.
    pub fn try_reserve(&self, resource_id: &ResourceId, at: DateTime<Utc>, ceiling: u32) -> bool {
        let counter = self.counter(resource_id, Self::hour_of(at));
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current >= ceiling {
                return false;
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Actions reserved in the hour containing `at`.
    #[must_use]
    pub fn count(&self, resource_id: &ResourceId, at: DateTime<Utc>) -> u32 {
        self.slots
            .read()
            .get(&(resource_id.clone(), Self::hour_of(at)))
            .map_or(0, |c| c.load(Ordering::Acquire))
    }

    /// Drop hours ending before `at`.
    pub fn prune_before(&self, at: DateTime<Utc>) -> usize {
        let cutoff = Self::hour_of(at);
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|(_, hour), _| *hour >= cutoff);
        before - slots.len()
    }
}

/// An open local position and the end of the segment containing it.
struct Opening {
    at: DateTime<Tz>,
    segment_end: DateTime<Tz>,
}

/// Computes send instants.
pub struct TimingScheduler {
    channels: ChannelProfiles,
    rng: Mutex<StdRng>,
    hourly: HourlyLedger,
}

impl TimingScheduler {
    /// Scheduler with OS-seeded randomness.
    #[must_use]
    pub fn new(channels: ChannelProfiles) -> Self {
        Self::with_rng(channels, StdRng::from_os_rng())
    }

    /// Scheduler with deterministic randomness.
    #[must_use]
    pub fn with_seed(channels: ChannelProfiles, seed: u64) -> Self {
        Self::with_rng(channels, StdRng::seed_from_u64(seed))
    }

    /// Scheduler with an explicit random source.
    #[must_use]
    pub fn with_rng(channels: ChannelProfiles, rng: StdRng) -> Self {
        Self {
            channels,
            rng: Mutex::new(rng),
            hourly: HourlyLedger::default(),
        }
    }

    /// Hourly ledger shared by every placement.
    #[must_use]
    pub const fn hourly(&self) -> &HourlyLedger {
        &self.hourly
    }

    /// Earliest valid instant at or after `now`, plus jitter, for a recipient
    /// in `timezone`.
    pub fn next_valid_instant(
        &self,
        channel: Channel,
        timezone: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, EngineError> {
        let tz = parse_timezone(timezone)?;
        self.next_valid_in(channel, &tz, now)
    }

    /// [`Self::next_valid_instant`] with a parsed timezone.
    pub fn next_valid_in(
        &self,
        channel: Channel,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, EngineError> {
        let profile = self.channels.get(channel);
        let opening = self
            .find_opening(profile, tz, now.with_timezone(tz).naive_local(), None)
            .ok_or_else(|| no_window(channel))?;
        Ok(self.jittered(profile, &opening))
    }

    /// Whether `at` lies inside an open segment of the channel's window for
    /// the recipient, ignoring the Saturday draw.
    #[must_use]
    pub fn is_within_window(&self, channel: Channel, tz: &Tz, at: DateTime<Utc>) -> bool {
        let profile = self.channels.get(channel);
        let local = at.with_timezone(tz);
        let weekday_ok = match (local.weekday(), profile.weekend) {
            (Weekday::Sun, _) | (Weekday::Sat, WeekendPolicy::Exclude) => false,
            _ => true,
        };
        weekday_ok && profile.business_hours.contains(local.time())
    }

    /// Reserve an hourly slot on the resource at `candidate`, moving to later
    /// open instants when an hour is full. The search never leaves the UTC day
    /// of `candidate`, whose rate window the caller consumed; `None` means the
    /// rest of that day is full.
    pub fn place_on_resource(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        tz: &Tz,
        candidate: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, EngineError> {
        let ceiling = self.channels.get(channel).hourly_ceiling;
        let day = candidate.date_naive();
        let mut at = candidate;
        while at.date_naive() == day {
            if self.hourly.try_reserve(resource_id, at, ceiling) {
                return Ok(Some(at));
            }
            let next_hour = DateTime::<Utc>::from_timestamp((HourlyLedger::hour_of(at) + 1) * 3600, 0)
                .ok_or_else(|| EngineError::Backend(format!("hour overflow after {at}")))?;
            at = self.next_valid_in(channel, tz, next_hour)?;
        }
        tracing::debug!(
            "hourly ceiling filled {} for {} on {}",
            resource_id,
            channel,
            day
        );
        Ok(None)
    }

    /// Same-day retry after `delay`, or the next open window when the delay
    /// runs past today's window.
    pub fn retry_after(
        &self,
        channel: Channel,
        tz: &Tz,
        previous: DateTime<Utc>,
        delay: Duration,
    ) -> Result<DateTime<Utc>, EngineError> {
        let profile = self.channels.get(channel);
        let from = (previous + delay).with_timezone(tz).naive_local();
        let opening = self
            .find_opening(profile, tz, from, None)
            .ok_or_else(|| no_window(channel))?;
        Ok(opening.at.with_timezone(&Utc))
    }

    /// Retry on the next open day, in the half of the window opposite to the
    /// previous attempt's local time.
    pub fn next_day_other_half(
        &self,
        channel: Channel,
        tz: &Tz,
        previous: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, EngineError> {
        let profile = self.channels.get(channel);
        let local = previous.with_timezone(tz);
        let mid = profile.business_hours.midpoint();
        let afternoon = local.time() < mid;
        let next_day = local
            .date_naive()
            .succ_opt()
            .ok_or_else(|| no_window(channel))?;
        let from = if afternoon {
            next_day.and_time(mid)
        } else {
            next_day.and_time(profile.business_hours.start)
        };
        let cutoff = (!afternoon).then_some(mid);
        let opening = self
            .find_opening(profile, tz, from, cutoff)
            .ok_or_else(|| no_window(channel))?;
        Ok(self.jittered(profile, &opening))
    }

    fn day_allowed(&self, weekend: WeekendPolicy, weekday: Weekday) -> bool {
        match (weekday, weekend) {
            (Weekday::Sun, _) | (Weekday::Sat, WeekendPolicy::Exclude) => false,
            (Weekday::Sat, WeekendPolicy::ReducedSaturday { probability, .. }) => {
                self.rng.lock().random_bool(probability.clamp(0.0, 1.0))
            }
            _ => true,
        }
    }

    /// Walk forward from `from` (recipient-local) to the first open position.
    /// `cutoff` truncates every segment on days other than the first.
    fn find_opening(
        &self,
        profile: &ChannelProfile,
        tz: &Tz,
        from: NaiveDateTime,
        cutoff: Option<chrono::NaiveTime>,
    ) -> Option<Opening> {
        let segments = profile.business_hours.segments();
        for offset in 0..=HORIZON_DAYS {
            let date = from.date() + Duration::days(offset);
            if !self.day_allowed(profile.weekend, date.weekday()) {
                continue;
            }
            for segment in &segments {
                let start = if offset == 0 {
                    segment.start.max(from.time())
                } else {
                    segment.start
                };
                let end = cutoff.map_or(segment.end, |c| segment.end.min(c));
                if start >= end {
                    continue;
                }
                let (Some(at), Some(segment_end)) = (
                    resolve_local(tz, date.and_time(start)),
                    resolve_local(tz, date.and_time(end)),
                ) else {
                    continue;
                };
                if at < segment_end {
                    return Some(Opening { at, segment_end });
                }
            }
        }
        None
    }

    #[allow(clippy::cast_possible_truncation)]
    fn jittered(&self, profile: &ChannelProfile, opening: &Opening) -> DateTime<Utc> {
        let max_secs = i64::from(profile.max_jitter_minutes) * 60;
        let room = (opening.segment_end - opening.at).num_seconds() - 1;
        let bound = max_secs.min(room).max(0);
        let skew = {
            let mut rng = self.rng.lock();
            rng.random::<f64>() * rng.random::<f64>()
        };
        // skew is in [0, 1), so the product stays within bound
        let offset = (skew * bound as f64) as i64;
        (opening.at + Duration::seconds(offset)).with_timezone(&Utc)
    }
}

/// Map a local wall time to an instant. Inside a DST gap the wall time does
/// not exist, so the next existing minute is used.
fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
}

fn no_window(channel: Channel) -> EngineError {
    EngineError::Config(format!(
        "no open {channel} window within {HORIZON_DAYS} days"
    ))
}
