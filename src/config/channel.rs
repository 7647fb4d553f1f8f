//! Per-channel capability descriptors.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::core::channel::Channel;

/// Half-open local time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: NaiveTime,
    /// Exclusive end.
    pub end: NaiveTime,
}

impl TimeRange {
    /// Build a range from hour/minute pairs. Out-of-range values fall back to
    /// midnight, which validation then rejects.
    #[must_use]
    pub fn hm(start: (u32, u32), end: (u32, u32)) -> Self {
        Self {
            start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap_or_default(),
        }
    }
}

/// Recipient-local sending window with an optional mid-day exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    /// Window start.
    pub start: NaiveTime,
    /// Window end.
    pub end: NaiveTime,
    /// Sub-range skipped inside the window, e.g. lunch for voice.
    #[serde(default)]
    pub exclusion: Option<TimeRange>,
}

impl BusinessHours {
    /// Open segments of a day: the window minus the exclusion.
    #[must_use]
    pub fn segments(&self) -> Vec<TimeRange> {
        let window = TimeRange {
            start: self.start,
            end: self.end,
        };
        match self.exclusion {
            Some(ex) if ex.start < window.end && ex.end > window.start => {
                let mut out = Vec::with_capacity(2);
                if window.start < ex.start {
                    out.push(TimeRange {
                        start: window.start,
                        end: ex.start,
                    });
                }
                if ex.end < window.end {
                    out.push(TimeRange {
                        start: ex.end,
                        end: window.end,
                    });
                }
                out
            }
            _ => vec![window],
        }
    }

    /// Whether a local time falls inside an open segment.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.segments()
            .iter()
            .any(|seg| time >= seg.start && time < seg.end)
    }

    /// Midpoint of the window, splitting it into morning and afternoon halves.
    #[must_use]
    pub fn midpoint(&self) -> NaiveTime {
        self.start + (self.end - self.start) / 2
    }
}

/// Weekend handling for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekendPolicy {
    /// Weekdays only.
    Exclude,
    /// Saturday sometimes allowed at a reduced quota; Sunday excluded.
    ReducedSaturday {
        /// Chance a given Saturday is used.
        probability: f64,
        /// Multiplier applied to the daily cap on Saturdays.
        cap_multiplier: f64,
    },
}

/// Fixed-delay retry rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRule {
    /// Delay before the retry.
    pub delay_minutes: i64,
    /// Total attempts allowed, counting the first.
    pub max_attempts: u32,
}

/// Retry handling per dispatch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetryPolicy {
    /// Busy line: retried the same day after a fixed delay.
    #[serde(default)]
    pub busy: Option<RetryRule>,
    /// No answer: retried the next business day in the other half of the window.
    /// Value is the total attempts allowed.
    #[serde(default)]
    pub no_answer: Option<u32>,
    /// Transient provider failure.
    #[serde(default)]
    pub failed: Option<RetryRule>,
}

/// Capability descriptor consumed by the generic allocator and scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelProfile {
    /// Mature daily cap per resource.
    pub daily_cap: u32,
    /// Weekly ceiling per resource; looser than seven daily caps allow.
    pub weekly_cap: u32,
    /// Recipient-local sending window.
    pub business_hours: BusinessHours,
    /// Weekend handling.
    pub weekend: WeekendPolicy,
    /// Upper bound on humanized jitter.
    pub max_jitter_minutes: u32,
    /// Maximum sends per clock hour from one resource.
    pub hourly_ceiling: u32,
    /// Retry handling.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Longest payload the channel accepts.
    pub max_message_length: usize,
    /// Replies thread with prior touches.
    pub supports_threading: bool,
    /// A do-not-contact registry check is required before sending.
    pub requires_compliance_check: bool,
}

impl ChannelProfile {
    /// Validate profile values.
    pub fn validate(&self) -> Result<(), String> {
        if self.daily_cap == 0 {
            return Err("daily_cap must be greater than 0".into());
        }
        if self.weekly_cap < self.daily_cap {
            return Err("weekly_cap must be at least daily_cap".into());
        }
        if self.business_hours.start >= self.business_hours.end {
            return Err("business_hours start must precede end".into());
        }
        if self.business_hours.segments().is_empty() {
            return Err("exclusion covers the whole business window".into());
        }
        if self.hourly_ceiling == 0 {
            return Err("hourly_ceiling must be greater than 0".into());
        }
        if let WeekendPolicy::ReducedSaturday {
            probability,
            cap_multiplier,
        } = self.weekend
        {
            if !(0.0..=1.0).contains(&probability) || !(0.0..=1.0).contains(&cap_multiplier) {
                return Err("weekend probability and cap_multiplier must be within [0, 1]".into());
            }
        }
        Ok(())
    }
}

/// One profile per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelProfiles {
    /// Email profile.
    pub email: ChannelProfile,
    /// SMS profile.
    pub sms: ChannelProfile,
    /// Voice profile.
    pub voice: ChannelProfile,
    /// Social messaging profile.
    pub social: ChannelProfile,
}

impl ChannelProfiles {
    /// Profile for a channel.
    #[must_use]
    pub const fn get(&self, channel: Channel) -> &ChannelProfile {
        match channel {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
            Channel::Voice => &self.voice,
            Channel::Social => &self.social,
        }
    }

    /// Validate every profile.
    pub fn validate(&self) -> Result<(), String> {
        for channel in Channel::ALL {
            self.get(channel)
                .validate()
                .map_err(|e| format!("channel `{channel}` invalid: {e}"))?;
        }
        Ok(())
    }
}

impl Default for ChannelProfiles {
    fn default() -> Self {
        let office = |start: (u32, u32), end: (u32, u32)| {
            let range = TimeRange::hm(start, end);
            BusinessHours {
                start: range.start,
                end: range.end,
                exclusion: None,
            }
        };
        Self {
            email: ChannelProfile {
                daily_cap: 50,
                weekly_cap: 250,
                business_hours: office((8, 0), (17, 0)),
                weekend: WeekendPolicy::Exclude,
                max_jitter_minutes: 20,
                hourly_ceiling: 12,
                retry: RetryPolicy {
                    failed: Some(RetryRule {
                        delay_minutes: 30,
                        max_attempts: 3,
                    }),
                    ..RetryPolicy::default()
                },
                max_message_length: 5000,
                supports_threading: true,
                requires_compliance_check: false,
            },
            sms: ChannelProfile {
                daily_cap: 100,
                weekly_cap: 500,
                business_hours: office((9, 0), (17, 0)),
                weekend: WeekendPolicy::Exclude,
                max_jitter_minutes: 10,
                hourly_ceiling: 30,
                retry: RetryPolicy {
                    failed: Some(RetryRule {
                        delay_minutes: 15,
                        max_attempts: 2,
                    }),
                    ..RetryPolicy::default()
                },
                max_message_length: 160,
                supports_threading: false,
                requires_compliance_check: true,
            },
            voice: ChannelProfile {
                daily_cap: 80,
                weekly_cap: 400,
                business_hours: BusinessHours {
                    exclusion: Some(TimeRange::hm((12, 0), (13, 0))),
                    ..office((9, 0), (17, 0))
                },
                weekend: WeekendPolicy::Exclude,
                max_jitter_minutes: 15,
                hourly_ceiling: 20,
                retry: RetryPolicy {
                    busy: Some(RetryRule {
                        delay_minutes: 30,
                        max_attempts: 2,
                    }),
                    no_answer: Some(2),
                    failed: Some(RetryRule {
                        delay_minutes: 15,
                        max_attempts: 2,
                    }),
                },
                max_message_length: 2000,
                supports_threading: false,
                requires_compliance_check: true,
            },
            social: ChannelProfile {
                daily_cap: 20,
                weekly_cap: 100,
                business_hours: office((9, 0), (18, 0)),
                weekend: WeekendPolicy::ReducedSaturday {
                    probability: 0.3,
                    cap_multiplier: 0.5,
                },
                max_jitter_minutes: 45,
                hourly_ceiling: 5,
                retry: RetryPolicy {
                    failed: Some(RetryRule {
                        delay_minutes: 60,
                        max_attempts: 2,
                    }),
                    ..RetryPolicy::default()
                },
                max_message_length: 300,
                supports_threading: true,
                requires_compliance_check: false,
            },
        }
    }
}
