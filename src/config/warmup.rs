//! Warmup ramps: stepwise daily caps by days since activation.

use serde::{Deserialize, Serialize};

use crate::core::channel::ResourceType;

/// One step of a ramp: from `from_day` onward the cap is `daily_cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampStep {
    /// First day (since activation) the step applies.
    pub from_day: u32,
    /// Daily cap while the step applies.
    pub daily_cap: u32,
}

/// Monotonic non-decreasing step function of days since activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupRamp {
    /// Steps ordered by `from_day`; the first starts at day 0.
    pub steps: Vec<RampStep>,
}

impl WarmupRamp {
    /// Build a ramp from `(from_day, daily_cap)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: &[(u32, u32)]) -> Self {
        Self {
            steps: pairs
                .iter()
                .map(|&(from_day, daily_cap)| RampStep {
                    from_day,
                    daily_cap,
                })
                .collect(),
        }
    }

    /// Cap for a resource `days` days after activation.
    #[must_use]
    pub fn cap_for_day(&self, days: u32) -> u32 {
        self.steps
            .iter()
            .take_while(|step| step.from_day <= days)
            .last()
            .map_or(0, |step| step.daily_cap)
    }

    /// Day of the final step; warmup completes once this is exceeded.
    #[must_use]
    pub fn final_step_day(&self) -> u32 {
        self.steps.last().map_or(0, |step| step.from_day)
    }

    /// Validate ordering and monotonicity.
    pub fn validate(&self) -> Result<(), String> {
        let first = self.steps.first().ok_or("ramp must have at least one step")?;
        if first.from_day != 0 {
            return Err("first ramp step must start at day 0".into());
        }
        for pair in self.steps.windows(2) {
            if pair[1].from_day <= pair[0].from_day {
                return Err("ramp steps must have strictly increasing from_day".into());
            }
            if pair[1].daily_cap < pair[0].daily_cap {
                return Err("ramp caps must be non-decreasing".into());
            }
        }
        Ok(())
    }
}

/// One ramp per resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupRamps {
    /// Sending domains.
    pub domain: WarmupRamp,
    /// Phone numbers.
    pub phone_number: WarmupRamp,
    /// Social seats.
    pub seat: WarmupRamp,
}

impl WarmupRamps {
    /// Ramp for a resource type.
    #[must_use]
    pub const fn get(&self, resource_type: ResourceType) -> &WarmupRamp {
        match resource_type {
            ResourceType::Domain => &self.domain,
            ResourceType::PhoneNumber => &self.phone_number,
            ResourceType::Seat => &self.seat,
        }
    }

    /// Validate every ramp.
    pub fn validate(&self) -> Result<(), String> {
        for (name, ramp) in [
            ("domain", &self.domain),
            ("phone_number", &self.phone_number),
            ("seat", &self.seat),
        ] {
            ramp.validate()
                .map_err(|e| format!("warmup `{name}` invalid: {e}"))?;
        }
        Ok(())
    }
}

impl Default for WarmupRamps {
    fn default() -> Self {
        Self {
            domain: WarmupRamp::from_pairs(&[(0, 10), (3, 20), (7, 30), (14, 40), (21, 50)]),
            phone_number: WarmupRamp::from_pairs(&[(0, 25), (7, 50), (14, 100)]),
            seat: WarmupRamp::from_pairs(&[(0, 5), (7, 10), (14, 15), (21, 20)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_non_decreasing_over_days() {
        let ramps = WarmupRamps::default();
        for ramp in [&ramps.domain, &ramps.phone_number, &ramps.seat] {
            let mut prev = 0;
            for day in 0..60 {
                let cap = ramp.cap_for_day(day);
                assert!(cap >= prev, "cap dropped at day {day}");
                prev = cap;
            }
        }
    }

    #[test]
    fn test_ramp_steps() {
        let ramp = WarmupRamps::default().domain;
        assert_eq!(ramp.cap_for_day(0), 10);
        assert_eq!(ramp.cap_for_day(2), 10);
        assert_eq!(ramp.cap_for_day(3), 20);
        assert_eq!(ramp.cap_for_day(20), 40);
        assert_eq!(ramp.cap_for_day(400), 50);
        assert_eq!(ramp.final_step_day(), 21);
    }

    #[test]
    fn test_decreasing_ramp_rejected() {
        let ramp = WarmupRamp::from_pairs(&[(0, 20), (5, 10)]);
        assert!(ramp.validate().is_err());
        let late_start = WarmupRamp::from_pairs(&[(1, 20)]);
        assert!(late_start.validate().is_err());
    }
}
