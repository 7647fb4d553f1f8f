//! Lead scoring policy. Output tier gates channel eligibility only.

use serde::{Deserialize, Serialize};

/// Discrete score bucket, ordered from least to most promising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Below 20.
    Dead,
    /// 20 to 34.
    Cold,
    /// 35 to 59.
    Cool,
    /// 60 to 84.
    Warm,
    /// 85 and above.
    Hot,
}

impl Tier {
    /// Fixed cut points over a `[0, 100]` score.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            85..=u8::MAX => Self::Hot,
            60..=84 => Self::Warm,
            35..=59 => Self::Cool,
            20..=34 => Self::Cold,
            _ => Self::Dead,
        }
    }
}

/// Seniority of the contact, feeding the authority component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Seniority {
    /// C-suite or founder.
    CLevel,
    /// Vice president.
    Vp,
    /// Director.
    Director,
    /// Manager.
    Manager,
    /// Individual contributor.
    IndividualContributor,
    /// No title data.
    #[default]
    Unknown,
}

/// Inputs the scoring policy reads. Produced by the enrichment pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadAttributes {
    /// Email verified deliverable.
    pub email_verified: bool,
    /// A phone number is on file.
    pub has_phone: bool,
    /// A social profile is on file.
    pub has_social_profile: bool,
    /// Contact seniority.
    pub seniority: Seniority,
    /// Company headcount falls in the client's target band.
    pub headcount_in_target_band: bool,
    /// Company industry matches the client's ICP.
    pub industry_match: bool,
    /// Company raised funding recently.
    pub recent_funding: bool,
    /// Company is hiring for relevant roles.
    pub hiring_signal: bool,
    /// Address is on a free/generic mailbox provider.
    pub generic_email_domain: bool,
    /// Lead bounced or complained in a prior campaign.
    pub prior_negative_signal: bool,
    /// Opened or clicked recent messages.
    pub engaged: bool,
    /// Replied to a prior touch.
    pub replied: bool,
    /// Third-party buyer-intent signal present.
    pub buyer_intent: bool,
}

/// Score and tier produced by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    /// Total score in `[0, 100]`.
    pub score: u8,
    /// Tier for the score.
    pub tier: Tier,
}

/// Swappable, deterministic, side-effect-free scoring function.
pub trait ScoringPolicy: Send + Sync {
    /// Score a lead's attributes.
    fn score(&self, attributes: &LeadAttributes) -> ScoreCard;
}

/// Component maxima; they sum to 100.
const DATA_QUALITY_MAX: u32 = 25;
const AUTHORITY_MAX: u32 = 25;
const COMPANY_FIT_MAX: u32 = 25;
const TIMING_MAX: u32 = 15;
const RISK_MAX: u32 = 10;

/// Weighted five-component score with additive engagement and intent boosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScoringPolicy;

impl DefaultScoringPolicy {
    fn data_quality(a: &LeadAttributes) -> u32 {
        let mut points = 0;
        if a.email_verified {
            points += 10;
        }
        if a.has_phone {
            points += 8;
        }
        if a.has_social_profile {
            points += 7;
        }
        points.min(DATA_QUALITY_MAX)
    }

    fn authority(a: &LeadAttributes) -> u32 {
        let points: u32 = match a.seniority {
            Seniority::CLevel => 25,
            Seniority::Vp => 20,
            Seniority::Director => 15,
            Seniority::Manager => 10,
            Seniority::IndividualContributor => 5,
            Seniority::Unknown => 0,
        };
        points.min(AUTHORITY_MAX)
    }

    fn company_fit(a: &LeadAttributes) -> u32 {
        let mut points = 0;
        if a.headcount_in_target_band {
            points += 15;
        }
        if a.industry_match {
            points += 10;
        }
        points.min(COMPANY_FIT_MAX)
    }

    fn timing(a: &LeadAttributes) -> u32 {
        let mut points = 0;
        if a.recent_funding {
            points += 8;
        }
        if a.hiring_signal {
            points += 7;
        }
        points.min(TIMING_MAX)
    }

    fn risk(a: &LeadAttributes) -> u32 {
        let mut deductions = 0;
        if a.generic_email_domain {
            deductions += 5;
        }
        if a.prior_negative_signal {
            deductions += 10;
        }
        RISK_MAX.saturating_sub(deductions)
    }

    fn boosts(a: &LeadAttributes) -> u32 {
        let mut points = 0;
        if a.engaged {
            points += 5;
        }
        if a.replied {
            points += 10;
        }
        if a.buyer_intent {
            points += 10;
        }
        points
    }
}

impl ScoringPolicy for DefaultScoringPolicy {
    fn score(&self, attributes: &LeadAttributes) -> ScoreCard {
        let base = Self::data_quality(attributes)
            + Self::authority(attributes)
            + Self::company_fit(attributes)
            + Self::timing(attributes)
            + Self::risk(attributes);
        let total = (base + Self::boosts(attributes)).min(100);
        let score = u8::try_from(total).unwrap_or(100);
        ScoreCard {
            score,
            tier: Tier::from_score(score),
        }
    }
}
