//! Channels and the resource types that carry them.

use serde::{Deserialize, Serialize};

/// Communication channel for a touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Email sent from a warmed sending domain.
    Email,
    /// Text message from a phone number.
    Sms,
    /// Outbound call from a phone number.
    Voice,
    /// Social-network messaging through an automation seat.
    Social,
}

impl Channel {
    /// Every channel, in a stable order.
    pub const ALL: [Self; 4] = [Self::Email, Self::Sms, Self::Voice, Self::Social];

    /// Resource type able to carry this channel.
    #[must_use]
    pub const fn resource_type(self) -> ResourceType {
        match self {
            Self::Email => ResourceType::Domain,
            Self::Sms | Self::Voice => ResourceType::PhoneNumber,
            Self::Social => ResourceType::Seat,
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Voice => "voice",
            Self::Social => "social",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of finite shared sending asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Sending domain.
    Domain,
    /// Phone number.
    PhoneNumber,
    /// Social-network automation seat bound to one connected account.
    Seat,
}

impl ResourceType {
    /// Channels this resource type can carry.
    #[must_use]
    pub fn channels(self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| c.resource_type() == self)
            .collect()
    }
}
