use serde::{Deserialize, Serialize};
use std::fmt;

use super::subscription::TERMINAL_STEP;

/// Notification templates sent by the dunning engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    FriendlyReminder,
    UrgentReminder,
    FeatureLossCountdown,
    AccessRestricted,
    LastChance,
    ForcedDowngrade,
    DeletionWarning,
    DataDeleted,
    PaymentRecovered,
}

impl NotificationTemplate {
    /// Template sent when `step` executes. `None` for steps outside 1..=8.
    pub fn for_step(step: u8) -> Option<Self> {
        match step {
            1 => Some(Self::FriendlyReminder),
            2 => Some(Self::UrgentReminder),
            3 => Some(Self::FeatureLossCountdown),
            4 => Some(Self::AccessRestricted),
            5 => Some(Self::LastChance),
            6 => Some(Self::ForcedDowngrade),
            7 => Some(Self::DeletionWarning),
            TERMINAL_STEP => Some(Self::DataDeleted),
            _ => None,
        }
    }

    /// Stable template key handed to the notifier
    pub fn key(&self) -> &'static str {
        match self {
            Self::FriendlyReminder => "dunning_step_1",
            Self::UrgentReminder => "dunning_step_2",
            Self::FeatureLossCountdown => "dunning_step_3",
            Self::AccessRestricted => "dunning_step_4",
            Self::LastChance => "dunning_step_5",
            Self::ForcedDowngrade => "dunning_step_6",
            Self::DeletionWarning => "dunning_step_7",
            Self::DataDeleted => "dunning_step_8",
            Self::PaymentRecovered => "dunning_recovered",
        }
    }

    /// Email subject line
    pub fn subject(&self) -> &'static str {
        match self {
            Self::FriendlyReminder => "We couldn't process your payment",
            Self::UrgentReminder => "Action needed: your payment is still outstanding",
            Self::FeatureLossCountdown => "Your premium features are at risk",
            Self::AccessRestricted => "Your vault access has been restricted",
            Self::LastChance => "Last chance to keep your plan",
            Self::ForcedDowngrade => "Your account has been moved to the free plan",
            Self::DeletionWarning => "Some of your documents will be deleted",
            Self::DataDeleted => "Documents removed from your vault",
            Self::PaymentRecovered => "Payment received, thank you",
        }
    }
}

impl fmt::Display for NotificationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
