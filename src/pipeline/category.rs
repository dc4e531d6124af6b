//! The closed category set and its fixed stage order.
//!
//! Stage order is a design decision, not an emergent property: an ambiguous
//! conversation (an Amazon order that is also technically a receipt) belongs
//! to whichever stage runs first. Reordering changes outcomes.

use serde::{Deserialize, Serialize};

/// One triage category. Every claimed conversation lands in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Child/family-specific: school, activities, permission slips.
    Family,
    /// Amazon orders, shipments, returns.
    Amazon,
    /// Generic purchase receipts from any merchant.
    Receipts,
    /// Brokerage/investment statements and confirmations.
    Investments,
    /// Crowdfunding campaign updates and pledges.
    Crowdfunding,
    /// Editorial newsletters and digests.
    Newsletters,
    /// Promotional/marketing mail.
    Marketing,
    /// Package-shipping updates from carriers and merchants.
    Shipping,
    /// Security alerts: new sign-ins, password changes.
    SecurityAlerts,
    /// One-time confirmation/verification codes.
    ConfirmationCodes,
    /// Appointment and event reminders.
    Reminders,
    /// Bank/card notifications: balances, payments, statements.
    FinancialNotices,
    /// Catch-all low-value automated notifications.
    Notifications,
}

impl Category {
    /// Fixed pipeline order. Earlier stages claim ambiguous conversations.
    pub const PRIORITY: [Category; 13] = [
        Category::Family,
        Category::Amazon,
        Category::Receipts,
        Category::Investments,
        Category::Crowdfunding,
        Category::Newsletters,
        Category::Marketing,
        Category::Shipping,
        Category::SecurityAlerts,
        Category::ConfirmationCodes,
        Category::Reminders,
        Category::FinancialNotices,
        Category::Notifications,
    ];

    /// Short label for logging and oracle prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Amazon => "amazon",
            Self::Receipts => "receipts",
            Self::Investments => "investments",
            Self::Crowdfunding => "crowdfunding",
            Self::Newsletters => "newsletters",
            Self::Marketing => "marketing",
            Self::Shipping => "shipping",
            Self::SecurityAlerts => "security_alerts",
            Self::ConfirmationCodes => "confirmation_codes",
            Self::Reminders => "reminders",
            Self::FinancialNotices => "financial_notices",
            Self::Notifications => "notifications",
        }
    }

    /// Parse an oracle-returned label. `None` for anything outside the
    /// closed set (including "skip").
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::PRIORITY.iter().copied().find(|c| c.label() == label)
    }

    /// One-line classification criterion, embedded in prompts.
    pub fn criterion(&self) -> &'static str {
        match self {
            Self::Family => {
                "about the user's children or family logistics: school, sports, \
                 activities, permission slips, pediatric appointments"
            }
            Self::Amazon => "from Amazon: orders, shipments, deliveries, returns, refunds",
            Self::Receipts => {
                "a purchase receipt or order confirmation from any merchant, \
                 with amounts paid"
            }
            Self::Investments => {
                "from a brokerage or investment service: statements, trade \
                 confirmations, dividend notices"
            }
            Self::Crowdfunding => {
                "a crowdfunding campaign update, pledge confirmation, or \
                 backer survey"
            }
            Self::Newsletters => "an editorial newsletter or periodic digest someone subscribed to",
            Self::Marketing => "promotional marketing: sales, coupons, product announcements",
            Self::Shipping => {
                "a package-shipping update from a carrier or merchant: shipped, \
                 out for delivery, delivered"
            }
            Self::SecurityAlerts => {
                "a security alert: new sign-in, password change, suspicious \
                 activity"
            }
            Self::ConfirmationCodes => "a one-time confirmation or verification code",
            Self::Reminders => "an appointment or event reminder",
            Self::FinancialNotices => {
                "a bank or card notification: balance, payment due, statement \
                 ready, transfer"
            }
            Self::Notifications => {
                "any other low-value automated notification not worth \
                 individual attention"
            }
        }
    }

    /// High-volume low-signal categories are summarized in one narrative
    /// sentence per category instead of per-item structured enrichment.
    pub fn summarized_in_aggregate(&self) -> bool {
        matches!(
            self,
            Self::Marketing
                | Self::Shipping
                | Self::SecurityAlerts
                | Self::ConfirmationCodes
                | Self::Reminders
                | Self::Notifications
        )
    }
}

/// Per-conversation oracle verdict: one category, or skip entirely.
///
/// `Skip` marks genuine personal correspondence; skipped conversations must
/// never appear in the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Category(Category),
    Skip,
}

impl Assignment {
    pub fn from_label(label: &str) -> Option<Self> {
        if label.trim().eq_ignore_ascii_case("skip") {
            return Some(Self::Skip);
        }
        Category::from_label(label).map(Self::Category)
    }
}
