//! Status enums persisted as TEXT columns.
//!
//! Conversions are explicit (`as_str` / `parse`) rather than derived so
//! the wire/database strings stay stable even if variants are renamed.

use serde::{Deserialize, Serialize};

/// Billing interval a server is charged on.
///
/// The Stripe recurrence for each cycle is a fixed mapping; an unknown
/// cycle name is a configuration error and must fail fast, never
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

/// Unit of a Stripe price recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceUnit {
    Month,
    Year,
}

impl BillingCycle {
    pub const ALL: [BillingCycle; 4] = [
        BillingCycle::Monthly,
        BillingCycle::Quarterly,
        BillingCycle::SemiAnnual,
        BillingCycle::Annual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::SemiAnnual => "semi_annual",
            BillingCycle::Annual => "annual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(BillingCycle::Monthly),
            "quarterly" => Some(BillingCycle::Quarterly),
            "semi_annual" => Some(BillingCycle::SemiAnnual),
            "annual" => Some(BillingCycle::Annual),
            _ => None,
        }
    }

    /// Fixed mapping to a Stripe price recurrence: (interval_count, unit).
    pub fn recurrence(&self) -> (u64, RecurrenceUnit) {
        match self {
            BillingCycle::Monthly => (1, RecurrenceUnit::Month),
            BillingCycle::Quarterly => (3, RecurrenceUnit::Month),
            BillingCycle::SemiAnnual => (6, RecurrenceUnit::Month),
            BillingCycle::Annual => (1, RecurrenceUnit::Year),
        }
    }

    /// Reverse of [`recurrence`](Self::recurrence), used when mapping a
    /// subscription item's price back to a local cycle.
    pub fn from_recurrence(interval_count: u64, unit: RecurrenceUnit) -> Option<Self> {
        match (interval_count, unit) {
            (1, RecurrenceUnit::Month) => Some(BillingCycle::Monthly),
            (3, RecurrenceUnit::Month) => Some(BillingCycle::Quarterly),
            (6, RecurrenceUnit::Month) => Some(BillingCycle::SemiAnnual),
            (1, RecurrenceUnit::Year) => Some(BillingCycle::Annual),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing-facing lifecycle state of a server, driven by subscription
/// webhooks. Orthogonal to [`ProvisionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Pending,
    Active,
    PastDue,
    Canceled,
    Suspended,
    Deleted,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Pending => "pending",
            ServerStatus::Active => "active",
            ServerStatus::PastDue => "past_due",
            ServerStatus::Canceled => "canceled",
            ServerStatus::Suspended => "suspended",
            ServerStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ServerStatus::Pending),
            "active" => Some(ServerStatus::Active),
            "past_due" => Some(ServerStatus::PastDue),
            "canceled" => Some(ServerStatus::Canceled),
            "suspended" => Some(ServerStatus::Suspended),
            "deleted" => Some(ServerStatus::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote-provisioning state of a server, driven by panel API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    Pending,
    Provisioning,
    Provisioned,
    Failed,
}

impl ProvisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStatus::Pending => "pending",
            ProvisionStatus::Provisioning => "provisioning",
            ProvisionStatus::Provisioned => "provisioned",
            ProvisionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProvisionStatus::Pending),
            "provisioning" => Some(ProvisionStatus::Provisioning),
            "provisioned" => Some(ProvisionStatus::Provisioned),
            "failed" => Some(ProvisionStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProvisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of background job queued for the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Provision,
    Suspend,
    Unsuspend,
    Delete,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Provision => "provision",
            JobKind::Suspend => "suspend",
            JobKind::Unsuspend => "unsuspend",
            JobKind::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provision" => Some(JobKind::Provision),
            "suspend" => Some(JobKind::Suspend),
            "unsuspend" => Some(JobKind::Unsuspend),
            "delete" => Some(JobKind::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn billing_cycle_round_trips_through_strings() {
        for cycle in BillingCycle::ALL {
            assert_eq!(BillingCycle::parse(cycle.as_str()), Some(cycle));
        }
        assert_eq!(BillingCycle::parse("weekly"), None);
    }

    #[test]
    fn recurrence_mapping_is_fixed() {
        assert_eq!(
            BillingCycle::Monthly.recurrence(),
            (1, RecurrenceUnit::Month)
        );
        assert_eq!(
            BillingCycle::Quarterly.recurrence(),
            (3, RecurrenceUnit::Month)
        );
        assert_eq!(
            BillingCycle::SemiAnnual.recurrence(),
            (6, RecurrenceUnit::Month)
        );
        assert_eq!(BillingCycle::Annual.recurrence(), (1, RecurrenceUnit::Year));
    }

    #[test]
    fn recurrence_mapping_inverts() {
        for cycle in BillingCycle::ALL {
            let (count, unit) = cycle.recurrence();
            assert_eq!(BillingCycle::from_recurrence(count, unit), Some(cycle));
        }
        assert_eq!(
            BillingCycle::from_recurrence(2, RecurrenceUnit::Month),
            None
        );
    }

    #[test]
    fn server_status_parses_known_values() {
        assert_eq!(ServerStatus::parse("past_due"), Some(ServerStatus::PastDue));
        assert_eq!(ServerStatus::parse("nope"), None);
    }
}
