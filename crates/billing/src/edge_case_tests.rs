// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Billing
//!
//! Boundary conditions across:
//! - Billing cycles and recurrence mapping
//! - Checkout metadata round-trips
//! - Catalog sync reporting
//! - Job retry budgets and backoff

#[cfg(test)]
mod billing_cycle_tests {
    use pixelhost_shared::{BillingCycle, RecurrenceUnit};

    // =========================================================================
    // Every cycle round-trips through its string form
    // =========================================================================
    #[test]
    fn test_cycle_string_round_trip() {
        for cycle in BillingCycle::ALL {
            assert_eq!(BillingCycle::parse(cycle.as_str()), Some(cycle));
        }
    }

    // =========================================================================
    // Recurrence mapping is a bijection over the supported cycles
    // =========================================================================
    #[test]
    fn test_recurrence_round_trip() {
        for cycle in BillingCycle::ALL {
            let (count, unit) = cycle.recurrence();
            assert_eq!(
                BillingCycle::from_recurrence(count, unit),
                Some(cycle),
                "cycle {} did not survive recurrence round-trip",
                cycle
            );
        }
    }

    // =========================================================================
    // Recurrences Stripe can send that we never create map to nothing
    // =========================================================================
    #[test]
    fn test_foreign_recurrences_rejected() {
        assert_eq!(BillingCycle::from_recurrence(2, RecurrenceUnit::Month), None);
        assert_eq!(BillingCycle::from_recurrence(12, RecurrenceUnit::Month), None);
        assert_eq!(BillingCycle::from_recurrence(2, RecurrenceUnit::Year), None);
        assert_eq!(BillingCycle::from_recurrence(0, RecurrenceUnit::Month), None);
    }

    // =========================================================================
    // Annual is expressed as 1 year, not 12 months
    // =========================================================================
    #[test]
    fn test_annual_uses_year_unit() {
        assert_eq!(BillingCycle::Annual.recurrence(), (1, RecurrenceUnit::Year));
    }

    #[test]
    fn test_unknown_cycle_string_rejected() {
        assert_eq!(BillingCycle::parse("weekly"), None);
        assert_eq!(BillingCycle::parse("MONTHLY"), None);
        assert_eq!(BillingCycle::parse(""), None);
    }
}

#[cfg(test)]
mod metadata_tests {
    use crate::checkout::{
        META_BILLING_CYCLE, META_GAME, META_PLAN, META_REGION, META_SERVER_NAME, META_USER_ID,
        META_VARIANT,
    };
    use crate::lifecycle::ServerMetadata;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn metadata_for(user_id: Uuid) -> HashMap<String, String> {
        HashMap::from([
            (META_USER_ID.to_string(), user_id.to_string()),
            (META_PLAN.to_string(), "boost".to_string()),
            (META_GAME.to_string(), "valheim".to_string()),
            (META_VARIANT.to_string(), "vanilla".to_string()),
            (META_REGION.to_string(), "us-east".to_string()),
            (META_SERVER_NAME.to_string(), "viking camp".to_string()),
            (META_BILLING_CYCLE.to_string(), "quarterly".to_string()),
        ])
    }

    // =========================================================================
    // What checkout writes, the webhook side reads back intact
    // =========================================================================
    #[test]
    fn test_metadata_round_trip() {
        let user_id = Uuid::new_v4();
        let meta = ServerMetadata::from_map(&metadata_for(user_id))
            .unwrap()
            .unwrap();
        assert_eq!(meta.user_id, user_id);
        assert_eq!(meta.plan, "boost");
        assert_eq!(meta.game, "valheim");
        assert_eq!(meta.region, "us-east");
        assert_eq!(meta.server_name, "viking camp");
        assert_eq!(meta.billing_cycle.as_str(), "quarterly");
    }

    // =========================================================================
    // Events from unrelated Stripe products must be acknowledged, not
    // treated as errors
    // =========================================================================
    #[test]
    fn test_unrelated_metadata_yields_none() {
        let map = HashMap::from([("promo".to_string(), "summer".to_string())]);
        assert!(ServerMetadata::from_map(&map).unwrap().is_none());
        assert!(ServerMetadata::from_map(&HashMap::new()).unwrap().is_none());
    }

    // =========================================================================
    // A map that claims to be ours but is incomplete is a hard error
    // =========================================================================
    #[test]
    fn test_partial_metadata_is_error() {
        for missing in [
            META_PLAN,
            META_GAME,
            META_VARIANT,
            META_REGION,
            META_SERVER_NAME,
            META_BILLING_CYCLE,
        ] {
            let mut map = metadata_for(Uuid::new_v4());
            map.remove(missing);
            assert!(
                ServerMetadata::from_map(&map).is_err(),
                "missing '{}' should be an error",
                missing
            );
        }
    }

    #[test]
    fn test_garbage_user_id_is_error() {
        let mut map = metadata_for(Uuid::new_v4());
        map.insert(META_USER_ID.to_string(), "not-a-uuid".to_string());
        assert!(ServerMetadata::from_map(&map).is_err());
    }
}

#[cfg(test)]
mod catalog_report_tests {
    use crate::catalog::SyncReport;

    // =========================================================================
    // Drift detection keys off mutating counters only; `unchanged`
    // alone means the catalog is converged
    // =========================================================================
    #[test]
    fn test_unchanged_only_is_in_sync() {
        let report = SyncReport {
            unchanged: 12,
            ..SyncReport::default()
        };
        assert!(report.in_sync());
    }

    #[test]
    fn test_any_mutation_is_drift() {
        let created = SyncReport {
            products_created: 1,
            ..SyncReport::default()
        };
        assert!(!created.in_sync());

        let retired = SyncReport {
            prices_deactivated: 1,
            prices_created: 1,
            ..SyncReport::default()
        };
        assert!(!retired.in_sync());
    }
}

#[cfg(test)]
mod job_retry_tests {
    use crate::jobs::{backoff_minutes, ProvisionJob, DEFAULT_MAX_ATTEMPTS};
    use pixelhost_shared::JobKind;
    use uuid::Uuid;

    fn job_with_attempts(attempts: i32) -> ProvisionJob {
        ProvisionJob {
            id: Uuid::new_v4(),
            server_id: Uuid::new_v4(),
            kind: JobKind::Provision,
            attempts,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    // =========================================================================
    // A full failure sequence: attempts 1 and 2 requeue, attempt 3 is
    // terminal
    // =========================================================================
    #[test]
    fn test_retry_budget_exhaustion_sequence() {
        assert!(!job_with_attempts(1).is_final_attempt());
        assert!(!job_with_attempts(2).is_final_attempt());
        assert!(job_with_attempts(3).is_final_attempt());
        // Attempts beyond the budget (recovered rows) stay terminal.
        assert!(job_with_attempts(4).is_final_attempt());
    }

    // =========================================================================
    // Backoff is monotone and capped
    // =========================================================================
    #[test]
    fn test_backoff_monotone_and_capped() {
        let delays: Vec<i64> = (1..=5).map(backoff_minutes).collect();
        assert_eq!(delays, vec![1, 5, 25, 25, 25]);
        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }
}
