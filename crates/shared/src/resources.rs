//! Static plan-to-resources table.
//!
//! Immutable configuration loaded into the binary at compile time and
//! consumed read-only when building a panel `create server` payload.
//! Changing an allocation means shipping a new build, never mutating
//! state at runtime.

/// Resource allocation for a plan tier, in the panel's native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanResources {
    pub plan_key: &'static str,
    /// RAM in MiB.
    pub memory_mb: u32,
    /// Disk in MiB.
    pub disk_mb: u32,
    /// CPU as a percentage where 100 = one full core.
    pub cpu_percent: u32,
    /// Swap in MiB.
    pub swap_mb: u32,
    /// Block IO weight (10-1000).
    pub io_weight: u32,
    pub backups: u32,
    pub databases: u32,
    pub allocations: u32,
}

const PLAN_RESOURCES: &[PlanResources] = &[
    PlanResources {
        plan_key: "core",
        memory_mb: 4096,
        disk_mb: 20480,
        cpu_percent: 200,
        swap_mb: 0,
        io_weight: 500,
        backups: 2,
        databases: 1,
        allocations: 1,
    },
    PlanResources {
        plan_key: "boost",
        memory_mb: 8192,
        disk_mb: 51200,
        cpu_percent: 400,
        swap_mb: 0,
        io_weight: 500,
        backups: 5,
        databases: 2,
        allocations: 2,
    },
    PlanResources {
        plan_key: "ultra",
        memory_mb: 16384,
        disk_mb: 102400,
        cpu_percent: 800,
        swap_mb: 0,
        io_weight: 500,
        backups: 10,
        databases: 4,
        allocations: 3,
    },
];

/// Look up the resource allocation for a plan tier.
///
/// Returns `None` for unknown keys; callers treat that as a
/// configuration error, not a user error.
pub fn plan_resources(plan_key: &str) -> Option<&'static PlanResources> {
    PLAN_RESOURCES.iter().find(|p| p.plan_key == plan_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_plans_resolve() {
        for key in ["core", "boost", "ultra"] {
            let res = plan_resources(key);
            assert!(res.is_some(), "plan {} should have resources", key);
        }
    }

    #[test]
    fn unknown_plan_is_none() {
        assert!(plan_resources("mega").is_none());
    }

    #[test]
    fn allocations_grow_with_tier() {
        let core = plan_resources("core").map(|p| p.memory_mb);
        let ultra = plan_resources("ultra").map(|p| p.memory_mb);
        assert!(core < ultra);
    }
}
