//! Decode limits and parallelism controls
//!
//! Provides configurable limits for:
//! - Concurrent fan-out over mapping entries / sequence elements
//! - Nesting depth (also the guard against recursive aliases)

use std::env;

/// Limits applied by a [`Decoder`](crate::decode::Decoder)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindLimits {
    /// Decode container entries on the rayon pool
    pub parallel: bool,

    /// Minimum entry count before a container is fanned out
    pub parallel_threshold: usize,

    /// Maximum nesting depth of a single decode
    pub max_depth: usize,
}

impl Default for BindLimits {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_threshold: 8,
            max_depth: 256,
        }
    }
}

impl BindLimits {
    /// Limits suitable for testing (sequential, shallow)
    pub fn testing() -> Self {
        Self {
            parallel: false,
            parallel_threshold: usize::MAX,
            max_depth: 32,
        }
    }

    /// Fan out every container regardless of size
    pub fn always_parallel() -> Self {
        Self {
            parallel: true,
            parallel_threshold: 0,
            ..Self::default()
        }
    }

    /// Defaults overridden by `DOCBIND_PARALLEL`, `DOCBIND_PARALLEL_THRESHOLD`
    /// and `DOCBIND_MAX_DEPTH`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut limits = Self::default();
        if let Some(value) = lookup("DOCBIND_PARALLEL") {
            limits.parallel = !matches!(value.trim(), "0" | "false" | "off" | "no");
        }
        if let Some(value) = lookup("DOCBIND_PARALLEL_THRESHOLD").and_then(|v| v.trim().parse().ok()) {
            limits.parallel_threshold = value;
        }
        if let Some(value) = lookup("DOCBIND_MAX_DEPTH").and_then(|v| v.trim().parse().ok()) {
            limits.max_depth = value;
        }
        limits
    }

    /// Whether a container of `len` entries should be fanned out
    pub fn fan_out(&self, len: usize) -> bool {
        self.parallel && len > 1 && len >= self.parallel_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_limits() {
        let limits = BindLimits::default();
        assert!(limits.parallel);
        assert!(limits.fan_out(8));
        assert!(!limits.fan_out(7));
    }

    #[test]
    fn test_testing_limits_are_sequential() {
        assert!(!BindLimits::testing().fan_out(10_000));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DOCBIND_PARALLEL", "off"),
            ("DOCBIND_MAX_DEPTH", "12"),
            ("DOCBIND_PARALLEL_THRESHOLD", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let limits = BindLimits::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert!(!limits.parallel);
        assert_eq!(limits.max_depth, 12);
        assert_eq!(limits.parallel_threshold, 8);
    }

    #[test]
    fn test_single_entry_never_fans_out() {
        assert!(!BindLimits::always_parallel().fan_out(1));
    }
}
