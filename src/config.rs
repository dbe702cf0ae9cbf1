//! Configuration of scheduling sessions and of the lowering pass.

/// Schedule session configuration.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Check with the matcher that a rejected transformation left the
    /// snapshot untouched
    pub verify_rollback: bool,
    /// Re-run the parallelization check on every parallel loop after each
    /// commit and reject transformations that break one
    pub recheck_parallel: bool,
    /// Deepest loop level refined by the dependence analysis
    pub max_levels: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            verify_rollback: cfg!(debug_assertions),
            recheck_parallel: true,
            max_levels: 8,
        }
    }
}

impl ScheduleConfig {
    pub fn with_verify_rollback(mut self, enabled: bool) -> Self {
        self.verify_rollback = enabled;
        self
    }

    pub fn with_recheck_parallel(mut self, enabled: bool) -> Self {
        self.recheck_parallel = enabled;
        self
    }

    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    /// Fastest settings, for throughput measurements.
    pub fn unchecked() -> Self {
        Self {
            verify_rollback: false,
            recheck_parallel: false,
            ..Default::default()
        }
    }
}

/// Lowering pass configuration.
#[derive(Debug, Clone)]
pub struct LowerConfig {
    /// Expand every call before lowering
    pub inline: bool,
    /// Rewrite reductions under parallel loops into workspaces
    pub lower_reductions: bool,
    /// Run the simplifier at the end
    pub simplify: bool,
}

impl Default for LowerConfig {
    fn default() -> Self {
        Self { inline: true, lower_reductions: true, simplify: true }
    }
}

impl LowerConfig {
    pub fn with_inline(mut self, enabled: bool) -> Self {
        self.inline = enabled;
        self
    }

    pub fn with_lower_reductions(mut self, enabled: bool) -> Self {
        self.lower_reductions = enabled;
        self
    }

    pub fn with_simplify(mut self, enabled: bool) -> Self {
        self.simplify = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScheduleConfig::default();
        assert!(config.recheck_parallel);
        assert_eq!(config.max_levels, 8);
        assert!(!ScheduleConfig::unchecked().recheck_parallel);

        let lower = LowerConfig::default().with_simplify(false);
        assert!(lower.inline && lower.lower_reductions);
        assert!(!lower.simplify);
    }
}
