//! Settings and configuration. A typed, validated settings object passed
//! explicitly into the engine rather than read from a singleton, plus a
//! small preset tier bundling the fields that materially affect output.

use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Which checks run over the value-flow result. Both default on; a driver
/// narrows this when it only wants one family of diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledChecks {
    pub uninit: bool,
    pub null_deref: bool,
}

impl Default for EnabledChecks {
    fn default() -> Self {
        EnabledChecks {
            uninit: true,
            null_deref: true,
        }
    }
}

/// Minimum severity a diagnostic must carry to survive the sink's filter.
/// Ordered from least to most severe so a filter is a simple `>=`
/// comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Information,
    Style,
    Portability,
    Performance,
    Warning,
    Error,
}

/// A bundle of settings fields, matching the teacher crate's "preset then
/// field override" pattern scoped down to only the fields this crate has.
/// There is no YAML tier here: the library-document and CLI-flag layers
/// that would normally sit above it are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    /// Small widening bound and loop budget, shallow CTU depth: a fast,
    /// lower-recall pass suitable for a pre-commit hook.
    Fast,
    /// The documented defaults.
    Balanced,
    /// Wider bounds, deeper CTU recursion, inconclusive diagnostics on:
    /// a slow, higher-recall pass for CI or an on-demand deep scan.
    Thorough,
}

impl Preset {
    pub fn settings(self) -> Settings {
        match self {
            Preset::Fast => Settings {
                widening_bound: 4,
                loop_iteration_budget: 2,
                ctu_depth_bound: 1,
                inconclusive: false,
                ..Settings::balanced()
            },
            Preset::Balanced => Settings::balanced(),
            Preset::Thorough => Settings {
                widening_bound: 16,
                loop_iteration_budget: 8,
                ctu_depth_bound: 4,
                inconclusive: true,
                ..Settings::balanced()
            },
        }
    }
}

/// The fields that materially affect the engine's output. Constructed via
/// [`Preset::settings`] and then optionally overridden field-by-field, then
/// validated with [`Settings::validate`] before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub enabled_checks: EnabledChecks,
    pub inconclusive: bool,
    pub severity_filter: Severity,
    pub widening_bound: u32,
    pub loop_iteration_budget: u32,
    pub ctu_depth_bound: u32,
    /// Cooperative cancellation flag. Not serialized: it is runtime-only
    /// coordination state, not a setting a CTU-summary round-trip needs to
    /// preserve.
    #[serde(skip, default = "default_terminate_flag")]
    pub terminate: Arc<AtomicBool>,
}

fn default_terminate_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

impl Settings {
    fn balanced() -> Self {
        Settings {
            enabled_checks: EnabledChecks::default(),
            inconclusive: false,
            severity_filter: Severity::Style,
            widening_bound: 8,
            loop_iteration_budget: 4,
            ctu_depth_bound: 2,
            terminate: default_terminate_flag(),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.widening_bound < 1 {
            return Err(ConfigError::WideningBoundTooSmall(self.widening_bound));
        }
        if self.loop_iteration_budget < 1 {
            return Err(ConfigError::LoopBudgetTooSmall(self.loop_iteration_budget));
        }
        if self.ctu_depth_bound < 1 {
            return Err(ConfigError::CtuDepthTooSmall(self.ctu_depth_bound));
        }
        Ok(())
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminate.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Preset::Balanced.settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_matches_documented_defaults() {
        let s = Settings::default();
        assert_eq!(s.widening_bound, 8);
        assert_eq!(s.loop_iteration_budget, 4);
        assert_eq!(s.ctu_depth_bound, 2);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn fast_preset_narrows_bounds() {
        let s = Preset::Fast.settings();
        assert!(s.widening_bound < Settings::default().widening_bound);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn zero_widening_bound_fails_validation() {
        let mut s = Settings::default();
        s.widening_bound = 0;
        assert_eq!(s.validate(), Err(ConfigError::WideningBoundTooSmall(0)));
    }

    #[test]
    fn terminate_flag_starts_clear() {
        let s = Settings::default();
        assert!(!s.is_terminated());
        s.terminate.store(true, std::sync::atomic::Ordering::Relaxed);
        assert!(s.is_terminated());
    }
}
