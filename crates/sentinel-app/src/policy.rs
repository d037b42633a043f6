//! Violation thresholds and counter mapping.
//!
//! Tab-switch, phone and server-reported warnings either keep independent
//! counters ([`CounterMode::PerCategory`]) or all feed the shared warning
//! count ([`CounterMode::Shared`]). Each counter terminates the session once
//! it reaches its limit.

use sentinel_core::{TerminationCause, ViolationCategory, ViolationEvent, ViolationSource};
use serde::{Deserialize, Serialize};

/// How dialog-worthy warnings are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterMode {
    /// Each counter key has its own count and limit.
    #[default]
    PerCategory,
    /// Every key reads the shared warning count.
    Shared,
}

/// Counter a dialog-worthy violation is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKey {
    /// Local tab switches.
    TabSwitch,
    /// Companion-device feed warnings.
    Phone,
    /// Server-flagged verdicts and progress warnings.
    Server,
}

impl CounterKey {
    /// Picks the counter for an event.
    pub fn for_event(event: &ViolationEvent) -> Self {
        match (event.category, event.source) {
            (ViolationCategory::TabSwitch, ViolationSource::Local) => Self::TabSwitch,
            (ViolationCategory::PhoneViolation, ViolationSource::PhoneFeed) => Self::Phone,
            _ => Self::Server,
        }
    }

    /// Cause recorded when this counter reaches its limit.
    pub fn limit_cause(self) -> TerminationCause {
        match self {
            Self::TabSwitch => TerminationCause::TabSwitchLimit,
            Self::Phone | Self::Server => TerminationCause::WarningLimit,
        }
    }
}

/// Threshold policy, loadable from JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationPolicy {
    /// Counter mode.
    pub counter_mode: CounterMode,
    /// Tab switches that terminate the session.
    pub tab_switch_limit: u32,
    /// Phone feed count that triggers the confirmation dialog.
    pub phone_limit: u32,
    /// Server warning count that terminates the session.
    pub server_warning_limit: u32,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        Self {
            counter_mode: CounterMode::PerCategory,
            tab_switch_limit: 3,
            phone_limit: 3,
            server_warning_limit: 3,
        }
    }
}

impl ViolationPolicy {
    /// Limit for one counter key.
    pub fn limit_for(&self, key: CounterKey) -> u32 {
        match key {
            CounterKey::TabSwitch => self.tab_switch_limit,
            CounterKey::Phone => self.phone_limit,
            CounterKey::Server => self.server_warning_limit,
        }
    }

    /// Returns the name of the first zero limit, if any.
    pub fn zero_limit(&self) -> Option<&'static str> {
        if self.tab_switch_limit == 0 {
            Some("tab_switch_limit")
        } else if self.phone_limit == 0 {
            Some("phone_limit")
        } else if self.server_warning_limit == 0 {
            Some("server_warning_limit")
        } else {
            None
        }
    }
}

/// Per-key counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounters {
    /// Counted tab switches.
    pub tab_switch: u32,
    /// Counted phone warnings.
    pub phone: u32,
    /// Counted server warnings.
    pub server: u32,
}

impl CategoryCounters {
    /// Current value for one key.
    pub fn get(&self, key: CounterKey) -> u32 {
        match key {
            CounterKey::TabSwitch => self.tab_switch,
            CounterKey::Phone => self.phone,
            CounterKey::Server => self.server,
        }
    }

    /// Raises one key to at least `value`.
    pub fn adopt(&mut self, key: CounterKey, value: u32) {
        let slot = self.slot(key);
        *slot = (*slot).max(value);
    }

    fn slot(&mut self, key: CounterKey) -> &mut u32 {
        match key {
            CounterKey::TabSwitch => &mut self.tab_switch,
            CounterKey::Phone => &mut self.phone,
            CounterKey::Server => &mut self.server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_policy_json_keeps_defaults() {
        let policy: ViolationPolicy =
            serde_json::from_str(r#"{"counter_mode":"shared","tab_switch_limit":5}"#)
                .expect("policy should parse");
        assert_eq!(policy.counter_mode, CounterMode::Shared);
        assert_eq!(policy.tab_switch_limit, 5);
        assert_eq!(policy.phone_limit, 3);
    }

    #[test]
    fn server_flagged_tab_switch_counts_as_server_warning() {
        let local = ViolationEvent::new(ViolationCategory::TabSwitch, "x", 1, ViolationSource::Local);
        let flagged = ViolationEvent::new(
            ViolationCategory::TabSwitch,
            "x",
            1,
            ViolationSource::SubmissionVerdict,
        )
        .server_flagged();
        assert_eq!(CounterKey::for_event(&local), CounterKey::TabSwitch);
        assert_eq!(CounterKey::for_event(&flagged), CounterKey::Server);
    }

    #[test]
    fn adopt_never_lowers_a_counter() {
        let mut counters = CategoryCounters::default();
        counters.adopt(CounterKey::Server, 2);
        counters.adopt(CounterKey::Server, 1);
        assert_eq!(counters.get(CounterKey::Server), 2);
    }
}
