//! Alarm registry: the active alarm set, at most one entry per code.

use tracing::debug;
use trainer_core::{Alarm, Severity};

/// Active alarms in insertion order.
#[derive(Clone, Debug, Default)]
pub struct AlarmRegistry {
    active: Vec<Alarm>,
}

impl AlarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise an alarm unless one with the same code is already active.
    ///
    /// A repeat raise never changes the active entry, even with a different
    /// severity. Returns whether an alarm was added.
    pub fn raise(&mut self, code: &str, text: &str, severity: Severity) -> bool {
        if self.is_active(code) {
            return false;
        }
        debug!(code, %severity, "alarm raised");
        self.active.push(Alarm::new(code, text, severity));
        true
    }

    pub fn raise_alarm(&mut self, alarm: &Alarm) -> bool {
        self.raise(&alarm.code, &alarm.text, alarm.severity)
    }

    /// Remove the alarm with this code. Returns whether one was removed.
    pub fn clear(&mut self, code: &str) -> bool {
        let before = self.active.len();
        self.active.retain(|a| a.code != code);
        let removed = self.active.len() != before;
        if removed {
            debug!(code, "alarm cleared");
        }
        removed
    }

    pub fn clear_all(&mut self) {
        self.active.clear();
    }

    pub fn list(&self) -> &[Alarm] {
        &self.active
    }

    pub fn get(&self, code: &str) -> Option<&Alarm> {
        self.active.iter().find(|a| a.code == code)
    }

    pub fn is_active(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
