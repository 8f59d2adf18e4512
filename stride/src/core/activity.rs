//! Activity status tags reported by devices and the triggers they produce.

use crate::core::types::{ModelTier, Trigger};

/// Activity classes a device reports (`"Run"`, `"Walk"`, `"None"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Run,
    Walk,
    Idle,
}

impl Activity {
    /// Map a raw status tag. Unknown tags count as idle.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            t if t.eq_ignore_ascii_case("run") => Activity::Run,
            t if t.eq_ignore_ascii_case("walk") => Activity::Walk,
            _ => Activity::Idle,
        }
    }

    /// Fixed intensity-to-tier table.
    pub fn tier(self) -> ModelTier {
        match self {
            Activity::Run => ModelTier::High,
            Activity::Walk => ModelTier::Mid,
            Activity::Idle => ModelTier::Low,
        }
    }

    pub fn is_active(self) -> bool {
        self == Activity::Run
    }
}

/// Edge between the previous and current activity of one device.
pub fn detect_trigger(was_active: bool, is_active: bool) -> Trigger {
    match (was_active, is_active) {
        (false, true) => Trigger::Start,
        (true, false) => Trigger::Stop,
        _ => Trigger::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_map_to_tiers() {
        assert_eq!(Activity::from_tag("Run").tier(), ModelTier::High);
        assert_eq!(Activity::from_tag("Walk").tier(), ModelTier::Mid);
        assert_eq!(Activity::from_tag("None").tier(), ModelTier::Low);
        assert_eq!(Activity::from_tag("sprint").tier(), ModelTier::Low);
    }

    #[test]
    fn only_running_is_active() {
        assert!(Activity::Run.is_active());
        assert!(!Activity::Walk.is_active());
        assert!(!Activity::Idle.is_active());
    }

    #[test]
    fn triggers_fire_on_edges_only() {
        assert_eq!(detect_trigger(false, true), Trigger::Start);
        assert_eq!(detect_trigger(true, false), Trigger::Stop);
        assert_eq!(detect_trigger(true, true), Trigger::None);
        assert_eq!(detect_trigger(false, false), Trigger::None);
    }
}
