//! # Repair State Machine
//!
//! ```text
//! Pending ──► In Progress ──► Completed ──► Delivered
//!    │   ╲          │      ╱       │
//!    │    ╲─────────┼─────╱ skips  │
//!    ▼              ▼              ▼
//!  Cancelled ◄──────┴──────────────┘
//! ```
//!
//! - Forward moves may skip states (Pending → Completed).
//! - Backward moves are rejected.
//! - Delivered and Cancelled are terminal.

use crate::error::{CoreError, CoreResult};
use crate::types::RepairStatus;

/// Side effects the engine must run for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionEffects {
    /// Hand the phone back to the shop.
    pub release_phone: bool,
    /// Send the "ready for pickup" SMS.
    pub notify_completed: bool,
    /// Transition is a cancellation (parts may be restored).
    pub cancelled: bool,
}

impl RepairStatus {
    /// No further transitions once delivered or cancelled.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, RepairStatus::Delivered | RepairStatus::Cancelled)
    }

    /// Work still outstanding (used by the due-date scan).
    pub const fn is_open(&self) -> bool {
        matches!(self, RepairStatus::Pending | RepairStatus::InProgress)
    }

    /// True if `self → to` is a legal move.
    pub fn can_transition_to(&self, to: RepairStatus) -> bool {
        if self.is_terminal() || *self == to {
            return false;
        }
        to == RepairStatus::Cancelled || to > *self
    }
}

/// Validates `from → to` and reports the side effects to apply.
///
/// ## Example
/// ```rust
/// use swapsync_core::repair::plan_transition;
/// use swapsync_core::types::RepairStatus;
///
/// let fx = plan_transition("RPR-0001", RepairStatus::Pending, RepairStatus::Completed).unwrap();
/// assert!(fx.notify_completed && fx.release_phone);
/// ```
pub fn plan_transition(
    repair: &str,
    from: RepairStatus,
    to: RepairStatus,
) -> CoreResult<TransitionEffects> {
    if !from.can_transition_to(to) {
        return Err(CoreError::InvalidRepairTransition {
            repair: repair.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let effects = match to {
        RepairStatus::Completed => TransitionEffects {
            release_phone: true,
            notify_completed: true,
            cancelled: false,
        },
        // Skipping straight to Delivered still counts as completion.
        RepairStatus::Delivered => TransitionEffects {
            release_phone: from < RepairStatus::Completed,
            notify_completed: from < RepairStatus::Completed,
            cancelled: false,
        },
        RepairStatus::Cancelled => TransitionEffects {
            release_phone: true,
            notify_completed: false,
            cancelled: true,
        },
        RepairStatus::Pending | RepairStatus::InProgress => TransitionEffects::default(),
    };
    Ok(effects)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use RepairStatus::*;

    #[test]
    fn test_forward_moves() {
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Delivered));
        assert!(Completed.can_transition_to(Delivered));
    }

    #[test]
    fn test_backward_and_terminal_rejected() {
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_cancel_from_any_open_state() {
        for from in [Pending, InProgress, Completed] {
            let fx = plan_transition("RPR-0001", from, Cancelled).unwrap();
            assert!(fx.cancelled);
            assert!(!fx.notify_completed);
        }
    }

    #[test]
    fn test_delivered_after_completed_does_not_renotify() {
        let fx = plan_transition("RPR-0001", Completed, Delivered).unwrap();
        assert!(!fx.notify_completed);
        let fx = plan_transition("RPR-0001", InProgress, Delivered).unwrap();
        assert!(fx.notify_completed);
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = plan_transition("RPR-0009", Delivered, Cancelled).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("RPR-0009"));
    }
}
