//! Pure streak transitions.
//!
//! Every transition validates its precondition against the current state
//! and mutates the streak in place; persistence happens in the service.
//!
//! ```text
//! active ──day missed──▶ at_risk ──still missed──▶ payment_window ──deadline──▶ terminated
//!   │  ▲                    │                          │
//!   │  └──────recover───────┴──────────recover─────────┘
//!   └──both check in on day 15──▶ completed
//! ```

use crate::error::EngineError;
use crate::storage::{Streak, StreakState};

/// Length of a streak in days.
pub const STREAK_LENGTH: i64 = 15;

/// A transition whose precondition does not hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} a streak that is {state:?}")]
    InvalidState {
        action: &'static str,
        state: StreakState,
    },

    #[error("recovery deadline passed at {deadline}")]
    DeadlineExceeded { deadline: i64 },
}

impl From<TransitionError> for EngineError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::InvalidState { .. } => Self::InvalidState(e.to_string()),
            TransitionError::DeadlineExceeded { .. } => Self::DeadlineExceeded(e.to_string()),
        }
    }
}

type Transition = Result<(), TransitionError>;

fn require(streak: &Streak, action: &'static str, allowed: bool) -> Transition {
    if allowed {
        Ok(())
    } else {
        Err(TransitionError::InvalidState {
            action,
            state: streak.state,
        })
    }
}

impl Streak {
    /// Both participants checked in for the current day.
    pub fn advance(&mut self, now: i64) -> Transition {
        require(self, "advance", self.state.accepts_check_in())?;

        if self.current_day + 1 > STREAK_LENGTH {
            self.current_day = STREAK_LENGTH;
            self.state = StreakState::Completed;
            self.completed_at = Some(now);
        } else {
            self.current_day += 1;
            self.state = StreakState::Active;
            self.day_started_at = now;
        }
        self.breaker_user_id = None;
        self.recovery_deadline_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// The current day ended without both check-ins.
    pub fn mark_at_risk(&mut self, now: i64) -> Transition {
        require(self, "mark at risk", self.state == StreakState::Active)?;

        self.state = StreakState::AtRisk;
        self.updated_at = now;
        Ok(())
    }

    /// The miss persisted; the streak can now only be saved before `deadline`.
    pub fn open_payment_window(&mut self, breaker_user_id: &str, deadline: i64, now: i64) -> Transition {
        require(self, "open the payment window for", self.state == StreakState::AtRisk)?;

        self.state = StreakState::PaymentWindow;
        self.breaker_user_id = Some(breaker_user_id.to_string());
        self.recovery_deadline_at = Some(deadline);
        self.updated_at = now;
        Ok(())
    }

    /// Forgive the miss. Progress is kept and the current day restarts at `now`.
    pub fn recover(&mut self, payment_id: Option<String>, now: i64) -> Transition {
        require(self, "recover", self.state.is_recoverable())?;
        if let Some(deadline) = self.recovery_deadline_at {
            if now > deadline {
                return Err(TransitionError::DeadlineExceeded { deadline });
            }
        }

        self.state = StreakState::Active;
        self.breaker_user_id = None;
        self.recovery_deadline_at = None;
        self.recovery_payment_id = payment_id;
        self.day_started_at = now;
        self.updated_at = now;
        Ok(())
    }

    /// The payment window closed unpaid.
    pub fn expire(&mut self, now: i64) -> Transition {
        require(self, "expire", self.state == StreakState::PaymentWindow)?;
        if self.recovery_deadline_at.is_some_and(|deadline| now <= deadline) {
            return Err(TransitionError::InvalidState {
                action: "expire (deadline not reached)",
                state: self.state,
            });
        }

        self.state = StreakState::Terminated;
        self.updated_at = now;
        Ok(())
    }

    /// Discard progress and start over at day 1.
    pub fn reset(&mut self, now: i64) -> Transition {
        require(self, "reset", self.state != StreakState::Terminated)?;

        self.current_day = 1;
        self.state = StreakState::Active;
        self.reset_count += 1;
        self.breaker_user_id = None;
        self.recovery_deadline_at = None;
        self.completed_at = None;
        self.day_started_at = now;
        self.updated_at = now;
        Ok(())
    }

    /// Move to `day`, clamped to the streak length.
    pub fn adjust(&mut self, day: i64, now: i64) -> Transition {
        require(self, "adjust", self.state != StreakState::Terminated)?;

        self.current_day = day.clamp(1, STREAK_LENGTH);
        if self.current_day == STREAK_LENGTH {
            self.state = StreakState::Completed;
            self.completed_at = Some(now);
        } else {
            self.state = StreakState::Active;
            self.completed_at = None;
        }
        self.breaker_user_id = None;
        self.recovery_deadline_at = None;
        self.day_started_at = now;
        self.updated_at = now;
        Ok(())
    }

    /// The owning connection ended.
    pub fn terminate(&mut self, now: i64) -> Transition {
        require(self, "terminate", !self.state.is_terminal())?;

        self.state = StreakState::Terminated;
        self.updated_at = now;
        Ok(())
    }
}
