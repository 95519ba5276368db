//! Streak state machine and nudge tracker.

pub mod machine;
pub mod nudge;
pub mod service;

#[cfg(test)]
mod nudge_tests;

pub use machine::{STREAK_LENGTH, TransitionError};
pub use nudge::{MAX_MESSAGE_CHARS, NudgeService};
pub use service::{
    CheckInOutcome, RecoverOutcome, RecoveryOptions, StreakDetail, StreakService, SweepReport,
    TodayOverview, TodayStreak,
};
