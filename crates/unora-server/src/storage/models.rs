//! Data models for Unora engine storage.

use serde::{Deserialize, Serialize};
use unora_core::Tier;

/// Discovery category a card, interest and connection belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ServerType {
    Partner,
    Friend,
    Growth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InterestStatus {
    Pending,
    Matched,
    Expired,
    Wiped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StreakState {
    Active,
    AtRisk,
    PaymentWindow,
    Reset,
    Completed,
    Terminated,
}

impl StreakState {
    /// States in which participants may check in or nudge.
    pub const fn accepts_check_in(self) -> bool {
        matches!(self, Self::Active | Self::AtRisk)
    }

    /// States from which a broken streak can still be recovered.
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::AtRisk | Self::PaymentWindow)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Terminated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CheckInType {
    Manual,
    NudgeResponse,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NudgeStatus {
    Sent,
    Seen,
    Responded,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RevealStatus {
    Locked,
    Unlocked,
    Viewed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum UnlockMethod {
    Earned,
    Purchased,
    Gifted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    StreakRecovery,
    EarlyReveal,
    ReferralBonus,
    WelcomeBonus,
    Refund,
    AdminAdjustment,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub city: Option<String>,
    pub age: Option<i64>,
    pub photo_url: Option<String>,
    pub tier: String,
    pub credit_balance: i64,
    pub active_connection_count: i64,
    pub free_recoveries_used: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl User {
    /// Subscription tier, with unknown names treated as `free`.
    pub fn tier(&self) -> Tier {
        Tier::parse_or_free(&self.tier)
    }
}

/// Public profile fields shown next to a counterpart.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub id: String,
    pub display_name: String,
    pub city: Option<String>,
    pub age: Option<i64>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryCard {
    pub id: String,
    pub viewer_user_id: String,
    pub candidate_user_id: String,
    pub server_type: ServerType,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Interest {
    pub id: String,
    pub sender_user_id: String,
    pub receiver_user_id: String,
    pub server_type: ServerType,
    pub discovery_card_id: String,
    pub status: InterestStatus,
    pub created_at: i64,
    pub matched_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub user_a_id: String,
    pub user_b_id: String,
    pub server_type: ServerType,
    pub status: ConnectionStatus,
    pub created_at: i64,
    pub terminated_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

impl Connection {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.user_a_id == user_id || self.user_b_id == user_id
    }

    /// The other participant, or `None` when `user_id` is not part of the pair.
    pub fn partner_of(&self, user_id: &str) -> Option<&str> {
        if self.user_a_id == user_id {
            Some(&self.user_b_id)
        } else if self.user_b_id == user_id {
            Some(&self.user_a_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Streak {
    pub id: String,
    pub connection_id: String,
    pub state: StreakState,
    pub current_day: i64,
    pub reset_count: i64,
    pub breaker_user_id: Option<String>,
    pub recovery_deadline_at: Option<i64>,
    pub recovery_payment_id: Option<String>,
    pub health_score: Option<f64>,
    pub day_started_at: i64,
    #[serde(skip)]
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub id: String,
    pub streak_id: String,
    pub user_id: String,
    pub day_number: i64,
    pub utc_day: i64,
    pub check_in_type: CheckInType,
    pub event_data: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Nudge {
    pub id: String,
    pub streak_id: String,
    pub sender_user_id: String,
    pub receiver_user_id: String,
    pub day_number: i64,
    pub utc_day: i64,
    pub status: NudgeStatus,
    pub message: Option<String>,
    pub created_at: i64,
    pub seen_at: Option<i64>,
    pub responded_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RevealMilestone {
    pub id: String,
    pub reveal_number: i64,
    pub day_required: i64,
    pub reveal_type: String,
    pub title: String,
    pub credit_cost: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reveal {
    pub id: String,
    pub connection_id: String,
    pub milestone_id: String,
    pub unlock_method: Option<UnlockMethod>,
    pub status: RevealStatus,
    pub content_attempts: i64,
    pub created_at: i64,
    pub unlocked_at: Option<i64>,
    pub viewed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RevealContent {
    pub id: String,
    pub reveal_id: String,
    pub summary: String,
    pub insight: String,
    /// JSON array of conversation starters.
    pub conversation_starters: String,
    pub created_at: i64,
}

impl RevealContent {
    pub fn starters(&self) -> Vec<String> {
        serde_json::from_str(&self.conversation_starters).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub balance_after: i64,
    pub transaction_type: TransactionType,
    pub reference_id: Option<String>,
    pub description: Option<String>,
    pub created_at: i64,
}
