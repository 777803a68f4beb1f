use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Forming,
    Completed,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Forming => "forming",
            GroupStatus::Completed => "completed",
        }
    }
}

impl FromStr for GroupStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forming" => Ok(GroupStatus::Forming),
            "completed" => Ok(GroupStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for GroupStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Invited,
    Joined,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Invited => "invited",
            MemberStatus::Joined => "joined",
        }
    }
}

impl FromStr for MemberStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invited" => Ok(MemberStatus::Invited),
            "joined" => Ok(MemberStatus::Joined),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for MemberStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A leader-driven batch purchase. The leader is not a member row.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPurchase {
    pub id: Uuid,
    pub event_id: Uuid,
    pub leader_id: Uuid,
    pub group_name: String,
    pub max_members: i32,
    pub target_seats: i32,
    #[sqlx(try_from = "String")]
    pub status: GroupStatus,
    pub total_prepaid: f64,
    pub estimated_price_per_seat: Option<f64>,
    pub actual_total_cost: Option<f64>,
    pub leader_seat_id: Option<Uuid>,
    pub leader_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: MemberStatus,
    pub invited_at: DateTime<Utc>,
    pub joined_at: Option<DateTime<Utc>>,
    pub prepaid_amount: f64,
    pub seat_assigned_id: Option<Uuid>,
    pub final_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetails {
    #[serde(flatten)]
    pub group: GroupPurchase,
    pub members: Vec<GroupMember>,
}

impl GroupDetails {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.group.leader_id == user_id || self.members.iter().any(|m| m.user_id == user_id)
    }

    /// Joined members in join order; ties broken by user id so the order is total.
    pub fn joined_members(&self) -> Vec<&GroupMember> {
        let mut joined: Vec<&GroupMember> = self
            .members
            .iter()
            .filter(|m| m.status == MemberStatus::Joined)
            .collect();
        joined.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.user_id.cmp(&b.user_id)));
        joined
    }

    /// Leader plus every member row, joined or merely invited.
    pub fn headcount(&self) -> usize {
        self.members.len() + 1
    }
}
