// Core domain types shared across all Leadflow crates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One fixed position in the sales pipeline, in pipeline order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    New,
    Contacted,
    Qualified,
    Proposal,
    Won,
    Lost,
}

impl Stage {
    /// All stages in pipeline order. Column layout and projection iterate this.
    pub const ALL: [Stage; 6] = [
        Stage::New,
        Stage::Contacted,
        Stage::Qualified,
        Stage::Proposal,
        Stage::Won,
        Stage::Lost,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Proposal => "proposal",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "contacted" => Some(Self::Contacted),
            "qualified" => Some(Self::Qualified),
            "proposal" => Some(Self::Proposal),
            "won" => Some(Self::Won),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }
}

/// Reference to the principal responsible for a lead.
///
/// `Unassigned` is an explicit sentinel, not a missing field: externally
/// ingested leads start unassigned until an admin delegates them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OwnerRef {
    #[default]
    Unassigned,
    Assigned(Uuid),
}

impl OwnerRef {
    /// True when this lead is owned by the given principal.
    pub fn is(self, principal_id: Uuid) -> bool {
        self == OwnerRef::Assigned(principal_id)
    }
}

/// A sales lead moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub company: String,
    /// Non-negative; validated at the ingestion boundary.
    #[serde(default)]
    pub value: Decimal,
    pub stage: Stage,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Where this lead came from (e.g. "webform", "referral").
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub owner: OwnerRef,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of a lead's intent-mutable fields.
///
/// `None` means "leave unchanged". Stage and owner are the only fields the
/// engine mutates through intents; contact fields only change at ingestion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeadPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,
}

impl LeadPatch {
    pub fn stage(stage: Stage) -> Self {
        Self { stage: Some(stage), owner: None }
    }

    pub fn owner(owner: OwnerRef) -> Self {
        Self { stage: None, owner: Some(owner) }
    }

    pub fn is_empty(&self) -> bool {
        self.stage.is_none() && self.owner.is_none()
    }
}

/// Role of an authenticated actor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    OwnerAdmin,
    Member,
}

/// An authenticated actor with a role.
///
/// `provisioned_by` is the owner-admin that created this member account;
/// `None` for owner-admins themselves. The hierarchy is one level deep:
/// members never provision other members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub provisioned_by: Option<Uuid>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::OwnerAdmin
    }
}
