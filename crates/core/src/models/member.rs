//! Member registry model

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ClassCode, RoleTag};

/// A registered guild member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub display_name: String,
    /// Discord user id
    pub external_chat_id: Option<String>,
    pub eligible_roles: BTreeSet<RoleTag>,
    pub eligible_classes: BTreeSet<ClassCode>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn new(display_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            display_name,
            external_chat_id: None,
            eligible_roles: BTreeSet::new(),
            eligible_classes: BTreeSet::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_external_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.external_chat_id = Some(chat_id.into());
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleTag>) -> Self {
        self.eligible_roles.extend(roles);
        self
    }

    pub fn with_classes(mut self, classes: impl IntoIterator<Item = ClassCode>) -> Self {
        self.eligible_classes.extend(classes);
        self
    }
}

/// Fields supplied when registering or editing a member
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberDraft {
    pub display_name: String,
    #[serde(default)]
    pub external_chat_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleTag>,
    #[serde(default)]
    pub classes: Vec<ClassCode>,
}

/// Lookup key for the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum MemberKey {
    Id(Uuid),
    ExternalChatId(String),
}

impl std::fmt::Display for MemberKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberKey::Id(id) => write!(f, "id {}", id),
            MemberKey::ExternalChatId(chat_id) => write!(f, "chat id {}", chat_id),
        }
    }
}
