//! Member registry
//!
//! Validated CRUD over guild members. Members are only ever soft deleted so
//! that historical meeting rosters keep resolving.

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::eligibility::ClassRoleMatrix;
use crate::error::{Error, Result};
use crate::models::{JoinSubmission, Member, MemberDraft, MemberKey};
use crate::storage::MemberRepository;

/// Trim a chat id, treating blank as absent
pub(crate) fn normalize_chat_id(chat_id: Option<&str>) -> Option<String> {
    chat_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Check a draft and return its trimmed display name
fn validate_draft(draft: &MemberDraft) -> Result<String> {
    let name = draft.display_name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Display name is required".into()));
    }
    if draft.classes.is_empty() {
        return Err(Error::Validation("At least one class is required".into()));
    }

    for role in &draft.roles {
        let playable = draft
            .classes
            .iter()
            .any(|class| ClassRoleMatrix::is_role_valid_for_class(*role, *class));
        if !playable {
            return Err(Error::Validation(format!(
                "Role {} is not valid for any of the member's classes",
                role
            )));
        }
    }

    Ok(name.to_string())
}

pub struct MemberRegistry<'a, S: MemberRepository> {
    store: &'a S,
}

impl<'a, S: MemberRepository> MemberRegistry<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Register a new member
    #[instrument(skip(self, draft), fields(name = %draft.display_name))]
    pub fn register(&self, draft: &MemberDraft) -> Result<Member> {
        let name = validate_draft(draft)?;

        let mut member = Member::new(name)
            .with_roles(draft.roles.iter().copied())
            .with_classes(draft.classes.iter().copied());
        member.external_chat_id = normalize_chat_id(draft.external_chat_id.as_deref());

        self.store.create_member(&member)?;
        info!(member_id = %member.id, "Registered member");
        Ok(member)
    }

    /// Create the member behind a join request from an unknown chat user
    #[instrument(skip(self, submission), fields(chat_id = %submission.external_chat_id))]
    pub fn provision(&self, submission: &JoinSubmission) -> Result<Member> {
        let member = Member::new(submission.display_name.trim().to_string())
            .with_external_chat_id(submission.external_chat_id.trim())
            .with_roles([submission.requested_role])
            .with_classes([submission.requested_class]);

        self.store.create_member(&member)?;
        info!(member_id = %member.id, "Provisioned member from join request");
        Ok(member)
    }

    /// Replace a member's editable fields
    #[instrument(skip(self, draft))]
    pub fn update(&self, member_id: Uuid, draft: &MemberDraft) -> Result<Member> {
        let name = validate_draft(draft)?;
        let mut member = self.get(&MemberKey::Id(member_id))?;

        member.display_name = name;
        member.external_chat_id = normalize_chat_id(draft.external_chat_id.as_deref());
        member.eligible_roles = draft.roles.iter().copied().collect();
        member.eligible_classes = draft.classes.iter().copied().collect();
        member.updated_at = Utc::now();

        if !self.store.update_member(&member)? {
            return Err(Error::NotFound(format!("Member {}", member_id)));
        }
        Ok(member)
    }

    /// Look up a member, including deactivated ones
    pub fn get(&self, key: &MemberKey) -> Result<Member> {
        self.store
            .find_member(key)?
            .ok_or_else(|| Error::NotFound(format!("Member with {}", key)))
    }

    /// Look up a member that has not been deactivated
    pub fn get_active(&self, key: &MemberKey) -> Result<Member> {
        match self.store.find_member(key)? {
            Some(member) if member.active => Ok(member),
            _ => Err(Error::NotFound(format!("Active member with {}", key))),
        }
    }

    pub fn list_active(&self) -> Result<Vec<Member>> {
        self.store.list_active_members()
    }

    /// Soft delete
    #[instrument(skip(self))]
    pub fn deactivate(&self, member_id: Uuid) -> Result<()> {
        if !self.store.deactivate_member(member_id)? {
            return Err(Error::NotFound(format!("Member {}", member_id)));
        }
        info!("Deactivated member");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassCode, RoleTag};
    use crate::storage::Database;

    fn draft(name: &str, chat_id: Option<&str>) -> MemberDraft {
        MemberDraft {
            display_name: name.to_string(),
            external_chat_id: chat_id.map(str::to_string),
            roles: vec![RoleTag::Tank, RoleTag::Boss],
            classes: vec![ClassCode::ThienSach],
        }
    }

    #[test]
    fn test_register_trims_fields() {
        let db = Database::open_in_memory().unwrap();
        let registry = MemberRegistry::new(&db);

        let member = registry.register(&draft("  Hải  ", Some(" 9001 "))).unwrap();
        assert_eq!(member.display_name, "Hải");
        assert_eq!(member.external_chat_id.as_deref(), Some("9001"));

        let found = registry
            .get(&MemberKey::ExternalChatId("9001".into()))
            .unwrap();
        assert_eq!(found.id, member.id);
    }

    #[test]
    fn test_register_validation() {
        let db = Database::open_in_memory().unwrap();
        let registry = MemberRegistry::new(&db);

        let err = registry.register(&draft("   ", None)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut no_class = draft("Hà", None);
        no_class.classes.clear();
        assert!(matches!(
            registry.register(&no_class).unwrap_err(),
            Error::Validation(_)
        ));

        // Bá Đao cannot tank
        let mut bad_role = draft("Hà", None);
        bad_role.classes = vec![ClassCode::BaDao];
        assert!(matches!(
            registry.register(&bad_role).unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[test]
    fn test_roles_may_be_empty() {
        let db = Database::open_in_memory().unwrap();
        let registry = MemberRegistry::new(&db);

        let mut no_roles = draft("Khoa", None);
        no_roles.roles.clear();
        let member = registry.register(&no_roles).unwrap();
        assert!(member.eligible_roles.is_empty());
    }

    #[test]
    fn test_blank_chat_id_is_absent() {
        let db = Database::open_in_memory().unwrap();
        let registry = MemberRegistry::new(&db);

        // Two members without chat ids must not collide on the unique index
        registry.register(&draft("Một", Some("  "))).unwrap();
        let second = registry.register(&draft("Hai", None)).unwrap();
        assert!(second.external_chat_id.is_none());
    }

    #[test]
    fn test_duplicate_chat_id_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let registry = MemberRegistry::new(&db);

        registry.register(&draft("Một", Some("77"))).unwrap();
        let err = registry.register(&draft("Hai", Some("77"))).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_update_and_deactivate() {
        let db = Database::open_in_memory().unwrap();
        let registry = MemberRegistry::new(&db);
        let member = registry.register(&draft("Lan", Some("55"))).unwrap();

        let mut edit = draft("Lan Anh", Some("55"));
        edit.classes.push(ClassCode::VanHoa);
        edit.roles.push(RoleTag::Buff);
        let updated = registry.update(member.id, &edit).unwrap();
        assert_eq!(updated.display_name, "Lan Anh");
        assert!(updated.eligible_roles.contains(&RoleTag::Buff));

        registry.deactivate(member.id).unwrap();
        assert!(registry.list_active().unwrap().is_empty());
        assert!(!registry.get(&MemberKey::Id(member.id)).unwrap().active);
        assert!(matches!(
            registry.get_active(&MemberKey::Id(member.id)).unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_update_missing_member() {
        let db = Database::open_in_memory().unwrap();
        let registry = MemberRegistry::new(&db);
        let err = registry.update(Uuid::new_v4(), &draft("X", None)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(matches!(
            registry.deactivate(Uuid::new_v4()).unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_provision_from_submission() {
        let db = Database::open_in_memory().unwrap();
        let registry = MemberRegistry::new(&db);

        let member = registry
            .provision(&JoinSubmission {
                external_chat_id: "31337".into(),
                display_name: "Tùng".into(),
                requested_role: RoleTag::Buff,
                requested_class: ClassCode::NguDoc,
            })
            .unwrap();

        assert!(member.active);
        assert!(member.eligible_roles.contains(&RoleTag::Buff));
        assert!(member.eligible_classes.contains(&ClassCode::NguDoc));
    }
}
