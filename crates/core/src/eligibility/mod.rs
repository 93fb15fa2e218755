//! Class to role eligibility table

use crate::models::{ClassCode, RoleTag};

/// Static class→role allow-list
pub struct ClassRoleMatrix;

impl ClassRoleMatrix {
    /// Check if a class may play a role
    pub fn is_role_valid_for_class(role: RoleTag, class: ClassCode) -> bool {
        match role {
            // Every class can fight the boss and deal damage
            RoleTag::Boss | RoleTag::Dps => true,

            RoleTag::Buff => matches!(
                class,
                ClassCode::DuocTong
                    | ClassCode::TruongCaMon
                    | ClassCode::ThatTu
                    | ClassCode::VanHoa
                    | ClassCode::NguDoc
            ),

            RoleTag::Tank => matches!(
                class,
                ClassCode::ThuongVan
                    | ClassCode::ThienSach
                    | ClassCode::MinhGiao
                    | ClassCode::ThieuLam
            ),
        }
    }

    /// Roles a class may play, in vocabulary order
    pub fn roles_for_class(class: ClassCode) -> Vec<RoleTag> {
        RoleTag::all()
            .iter()
            .copied()
            .filter(|role| Self::is_role_valid_for_class(*role, class))
            .collect()
    }

    /// Classes able to play a role
    pub fn classes_for_role(role: RoleTag) -> Vec<ClassCode> {
        ClassCode::all()
            .iter()
            .copied()
            .filter(|class| Self::is_role_valid_for_class(role, *class))
            .collect()
    }
}

/// Free-function form of [`ClassRoleMatrix::is_role_valid_for_class`]
pub fn is_role_valid_for_class(role: RoleTag, class: ClassCode) -> bool {
    ClassRoleMatrix::is_role_valid_for_class(role, class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boss_valid_for_every_class() {
        for class in ClassCode::all() {
            assert!(is_role_valid_for_class(RoleTag::Boss, *class), "{}", class);
        }
    }

    #[test]
    fn test_support_roles() {
        assert!(is_role_valid_for_class(RoleTag::Buff, ClassCode::VanHoa));
        assert!(!is_role_valid_for_class(RoleTag::Buff, ClassCode::BaDao));
        assert!(is_role_valid_for_class(RoleTag::Tank, ClassCode::ThieuLam));
        assert!(!is_role_valid_for_class(RoleTag::Tank, ClassCode::DuongMon));
    }

    #[test]
    fn test_role_lists() {
        assert_eq!(
            ClassRoleMatrix::roles_for_class(ClassCode::ThienSach),
            vec![RoleTag::Tank, RoleTag::Dps, RoleTag::Boss]
        );
        assert_eq!(ClassRoleMatrix::classes_for_role(RoleTag::Buff).len(), 5);
        assert_eq!(ClassRoleMatrix::classes_for_role(RoleTag::Tank).len(), 4);
    }
}
