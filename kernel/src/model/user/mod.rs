use crate::model::{
    id::UserId,
    role::{derive_role, LegacyPermissions, Role, RoleSource},
};
use serde::{Deserialize, Serialize};

pub mod event;

/// 保存されている形のままのユーザー。ロールは旧形式のフィールドに残っていることがある
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub permissions: Option<LegacyPermissions>,
}

impl UserRecord {
    pub fn role_sources(&self) -> impl Iterator<Item = RoleSource<'_>> {
        let canonical = self.role.as_deref().map(RoleSource::Canonical);
        let admin_flag = self.is_admin.map(RoleSource::AdminFlag);
        let permissions = self.permissions.as_ref().map(RoleSource::Permissions);
        canonical.into_iter().chain(admin_flag).chain(permissions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

impl From<UserRecord> for User {
    fn from(value: UserRecord) -> Self {
        let role = derive_role(value.role_sources());
        let UserRecord {
            user_id,
            email,
            display_name,
            ..
        } = value;
        Self {
            user_id,
            email,
            display_name,
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_is_derived_from_legacy_documents() {
        let legacy: UserRecord = serde_json::from_value(json!({
            "userId": "7f9c24e8-3b12-4fef-91e0-5b8c8f4a1d2b",
            "email": "old@example.org",
            "displayName": "Old Timer",
            "isAdmin": false,
            "permissions": { "canApproveReservations": true }
        }))
        .unwrap();
        assert_eq!(User::from(legacy).role, Role::Approver);

        let canonical: UserRecord = serde_json::from_value(json!({
            "userId": "7f9c24e8-3b12-4fef-91e0-5b8c8f4a1d2b",
            "email": "new@example.org",
            "displayName": "Newcomer",
            "role": "requester",
            "isAdmin": true
        }))
        .unwrap();
        assert_eq!(User::from(canonical).role, Role::Requester);
    }
}
