use kernel::model::{id::UserId, role::LegacyPermissions, user::UserRecord};
use sqlx::types::Json;

#[derive(sqlx::FromRow)]
pub struct UserRow {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Option<String>,
    pub is_admin: Option<bool>,
    pub permissions: Option<Json<LegacyPermissions>>,
}

impl From<UserRow> for UserRecord {
    fn from(value: UserRow) -> Self {
        let UserRow {
            user_id,
            email,
            display_name,
            role,
            is_admin,
            permissions,
        } = value;
        UserRecord {
            user_id,
            email,
            display_name,
            role,
            is_admin,
            permissions: permissions.map(|p| p.0),
        }
    }
}
