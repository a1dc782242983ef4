use garde::Validate;
use kernel::model::{
    id::UserId,
    role::{Permissions, Role},
    user::{event::UpdateUserRole, User},
};
use serde::{Deserialize, Serialize};

use crate::extractor::AuthorizedUser;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersResponse {
    pub items: Vec<UserResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub permissions: Permissions,
}

impl From<User> for UserResponse {
    fn from(value: User) -> Self {
        let User {
            user_id,
            email,
            display_name,
            role,
        } = value;
        Self {
            user_id,
            email,
            display_name,
            role,
            permissions: role.into(),
        }
    }
}

/// 未登録のユーザーは `userId` を持たない閲覧者として返す
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserResponse {
    pub user_id: Option<UserId>,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub permissions: Permissions,
}

impl From<AuthorizedUser> for CurrentUserResponse {
    fn from(value: AuthorizedUser) -> Self {
        let role = value.role();
        Self {
            user_id: value.id(),
            display_name: value.display_name().to_string(),
            email: value.email,
            role,
            permissions: role.into(),
        }
    }
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRoleRequest {
    #[garde(skip)]
    pub role: Role,
}

#[derive(derive_new::new)]
pub struct UpdateUserRoleRequestWithUserId(UserId, UpdateUserRoleRequest);

impl From<UpdateUserRoleRequestWithUserId> for UpdateUserRole {
    fn from(value: UpdateUserRoleRequestWithUserId) -> Self {
        let UpdateUserRoleRequestWithUserId(user_id, UpdateUserRoleRequest { role }) = value;
        Self { user_id, role }
    }
}
