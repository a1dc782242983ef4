use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use kernel::model::{id::UserId, role::Role, user::User};
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

/// フロントの認証プロキシが付与する、サインイン済みユーザーのメールアドレス
pub const PRINCIPAL_NAME_HEADER: &str = "x-ms-client-principal-name";

/// The signed-in caller and the role resolved for them.
///
/// Principals without a user record are treated as viewers.
#[derive(Debug, Clone)]
pub struct AuthorizedUser {
    pub email: String,
    pub user: Option<User>,
}

impl AuthorizedUser {
    pub fn id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.user_id)
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> &str {
        self.user
            .as_ref()
            .map_or(self.email.as_str(), |u| u.display_name.as_str())
    }

    pub fn role(&self) -> Role {
        self.user.as_ref().map_or(Role::Viewer, |u| u.role)
    }

    pub fn require_submit(&self) -> AppResult<()> {
        self.role()
            .can_submit()
            .then_some(())
            .ok_or(AppError::ForbiddenOperation)
    }

    pub fn require_review(&self) -> AppResult<()> {
        self.role()
            .can_review()
            .then_some(())
            .ok_or(AppError::ForbiddenOperation)
    }

    pub fn require_admin(&self) -> AppResult<()> {
        self.role()
            .can_administer()
            .then_some(())
            .ok_or(AppError::ForbiddenOperation)
    }
}

#[async_trait]
impl FromRequestParts<AppRegistry> for AuthorizedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        registry: &AppRegistry,
    ) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(PRINCIPAL_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AppError::UnauthenticatedError)?
            .to_string();

        let user = registry.user_repository().find_by_email(&email).await?;

        Ok(Self { email, user })
    }
}
