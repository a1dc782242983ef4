use crate::database::{model::user::UserRow, ConnectionPool};
use async_trait::async_trait;
use derive_new::new;
use kernel::model::user::{event::UpdateUserRole, User, UserRecord};
use kernel::repository::user::UserRepository;
use shared::error::{AppError, AppResult};

#[derive(new)]
pub struct UserRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl UserRepository for UserRepositoryImpl {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        // メールアドレスは大文字小文字を区別しない
        let row = sqlx::query_as::<_, UserRow>(
            r#"
                SELECT user_id, email, display_name, role, is_admin, permissions
                FROM users
                WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(row.map(UserRecord::from).map(User::from))
    }

    async fn find_all(&self) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, UserRow>(
            r#"
                SELECT user_id, email, display_name, role, is_admin, permissions
                FROM users
                ORDER BY created_at DESC
            "#,
        )
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?
        .into_iter()
        .map(UserRecord::from)
        .map(User::from)
        .collect();

        Ok(users)
    }

    async fn update_role(&self, event: UpdateUserRole) -> AppResult<()> {
        // 正式なロールを書き込んだ時点で旧形式のフィールドは参照されなくなる
        let res = sqlx::query(
            r#"
                UPDATE users
                SET role = $2, updated_at = CURRENT_TIMESTAMP(3)
                WHERE user_id = $1
            "#,
        )
        .bind(event.user_id)
        .bind(event.role.as_ref())
        .execute(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::EntityNotFound(format!(
                "ユーザー（{}）が見つかりませんでした。",
                event.user_id
            )));
        }
        Ok(())
    }
}
