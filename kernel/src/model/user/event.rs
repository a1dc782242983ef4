use crate::model::{id::UserId, role::Role};
use derive_new::new;

#[derive(new)]
pub struct UpdateUserRole {
    pub user_id: UserId,
    pub role: Role,
}
