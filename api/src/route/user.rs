use axum::{
    routing::{get, put},
    Router,
};
use registry::AppRegistry;

use crate::handler::user::{change_role, get_current_user, list_users};

pub fn build_user_router() -> Router<AppRegistry> {
    let users_routers = Router::new()
        .route("/me", get(get_current_user))
        .route("/", get(list_users))
        .route("/:user_id/role", put(change_role));

    Router::new().nest("/users", users_routers)
}
