use axum::{routing::get, Router};
use registry::AppRegistry;

use crate::handler::settings::{show_email_settings, update_email_settings};

pub fn build_settings_routers() -> Router<AppRegistry> {
    let settings_routers =
        Router::new().route("/email", get(show_email_settings).put(update_email_settings));

    Router::new().nest("/settings", settings_routers)
}
