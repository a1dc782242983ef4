use crate::{
    extractor::AuthorizedUser,
    model::settings::{EmailSettingsResponse, UpdateEmailSettingsRequest},
};
use axum::{extract::State, Json};
use garde::Validate;
use kernel::model::settings::EmailSettings;
use registry::AppRegistry;
use shared::error::AppResult;

pub async fn show_email_settings(
    user: AuthorizedUser,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<EmailSettingsResponse>> {
    user.require_admin()?;

    registry
        .settings_repository()
        .email_settings()
        .await
        .map(EmailSettingsResponse::from)
        .map(Json)
}

pub async fn update_email_settings(
    user: AuthorizedUser,
    State(registry): State<AppRegistry>,
    Json(req): Json<UpdateEmailSettingsRequest>,
) -> AppResult<Json<EmailSettingsResponse>> {
    user.require_admin()?;
    req.validate()?;

    let settings = EmailSettings::from(req);
    registry
        .settings_repository()
        .save_email_settings(settings.clone())
        .await?;
    Ok(Json(settings.into()))
}
