use crate::{
    extractor::AuthorizedUser,
    model::review::{HoldConflictResponse, StartReviewResponse},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kernel::model::{
    id::ReservationId,
    reservation::{
        event::{AcquireReviewHold, ReleaseReviewHold},
        review::HoldOutcome,
    },
};
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

/// Opens (or extends) the caller's review hold.
///
/// The hold is advisory: when the store cannot be reached the caller is told
/// to continue without one instead of receiving an error.
pub async fn start_review(
    user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Response> {
    user.require_review()?;

    let duration = registry.review_hold_duration();
    let degraded = |e: AppError| -> AppResult<Response> {
        tracing::warn!(
            %reservation_id,
            error.cause_chain = ?e,
            error.message = %e,
            "review hold unavailable, continuing without it"
        );
        Ok(Json(StartReviewResponse::degraded(duration.num_minutes())).into_response())
    };

    // 編集できない予約にはホールドを設定しない
    match registry
        .reservation_repository()
        .find_by_id(reservation_id)
        .await
    {
        Ok(Some(current)) if !current.status.is_editable() => {
            return Err(AppError::UnprocessableEntity(format!(
                "a {} reservation cannot be reviewed",
                current.status
            )))
        }
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err(AppError::EntityNotFound(format!(
                "予約（{reservation_id}）が見つかりませんでした。"
            )))
        }
        Err(e) => return degraded(e),
    }

    let acquire = AcquireReviewHold::new(
        reservation_id,
        user.email().to_string(),
        registry.clock().now(),
        duration,
    );
    match registry
        .reservation_repository()
        .acquire_review_hold(acquire)
        .await
    {
        Ok(HoldOutcome::Acquired { hold, change_key }) => Ok(Json(
            StartReviewResponse::acquired(hold, change_key, duration.num_minutes()),
        )
        .into_response()),
        Ok(HoldOutcome::Conflict(conflict)) => Ok((
            StatusCode::LOCKED,
            Json(HoldConflictResponse::from(conflict)),
        )
            .into_response()),
        Err(e @ AppError::EntityNotFound(_)) => Err(e),
        Err(e) => degraded(e),
    }
}

/// Releases the caller's hold. Never fails the caller.
pub async fn release_review(
    user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
) -> StatusCode {
    let release = ReleaseReviewHold::new(reservation_id, user.email().to_string());
    if let Err(e) = registry
        .reservation_repository()
        .release_review_hold(release)
        .await
    {
        tracing::warn!(
            %reservation_id,
            error.cause_chain = ?e,
            error.message = %e,
            "failed to release review hold"
        );
    }
    StatusCode::NO_CONTENT
}
