use crate::{
    extractor::AuthorizedUser,
    model::reservation::{
        ApproveReservationRequest, CancelReservationRequest, CreateReservationRequest,
        FieldChangeResponse, RejectReservationRequest, ReservationListQuery, ReservationResponse,
        ReservationsResponse, ResubmitReservationRequest, UpdateReservationRequest,
        UpdatedReservationResponse, VersionConflictResponse,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use garde::Validate;
use kernel::model::{
    change::FieldChange,
    id::{ChangeKey, ReservationId},
    notification::NotificationKind,
    reservation::{
        event::{
            CreateReservation, PreviousRevision, ReviewAction, TransitionStatus,
            UpdateReservation,
        },
        review::UpdateOutcome,
        Requester, Reservation, ReservationStatus,
    },
};
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

pub async fn register_reservation(
    user: AuthorizedUser,
    State(registry): State<AppRegistry>,
    Json(req): Json<CreateReservationRequest>,
) -> AppResult<Response> {
    user.require_submit()?;
    req.validate()?;

    let fields = req
        .into_fields()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;
    let create_reservation = CreateReservation::new(
        fields,
        Requester {
            email: user.email().to_string(),
            display_name: user.display_name().to_string(),
        },
        None,
        user.email().to_string(),
        registry.clock().now(),
    );

    let reservation = registry
        .reservation_repository()
        .create(create_reservation)
        .await?;
    let reservation = notify(&registry, reservation, NotificationKind::Submitted, &[]).await;

    with_etag(StatusCode::CREATED, &registry, reservation)
}

pub async fn show_reservation_list(
    _user: AuthorizedUser,
    Query(query): Query<ReservationListQuery>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<ReservationsResponse>> {
    query.validate()?;

    let now = registry.clock().now();
    registry
        .reservation_repository()
        .find_all(query.into())
        .await
        .map(|items| ReservationsResponse::new(items, now))
        .map(Json)
}

pub async fn show_reservation(
    _user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Response> {
    let reservation = find_reservation(&registry, reservation_id).await?;
    with_etag(StatusCode::OK, &registry, reservation)
}

pub async fn update_reservation(
    user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
    headers: HeaderMap,
    Json(req): Json<UpdateReservationRequest>,
) -> AppResult<Response> {
    user.require_review()?;

    let UpdateReservationRequest {
        change_key,
        changes,
    } = req;
    let update_reservation = UpdateReservation::new(
        reservation_id,
        presented_change_key(&headers, change_key)?,
        changes,
        user.email().to_string(),
        registry.clock().now(),
    );

    match registry
        .reservation_repository()
        .update(update_reservation)
        .await?
    {
        UpdateOutcome::Updated {
            reservation,
            changes,
        } => {
            // 実質的な変更が無ければ申請者には通知しない
            let reservation = if changes.is_empty() {
                reservation
            } else {
                notify(&registry, reservation, NotificationKind::Updated, &changes).await
            };
            let etag = etag_value(&reservation.change_key)?;
            let body = UpdatedReservationResponse {
                reservation: ReservationResponse::new(reservation, registry.clock().now()),
                changes: FieldChangeResponse::from_changes(changes),
            };
            Ok((StatusCode::OK, [(header::ETAG, etag)], Json(body)).into_response())
        }
        UpdateOutcome::Conflict(conflict) => Ok((
            StatusCode::CONFLICT,
            Json(VersionConflictResponse::from(conflict)),
        )
            .into_response()),
    }
}

pub async fn approve_reservation(
    user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
    headers: HeaderMap,
    Json(req): Json<ApproveReservationRequest>,
) -> AppResult<Response> {
    user.require_review()?;
    req.validate()?;

    let ApproveReservationRequest { change_key, notes } = req;
    let action = ReviewAction::Approve { notes };
    transition(&registry, &user, reservation_id, &headers, change_key, action).await
}

pub async fn reject_reservation(
    user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
    headers: HeaderMap,
    Json(req): Json<RejectReservationRequest>,
) -> AppResult<Response> {
    user.require_review()?;
    req.validate()?;

    let RejectReservationRequest { change_key, reason } = req;
    let action = ReviewAction::Reject { reason };
    transition(&registry, &user, reservation_id, &headers, change_key, action).await
}

pub async fn cancel_reservation(
    user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
    headers: HeaderMap,
    Json(req): Json<CancelReservationRequest>,
) -> AppResult<Response> {
    req.validate()?;
    // 申請者本人は自分の予約を取り消せる
    if user.require_review().is_err() {
        let current = find_reservation(&registry, reservation_id).await?;
        if !current.is_requested_by(user.email()) {
            return Err(AppError::ForbiddenOperation);
        }
    }

    let CancelReservationRequest { change_key, reason } = req;
    let action = ReviewAction::Cancel { reason };
    transition(&registry, &user, reservation_id, &headers, change_key, action).await
}

pub async fn resubmit_reservation(
    user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
    Json(req): Json<ResubmitReservationRequest>,
) -> AppResult<Response> {
    let previous = find_reservation(&registry, reservation_id).await?;
    if !previous.is_requested_by(user.email()) && user.require_admin().is_err() {
        return Err(AppError::ForbiddenOperation);
    }
    if previous.status != ReservationStatus::Rejected {
        return Err(AppError::UnprocessableEntity(format!(
            "only a rejected reservation can be resubmitted (this one is {})",
            previous.status
        )));
    }

    let fields = previous.fields.apply_changes(&req.changes)?;
    let create_reservation = CreateReservation::new(
        fields,
        previous.requester.clone(),
        Some(PreviousRevision {
            reservation_id: previous.reservation_id,
            revision: previous.revision,
        }),
        user.email().to_string(),
        registry.clock().now(),
    );

    let reservation = registry
        .reservation_repository()
        .create(create_reservation)
        .await?;
    let reservation = notify(&registry, reservation, NotificationKind::Resubmitted, &[]).await;

    with_etag(StatusCode::CREATED, &registry, reservation)
}

async fn transition(
    registry: &AppRegistry,
    user: &AuthorizedUser,
    reservation_id: ReservationId,
    headers: &HeaderMap,
    body_change_key: Option<ChangeKey>,
    action: ReviewAction,
) -> AppResult<Response> {
    let kind = match &action {
        ReviewAction::Approve { .. } => NotificationKind::Approved,
        ReviewAction::Reject { .. } => NotificationKind::Rejected,
        ReviewAction::Cancel { .. } => NotificationKind::Cancelled,
    };
    let transition_status = TransitionStatus::new(
        reservation_id,
        presented_change_key(headers, body_change_key)?,
        action,
        user.email().to_string(),
        registry.clock().now(),
    );

    match registry
        .reservation_repository()
        .transition_status(transition_status)
        .await?
    {
        UpdateOutcome::Updated { reservation, .. } => {
            let reservation = notify(registry, reservation, kind, &[]).await;
            with_etag(StatusCode::OK, registry, reservation)
        }
        UpdateOutcome::Conflict(conflict) => Ok((
            StatusCode::CONFLICT,
            Json(VersionConflictResponse::from(conflict)),
        )
            .into_response()),
    }
}

async fn find_reservation(
    registry: &AppRegistry,
    reservation_id: ReservationId,
) -> AppResult<Reservation> {
    registry
        .reservation_repository()
        .find_by_id(reservation_id)
        .await?
        .ok_or_else(|| {
            AppError::EntityNotFound(format!("予約（{reservation_id}）が見つかりませんでした。"))
        })
}

// If-Match ヘッダーを優先し、無ければボディの changeKey を使う
fn presented_change_key(headers: &HeaderMap, body: Option<ChangeKey>) -> AppResult<ChangeKey> {
    headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .and_then(ChangeKey::from_if_match)
        .or(body)
        .ok_or_else(|| {
            AppError::PreconditionRequired(
                "send the changeKey you last read in If-Match or the request body".into(),
            )
        })
}

fn etag_value(change_key: &ChangeKey) -> AppResult<HeaderValue> {
    HeaderValue::from_str(&change_key.to_etag())
        .map_err(|e| AppError::ConversionEntityError(e.to_string()))
}

fn with_etag(
    status: StatusCode,
    registry: &AppRegistry,
    reservation: Reservation,
) -> AppResult<Response> {
    let etag = etag_value(&reservation.change_key)?;
    let body = ReservationResponse::new(reservation, registry.clock().now());
    Ok((status, [(header::ETAG, etag)], Json(body)).into_response())
}

// 通知の失敗で本来の操作を失敗させない。送信結果は履歴に追記される
async fn notify(
    registry: &AppRegistry,
    mut reservation: Reservation,
    kind: NotificationKind,
    changes: &[FieldChange],
) -> Reservation {
    match registry
        .notification_dispatcher()
        .dispatch(&reservation, kind, changes)
        .await
    {
        Ok(Some(record)) => reservation.communication_history.push(record),
        Ok(None) => {}
        Err(e) => tracing::warn!(
            reservation_id = %reservation.reservation_id,
            kind = %kind,
            error.message = %e,
            "failed to record reservation notification"
        ),
    }
    reservation
}
