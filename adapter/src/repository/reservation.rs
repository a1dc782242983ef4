use crate::database::{
    model::reservation::{CommunicationRow, ReservationRow, RevisionRow},
    ConnectionPool,
};
use async_trait::async_trait;
use derive_new::new;
use kernel::model::{
    id::{ChangeKey, ReservationId},
    reservation::{
        event::{
            AcquireReviewHold, CreateReservation, ReleaseReviewHold, TransitionStatus,
            UpdateReservation,
        },
        review::{HoldAttempt, HoldOutcome, HoldRelease, PlannedWrite, UpdateOutcome, VersionConflict},
        CommunicationRecord, Reservation, ReservationListFilter, ReservationRevision, ReviewHold,
    },
};
use kernel::repository::reservation::ReservationRepository;
use shared::error::{AppError, AppResult};
use sqlx::types::{
    chrono::{DateTime, Utc},
    Json,
};
use std::collections::HashMap;

// 失効・解除と競合した場合に条件付き書き込みをやり直す回数
const MAX_HOLD_ATTEMPTS: usize = 3;

macro_rules! select_reservations {
    ($tail:literal) => {
        concat!(
            r#"
            SELECT
                reservation_id,
                change_key,
                status,
                fields,
                requester,
                reviewing_by,
                review_expires_at,
                review_notes,
                revision,
                previous_reservation_id,
                last_modified_by,
                created_at,
                updated_at
            FROM reservations
            "#,
            $tail
        )
    };
}

#[derive(new)]
pub struct ReservationRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl ReservationRepository for ReservationRepositoryImpl {
    async fn create(&self, event: CreateReservation) -> AppResult<Reservation> {
        let (reservation, revision) = event.into_initial()?;

        let mut tx = self.db.begin().await?;

        let res = sqlx::query(
            r#"
                INSERT INTO reservations
                (reservation_id, change_key, status, fields, requester,
                review_notes, revision, previous_reservation_id,
                last_modified_by, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ;
            "#,
        )
        .bind(reservation.reservation_id)
        .bind(&reservation.change_key)
        .bind(reservation.status.as_ref())
        .bind(Json(&reservation.fields))
        .bind(Json(&reservation.requester))
        .bind(&reservation.review_notes)
        .bind(reservation.revision)
        .bind(reservation.previous_reservation_id)
        .bind(&reservation.last_modified_by)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            // previous_reservation_id の UNIQUE 制約違反 = 既に再申請済み
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::UnprocessableEntity("this reservation has already been resubmitted".into())
            }
            e => AppError::SpecificOperationError(e),
        })?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No reservation record has been created".into(),
            ));
        }

        Self::insert_revision(&mut tx, &revision).await?;

        tx.commit().await.map_err(AppError::TransactionError)?;

        Ok(reservation)
    }

    async fn find_by_id(&self, reservation_id: ReservationId) -> AppResult<Option<Reservation>> {
        let Some(row) = sqlx::query_as::<_, ReservationRow>(select_reservations!(
            "WHERE reservation_id = $1"
        ))
        .bind(reservation_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?
        else {
            return Ok(None);
        };

        let mut history = self.find_communications(&[reservation_id]).await?;
        let records = history.remove(&reservation_id).unwrap_or_default();
        row.into_reservation(records).map(Some)
    }

    async fn find_all(&self, filter: ReservationListFilter) -> AppResult<Vec<Reservation>> {
        // 新しい申請から順に並べる
        let rows = sqlx::query_as::<_, ReservationRow>(select_reservations!(
            r#"
            WHERE ($1::VARCHAR IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(filter.status.map(|s| s.as_ref().to_string()))
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        let ids: Vec<ReservationId> = rows.iter().map(|r| r.reservation_id).collect();
        let mut history = self.find_communications(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let records = history.remove(&row.reservation_id).unwrap_or_default();
                row.into_reservation(records)
            })
            .collect()
    }

    async fn acquire_review_hold(&self, event: AcquireReviewHold) -> AppResult<HoldOutcome> {
        let hold = event.hold();

        for _ in 0..MAX_HOLD_ATTEMPTS {
            // ① ホールドが無い・期限切れ・本人のもの、のいずれかなら設定する。
            //    確認と設定を 1 つの UPDATE で行うので、同時に取得されることはない
            let acquired: Option<(ChangeKey,)> = sqlx::query_as(
                r#"
                    UPDATE reservations
                    SET
                        reviewing_by = $2,
                        review_expires_at = $3
                    WHERE reservation_id = $1
                      AND (
                        reviewing_by IS NULL
                        OR review_expires_at IS NULL
                        OR review_expires_at <= $4
                        OR LOWER(reviewing_by) = LOWER($2)
                      )
                    RETURNING change_key
                    ;
                "#,
            )
            .bind(event.reservation_id)
            .bind(&hold.reviewing_by)
            .bind(hold.review_expires_at)
            .bind(event.requested_at)
            .fetch_optional(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;

            if let Some((change_key,)) = acquired {
                return Ok(HoldOutcome::Acquired { hold, change_key });
            }

            // ② 設定できなかった理由を調べる
            let current: Option<(Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
                r#"
                    SELECT reviewing_by, review_expires_at
                    FROM reservations
                    WHERE reservation_id = $1
                "#,
            )
            .bind(event.reservation_id)
            .fetch_optional(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;

            let Some((reviewing_by, review_expires_at)) = current else {
                return Err(AppError::EntityNotFound(format!(
                    "予約（{}）が見つかりませんでした。",
                    event.reservation_id
                )));
            };
            match event.attempt(ReviewHold::from_columns(reviewing_by, review_expires_at).as_ref()) {
                HoldAttempt::Conflict(conflict) => return Ok(HoldOutcome::Conflict(conflict)),
                // ③ ①と②の間に解除・失効した。もう一度試す
                HoldAttempt::Available => {}
            }
        }

        Err(event.retries_exhausted())
    }

    async fn release_review_hold(&self, event: ReleaseReviewHold) -> AppResult<()> {
        // 本人以外・期限切れ後の解除は 0 行更新になるだけで、エラーにはしない
        sqlx::query(
            r#"
                UPDATE reservations
                SET
                    reviewing_by = NULL,
                    review_expires_at = NULL
                WHERE reservation_id = $1
                  AND LOWER(reviewing_by) = LOWER($2)
            "#,
        )
        .bind(event.reservation_id)
        .bind(&event.requested_by)
        .execute(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(())
    }

    async fn update(&self, event: UpdateReservation) -> AppResult<UpdateOutcome> {
        let current = self.fetch_existing(event.reservation_id).await?;
        if current.change_key != event.presented_change_key {
            return self
                .version_conflict(&event.presented_change_key, &current)
                .await;
        }
        let plan = event.plan(&current)?;
        self.write_planned(current, plan).await
    }

    async fn transition_status(&self, event: TransitionStatus) -> AppResult<UpdateOutcome> {
        let current = self.fetch_existing(event.reservation_id).await?;
        if current.change_key != event.presented_change_key {
            return self
                .version_conflict(&event.presented_change_key, &current)
                .await;
        }
        let plan = event.plan(&current)?;
        self.write_planned(current, plan).await
    }

    async fn append_communication(
        &self,
        reservation_id: ReservationId,
        record: CommunicationRecord,
    ) -> AppResult<()> {
        let res = sqlx::query(
            r#"
                INSERT INTO communication_history
                (reservation_id, sent_at, kind, success, recipients, subject)
                VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reservation_id)
        .bind(record.timestamp)
        .bind(record.kind.as_ref())
        .bind(record.success)
        .bind(Json(&record.recipients))
        .bind(&record.subject)
        .execute(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No communication record has been created".into(),
            ));
        }
        Ok(())
    }
}

impl ReservationRepositoryImpl {
    async fn fetch_existing(&self, reservation_id: ReservationId) -> AppResult<Reservation> {
        self.find_by_id(reservation_id).await?.ok_or_else(|| {
            AppError::EntityNotFound(format!("予約（{reservation_id}）が見つかりませんでした。"))
        })
    }

    // 提示された changeKey を前提とした書き込みを 1 回の条件付き UPDATE で行う
    async fn write_planned(
        &self,
        current: Reservation,
        plan: PlannedWrite,
    ) -> AppResult<UpdateOutcome> {
        let mut tx = self.db.begin().await?;

        let written: Option<(Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
                UPDATE reservations
                SET
                    status = $3,
                    fields = $4,
                    review_notes = $5,
                    change_key = $6,
                    last_modified_by = $7,
                    updated_at = $8,
                    reviewing_by = CASE
                        WHEN $9 OR LOWER(reviewing_by) = LOWER($7) THEN NULL
                        ELSE reviewing_by END,
                    review_expires_at = CASE
                        WHEN $9 OR LOWER(reviewing_by) = LOWER($7) THEN NULL
                        ELSE review_expires_at END
                WHERE reservation_id = $1
                  AND change_key = $2
                RETURNING reviewing_by, review_expires_at
                ;
            "#,
        )
        .bind(plan.reservation_id)
        .bind(&plan.expected_change_key)
        .bind(plan.status.as_ref())
        .bind(Json(&plan.fields))
        .bind(&plan.review_notes)
        .bind(&plan.change_key)
        .bind(&plan.modified_by)
        .bind(plan.modified_at)
        .bind(plan.hold_release == HoldRelease::Always)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        let Some((reviewing_by, review_expires_at)) = written else {
            // 読み込んでから書き込むまでの間に別の更新が入った
            drop(tx);
            let latest = self.fetch_existing(plan.reservation_id).await?;
            return self
                .version_conflict(&plan.expected_change_key, &latest)
                .await;
        };

        Self::insert_revision(&mut tx, &plan.revision()).await?;

        tx.commit().await.map_err(AppError::TransactionError)?;

        let mut reservation = plan.apply_to(&current);
        reservation.review_hold = ReviewHold::from_columns(reviewing_by, review_expires_at);
        Ok(UpdateOutcome::Updated {
            reservation,
            changes: plan.changes,
        })
    }

    async fn version_conflict(
        &self,
        presented: &ChangeKey,
        current: &Reservation,
    ) -> AppResult<UpdateOutcome> {
        let base: Option<ReservationRevision> = sqlx::query_as::<_, RevisionRow>(
            r#"
                SELECT reservation_id, change_key, fields, recorded_by, recorded_at
                FROM reservation_revisions
                WHERE reservation_id = $1 AND change_key = $2
            "#,
        )
        .bind(current.reservation_id)
        .bind(presented)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?
        .map(ReservationRevision::from);

        VersionConflict::between(base.as_ref(), current).map(UpdateOutcome::Conflict)
    }

    async fn insert_revision(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        revision: &ReservationRevision,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
                INSERT INTO reservation_revisions
                (reservation_id, change_key, fields, recorded_by, recorded_at)
                VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(revision.reservation_id)
        .bind(&revision.change_key)
        .bind(Json(&revision.fields))
        .bind(&revision.recorded_by)
        .bind(revision.recorded_at)
        .execute(&mut **tx)
        .await
        .map_err(AppError::SpecificOperationError)?;
        Ok(())
    }

    // 予約 ID ごとの通知履歴を、追記された順に取得する
    async fn find_communications(
        &self,
        reservation_ids: &[ReservationId],
    ) -> AppResult<HashMap<ReservationId, Vec<CommunicationRecord>>> {
        if reservation_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<uuid::Uuid> = reservation_ids.iter().map(|id| id.raw()).collect();
        let rows = sqlx::query_as::<_, CommunicationRow>(
            r#"
                SELECT reservation_id, sent_at, kind, success, recipients, subject
                FROM communication_history
                WHERE reservation_id = ANY($1)
                ORDER BY communication_id ASC
            "#,
        )
        .bind(ids)
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        let mut history: HashMap<ReservationId, Vec<CommunicationRecord>> = HashMap::new();
        for row in rows {
            let reservation_id = row.reservation_id;
            history
                .entry(reservation_id)
                .or_default()
                .push(CommunicationRecord::try_from(row)?);
        }
        Ok(history)
    }
}
