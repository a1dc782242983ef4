use crate::model::{
    id::ReservationId,
    reservation::{
        event::{
            AcquireReviewHold, CreateReservation, ReleaseReviewHold, TransitionStatus,
            UpdateReservation,
        },
        review::{HoldOutcome, UpdateOutcome},
        CommunicationRecord, Reservation, ReservationListFilter,
    },
};
use async_trait::async_trait;
use shared::error::AppResult;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    // 予約申請を登録する
    async fn create(&self, event: CreateReservation) -> AppResult<Reservation>;
    async fn find_by_id(&self, reservation_id: ReservationId) -> AppResult<Option<Reservation>>;
    async fn find_all(&self, filter: ReservationListFilter) -> AppResult<Vec<Reservation>>;
    // レビュー中ホールドを取得する。確認と設定は 1 回の条件付き書き込みで行う
    async fn acquire_review_hold(&self, event: AcquireReviewHold) -> AppResult<HoldOutcome>;
    // 本人のホールドであれば解除する。それ以外は何もしない
    async fn release_review_hold(&self, event: ReleaseReviewHold) -> AppResult<()>;
    // 提示された changeKey が現在の値と一致する場合だけ業務フィールドを更新する
    async fn update(&self, event: UpdateReservation) -> AppResult<UpdateOutcome>;
    // 承認・却下・取消。更新と同じく changeKey で競合を検出する
    async fn transition_status(&self, event: TransitionStatus) -> AppResult<UpdateOutcome>;
    // 通知履歴に追記する（changeKey は変わらない）
    async fn append_communication(
        &self,
        reservation_id: ReservationId,
        record: CommunicationRecord,
    ) -> AppResult<()>;
}
