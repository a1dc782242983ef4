use axum::{
    routing::{get, post, put},
    Router,
};
use registry::AppRegistry;

use crate::handler::{
    reservation::{
        approve_reservation, cancel_reservation, register_reservation, reject_reservation,
        resubmit_reservation, show_reservation, show_reservation_list, update_reservation,
    },
    review::{release_review, start_review},
};

pub fn build_reservation_routers() -> Router<AppRegistry> {
    let reservations_routers = Router::new()
        .route("/", post(register_reservation))
        .route("/", get(show_reservation_list))
        .route("/:reservation_id", get(show_reservation))
        .route("/:reservation_id", put(update_reservation))
        .route("/:reservation_id/start-review", post(start_review))
        .route("/:reservation_id/release-review", post(release_review))
        .route("/:reservation_id/approve", post(approve_reservation))
        .route("/:reservation_id/reject", post(reject_reservation))
        .route("/:reservation_id/cancel", post(cancel_reservation))
        .route("/:reservation_id/resubmit", post(resubmit_reservation));

    Router::new().nest("/reservations", reservations_routers)
}
