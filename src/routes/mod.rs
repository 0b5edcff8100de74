use crate::models::AppState;
use axum::Router;

pub mod admin_routes;
pub mod auth_routes;
pub mod booking_routes;
pub mod test_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1/admin", admin_routes::router())
        .nest("/api/v1", test_routes::router())
        .nest("/api/v1", booking_routes::router())
        .with_state(state)
}
