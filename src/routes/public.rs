use crate::{AppState, handlers::account};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Unauthenticated endpoints. None of them read tenant data.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Self-service carrier sign-up: provider account, organization, first admin.
        .route("/register", post(account::register))
        // POST /login
        // Password grant forwarded to the auth provider.
        .route("/login", post(account::login))
}
