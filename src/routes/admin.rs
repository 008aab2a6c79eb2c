use crate::{AppState, handlers::admin};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Platform operator endpoints. Authentication comes from the layer applied in
/// `create_router`; every handler additionally rejects non-superusers with 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Organization, user, driver, equipment, open issue and pending CAF counters.
        .route("/stats", get(admin::get_admin_stats))
        // GET|POST /admin/organizations
        // Every tenant; creation of master (consulting) organizations.
        .route(
            "/organizations",
            get(admin::list_all_organizations).post(admin::create_master_organization),
        )
}
