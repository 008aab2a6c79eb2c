use crate::{
    AppState,
    auth::AuthUser,
    handlers::{account, cafs, equipment, issues, members, organizations},
    models::{IssueFilter, IssueType},
};
use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{delete, get, post},
};
use uuid::Uuid;

/// Authenticated Router Module
///
/// Every route here sits behind the auth middleware, so handlers always receive a
/// resolved `AuthUser`. Tenant isolation is not a router concern: each handler loads
/// its record and asks the access policy before touching data.
pub fn authenticated_routes() -> Router<AppState> {
    let router = Router::<AppState>::new()
        // --- Current user ---
        .route("/me", get(account::get_me))
        .route("/me/cafs", get(account::get_my_cafs))
        // --- Organizations & locations ---
        .route(
            "/organizations",
            get(organizations::list_organizations).post(organizations::create_organization),
        )
        .route(
            "/organizations/{id}",
            get(organizations::get_organization).put(organizations::update_organization),
        )
        .route(
            "/organizations/{id}/locations",
            get(organizations::list_locations).post(organizations::create_location),
        )
        .route("/organizations/{id}/dashboard", get(organizations::get_dashboard))
        // --- People ---
        .route(
            "/organizations/{id}/drivers",
            get(members::list_drivers).post(members::create_driver),
        )
        .route(
            "/organizations/{id}/drivers/{party_id}",
            get(members::get_driver).put(members::update_driver),
        )
        .route(
            "/organizations/{id}/drivers/{party_id}/compliance",
            get(members::get_driver_compliance),
        )
        .route(
            "/organizations/{id}/staff",
            get(members::list_staff).post(members::create_staff),
        )
        .route("/organizations/{id}/roles", post(members::assign_role))
        .route("/roles/{id}", delete(members::end_role))
        .route("/organizations/{id}/users", post(account::create_user))
        // --- Equipment & maintenance ---
        .route(
            "/organizations/{id}/equipment",
            get(equipment::list_equipment).post(equipment::create_equipment),
        )
        .route(
            "/equipment/{id}",
            get(equipment::get_equipment).put(equipment::update_equipment),
        )
        .route(
            "/equipment/{id}/maintenance",
            get(equipment::get_maintenance).post(equipment::record_maintenance),
        )
        .route("/maintenance/schedules", get(equipment::get_schedules))
        // --- Issues ---
        .route(
            "/organizations/{id}/issues",
            get(issues::list_issues).post(issues::create_issue),
        )
        .route(
            "/issues/{id}",
            get(issues::get_issue)
                .put(issues::update_issue)
                .delete(issues::delete_issue),
        )
        .route(
            "/issues/{id}/violations",
            get(issues::list_violations).post(issues::add_violation),
        )
        .route(
            "/issues/{id}/documents",
            get(issues::list_documents).post(issues::upload_document),
        )
        .route("/documents/{id}/download", get(issues::download_document))
        // --- Corrective action forms ---
        .route("/organizations/{id}/cafs", get(cafs::list_cafs))
        .route("/issues/{id}/cafs", post(cafs::create_caf))
        .route("/issues/{id}/cafs/generate", post(cafs::generate_cafs))
        .route("/cafs/{id}", get(cafs::get_caf))
        .route("/cafs/{id}/assign", post(cafs::assign_caf))
        .route("/cafs/{id}/sign", post(cafs::sign_caf))
        .route("/cafs/{id}/approve", post(cafs::approve_caf))
        .route("/cafs/{id}/reject", post(cafs::reject_caf));

    // GET /organizations/{id}/licenses, /mvrs, /trainings, /drug-alcohol,
    // /roadside-inspections, /accidents
    IssueType::ALL.into_iter().fold(router, |router, issue_type| {
        router.route(
            &format!("/organizations/{{id}}/{}", issue_type.segment()),
            get(
                move |auth: AuthUser,
                      State(state): State<AppState>,
                      Path(id): Path<Uuid>,
                      Query(filter): Query<IssueFilter>| async move {
                    issues::list_issues_of_type(issue_type, auth, state, id, filter).await
                },
            ),
        )
    })
}
