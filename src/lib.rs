use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain rules, independent of HTTP and storage.
pub mod access;
pub mod caf;
pub mod compliance;
pub mod maintenance;

// Services and plumbing.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod repository;
pub mod storage;

pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use identity::{GoTrueClient, IdentityState, MockIdentityProvider};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every `#[utoipa::path]` handler, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::account::register, handlers::account::login, handlers::account::get_me,
        handlers::account::get_my_cafs, handlers::account::create_user,
        handlers::organizations::list_organizations, handlers::organizations::create_organization,
        handlers::organizations::get_organization, handlers::organizations::update_organization,
        handlers::organizations::list_locations, handlers::organizations::create_location,
        handlers::organizations::get_dashboard,
        handlers::members::list_drivers, handlers::members::create_driver,
        handlers::members::get_driver, handlers::members::update_driver,
        handlers::members::get_driver_compliance, handlers::members::list_staff,
        handlers::members::create_staff, handlers::members::assign_role, handlers::members::end_role,
        handlers::equipment::list_equipment, handlers::equipment::create_equipment,
        handlers::equipment::get_equipment, handlers::equipment::update_equipment,
        handlers::equipment::get_maintenance, handlers::equipment::record_maintenance,
        handlers::equipment::get_schedules,
        handlers::issues::list_issues, handlers::issues::create_issue, handlers::issues::get_issue,
        handlers::issues::update_issue, handlers::issues::delete_issue,
        handlers::issues::list_violations, handlers::issues::add_violation,
        handlers::issues::list_documents, handlers::issues::upload_document,
        handlers::issues::download_document,
        handlers::cafs::list_cafs, handlers::cafs::create_caf, handlers::cafs::generate_cafs,
        handlers::cafs::get_caf, handlers::cafs::assign_caf, handlers::cafs::sign_caf,
        handlers::cafs::approve_caf, handlers::cafs::reject_caf,
        handlers::admin::get_admin_stats, handlers::admin::list_all_organizations,
        handlers::admin::create_master_organization,
    ),
    components(
        schemas(
            models::Organization, models::Location, models::CreateOrganizationRequest,
            models::UpdateOrganizationRequest, models::CreateLocationRequest,
            models::Person, models::User, models::Role, models::RoleType, models::Member,
            models::CreatePersonRequest, models::UpdatePersonRequest, models::AssignRoleRequest,
            models::CreateUserRequest, models::RegisterRequest, models::LoginRequest,
            models::UserProfile, models::DriverProfile,
            models::Equipment, models::EquipmentCategory, models::CreateEquipmentRequest,
            models::UpdateEquipmentRequest, models::MaintenanceRecord, models::ServiceLevel,
            models::RecordMaintenanceRequest,
            models::Issue, models::IssueType, models::IssueStatus, models::Priority, models::PartyType,
            models::DrugTestType, models::DrugTestResult,
            models::IssueDetail, models::IssueRecord, models::LicenseDetail, models::MvrDetail,
            models::TrainingDetail, models::DrugAlcoholDetail, models::RoadsideInspectionDetail,
            models::AccidentDetail, models::Violation, models::Document,
            models::CreateIssueRequest, models::UpdateIssueRequest, models::CreateViolationRequest,
            models::UploadDocumentRequest, models::UploadDocumentResponse,
            models::DownloadUrlResponse,
            models::Caf, models::CafStatus, models::CreateCafRequest, models::AssignCafRequest,
            models::SignCafRequest, models::ReviewCafRequest,
            models::OrganizationDashboard, models::IssueTypeCount, models::PlatformStats,
            compliance::DriverCompliance, compliance::CredentialStatus, compliance::Badge,
            maintenance::MaintenanceOverview, maintenance::ServiceDue, maintenance::DueStatus,
            maintenance::ScheduleInterval, identity::TokenResponse,
        )
    ),
    tags(
        (name = "fleet-compliance", description = "DOT driver and vehicle compliance API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container of every service a handler may need. Components are
/// projected out through the `FromRef` impls below.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// Object storage for compliance documents.
    pub storage: StorageState,
    /// External auth provider owning passwords.
    pub identity: IdentityState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Route layer for the authenticated and admin routers. Extracting `AuthUser` rejects
/// the request with 401 before any handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routers, the auth layer and the observability stack around the state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    // Request id is set first so the trace span and the response both carry it.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, tagged with method, URI and `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
