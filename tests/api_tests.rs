mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, ids, license, days_from_today};
use fleet_compliance::{
    MockIdentityProvider, MockStorageService,
    models::RoleType,
    repository::Repository,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn registration(email: &str, password: &str) -> serde_json::Value {
    json!({
        "organization_name": "Lone Star Freight",
        "dot_number": "1234567",
        "first_name": "Dana",
        "last_name": "Reyes",
        "email": email,
        "password": password,
    })
}

// --- Public routes ---

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));
}

#[tokio::test]
async fn test_register_creates_org_admin_and_login() {
    let app = TestApp::new();

    let (status, profile) = app
        .call(Method::POST, "/register", None, Some(registration("dana@lonestar.test", "correct-horse")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(profile["roles"][0]["role_type"], "admin");
    assert_eq!(profile["person"]["last_name"], "Reyes");

    let user_id: Uuid = profile["id"].as_str().unwrap().parse().unwrap();
    let (status, me) = app.get("/me", user_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "dana@lonestar.test");

    let org_id = me["roles"][0]["organization_id"].as_str().unwrap();
    let (status, org) = app.get(&format!("/organizations/{}", org_id), user_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(org["name"], "Lone Star Freight");
    assert_eq!(org["is_master"], false);

    let (status, token) = app
        .call(
            Method::POST,
            "/login",
            None,
            Some(json!({ "email": "dana@lonestar.test", "password": "correct-horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(token["access_token"].as_str().unwrap().starts_with("mock-token-"));
}

#[tokio::test]
async fn test_register_rejects_short_password_and_duplicate_email() {
    let app = TestApp::new();

    let (status, _) = app
        .call(Method::POST, "/register", None, Some(registration("a@b.test", "short")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(Method::POST, "/register", None, Some(registration("a@b.test", "long-enough")))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(Method::POST, "/register", None, Some(registration("A@B.test", "long-enough")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_failed_registration_leaves_no_carrier_behind() {
    let app = TestApp::new();
    let org = app.organization("Existing Carrier").await;
    let seat = app.seat(&org, RoleType::Admin, None).await;
    let taken = format!("{}@fleet.test", seat.party_id());

    // The provider has never seen this address, but a login already mirrors it.
    let (status, body) = app
        .call(Method::POST, "/register", None, Some(registration(&taken, "long-enough")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "record already exists");

    let organizations = app.repo.list_organizations().await.unwrap();
    assert_eq!(organizations.len(), 1);
    assert_eq!(organizations[0].id, org.id);
    assert_eq!(app.repo.get_stats().await.unwrap().total_users, 1);
}

#[tokio::test]
async fn test_login_with_bad_credentials_is_unauthorized() {
    let app = TestApp::new();
    let (status, _) = app
        .call(
            Method::POST,
            "/login",
            None,
            Some(json!({ "email": "nobody@x.test", "password": "whatever1" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_identity_outage_is_bad_gateway() {
    let app = TestApp::build(
        Arc::new(MockStorageService::new()),
        Arc::new(MockIdentityProvider::new_failing()),
    );
    let (status, body) = app
        .call(Method::POST, "/register", None, Some(registration("c@d.test", "long-enough")))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "identity provider unavailable");
}

// --- Authentication ---

#[tokio::test]
async fn test_authenticated_routes_require_a_user() {
    let app = TestApp::new();

    let (status, _) = app.call(Method::GET, "/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Unknown bypass ids fall through to the bearer check.
    let (status, _) = app.get("/me", Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(Method::GET, "/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = TestApp::new();
    let request = axum::http::Request::builder()
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::util::ServiceExt::oneshot(app.router.clone(), request).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

// --- Tenant isolation ---

#[tokio::test]
async fn test_admin_cannot_reach_another_tenant() {
    let app = TestApp::new();
    let mine = app.organization("Mine").await;
    let theirs = app.organization("Theirs").await;
    let admin = app.seat(&mine, RoleType::Admin, None).await;
    let driver = app.person(&theirs, RoleType::Driver, None, "Other").await;
    let record = app.issue(&theirs, driver.id, license(days_from_today(200))).await;

    let (status, _) = app.get(&format!("/organizations/{}", theirs.id), admin.user_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&format!("/organizations/{}/drivers", theirs.id), admin.user_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&format!("/issues/{}", record.issue.id), admin.user_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            &format!("/organizations/{}/drivers", theirs.id),
            admin.user_id,
            json!({ "first_name": "Sneaky", "last_name": "Hire" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, orgs) = app.get("/organizations", admin.user_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&orgs), vec![mine.id.to_string()]);
}

#[tokio::test]
async fn test_unknown_records_are_not_found() {
    let app = TestApp::new();
    let org = app.organization("Solo").await;
    let admin = app.seat(&org, RoleType::Admin, None).await;

    for uri in [
        format!("/organizations/{}", Uuid::new_v4()),
        format!("/issues/{}", Uuid::new_v4()),
        format!("/equipment/{}", Uuid::new_v4()),
        format!("/cafs/{}", Uuid::new_v4()),
        format!("/documents/{}/download", Uuid::new_v4()),
        format!("/organizations/{}/drivers/{}", org.id, Uuid::new_v4()),
    ] {
        let (status, _) = app.get(&uri, admin.user_id).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }
}

// --- Master organizations ---

#[tokio::test]
async fn test_master_seat_oversees_sub_organizations() {
    let app = TestApp::new();
    let (master, sub) = app.master_with_sub().await;
    let consultant = app.seat(&master, RoleType::Master, None).await;
    let driver = app.person(&sub, RoleType::Driver, None, "Managed").await;

    let (status, _) = app.get(&format!("/organizations/{}", sub.id), consultant.user_id).await;
    assert_eq!(status, StatusCode::OK);

    let (status, drivers) = app.get(&format!("/organizations/{}/drivers", sub.id), consultant.user_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&drivers), vec![driver.id.to_string()]);

    let (status, orgs) = app.get("/organizations", consultant.user_id).await;
    assert_eq!(status, StatusCode::OK);
    let visible = ids(&orgs);
    assert!(visible.contains(&master.id.to_string()));
    assert!(visible.contains(&sub.id.to_string()));

    let (status, created) = app
        .post(
            "/organizations",
            consultant.user_id,
            json!({ "name": "Second Carrier", "master_id": master.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["master_id"], master.id.to_string());
    assert_eq!(created["is_master"], false);
}

#[tokio::test]
async fn test_sub_organization_creation_rules() {
    let app = TestApp::new();
    let (master, sub) = app.master_with_sub().await;
    let carrier_admin = app.seat(&sub, RoleType::Admin, None).await;

    let (status, _) = app
        .post("/organizations", carrier_admin.user_id, json!({ "name": "Nope" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/organizations",
            carrier_admin.user_id,
            json!({ "name": "Nope", "master_id": sub.id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/organizations",
            carrier_admin.user_id,
            json!({ "name": "Nope", "master_id": master.id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// --- Location scoping ---

#[tokio::test]
async fn test_location_bound_staff_sees_only_their_location() {
    let app = TestApp::new();
    let org = app.organization("Two Yards").await;
    let north = app.location(&org, "North Yard").await;
    let south = app.location(&org, "South Yard").await;
    let staff = app.seat(&org, RoleType::Staff, Some(north.id)).await;
    let north_driver = app.person(&org, RoleType::Driver, Some(north.id), "North").await;
    let south_driver = app.person(&org, RoleType::Driver, Some(south.id), "South").await;

    let (status, drivers) = app.get(&format!("/organizations/{}/drivers", org.id), staff.user_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&drivers), vec![north_driver.id.to_string()]);

    let (status, _) = app
        .get(&format!("/organizations/{}/drivers/{}", org.id, north_driver.id), staff.user_id)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .get(&format!("/organizations/{}/drivers/{}", org.id, south_driver.id), staff.user_id)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            &format!("/organizations/{}/drivers", org.id),
            staff.user_id,
            json!({ "first_name": "New", "last_name": "South", "location_id": south.id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, member) = app
        .post(
            &format!("/organizations/{}/drivers", org.id),
            staff.user_id,
            json!({ "first_name": "New", "last_name": "North", "location_id": north.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(member["role_type"], "driver");
    assert_eq!(member["location_id"], north.id.to_string());

    // Admin roles cover the whole organization, so location staff cannot hand them out.
    let (status, _) = app
        .post(
            &format!("/organizations/{}/staff", org.id),
            staff.user_id,
            json!({ "first_name": "Boss", "last_name": "North", "role_type": "admin" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_master_and_admin_roles_take_no_location() {
    let app = TestApp::new();
    let operator = app.superuser().await;
    let (master, sub) = app.master_with_sub().await;
    let branch = app.location(&master, "Branch Office").await;
    let carrier_yard = app.location(&sub, "Carrier Yard").await;
    let consultant = app.seat(&master, RoleType::Staff, Some(branch.id)).await;

    let (status, _) = app
        .post(
            &format!("/organizations/{}/roles", master.id),
            operator,
            json!({ "party_id": consultant.party_id(), "role_type": "master", "location_id": branch.id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &format!("/organizations/{}/roles", sub.id),
            operator,
            json!({ "party_id": consultant.party_id(), "role_type": "admin", "location_id": carrier_yard.id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &format!("/organizations/{}/staff", sub.id),
            operator,
            json!({ "first_name": "Yard", "last_name": "Boss", "role_type": "admin", "location_id": carrier_yard.id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was granted, so the sub-organization stays out of reach.
    let (status, _) = app.get(&format!("/organizations/{}/dashboard", sub.id), consultant.user_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, role) = app
        .post(
            &format!("/organizations/{}/roles", master.id),
            operator,
            json!({ "party_id": consultant.party_id(), "role_type": "master" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(role["location_id"].is_null());

    let (status, _) = app.get(&format!("/organizations/{}/dashboard", sub.id), consultant.user_id).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_staff_at_two_locations_is_listed_once() {
    let app = TestApp::new();
    let org = app.organization("Twin Terminals").await;
    let admin = app.seat(&org, RoleType::Admin, None).await;
    let east = app.location(&org, "East").await;
    let west = app.location(&org, "West").await;
    let dispatcher = app.person(&org, RoleType::Staff, Some(east.id), "Dispatcher").await;

    let (status, _) = app
        .post(
            &format!("/organizations/{}/roles", org.id),
            admin.user_id,
            json!({ "party_id": dispatcher.id, "role_type": "staff", "location_id": west.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, staff) = app.get(&format!("/organizations/{}/staff", org.id), admin.user_id).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<&str> = staff
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    let dispatcher_id = dispatcher.id.to_string();
    assert_eq!(listed.iter().filter(|id| **id == dispatcher_id).count(), 1);
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_foreign_location_is_rejected() {
    let app = TestApp::new();
    let org = app.organization("Home").await;
    let other = app.organization("Away").await;
    let away_yard = app.location(&other, "Away Yard").await;
    let admin = app.seat(&org, RoleType::Admin, None).await;

    let (status, _) = app
        .post(
            &format!("/organizations/{}/drivers", org.id),
            admin.user_id,
            json!({ "first_name": "Lost", "last_name": "Driver", "location_id": away_yard.id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// --- Drivers ---

#[tokio::test]
async fn test_driver_sees_only_their_own_records() {
    let app = TestApp::new();
    let org = app.organization("Owner Operators").await;
    let driver = app.seat(&org, RoleType::Driver, None).await;
    let colleague = app.person(&org, RoleType::Driver, None, "Colleague").await;
    app.issue(&org, driver.party_id(), license(days_from_today(300))).await;
    app.issue(&org, colleague.id, license(days_from_today(300))).await;

    let (status, drivers) = app.get(&format!("/organizations/{}/drivers", org.id), driver.user_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&drivers), vec![driver.party_id().to_string()]);

    let (status, issues) = app.get(&format!("/organizations/{}/issues", org.id), driver.user_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(issues.as_array().unwrap().len(), 1);
    assert_eq!(issues[0]["party_id"], driver.party_id().to_string());

    let (status, summary) = app
        .get(
            &format!("/organizations/{}/drivers/{}/compliance", org.id, driver.party_id()),
            driver.user_id,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["license"]["badge"], "current");
    assert_eq!(summary["mvr"]["badge"], "missing");
    assert_eq!(summary["overall"], "missing");

    let (status, _) = app
        .get(&format!("/organizations/{}/drivers/{}", org.id, colleague.id), driver.user_id)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&format!("/organizations/{}/staff", org.id), driver.user_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&format!("/organizations/{}/dashboard", org.id), driver.user_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Viewing is not managing.
    let (status, _) = app
        .put(
            &format!("/organizations/{}/drivers/{}", org.id, driver.party_id()),
            driver.user_id,
            json!({ "phone": "555-0100" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ended_role_revokes_access() {
    let app = TestApp::new();
    let org = app.organization("Turnover Inc").await;
    let admin = app.seat(&org, RoleType::Admin, None).await;
    let driver = app.seat(&org, RoleType::Driver, None).await;
    let role = app.repo.roles_for_party(driver.party_id()).await.unwrap().remove(0);

    let (status, _) = app.get(&format!("/organizations/{}", org.id), driver.user_id).await;
    assert_eq!(status, StatusCode::OK);

    let (status, ended) = app.delete(&format!("/roles/{}", role.id), admin.user_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["is_active"], false);
    assert!(ended["end_date"].is_string());

    let (status, _) = app.get(&format!("/organizations/{}", org.id), driver.user_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The role stays listed for history.
    let (status, drivers) = app.get(&format!("/organizations/{}/drivers", org.id), admin.user_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drivers[0]["is_active"], false);
}

#[tokio::test]
async fn test_assign_role_and_create_login() {
    let app = TestApp::new();
    let org = app.organization("Growing Fleet").await;
    let admin = app.seat(&org, RoleType::Admin, None).await;
    let driver = app.person(&org, RoleType::Driver, None, "Promoted").await;

    let (status, role) = app
        .post(
            &format!("/organizations/{}/roles", org.id),
            admin.user_id,
            json!({ "party_id": driver.id, "role_type": "staff" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(role["role_type"], "staff");

    let (status, _) = app
        .post(
            &format!("/organizations/{}/roles", org.id),
            admin.user_id,
            json!({ "party_id": driver.id, "role_type": "master" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &format!("/organizations/{}/roles", org.id),
            admin.user_id,
            json!({
                "party_id": driver.id,
                "role_type": "driver",
                "start_date": "2025-06-01",
                "end_date": "2025-01-01"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, user) = app
        .post(
            &format!("/organizations/{}/users", org.id),
            admin.user_id,
            json!({ "party_id": driver.id, "email": "promoted@fleet.test", "password": "s3cret-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let new_user: Uuid = user["id"].as_str().unwrap().parse().unwrap();

    let (status, me) = app.get("/me", new_user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["roles"].as_array().unwrap().len(), 2);

    // Strangers cannot be given a login through this organization.
    let stranger = app.organization("Elsewhere").await;
    let outsider = app.person(&stranger, RoleType::Driver, None, "Outsider").await;
    let (status, _) = app
        .post(
            &format!("/organizations/{}/users", org.id),
            admin.user_id,
            json!({ "party_id": outsider.id, "email": "out@fleet.test", "password": "s3cret-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// --- Admin ---

#[tokio::test]
async fn test_admin_routes_are_superuser_only() {
    let app = TestApp::new();
    let org = app.organization("Regular").await;
    let admin = app.seat(&org, RoleType::Admin, None).await;
    let root = app.superuser().await;

    let (status, _) = app.get("/admin/stats", admin.user_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/admin/organizations", admin.user_id, json!({ "name": "Rogue Master" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, stats) = app.get("/admin/stats", root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_organizations"], 1);
    assert_eq!(stats["total_users"], 2);

    let (status, master) = app
        .post("/admin/organizations", root, json!({ "name": "Consulting Group" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(master["is_master"], true);

    let (status, _) = app
        .post(
            "/admin/organizations",
            root,
            json!({ "name": "Nested", "master_id": master["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, all) = app.get("/admin/organizations", root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    // Superusers pass every tenant check.
    let (status, _) = app.get(&format!("/organizations/{}/dashboard", org.id), root).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = TestApp::new();
    let (status, doc) = app.call(Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/organizations/{id}/issues"].is_object());
    assert!(doc["paths"]["/cafs/{id}/sign"].is_object());
}
