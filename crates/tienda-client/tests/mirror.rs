//! ---
//! tienda_section: "06-client-mirror"
//! tienda_subsection: "integration-tests"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "License mirror fetch and fallback tests."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use serde_json::json;
use tienda_client::{LicenseClient, LicenseMirror, MirrorOrigin};
use tienda_licensing::License;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn public_license(is_valid: bool, expires_at: &str) -> serde_json::Value {
    json!({
        "clientName": "Farmacia del Puerto",
        "tier": "premium",
        "modules": {"caja": true, "reportes": true, "delivery": false},
        "features": {"maxUsers": 8, "multiStore": false},
        "expiresAt": expires_at,
        "active": true,
        "isExpired": !is_valid,
        "isValid": is_valid
    })
}

#[tokio::test]
async fn mirrors_served_license() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/license"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(public_license(true, "2999-01-01T00:00:00Z")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mirror = LicenseMirror::fetch(&server.uri()).await;
    assert!(mirror.is_valid());
    assert_eq!(mirror.tier().as_str(), "premium");
    assert!(mirror.is_module_enabled("caja"));
    assert!(!mirror.is_module_enabled("delivery"));
    assert!(!mirror.is_module_enabled("compras"));
    assert!(mirror.has_capacity("maxUsers", 7));
    assert_eq!(mirror.modules().len(), 3);
    assert!(matches!(
        mirror.snapshot().origin,
        MirrorOrigin::Remote { .. }
    ));
}

#[tokio::test]
async fn expired_license_is_evaluated_locally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/license"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(public_license(false, "2001-01-01T00:00:00Z")),
        )
        .mount(&server)
        .await;

    let mirror = LicenseMirror::fetch(&server.uri()).await;
    assert!(!mirror.is_valid());
    assert!(!mirror.is_module_enabled("caja"));
}

#[tokio::test]
async fn server_error_falls_back_to_default_license() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mirror = LicenseMirror::fetch(&server.uri()).await;
    let snapshot = mirror.snapshot();
    assert_eq!(
        snapshot.origin,
        MirrorOrigin::Fallback {
            reason: "status".into()
        }
    );
    assert_eq!(snapshot.license, License::fallback());
    assert!(mirror.is_valid());
    assert!(!mirror.is_module_enabled("caja"));
}

#[tokio::test]
async fn malformed_body_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let mirror = LicenseMirror::fetch(&server.uri()).await;
    assert_eq!(
        mirror.snapshot().origin,
        MirrorOrigin::Fallback {
            reason: "malformed".into()
        }
    );
}

#[tokio::test]
async fn unreachable_server_falls_back() {
    let mirror = LicenseMirror::fetch("http://127.0.0.1:9").await;
    assert!(mirror.snapshot().origin != MirrorOrigin::Local);
    assert_eq!(mirror.tier().as_str(), "basic");
    assert!(!mirror.is_module_enabled("reportes"));
}

#[tokio::test]
async fn reload_and_replace_swap_the_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pos/api/license"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(public_license(true, "2999-01-01")),
        )
        .mount(&server)
        .await;

    let mirror = LicenseMirror::from_license(License::fallback());
    assert!(!mirror.is_module_enabled("reportes"));

    let client = LicenseClient::new(&format!("{}/pos", server.uri())).unwrap();
    assert!(client.endpoint().as_str().ends_with("/pos/api/license"));
    mirror.reload(&client).await;
    assert!(mirror.is_module_enabled("reportes"));

    mirror.replace(License::fallback());
    assert_eq!(mirror.snapshot().origin, MirrorOrigin::Local);
    assert!(!mirror.is_module_enabled("reportes"));
}
