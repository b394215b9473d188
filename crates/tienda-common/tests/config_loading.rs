//! ---
//! tienda_section: "01-core-functionality"
//! tienda_subsection: "integration-tests"
//! tienda_type: "source"
//! tienda_scope: "code"
//! tienda_description: "Configuration discovery tests."
//! tienda_version: "v0.0.0-prealpha"
//! tienda_owner: "tbd"
//! ---
use std::fs;

use tienda_common::config::AppConfig;

#[test]
fn first_existing_candidate_wins() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("tienda.toml");
    fs::write(
        &present,
        r#"
        [license]
        path = "/var/lib/tienda/license.json"

        [modules.optional.caja]
        enabled = true
        "#,
    )
    .unwrap();

    let loaded = AppConfig::load_with_source(&[missing, present.clone()]).unwrap();
    assert_eq!(loaded.source.as_deref(), Some(present.as_path()));
    assert!(loaded.config.modules.optional["caja"].enabled);
    assert_eq!(
        loaded.config.license.path.as_deref(),
        Some(std::path::Path::new("/var/lib/tienda/license.json"))
    );
}

#[test]
fn no_candidates_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = AppConfig::load_with_source(&[dir.path().join("absent.toml")]).unwrap();
    assert!(loaded.source.is_none());
    assert!(loaded.config.api.enabled);
}

#[test]
fn malformed_candidate_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[modules\nstrict = maybe").unwrap();
    let err = AppConfig::load_with_source(&[path]).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}
