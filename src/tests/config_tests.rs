// Discovery options tests - defaults, load/save round trip through files

use crate::{DiscoveryOptions, Error, MappingError, PortMapper};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_options_default() {
    let options = DiscoveryOptions::default();

    assert!(options.upnp_enabled);
    assert!(options.nat_pmp_enabled);
    assert_eq!(options.upnp_timeout_ms, 5000);
    assert_eq!(options.nat_pmp_timeout_ms, 2000);
    assert_eq!(options.upnp_timeout(), Duration::from_secs(5));
    assert_eq!(options.nat_pmp_timeout(), Duration::from_secs(2));
}

#[test]
fn test_options_load_missing_file_returns_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("does-not-exist.json");

    let options = DiscoveryOptions::load(&path).expect("Failed to load");
    assert_eq!(options, DiscoveryOptions::default());
}

#[test]
fn test_options_load_empty_file_returns_default() {
    let file = NamedTempFile::new().unwrap();

    let options = DiscoveryOptions::load(file.path()).expect("Failed to load");
    assert_eq!(options, DiscoveryOptions::default());
}

#[test]
fn test_options_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("portmapper.json");

    let options = DiscoveryOptions {
        upnp_enabled: false,
        nat_pmp_timeout_ms: 750,
        ..Default::default()
    };
    options.save(&path).expect("Failed to save");

    let loaded = DiscoveryOptions::load(&path).expect("Failed to load");
    assert_eq!(loaded, options);
    assert_eq!(loaded.nat_pmp_timeout(), Duration::from_millis(750));
}

#[test]
fn test_options_partial_file_uses_defaults() {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), r#"{ "nat_pmp_enabled": false }"#).unwrap();

    let options = DiscoveryOptions::load(file.path()).expect("Failed to load");
    assert!(options.upnp_enabled);
    assert!(!options.nat_pmp_enabled);
    assert_eq!(options.upnp_timeout_ms, 5000);
}

#[test]
fn test_options_invalid_json() {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "not json").unwrap();

    match DiscoveryOptions::load(file.path()) {
        Err(Error::Config(msg)) => assert!(msg.contains("Failed to parse options")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_options_save_under_file_is_io_error() {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().join("portmapper.json");

    let result = DiscoveryOptions::default().save(&path);
    assert!(matches!(result, Err(Error::Io(_))), "got {:?}", result);
}

#[tokio::test]
async fn test_discover_from_file_with_everything_disabled() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("portmapper.json");
    std::fs::write(&path, r#"{"upnp_enabled": false, "nat_pmp_enabled": false}"#).unwrap();

    match PortMapper::discover_from_file(&path).await {
        Err(Error::Mapping(MappingError::NoGateway { upnp, pmp })) => {
            assert_eq!(upnp, MappingError::Disabled.to_string());
            assert_eq!(pmp, MappingError::Disabled.to_string());
        }
        Err(other) => panic!("expected NoGateway, got {:?}", other),
        Ok(_) => panic!("discovery should fail with both families disabled"),
    }
}

#[tokio::test]
async fn test_discover_from_file_reports_bad_options() {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "{ broken").unwrap();

    let result = PortMapper::discover_from_file(file.path()).await;
    assert!(matches!(result, Err(Error::Config(_))));
}
