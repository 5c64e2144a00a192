use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use github_viewer::config::{Config, ConfigLoader};
use github_viewer::error::ViewerError;

#[test]
fn reads_explicit_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("github-viewer.json");
    std::fs::write(
        &path,
        r#"{
            "api_base_url": "http://127.0.0.1:9000/",
            "request_timeout_secs": 5,
            "search_debounce_ms": 250,
            "data_dir": "/var/tmp/ghv",
            "verify_archives": false
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.api_base_url, "http://127.0.0.1:9000");
    assert_eq!(resolved.request_timeout, Duration::from_secs(5));
    assert_eq!(resolved.search_debounce, Duration::from_millis(250));
    assert_eq!(resolved.data_dir, Some(Utf8PathBuf::from("/var/tmp/ghv")));
    assert!(!resolved.verify_archives);
}

#[test]
fn missing_explicit_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(ViewerError::ConfigRead(_))
    );
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(ViewerError::ConfigParse(_))
    );
}

#[test]
fn rejects_invalid_values() {
    let zero_timeout = Config {
        request_timeout_secs: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(zero_timeout),
        Err(ViewerError::ConfigParse(_))
    );

    let ftp = Config {
        api_base_url: Some("ftp://example.com".to_string()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(ftp),
        Err(ViewerError::ConfigParse(_))
    );
}
