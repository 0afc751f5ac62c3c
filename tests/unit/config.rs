use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use console_gateway::i18n::Locale;
use console_gateway::{Config, ConfigLocation, Error, Gateway, read_config};

#[tokio::test]
async fn config_file_is_read() {
    let cfg = serde_json::json!({
        "api_base": "https://console.example.com/api",
        "app_base": "/admin",
        "locale": "zh-CN",
        "timeout_secs": 5
    });
    let mut cfg_path = PathBuf::from("target");
    cfg_path.push(format!("test-config-{}.json", uuid::Uuid::new_v4()));
    fs::create_dir_all("target").ok();
    fs::write(&cfg_path, serde_json::to_string(&cfg).unwrap()).unwrap();

    let config = read_config(ConfigLocation::File(cfg_path.to_string_lossy().to_string()))
        .await
        .expect("config parses");

    assert_eq!(config.api_base, "https://console.example.com/api");
    assert_eq!(config.app_base, "/admin");
    assert_eq!(config.locale, Locale::ZhCn);
    assert_eq!(config.timeout(), Duration::from_secs(5));
    assert!(config.storage_path.is_none());
    fs::remove_file(&cfg_path).ok();
}

#[test]
fn defaults_apply_when_fields_are_missing() {
    let config: Config =
        serde_json::from_str(r#"{"api_base": "http://localhost:8080/api"}"#).unwrap();
    assert_eq!(config.app_base, "");
    assert_eq!(config.locale, Locale::EnUs);
    assert_eq!(config.timeout(), Duration::from_secs(30));
}

#[test]
fn invalid_api_base_fails_fast() {
    let err = match Gateway::builder(Config::from_values("://not-a-valid-url", "/admin")).build() {
        Ok(_) => panic!("expected invalid URL error"),
        Err(err) => err,
    };

    match err {
        Error::Config(msg) => assert!(msg.contains("Invalid API base URL")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn unknown_locale_is_a_config_error() {
    assert!(matches!("fr-FR".parse::<Locale>(), Err(Error::Config(_))));
}

#[test]
fn env_config_is_read() {
    // The only test in this binary that touches the process environment.
    unsafe {
        std::env::set_var("CONSOLE_API_BASE", "http://127.0.0.1:8080/api");
        std::env::set_var("CONSOLE_APP_BASE", "/admin");
        std::env::set_var("CONSOLE_LOCALE", "zh_CN");
        std::env::set_var("CONSOLE_TIMEOUT_SECS", "12");
    }
    let config = Config::from_env().expect("env config");
    unsafe {
        for key in [
            "CONSOLE_API_BASE",
            "CONSOLE_APP_BASE",
            "CONSOLE_LOCALE",
            "CONSOLE_TIMEOUT_SECS",
        ] {
            std::env::remove_var(key);
        }
    }

    assert_eq!(config.api_base, "http://127.0.0.1:8080/api");
    assert_eq!(config.app_base, "/admin");
    assert_eq!(config.locale, Locale::ZhCn);
    assert_eq!(config.timeout(), Duration::from_secs(12));
    assert!(config.download_dir.is_none());
}

#[test]
fn build_outside_runtime_is_an_error() {
    let err = match Gateway::builder(Config::from_values("http://localhost/api", "/")).build() {
        Ok(_) => panic!("expected a missing runtime error"),
        Err(err) => err,
    };

    match err {
        Error::Config(msg) => assert!(msg.contains("tokio runtime")),
        other => panic!("unexpected error: {:?}", other),
    }
}
