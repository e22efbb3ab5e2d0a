use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

use listsync::keep::auth::KeepSecret;
use listsync::load_config::load_config;
use listsync_core::synchronise::ListPair;

const VARS: &[&str] = &[
    "GKEEP_EMAIL",
    "GKEEP_PASSWORD",
    "GKEEP_MASTER_TOKEN",
    "GKEEP_ANDROID_ID",
    "SYNC_LIST_NAMES",
    "GKEEP_LIST_TITLE",
    "REMINDERS_LIST_NAME",
    "APPLE_ID",
    "APPLE_PASSWORD",
    "APPLE_2FA_CODE",
    "ICLOUD_COOKIE_DIR",
    "SCHEDULE_INTERVAL_MINUTES",
    "SERVER_PORT",
];

fn clean_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

fn keep_env() {
    clean_env();
    env::set_var("GKEEP_EMAIL", "me@example.com");
    env::set_var("GKEEP_PASSWORD", "app-password");
}

#[test]
#[serial]
fn defaults_to_single_groceries_pair() {
    keep_env();

    let config = load_config(None).expect("Config should load");

    assert_eq!(config.keep.email, "me@example.com");
    assert_eq!(config.keep.secret, KeepSecret::Password("app-password".into()));
    assert_eq!(config.keep.android_id, "0123456789abcdef");
    assert_eq!(config.pairs, vec![ListPair::new("Groceries", "Groceries")]);
    assert!(config.sync_list_names.is_empty());
    assert_eq!(config.interval_minutes, 5);
    assert_eq!(config.server_port, 5000);
    assert!(config.icloud.is_none());
    assert!(config.require_icloud().is_err());
}

#[test]
#[serial]
fn master_token_is_preferred_and_empty_values_are_unset() {
    keep_env();
    env::set_var("GKEEP_MASTER_TOKEN", "aas_et/token");
    env::set_var("GKEEP_LIST_TITLE", "");
    env::set_var("SYNC_LIST_NAMES", "");

    let config = load_config(None).expect("Config should load");

    assert_eq!(config.keep.secret, KeepSecret::MasterToken("aas_et/token".into()));
    assert_eq!(config.pairs, vec![ListPair::new("Groceries", "Groceries")]);
}

#[test]
#[serial]
fn sync_list_names_map_one_to_one() {
    keep_env();
    env::set_var("SYNC_LIST_NAMES", " Groceries, ,Hardware ");
    env::set_var("GKEEP_LIST_TITLE", "Ignored");

    let config = load_config(None).expect("Config should load");

    assert_eq!(
        config.pairs,
        vec![
            ListPair::new("Groceries", "Groceries"),
            ListPair::new("Hardware", "Hardware"),
        ]
    );
    assert_eq!(config.sync_list_names, vec!["Groceries", "Hardware"]);
}

#[test]
#[serial]
fn single_list_mode_uses_both_names() {
    keep_env();
    env::set_var("GKEEP_LIST_TITLE", "Einkauf");
    env::set_var("REMINDERS_LIST_NAME", "Shopping");

    let config = load_config(None).expect("Config should load");

    assert_eq!(config.pairs, vec![ListPair::new("Einkauf", "Shopping")]);
}

#[test]
#[serial]
fn missing_email_is_reported() {
    clean_env();
    env::set_var("GKEEP_PASSWORD", "pw");

    let err = load_config(None).expect_err("Config should fail");
    assert!(err.to_string().contains("GKEEP_EMAIL"), "got: {err}");
}

#[test]
#[serial]
fn missing_keep_secret_is_reported() {
    clean_env();
    env::set_var("GKEEP_EMAIL", "me@example.com");

    let err = load_config(None).expect_err("Config should fail");
    assert!(err.to_string().contains("GKEEP_PASSWORD or GKEEP_MASTER_TOKEN"), "got: {err}");
}

#[test]
#[serial]
fn icloud_credentials_are_read_when_complete() {
    keep_env();
    env::set_var("APPLE_ID", "me@icloud.com");
    env::set_var("APPLE_PASSWORD", "apple-pw");
    env::set_var("APPLE_2FA_CODE", " 123456 ");
    env::set_var("ICLOUD_COOKIE_DIR", "/tmp/listsync-cookies");

    let config = load_config(None).expect("Config should load");
    let icloud = config.require_icloud().expect("iCloud configured");

    assert_eq!(icloud.apple_id, "me@icloud.com");
    assert_eq!(icloud.password, "apple-pw");
    assert_eq!(icloud.two_factor_code.as_deref(), Some("123456"));
    assert_eq!(icloud.cookie_dir, PathBuf::from("/tmp/listsync-cookies"));
}

#[test]
#[serial]
fn apple_id_without_password_is_not_enough() {
    keep_env();
    env::set_var("APPLE_ID", "me@icloud.com");

    let config = load_config(None).expect("Config should load");
    let err = config.require_icloud().expect_err("iCloud incomplete");
    assert!(err.to_string().contains("APPLE_PASSWORD"));
}

#[test]
#[serial]
fn interval_below_one_falls_back_and_garbage_is_rejected() {
    keep_env();
    env::set_var("SCHEDULE_INTERVAL_MINUTES", "0");
    assert_eq!(load_config(None).unwrap().interval_minutes, 5);

    env::set_var("SCHEDULE_INTERVAL_MINUTES", "15");
    assert_eq!(load_config(None).unwrap().interval_minutes, 15);

    env::set_var("SCHEDULE_INTERVAL_MINUTES", "often");
    let err = load_config(None).expect_err("non-integer interval");
    assert!(err.to_string().contains("SCHEDULE_INTERVAL_MINUTES"), "got: {err}");
}

#[test]
#[serial]
fn oversized_interval_is_rejected() {
    keep_env();
    env::set_var("SCHEDULE_INTERVAL_MINUTES", "400000000000000000");
    let err = load_config(None).expect_err("interval past the maximum");
    assert!(err.to_string().contains("SCHEDULE_INTERVAL_MINUTES"), "got: {err}");

    env::set_var("SCHEDULE_INTERVAL_MINUTES", "525600");
    assert_eq!(load_config(None).unwrap().interval_minutes, 525_600);
}

#[test]
#[serial]
fn invalid_server_port_is_rejected() {
    keep_env();
    env::set_var("SERVER_PORT", "99999");
    assert!(load_config(None).is_err());

    env::set_var("SERVER_PORT", "8080");
    assert_eq!(load_config(None).unwrap().server_port, 8080);
}

#[test]
#[serial]
fn yaml_file_supplies_pairs_and_interval() {
    keep_env();
    let config_yaml = r#"
interval_minutes: 10
lists:
  - keep: Groceries
    reminders: Shopping
  - keep: Hardware
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(Some(config_file.path())).expect("Config should load");

    assert_eq!(
        config.pairs,
        vec![
            ListPair::new("Groceries", "Shopping"),
            ListPair::new("Hardware", "Hardware"),
        ]
    );
    assert_eq!(config.interval_minutes, 10);
}

#[test]
#[serial]
fn environment_overrides_yaml_file() {
    keep_env();
    env::set_var("SYNC_LIST_NAMES", "Pharmacy");
    env::set_var("SCHEDULE_INTERVAL_MINUTES", "2");
    let config_file = NamedTempFile::new().expect("temp file");
    write(
        config_file.path(),
        "interval_minutes: 10\nlists:\n  - keep: Groceries\n",
    )
    .unwrap();

    let config = load_config(Some(config_file.path())).expect("Config should load");

    assert_eq!(config.pairs, vec![ListPair::new("Pharmacy", "Pharmacy")]);
    assert_eq!(config.interval_minutes, 2);
}

#[test]
#[serial]
fn unreadable_or_invalid_yaml_fails() {
    keep_env();
    let err = load_config(Some(std::path::Path::new("does-not-exist.yaml")))
        .expect_err("missing file");
    assert!(err.to_string().contains("Failed to read config file"));

    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "lists: [oops").unwrap();
    let err = load_config(Some(config_file.path())).expect_err("bad yaml");
    assert!(err.to_string().contains("Failed to parse config YAML"));
}
