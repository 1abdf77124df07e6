use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::Error;

fn cleanup_all_mirror_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("MIRROR__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = MirrorConfig::default();

    assert_eq!(config.coordination.root, "/npm_cache_share");
    assert_eq!(config.coordination.connect_string, "127.0.0.1:2181");
    assert_eq!(config.retry.write_back.max_retries, 3);
    assert!(!config.dispatcher.log_notifications);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_mirror_env_vars();
    with_vars(
        vec![
            ("MIRROR__COORDINATION__ROOT", Some("/cache_share")),
            ("MIRROR__RETRY__CONNECT__MAX_RETRIES", Some("7")),
        ],
        || {
            let config = MirrorConfig::new().unwrap();

            assert_eq!(config.coordination.root, "/cache_share");
            assert_eq!(config.retry.connect.max_retries, 7);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_mirror_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("mirror_override.toml");

    std::fs::write(
        &config_path,
        r#"
        [storage]
        release = "nexus|team_release:secret@repo.local"
        snapshot = "nexus|team_snapshot:secret@repo.local"

        [retry.write_back]
        max_retries = 5
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = MirrorConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .expect("override should merge");

        assert_eq!(config.storage.release_user().unwrap(), "team_release");
        assert_eq!(config.storage.snapshot_user().unwrap(), "team_snapshot");
        assert_eq!(config.retry.write_back.max_retries, 5);
        // untouched fields keep their defaults
        assert_eq!(config.retry.write_back.base_delay_ms, 50);
    });
}

#[test]
fn validation_should_fail_with_relative_root() {
    let mut config = MirrorConfig::default();
    config.coordination.root = "npm_cache_share".to_string();

    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn validation_should_fail_with_malformed_storage_descriptor() {
    let mut config = MirrorConfig::default();
    config.storage.snapshot = "localfile".to_string();

    assert!(matches!(config.validate(), Err(Error::Mirror(_))));
}

#[test]
fn validation_should_fail_with_zero_retries() {
    let mut config = MirrorConfig::default();
    config.retry.connect.max_retries = 0;

    assert!(config.validate().is_err());
}

#[test]
fn storage_user_takes_text_between_pipe_and_colon() {
    assert_eq!(storage_user("nexus|alice:pw@host").unwrap(), "alice");
    assert_eq!(storage_user("nexus|bob").unwrap(), "bob");
    assert!(storage_user("nexus|:pw@host").is_err());
    assert!(storage_user("").is_err());
}
