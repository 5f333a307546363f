#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use sprout_config::{
    Config, ConfigError, Profile, load_config_from, profile_to_sync_config, save_config_to,
};
use sprout_core::{ChannelKind, Classification, ThresholdBounds, TlsVerification};

const SAMPLE: &str = r#"
default_profile = "greenhouse"

[defaults]
output = "json"
timeout = 12

[profiles.greenhouse]
backend = "http://192.168.1.40:5000"
feed_url = "https://io.example.com/api/v2/grower/feeds"
api_key = "aio_plain"
ack_timeout = 3
polling_interval = 0
max_reconnect_attempts = 8

[profiles.greenhouse.channels]
co2 = "sensor"
mister = "actuator"

[profiles.greenhouse.thresholds]
temp = { lower = 20.0, upper = 28.0 }
co2 = { upper = 1200.0 }
"#;

fn write_sample(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn loads_profiles_from_toml() {
    let (_dir, path) = write_sample(SAMPLE);

    let config = load_config_from(&path).unwrap();

    assert_eq!(config.default_profile.as_deref(), Some("greenhouse"));
    assert_eq!(config.defaults.output, "json");
    assert_eq!(config.defaults.timeout, 12);
    let (name, profile) = config.profile(None).unwrap();
    assert_eq!(name, "greenhouse");
    assert_eq!(profile.channels.get("co2"), Some(&ChannelKind::Sensor));
    assert_eq!(
        profile.thresholds.get("co2"),
        Some(&ThresholdBounds {
            lower: None,
            upper: Some(1200.0)
        })
    );
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();

    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.default_profile.as_deref(), Some("default"));
    assert_eq!(config.defaults.output, "table");
    assert!(config.profiles.is_empty());
}

#[test]
fn profile_translates_to_sync_config() {
    let (_dir, path) = write_sample(SAMPLE);
    let config = load_config_from(&path).unwrap();
    let (name, profile) = config.profile(None).unwrap();

    let sync = profile_to_sync_config(profile, &name, &config.defaults).unwrap();

    assert_eq!(sync.backend_url.as_str(), "http://192.168.1.40:5000/");
    assert_eq!(sync.stream_url.as_str(), "ws://192.168.1.40:5000/");
    assert_eq!(sync.feed_url.as_str(), "https://io.example.com/api/v2/grower/feeds");
    assert_eq!(sync.timeout, Duration::from_secs(12));
    assert_eq!(sync.ack_timeout, Duration::from_secs(3));
    assert_eq!(sync.polling_interval, Duration::ZERO);
    assert_eq!(sync.max_reconnect_attempts, Some(8));
    assert_eq!(sync.tls, TlsVerification::SystemDefaults);
    assert_eq!(sync.channels.len(), 9);
    assert!(sync.channels.resolve("mister").unwrap().is_actuator());

    let co2 = sync.thresholds.get("co2").unwrap();
    assert_eq!(sprout_core::threshold::classify(1500.0, Some(co2)), Classification::AboveUpper);
}

#[test]
fn plaintext_api_key_is_the_last_resort() {
    let profile = Profile {
        api_key: Some("aio_plain".into()),
        ..Profile::for_backend("http://gh.local")
    };

    // Neither the env var nor a keyring entry exists for this profile.
    let key = sprout_config::resolve_api_key(&profile, "sprout-test-no-keyring").unwrap();

    assert_eq!(key.expose_secret(), "aio_plain");
}

#[test]
fn inverted_threshold_is_a_validation_error() {
    let (_dir, path) = write_sample(
        r#"
[profiles.default]
backend = "http://gh.local"

[profiles.default.thresholds]
humidity = { lower = 80.0, upper = 40.0 }
"#,
    );
    let config = load_config_from(&path).unwrap();
    let (name, profile) = config.profile(None).unwrap();

    let err = profile_to_sync_config(profile, &name, &config.defaults).unwrap_err();

    assert!(
        matches!(err, ConfigError::Validation { ref field, .. } if field == "thresholds.humidity")
    );
}

#[test]
fn bad_stream_url_scheme_is_rejected() {
    let profile = Profile {
        stream_url: Some("http://gh.local/stream".into()),
        ..Profile::for_backend("http://gh.local")
    };

    let err = profile_to_sync_config(&profile, "p", &Config::default().defaults).unwrap_err();

    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "stream_url"));
}

#[test]
fn saved_config_round_trips_through_loader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let mut config = Config::default();
    config.profiles.insert(
        "default".into(),
        Profile {
            insecure: Some(true),
            ..Profile::for_backend("https://gh.local")
        },
    );

    save_config_to(&config, &path).unwrap();
    let loaded = load_config_from(&path).unwrap();

    let (_, profile) = loaded.profile(None).unwrap();
    assert_eq!(profile.backend, "https://gh.local");
    assert_eq!(profile.insecure, Some(true));
}
