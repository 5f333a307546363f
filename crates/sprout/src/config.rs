//! CLI flag overrides layered on top of `sprout-config` profiles.
//!
//! Core never sees these types -- it receives a pre-built `SyncConfig`.

use std::time::Duration;

use secrecy::SecretString;

use sprout_config::{Config, Profile};
use sprout_core::{SyncConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use sprout_config::{config_path, load_config_or_default};

/// Determine the active profile name.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the `SyncConfig` for this invocation: profile (if any), then
/// flag and env overrides.
pub fn build_sync_config(global: &GlobalOpts, cfg: &Config) -> Result<SyncConfig, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let profile = match (cfg.profiles.get(&profile_name), global.backend.as_deref()) {
        (Some(profile), _) => profile.clone(),
        // No profile: build from flags / env alone.
        (None, Some(backend)) if global.profile.is_none() => Profile::for_backend(backend),
        (None, _) if global.profile.is_some() => {
            let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
                path: config_path().display().to_string(),
            });
        }
        (None, _) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    let mut sync = sprout_config::profile_to_sync_config(&profile, &profile_name, &cfg.defaults)?;
    apply_overrides(&mut sync, global)?;
    Ok(sync)
}

/// Apply CLI flags over a profile-derived config.
fn apply_overrides(sync: &mut SyncConfig, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(ref backend) = global.backend {
        let url: url::Url = backend.parse().map_err(|_| CliError::Validation {
            field: "backend".into(),
            reason: format!("invalid URL: {backend}"),
        })?;
        // A backend override only moves the endpoints the profile derived
        // from the old backend.
        if sync.feed_url == sync.backend_url {
            sync.feed_url = url.clone();
        }
        if sync.stream_url == sprout_core::config::stream_url_for(&sync.backend_url) {
            sync.stream_url = sprout_core::config::stream_url_for(&url);
        }
        sync.backend_url = url;
    }
    if let Some(ref key) = global.api_key {
        sync.api_key = Some(SecretString::from(key.clone()));
    }
    if let Some(ref token) = global.token {
        sync.token = Some(SecretString::from(token.clone()));
    }
    if global.insecure {
        sync.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        sync.timeout = Duration::from_secs(secs);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["sprout"];
        argv.extend_from_slice(args);
        argv.push("status");
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn flags_alone_are_enough() {
        let sync = build_sync_config(
            &global(&["--backend", "http://10.0.0.5:5000", "--timeout", "4"]),
            &Config::default(),
        )
        .unwrap();

        assert_eq!(sync.backend_url.as_str(), "http://10.0.0.5:5000/");
        assert_eq!(sync.stream_url.as_str(), "ws://10.0.0.5:5000/");
        assert_eq!(sync.timeout, Duration::from_secs(4));
    }

    #[test]
    fn backend_override_keeps_explicit_feed_url() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                feed_url: Some("https://io.example.com/feeds".into()),
                ..Profile::for_backend("http://old.local")
            },
        );

        let sync = build_sync_config(&global(&["-b", "http://new.local"]), &cfg).unwrap();

        assert_eq!(sync.backend_url.as_str(), "http://new.local/");
        assert_eq!(sync.stream_url.as_str(), "ws://new.local/");
        assert_eq!(sync.feed_url.as_str(), "https://io.example.com/feeds");
    }

    #[test]
    fn unknown_profile_lists_alternatives() {
        let mut cfg = Config::default();
        cfg.profiles
            .insert("lab".into(), Profile::for_backend("http://lab.local"));

        let err = build_sync_config(&global(&["--profile", "attic"]), &cfg).unwrap_err();

        assert!(matches!(err, CliError::ProfileNotFound { ref available, .. } if available == "lab"));
    }

    #[test]
    fn nothing_configured_is_a_usage_error() {
        let err = build_sync_config(&global(&[]), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }
}
