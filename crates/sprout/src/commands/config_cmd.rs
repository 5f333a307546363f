//! Config subcommand handlers.

use std::fmt::Write;

use sprout_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

/// Replace plaintext secrets before anything is printed.
fn redact(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        if profile.api_key.is_some() {
            profile.api_key = Some(MASK.into());
        }
        if profile.token.is_some() {
            profile.token = Some(MASK.into());
        }
    }
}

/// TOML-like view of a (redacted) config.
fn format_config(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let Some(p) = cfg.profiles.get(name) else {
            continue;
        };
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "backend = \"{}\"", p.backend);
        for (key, value) in [
            ("feed_url", &p.feed_url),
            ("stream_url", &p.stream_url),
            ("api_key", &p.api_key),
            ("api_key_env", &p.api_key_env),
            ("token", &p.token),
            ("token_env", &p.token_env),
        ] {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = \"{value}\"");
            }
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        for (key, value) in [
            ("timeout", p.timeout),
            ("handshake_timeout", p.handshake_timeout),
            ("ack_timeout", p.ack_timeout),
            ("polling_interval", p.polling_interval),
        ] {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = {value}");
            }
        }
        if let Some(attempts) = p.max_reconnect_attempts {
            let _ = writeln!(out, "max_reconnect_attempts = {attempts}");
        }
        if !p.channels.is_empty() {
            let _ = writeln!(out, "\n[profiles.{name}.channels]");
            for (channel, kind) in &p.channels {
                let _ = writeln!(out, "{channel} = \"{kind}\"");
            }
        }
        if !p.thresholds.is_empty() {
            let _ = writeln!(out, "\n[profiles.{name}.thresholds]");
            for (channel, bounds) in &p.thresholds {
                let mut parts = Vec::new();
                if let Some(lower) = bounds.lower {
                    parts.push(format!("lower = {lower}"));
                }
                if let Some(upper) = bounds.upper {
                    parts.push(format!("upper = {upper}"));
                }
                let _ = writeln!(out, "{channel} = {{ {} }}", parts.join(", "));
            }
        }
    }

    out
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = config::load_config_or_default();
            redact(&mut cfg);
            let out = output::render_single(&global.output, &cfg, format_config, |c| {
                let mut names: Vec<_> = c.profiles.keys().cloned().collect();
                names.sort();
                names.join("\n")
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use sprout_config::Profile;

    use super::*;

    #[test]
    fn secrets_never_reach_the_output() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                api_key: Some("aio_live_secret".into()),
                token: Some("bearer_secret".into()),
                api_key_env: Some("AIO_KEY".into()),
                ..Profile::for_backend("http://gh.local")
            },
        );

        redact(&mut cfg);
        let text = format_config(&cfg);

        assert!(!text.contains("secret"));
        assert!(text.contains("api_key = \"****\""));
        assert!(text.contains("api_key_env = \"AIO_KEY\""));
    }
}
