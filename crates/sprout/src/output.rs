//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one line per item.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use sprout_core::Classification;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Classification label, colored by severity.
pub fn classification_label(class: Classification, color: bool) -> String {
    let label = class.to_string();
    if !color {
        return label;
    }
    match class {
        Classification::Normal => label.green().to_string(),
        Classification::BelowLower | Classification::AboveUpper => label.red().bold().to_string(),
        Classification::UnboundedOk => label.dimmed().to_string(),
    }
}

/// Staleness marker for table views.
pub fn stale_label(stale: bool, color: bool) -> String {
    match (stale, color) {
        (false, _) => String::new(),
        (true, true) => "stale".yellow().to_string(),
        (true, false) => "stale".into(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `line_fn` on each item to emit one line per item
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    line_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
        OutputFormat::Plain => data.iter().map(&line_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses a custom `detail_fn` that returns a pre-formatted
/// string, since single-item views don't use `Tabled` derive.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    line_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
        OutputFormat::Plain => line_fn(data),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Item {
        name: &'static str,
        value: f64,
    }

    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "Name")]
        name: String,
    }

    fn items() -> Vec<Item> {
        vec![
            Item {
                name: "temp",
                value: 24.5,
            },
            Item {
                name: "light",
                value: 900.0,
            },
        ]
    }

    fn render(format: &OutputFormat) -> String {
        render_list(
            format,
            &items(),
            |i| ItemRow {
                name: i.name.into(),
            },
            |i| format!("{}\t{}", i.name, i.value),
        )
        .unwrap()
    }

    #[test]
    fn plain_emits_one_line_per_item() {
        assert_eq!(render(&OutputFormat::Plain), "temp\t24.5\nlight\t900");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render(&OutputFormat::JsonCompact);
        assert_eq!(out, r#"[{"name":"temp","value":24.5},{"name":"light","value":900.0}]"#);
    }

    #[test]
    fn table_has_headers() {
        let out = render(&OutputFormat::Table);
        assert!(out.contains("Name"));
        assert!(out.contains("light"));
    }

    #[test]
    fn labels_without_color_are_plain() {
        assert_eq!(classification_label(Classification::AboveUpper, false), "above-upper");
        assert_eq!(stale_label(true, false), "stale");
        assert_eq!(stale_label(false, true), "");
    }
}
