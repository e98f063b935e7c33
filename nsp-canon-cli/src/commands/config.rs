use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use nsp_canon_lib::settings::{self, Settings};

use crate::error::CliError;

/// Where a configured path came from.
fn source_label(configured: bool) -> &'static str {
    if configured { "(settings)" } else { "(default)" }
}

fn show_path(name: &str, value: Option<&Path>, source: &str) {
    match value {
        Some(path) => {
            let exists = if path.exists() {
                "\u{2714}".if_supports_color(Stdout, |t| t.green()).to_string()
            } else {
                "\u{2718}".if_supports_color(Stdout, |t| t.red()).to_string()
            };
            log::info!(
                "  {} {:<12} {} {}",
                exists,
                name,
                path.display().if_supports_color(Stdout, |t| t.cyan()),
                source.if_supports_color(Stdout, |t| t.dimmed()),
            );
        }
        None => {
            log::info!(
                "  {} {:<12} {}",
                "?".if_supports_color(Stdout, |t| t.yellow()),
                name,
                "not set".if_supports_color(Stdout, |t| t.dimmed()),
            );
        }
    }
}

/// Show the settings file and every resolved path.
pub(crate) fn run_config_show() -> Result<(), CliError> {
    let path = settings::settings_path();
    let settings = Settings::load_from(&path).map_err(|e| CliError::config(e.to_string()))?;

    log::info!("{}", "nsp-canon Configuration".if_supports_color(Stdout, |t| t.bold()));
    log::info!("");
    if path.exists() {
        log::info!(
            "  Settings file: {} {}",
            path.display().if_supports_color(Stdout, |t| t.cyan()),
            "(exists)".if_supports_color(Stdout, |t| t.green()),
        );
    } else {
        log::info!(
            "  Settings file: {} {}",
            path.display().if_supports_color(Stdout, |t| t.cyan()),
            "(not found)".if_supports_color(Stdout, |t| t.dimmed()),
        );
    }
    log::info!("");

    let keys: PathBuf = settings.keys_path(None);
    show_path("keys", Some(&keys), source_label(settings.paths.keys.is_some()));
    let paths = &settings.paths;
    show_path("titledb", paths.titledb.as_deref(), source_label(true));
    show_path("common_cert", paths.common_cert.as_deref(), source_label(true));
    show_path("output", paths.output.as_deref(), source_label(true));

    if let Some(text) = settings::load_settings_string() {
        log::info!("");
        for line in text.lines() {
            log::info!("  {}", line.if_supports_color(Stdout, |t| t.dimmed()));
        }
    }
    Ok(())
}

/// Print the settings file path.
pub(crate) fn run_config_path() {
    println!("{}", settings::settings_path().display());
}
