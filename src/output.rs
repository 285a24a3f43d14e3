//! # Output Configuration
//!
//! This module provides utilities for controlling CLI output appearance,
//! including color and emoji support based on terminal capabilities and
//! user preferences, and the table and JSON renderings of registry records.
//!
//! ## Respecting User Preferences
//!
//! The module respects the following environment variables and flags:
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dbclone::output::{OutputConfig, emoji};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! println!("{} Provisioning...", emoji(&config, "🔧", "[RUN]"));
//! ```

use crate::model::{CloneRecord, Host, Image};
use crate::provision::{ProvisionFailure, ProvisionReport};
use console::style;
use serde_json::json;
use std::env;

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// # Arguments
    /// * `color_flag` - The value of the --color CLI flag: "always", "never", or "auto"
    ///
    /// In auto mode, colors are disabled if `NO_COLOR` is set, `CLICOLOR=0`,
    /// `TERM=dumb`, or stdout is not a TTY (unless `CLICOLOR_FORCE=1`).
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        console::set_colors_enabled(use_color);
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // Presence alone disables colors (https://no-color.org/)
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    /// Create a configuration with colors always enabled.
    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    /// Create a configuration with colors always disabled.
    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns the emoji when colors are enabled, else the plain alternative.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Render rows as a left-aligned, space-padded table.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let format_row = |cells: Vec<&str>| -> String {
        let line = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ");
        line.trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&format_row(headers.to_vec()));
    out.push('\n');
    for row in rows {
        out.push_str(&format_row(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

/// Table of clone records.
pub fn clone_table(records: &[CloneRecord]) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.clone_id.to_string(),
                r.host_name.clone(),
                r.sql_instance.clone(),
                r.database_name.clone(),
                if r.is_enabled { "yes" } else { "no" }.to_string(),
                r.image_name.clone(),
                r.access_path.clone(),
            ]
        })
        .collect();
    render_table(
        &["ID", "HOST", "INSTANCE", "DATABASE", "ENABLED", "IMAGE", "ACCESS PATH"],
        &rows,
    )
}

/// Table of images.
pub fn image_table(images: &[Image]) -> String {
    let rows: Vec<Vec<String>> = images
        .iter()
        .map(|i| {
            vec![
                i.image_id.to_string(),
                i.database_name.clone(),
                i.image_name.clone(),
                i.size_mb.to_string(),
                i.created_on.format("%Y-%m-%d %H:%M:%S").to_string(),
                i.image_location.clone(),
            ]
        })
        .collect();
    render_table(
        &["ID", "DATABASE", "NAME", "SIZE MB", "CREATED", "LOCATION"],
        &rows,
    )
}

/// Table of hosts.
pub fn host_table(hosts: &[Host]) -> String {
    let rows: Vec<Vec<String>> = hosts
        .iter()
        .map(|h| {
            vec![
                h.host_id.to_string(),
                h.host_name.clone(),
                h.ip_address.clone(),
                h.fqdn.clone(),
            ]
        })
        .collect();
    render_table(&["ID", "NAME", "ADDRESS", "FQDN"], &rows)
}

/// One-line description of a failed pair.
pub fn failure_line(config: &OutputConfig, failure: &ProvisionFailure) -> String {
    let mut line = format!(
        "{} {}/{} failed while {}: {}",
        emoji(config, "❌", "[FAIL]"),
        failure.sql_instance,
        failure.subject,
        failure.stage,
        style(&failure.error).red()
    );
    for cleanup in &failure.cleanup_errors {
        line.push_str(&format!("\n    cleanup: {}", cleanup));
    }
    line
}

/// One-line description of a created clone.
pub fn clone_line(config: &OutputConfig, record: &CloneRecord) -> String {
    format!(
        "{} Clone {} {} on {} at {}",
        emoji(config, "✅", "[OK]"),
        record.clone_id,
        style(&record.database_name).green(),
        record.sql_instance,
        record.access_path
    )
}

/// JSON form of a report. Clone records keep their registry field names.
pub fn report_json(report: &ProvisionReport) -> serde_json::Value {
    let failures: Vec<serde_json::Value> = report
        .failures
        .iter()
        .map(|f| {
            json!({
                "SqlInstance": f.sql_instance,
                "Subject": f.subject,
                "Stage": f.stage,
                "Kind": f.error.kind().to_string(),
                "Error": f.error.to_string(),
                "CleanupErrors": f.cleanup_errors,
            })
        })
        .collect();
    json!({
        "Clones": report.clones,
        "Failures": failures,
    })
}
