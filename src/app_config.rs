//! Configuration file loading for CLI defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use linkprint_core::ContextPolicy;

/// File configuration for linkprint defaults.
///
/// Uses a small TOML subset: `key = value` lines, `#` comments,
/// double-quoted strings, integers and `true`/`false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Default output directory.
    pub output_dir: Option<PathBuf>,
    /// Default session cookie file.
    pub cookies_file: Option<PathBuf>,
    /// Default failure ledger file.
    pub ledger_path: Option<PathBuf>,
    /// Default concurrency (same range as CLI).
    pub concurrency: Option<u8>,
    /// Default navigation timeout in seconds.
    pub navigation_timeout_secs: Option<u64>,
    /// Default context policy.
    pub context_policy: Option<ContextPolicy>,
    /// Header of the hyperlink column.
    pub link_column: Option<String>,
    /// Header of the display-name column.
    pub name_column: Option<String>,
    /// Header of the selection column.
    pub status_column: Option<String>,
    /// Replace path-unsafe characters in names.
    pub sanitize_names: Option<bool>,
    /// Rewrite editor links to their print view.
    pub print_view_links: Option<bool>,
    /// Browser executable.
    pub browser_path: Option<PathBuf>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }

        if let Some(timeout) = self.navigation_timeout_secs
            && !(1..=600).contains(&timeout)
        {
            bail!(
                "Invalid config value for `navigation_timeout_secs`: {timeout}. Expected range: 1..=600"
            );
        }

        for (field, value) in [
            ("link_column", &self.link_column),
            ("name_column", &self.name_column),
            ("status_column", &self.status_column),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                bail!("Invalid config value for `{field}`: column name must not be empty");
            }
        }

        Ok(())
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/linkprint/config.toml`
/// 2. `$HOME/.config/linkprint/config.toml`
#[must_use]
pub fn resolve_default_config_path(
    env: impl Fn(&str) -> Option<std::ffi::OsString>,
) -> Option<PathBuf> {
    let non_empty = |name: &str| env(name).filter(|value| !value.is_empty());

    if let Some(xdg_config_home) = non_empty("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("linkprint")
                .join("config.toml"),
        );
    }

    let home = non_empty("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("linkprint")
            .join("config.toml"),
    )
}

/// Loads the config file at `explicit` (which must exist), or at the default
/// location if one exists there.
pub fn load_file_config(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<std::ffi::OsString>,
) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(Some);
    }
    match resolve_default_config_path(env) {
        Some(path) if path.exists() => read_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "cookies_file" => {
                cfg.cookies_file = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "ledger_path" => {
                cfg.ledger_path = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "browser_path" => {
                cfg.browser_path = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "concurrency" => {
                cfg.concurrency = Some(parse_integer_u8(value).with_context(invalid)?);
            }
            "navigation_timeout_secs" => {
                cfg.navigation_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "context_policy" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                let policy = parsed
                    .parse::<ContextPolicy>()
                    .map_err(anyhow::Error::msg)
                    .with_context(invalid)?;
                cfg.context_policy = Some(policy);
            }
            "link_column" => {
                cfg.link_column = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "name_column" => {
                cfg.name_column = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "status_column" => {
                cfg.status_column = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "sanitize_names" => {
                cfg.sanitize_names = Some(parse_boolean(value).with_context(invalid)?);
            }
            "print_view_links" => {
                cfg.print_view_links = Some(parse_boolean(value).with_context(invalid)?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
