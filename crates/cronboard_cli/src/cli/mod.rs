use clap::{Parser, Subcommand};
use cronboard_core::classify::BucketPolicy;
use cronboard_core::config::ConfigOverrides;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Dashboard for cron-scheduled tasks", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the schedule once and print the four sections
    ///
    /// Example: cronboard show
    /// Example: cronboard show --file schedule.json --now 2024-06-01T12:00:00Z
    Show {
        /// Read the schedule document from a file instead of the API
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Evaluate against this RFC 3339 instant instead of the current time
        #[arg(long, value_name = "RFC3339")]
        now: Option<String>,
    },
    /// Keep the dashboard running and notify when events start
    ///
    /// Example: cronboard watch
    Watch {
        /// Read the schedule document from a file instead of the API
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Print the previous and next occurrence of a cron expression
    ///
    /// Example: cronboard occurrences "0 7 14 3 *"
    Occurrences {
        expression: String,
        /// Reference RFC 3339 instant (defaults to now)
        #[arg(long, value_name = "RFC3339")]
        now: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    Endpoint,
    CorsRelay,
    RefreshInterval,
    PollInterval,
    BucketPolicy,
    Theme,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let field =
        canonicalize_flag_name(key_raw).ok_or_else(|| "override key cannot be empty".to_string())?;

    let target = match field.as_str() {
        "endpoint" => ConfigOverrideTarget::Endpoint,
        "cors_relay" | "relay" => ConfigOverrideTarget::CorsRelay,
        "refresh_interval_secs" | "refresh_interval" => ConfigOverrideTarget::RefreshInterval,
        "poll_interval_ms" | "poll_interval" => ConfigOverrideTarget::PollInterval,
        "bucket_policy" | "policy" => ConfigOverrideTarget::BucketPolicy,
        "theme" => ConfigOverrideTarget::Theme,
        other => return Err(format!("unknown config field '{other}'")),
    };

    Ok(ParsedConfigOverride { target, value })
}

/// Fold parsed `KEY=VALUE` overrides into a `ConfigOverrides`.
pub fn collect_config_overrides(raw: &[String]) -> Result<ConfigOverrides, String> {
    let mut overrides = ConfigOverrides::default();

    for entry in raw {
        let parsed = parse_config_override(entry)?;
        match parsed.target {
            ConfigOverrideTarget::Endpoint => {
                if parsed.value.is_empty() {
                    return Err("endpoint override cannot be empty".to_string());
                }
                overrides.endpoint = Some(parsed.value);
            }
            ConfigOverrideTarget::CorsRelay => overrides.cors_relay = Some(parsed.value),
            ConfigOverrideTarget::RefreshInterval => {
                overrides.refresh_interval_secs = Some(parse_positive(&parsed.value)?);
            }
            ConfigOverrideTarget::PollInterval => {
                overrides.poll_interval_ms = Some(parse_positive(&parsed.value)?);
            }
            ConfigOverrideTarget::BucketPolicy => {
                let policy = parsed
                    .value
                    .parse::<BucketPolicy>()
                    .map_err(|err| err.message())?;
                overrides.bucket_policy = Some(policy);
            }
            ConfigOverrideTarget::Theme => overrides.theme = Some(parsed.value),
        }
    }

    Ok(overrides)
}

fn parse_positive(value: &str) -> Result<u64, String> {
    match value.parse::<u64>() {
        Ok(number) if number > 0 => Ok(number),
        _ => Err(format!("expected a positive integer, got '{value}'")),
    }
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigOverrideTarget, collect_config_overrides, parse_config_override};
    use cronboard_core::classify::BucketPolicy;

    #[test]
    fn parse_config_override_canonicalizes_field_names() {
        let parsed = parse_config_override(" Bucket-Policy = exclusive ").unwrap();

        assert_eq!(parsed.target, ConfigOverrideTarget::BucketPolicy);
        assert_eq!(parsed.value, "exclusive");
    }

    #[test]
    fn parse_config_override_keeps_equals_in_value() {
        let parsed = parse_config_override("endpoint=http://localhost/schedule?a=b").unwrap();

        assert_eq!(parsed.target, ConfigOverrideTarget::Endpoint);
        assert_eq!(parsed.value, "http://localhost/schedule?a=b");
    }

    #[test]
    fn parse_config_override_rejects_unknown_fields() {
        let err = parse_config_override("unknown.field=value").unwrap_err();
        assert!(err.contains("unknown config field"));
    }

    #[test]
    fn parse_config_override_rejects_missing_equals() {
        let err = parse_config_override("theme").unwrap_err();
        assert!(err.contains("KEY=VALUE"));
    }

    #[test]
    fn parse_config_override_rejects_empty_key() {
        let err = parse_config_override(" = noir").unwrap_err();
        assert!(err.contains("cannot be empty"));
    }

    #[test]
    fn collect_config_overrides_builds_overrides() {
        let raw = vec![
            "poll_interval_ms=250".to_string(),
            "policy=exclusive".to_string(),
            "relay=https://relay.example/".to_string(),
        ];

        let overrides = collect_config_overrides(&raw).unwrap();
        assert_eq!(overrides.poll_interval_ms, Some(250));
        assert_eq!(overrides.bucket_policy, Some(BucketPolicy::Exclusive));
        assert_eq!(overrides.cors_relay.as_deref(), Some("https://relay.example/"));
        assert_eq!(overrides.endpoint, None);
    }

    #[test]
    fn collect_config_overrides_rejects_bad_numbers_and_policies() {
        let err = collect_config_overrides(&["refresh_interval=0".to_string()]).unwrap_err();
        assert!(err.contains("positive integer"));

        let err = collect_config_overrides(&["bucket_policy=mixed".to_string()]).unwrap_err();
        assert!(err.contains("unknown bucket policy"));
    }
}
