//! Static table of user-editable settings.
//!
//! Each entry maps a key to a typed accessor and a parsing mutator on [`Config`]. Setting an
//! empty value resets the field to its default.

use depot_utils::time::parse_std_duration;
use documented::DocumentedFields;

use crate::{
    config::{parse_sync_interval, Config},
    error::{ConfigError, Result},
};

pub struct Setting {
    pub key: &'static str,
    pub get: fn(&Config) -> String,
    pub set: fn(&mut Config, &str) -> Result<()>,
}

impl Setting {
    pub fn description(&self) -> &'static str {
        Config::get_field_docs(self.key).unwrap_or_default()
    }
}

pub static SETTINGS: &[Setting] = &[
    Setting {
        key: "cache_path",
        get: |c| display_path(c.get_cache_path()),
        set: |c, v| {
            c.cache_path = non_empty(v);
            Ok(())
        },
    },
    Setting {
        key: "db_path",
        get: |c| display_path(c.get_db_path()),
        set: |c, v| {
            c.db_path = non_empty(v);
            Ok(())
        },
    },
    Setting {
        key: "state_path",
        get: |c| display_path(c.get_state_path()),
        set: |c, v| {
            c.state_path = non_empty(v);
            Ok(())
        },
    },
    Setting {
        key: "sync_interval",
        get: |c| c.sync_interval.clone().unwrap_or_else(|| "auto".into()),
        set: |c, v| {
            if !v.is_empty() && parse_sync_interval(v).is_none() {
                return Err(invalid("sync_interval", v, "expected a duration, always, never or auto"));
            }
            c.sync_interval = non_empty(v);
            Ok(())
        },
    },
    Setting {
        key: "locale",
        get: |c| c.locale().to_string(),
        set: |c, v| {
            c.locale = non_empty(v);
            Ok(())
        },
    },
    Setting {
        key: "api_level",
        get: |c| c.api_level().to_string(),
        set: |c, v| {
            c.api_level = parse_optional(v, "api_level")?;
            Ok(())
        },
    },
    Setting {
        key: "abis",
        get: |c| c.abis().join(","),
        set: |c, v| {
            c.abis = non_empty(v).map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|abi| !abi.is_empty())
                    .map(String::from)
                    .collect()
            });
            Ok(())
        },
    },
    Setting {
        key: "allow_unknown_sources",
        get: |c| c.allow_unknown_sources().to_string(),
        set: |c, v| {
            c.allow_unknown_sources = parse_optional(v, "allow_unknown_sources")?;
            Ok(())
        },
    },
    Setting {
        key: "install_command",
        get: |c| c.install_command().join(" "),
        set: |c, v| {
            c.install_command =
                non_empty(v).map(|v| v.split_whitespace().map(String::from).collect());
            Ok(())
        },
    },
    Setting {
        key: "install_session",
        get: |c| c.install_session().to_string(),
        set: |c, v| {
            c.install_session = parse_optional(v, "install_session")?;
            Ok(())
        },
    },
    Setting {
        key: "install_timeout",
        get: |c| c.install_timeout.clone().unwrap_or_else(|| "10m".into()),
        set: |c, v| {
            c.install_timeout = parse_duration_setting(v, "install_timeout")?;
            Ok(())
        },
    },
    Setting {
        key: "cache_expiry",
        get: |c| c.cache_expiry.clone().unwrap_or_else(|| "1h".into()),
        set: |c, v| {
            c.cache_expiry = parse_duration_setting(v, "cache_expiry")?;
            Ok(())
        },
    },
    Setting {
        key: "cleanup_delay",
        get: |c| c.cleanup_delay.clone().unwrap_or_else(|| "60s".into()),
        set: |c, v| {
            c.cleanup_delay = parse_duration_setting(v, "cleanup_delay")?;
            Ok(())
        },
    },
    Setting {
        key: "search_limit",
        get: |c| c.search_limit().to_string(),
        set: |c, v| {
            c.search_limit = parse_optional(v, "search_limit")?;
            Ok(())
        },
    },
    Setting {
        key: "user_agent",
        get: |c| c.user_agent(),
        set: |c, v| {
            c.user_agent = non_empty(v);
            Ok(())
        },
    },
    Setting {
        key: "http_timeout",
        get: |c| c.http_timeout.clone().unwrap_or_else(|| "60s".into()),
        set: |c, v| {
            c.http_timeout = parse_duration_setting(v, "http_timeout")?;
            Ok(())
        },
    },
];

pub fn find_setting(key: &str) -> Option<&'static Setting> {
    SETTINGS.iter().find(|setting| setting.key == key)
}

pub fn get_setting(config: &Config, key: &str) -> Result<String> {
    let setting = find_setting(key).ok_or_else(|| ConfigError::UnknownSetting(key.into()))?;
    Ok((setting.get)(config))
}

pub fn set_setting(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let setting = find_setting(key).ok_or_else(|| ConfigError::UnknownSetting(key.into()))?;
    (setting.set)(config, value.trim())
}

fn display_path(path: Result<std::path::PathBuf>) -> String {
    match path {
        Ok(path) => path.display().to_string(),
        Err(err) => format!("<{err}>"),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidSettingValue {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_optional<T>(value: &str, key: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(value) {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|err| invalid(key, &v, format!("{err}"))),
    }
}

fn parse_duration_setting(value: &str, key: &'static str) -> Result<Option<String>> {
    match non_empty(value) {
        None => Ok(None),
        Some(v) if parse_std_duration(&v).is_some() => Ok(Some(v)),
        Some(v) => Err(invalid(key, &v, "expected a duration like 30s, 10m or 1h")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_keys_are_unique_and_documented() {
        let mut seen = HashSet::new();
        for setting in SETTINGS {
            assert!(seen.insert(setting.key), "duplicate key {}", setting.key);
            assert!(
                !setting.description().is_empty(),
                "{} has no description",
                setting.key
            );
        }
    }

    #[test]
    fn test_get_and_set() {
        let mut config = Config::default_config();

        set_setting(&mut config, "api_level", "29").unwrap();
        assert_eq!(get_setting(&config, "api_level").unwrap(), "29");
        assert_eq!(config.api_level, Some(29));

        set_setting(&mut config, "abis", "arm64-v8a, armeabi-v7a").unwrap();
        assert_eq!(config.abis(), vec!["arm64-v8a", "armeabi-v7a"]);

        set_setting(&mut config, "allow_unknown_sources", "true").unwrap();
        assert!(config.allow_unknown_sources());

        set_setting(&mut config, "install_command", "pm install {file}").unwrap();
        assert_eq!(config.install_command(), vec!["pm", "install", "{file}"]);
    }

    #[test]
    fn test_empty_value_resets() {
        let mut config = Config::default_config();
        set_setting(&mut config, "api_level", "21").unwrap();
        set_setting(&mut config, "api_level", "").unwrap();
        assert_eq!(config.api_level, None);
        assert_eq!(get_setting(&config, "api_level").unwrap(), "34");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default_config();
        assert!(matches!(
            set_setting(&mut config, "api_level", "lots"),
            Err(ConfigError::InvalidSettingValue { key: "api_level", .. })
        ));
        assert!(set_setting(&mut config, "cache_expiry", "forever").is_err());
        assert!(set_setting(&mut config, "sync_interval", "sometimes").is_err());
        assert!(set_setting(&mut config, "sync_interval", "never").is_ok());
    }

    #[test]
    fn test_unknown_setting() {
        let config = Config::default_config();
        assert!(matches!(
            get_setting(&config, "colour"),
            Err(ConfigError::UnknownSetting(_))
        ));
    }
}
