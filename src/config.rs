//! Runtime configuration: built-in defaults, then environment, then command line.

use std::{borrow::Cow, env, ffi::OsString, path::PathBuf, str::FromStr, time::Duration};

use log::{debug, info, warn};

use crate::{
    consts::{
        DEFAULT_DEBOUNCE_MS, DEFAULT_ELEVATE_PROGRAM, DEFAULT_HELPER_PATH, ENV_BUS,
        ENV_DEBOUNCE_MS, ENV_ELEVATE, ENV_HELPER,
    },
    systemd::{actions::HelperConfig, enums::DbusLevel},
};

/// Elevation value meaning "run the helper directly".
pub const NO_ELEVATION: &str = "none";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub level: DbusLevel,
    pub helper: HelperConfig,
    pub debounce: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            level: DbusLevel::default(),
            helper: HelperConfig::default(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

/// Values given on the command line, they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub level: Option<DbusLevel>,
    pub helper: Option<PathBuf>,
}

impl Config {
    /// Reads the process environment. Call `dotenv` before.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let level_value = get_env(&lookup, ENV_BUS, DbusLevel::default().as_str());
        let level = DbusLevel::from_str(&level_value).unwrap_or_else(|level| {
            warn!("Unknown bus level {level:?}, use {}", DbusLevel::default());
            DbusLevel::default()
        });

        let helper = get_env(&lookup, ENV_HELPER, DEFAULT_HELPER_PATH);
        let elevate = get_env(&lookup, ENV_ELEVATE, DEFAULT_ELEVATE_PROGRAM);
        let elevate = if elevate.is_empty() || elevate == NO_ELEVATION {
            None
        } else {
            Some(OsString::from(elevate.into_owned()))
        };

        let default_debounce = DEFAULT_DEBOUNCE_MS.to_string();
        let debounce_value = get_env(&lookup, ENV_DEBOUNCE_MS, &default_debounce);
        let debounce_ms = debounce_value.parse::<u64>().unwrap_or_else(|error| {
            warn!("Bad {ENV_DEBOUNCE_MS} value {debounce_value:?}: {error:?}");
            DEFAULT_DEBOUNCE_MS
        });

        Config {
            level,
            helper: HelperConfig::new(helper.into_owned(), elevate),
            debounce: Duration::from_millis(debounce_ms),
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(level) = overrides.level {
            debug!("Bus level from command line {level}");
            self.level = level;
        }

        if let Some(helper) = overrides.helper {
            debug!("Helper from command line {}", helper.display());
            self.helper.helper = helper;
        }

        self
    }
}

fn get_env<'a>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &'a str,
) -> Cow<'a, str> {
    match lookup(key) {
        Some(val) => {
            info!("Key {key}, Value {val}");
            Cow::Owned(val)
        }
        None => {
            info!("Key {key}, Use default value {default}");
            Cow::Borrowed(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::consts::ELEVATE_NO_INTERNAL_AGENT;

    fn config_from(values: &[(&str, &str)]) -> Config {
        let values: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.level, DbusLevel::System);
        assert_eq!(config.helper.helper, PathBuf::from(DEFAULT_HELPER_PATH));
        assert_eq!(config.helper.elevate_args, [ELEVATE_NO_INTERNAL_AGENT]);
        assert_eq!(config.debounce, Duration::from_secs(1));
    }

    #[test]
    fn test_environment() {
        let config = config_from(&[
            (ENV_BUS, "session"),
            (ENV_HELPER, "/opt/helper"),
            (ENV_ELEVATE, "sudo"),
            (ENV_DEBOUNCE_MS, "250"),
        ]);

        assert_eq!(config.level, DbusLevel::Session);
        assert_eq!(config.helper.helper, PathBuf::from("/opt/helper"));
        assert_eq!(config.helper.elevate, Some(OsString::from("sudo")));
        assert!(config.helper.elevate_args.is_empty());
        assert_eq!(config.debounce, Duration::from_millis(250));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config_from(&[(ENV_BUS, "kernel"), (ENV_DEBOUNCE_MS, "soon")]);
        assert_eq!(config.level, DbusLevel::System);
        assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));
    }

    #[test]
    fn test_no_elevation() {
        let config = config_from(&[(ENV_ELEVATE, NO_ELEVATION)]);
        assert_eq!(config.helper.elevate, None);
    }

    #[test]
    fn test_command_line_wins() {
        let config = config_from(&[(ENV_BUS, "session"), (ENV_HELPER, "/opt/helper")])
            .with_overrides(ConfigOverrides {
                level: Some(DbusLevel::System),
                helper: Some(PathBuf::from("/tmp/helper")),
            });

        assert_eq!(config.level, DbusLevel::System);
        assert_eq!(config.helper.helper, PathBuf::from("/tmp/helper"));
        assert_eq!(config.helper.elevate, Some(OsString::from("pkexec")));
    }
}
