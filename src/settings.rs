//! Named user preferences and the store they are kept in.

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    str::FromStr,
    sync::{PoisonError, RwLock},
};

use log::{debug, warn};
use strum::{EnumIter, IntoEnumIterator};

use crate::systemd::enums::UnitType;

pub const KEY_SHOW_INACTIVE: &str = "showinactive";
pub const KEY_WIN_MAXIMIZED: &str = "winmaximized";
pub const KEY_WIN_POSITION: &str = "winposition";
pub const KEY_HIDE_SERVICE_COLS: &str = "hide-service-cols";
pub const KEY_HIDE_TIMER_COLS: &str = "hide-timer-cols";
pub const KEY_HIDE_SOCKET_COLS: &str = "hide-socket-cols";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
pub enum PreferenceKey {
    ShowInactive,
    WinMaximized,
    WinPosition,
    HideServiceCols,
    HideTimerCols,
    HideSocketCols,
}

impl PreferenceKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceKey::ShowInactive => KEY_SHOW_INACTIVE,
            PreferenceKey::WinMaximized => KEY_WIN_MAXIMIZED,
            PreferenceKey::WinPosition => KEY_WIN_POSITION,
            PreferenceKey::HideServiceCols => KEY_HIDE_SERVICE_COLS,
            PreferenceKey::HideTimerCols => KEY_HIDE_TIMER_COLS,
            PreferenceKey::HideSocketCols => KEY_HIDE_SOCKET_COLS,
        }
    }

    /// Value used while nothing is stored. Also fixes the key's value type.
    pub fn default_value(&self) -> PreferenceValue {
        match self {
            PreferenceKey::ShowInactive | PreferenceKey::WinMaximized => {
                PreferenceValue::Bool(false)
            }
            PreferenceKey::WinPosition => PreferenceValue::Geometry(WindowGeometry::default()),
            PreferenceKey::HideServiceCols
            | PreferenceKey::HideTimerCols
            | PreferenceKey::HideSocketCols => PreferenceValue::StrList(Vec::new()),
        }
    }

    /// The hidden column list of a monitored kind.
    pub fn hidden_columns(unit_type: &UnitType) -> Option<PreferenceKey> {
        match unit_type {
            UnitType::Service => Some(PreferenceKey::HideServiceCols),
            UnitType::Timer => Some(PreferenceKey::HideTimerCols),
            UnitType::Socket => Some(PreferenceKey::HideSocketCols),
            _ => None,
        }
    }
}

impl Display for PreferenceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferenceKey {
    type Err = String;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        PreferenceKey::iter()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| key.to_owned())
    }
}

/// Window position and size.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceValue {
    Bool(bool),
    Geometry(WindowGeometry),
    StrList(Vec<String>),
}

impl PreferenceValue {
    fn type_name(&self) -> &'static str {
        match self {
            PreferenceValue::Bool(_) => "bool",
            PreferenceValue::Geometry(_) => "geometry",
            PreferenceValue::StrList(_) => "string list",
        }
    }

    fn same_type(&self, other: &PreferenceValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferenceError {
    TypeMismatch {
        key: PreferenceKey,
        expected: &'static str,
        found: &'static str,
    },
}

impl Display for PreferenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PreferenceError::TypeMismatch {
                key,
                expected,
                found,
            } => write!(f, "Preference {key} holds a {expected}, not a {found}"),
        }
    }
}

impl std::error::Error for PreferenceError {}

/// Key/value storage of the preferences. Loading and saving is up to the implementor.
pub trait PreferenceStore: Send + Sync {
    /// The stored value, or the key's default.
    fn get(&self, key: PreferenceKey) -> PreferenceValue;

    /// Stores `value`, refused if its type is not the key's.
    fn set(&self, key: PreferenceKey, value: PreferenceValue) -> Result<(), PreferenceError>;

    fn get_bool(&self, key: PreferenceKey) -> bool {
        match self.get(key) {
            PreferenceValue::Bool(value) => value,
            other => {
                warn!("Preference {key} is a {}", other.type_name());
                false
            }
        }
    }

    fn set_bool(&self, key: PreferenceKey, value: bool) -> Result<(), PreferenceError> {
        self.set(key, PreferenceValue::Bool(value))
    }

    fn get_str_list(&self, key: PreferenceKey) -> Vec<String> {
        match self.get(key) {
            PreferenceValue::StrList(values) => values,
            other => {
                warn!("Preference {key} is a {}", other.type_name());
                Vec::new()
            }
        }
    }

    fn set_str_list(&self, key: PreferenceKey, values: Vec<String>) -> Result<(), PreferenceError> {
        self.set(key, PreferenceValue::StrList(values))
    }

    fn get_geometry(&self, key: PreferenceKey) -> WindowGeometry {
        match self.get(key) {
            PreferenceValue::Geometry(geometry) => geometry,
            other => {
                warn!("Preference {key} is a {}", other.type_name());
                WindowGeometry::default()
            }
        }
    }
}

/// Preferences living as long as the process.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<HashMap<PreferenceKey, PreferenceValue>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: PreferenceKey) -> PreferenceValue {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .unwrap_or_else(|| key.default_value())
    }

    fn set(&self, key: PreferenceKey, value: PreferenceValue) -> Result<(), PreferenceError> {
        let default = key.default_value();
        if !default.same_type(&value) {
            return Err(PreferenceError::TypeMismatch {
                key,
                expected: default.type_name(),
                found: value.type_name(),
            });
        }

        debug!("Set preference {key} to {value:?}");
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        for key in PreferenceKey::iter() {
            assert_eq!(PreferenceKey::from_str(key.as_str()), Ok(key));
        }
        assert_eq!(
            PreferenceKey::from_str("winsize"),
            Err("winsize".to_owned())
        );
    }

    #[test]
    fn test_defaults() {
        let preferences = MemoryPreferences::new();
        assert!(!preferences.get_bool(PreferenceKey::ShowInactive));
        assert!(preferences.get_str_list(PreferenceKey::HideTimerCols).is_empty());
        assert_eq!(
            preferences.get_geometry(PreferenceKey::WinPosition),
            WindowGeometry::default()
        );
    }

    #[test]
    fn test_set_and_get() {
        let preferences = MemoryPreferences::new();
        preferences
            .set_bool(PreferenceKey::ShowInactive, true)
            .unwrap();
        preferences
            .set_str_list(
                PreferenceKey::HideServiceCols,
                vec!["Main PID".to_owned(), "Type".to_owned()],
            )
            .unwrap();

        let geometry = WindowGeometry {
            x: 10,
            y: 20,
            width: 800,
            height: 600,
        };
        preferences
            .set(PreferenceKey::WinPosition, PreferenceValue::Geometry(geometry))
            .unwrap();

        assert!(preferences.get_bool(PreferenceKey::ShowInactive));
        assert!(!preferences.get_bool(PreferenceKey::WinMaximized));
        assert_eq!(
            preferences.get_str_list(PreferenceKey::HideServiceCols),
            ["Main PID", "Type"]
        );
        assert_eq!(preferences.get_geometry(PreferenceKey::WinPosition), geometry);
    }

    #[test]
    fn test_type_checked() {
        let preferences = MemoryPreferences::new();
        let res = preferences.set(
            PreferenceKey::HideSocketCols,
            PreferenceValue::Bool(true),
        );
        assert_eq!(
            res,
            Err(PreferenceError::TypeMismatch {
                key: PreferenceKey::HideSocketCols,
                expected: "string list",
                found: "bool",
            })
        );
        assert!(preferences.get_str_list(PreferenceKey::HideSocketCols).is_empty());
    }

    #[test]
    fn test_hidden_columns_key() {
        assert_eq!(
            PreferenceKey::hidden_columns(&UnitType::Timer),
            Some(PreferenceKey::HideTimerCols)
        );
        assert_eq!(PreferenceKey::hidden_columns(&UnitType::Mount), None);
    }
}
