use super::sysdbus::{
    INTERFACE_SYSTEMD_SERVICE, INTERFACE_SYSTEMD_SOCKET, INTERFACE_SYSTEMD_TIMER,
    INTERFACE_SYSTEMD_UNIT,
};
use log::{debug, warn};
use std::{fmt::Display, str::FromStr};
use strum::EnumIter;

const ENABLED: &str = "enabled";
const DISABLED: &str = "disabled";

/// Unit file state as reported by the `UnitFileState` property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, Default)]
pub enum EnablementStatus {
    #[default]
    Unknown,
    Alias,
    Bad,
    Disabled,
    Enabled,
    EnabledRuntime,
    Generated,
    Indirect,
    Linked,
    LinkedRuntime,
    Masked,
    MaskedRuntime,
    Static,
    Transient,
}

impl EnablementStatus {
    pub fn new(enablement_status: &str) -> EnablementStatus {
        match enablement_status {
            "alias" => EnablementStatus::Alias,
            "bad" => EnablementStatus::Bad,
            DISABLED => EnablementStatus::Disabled,
            ENABLED => EnablementStatus::Enabled,
            "enabled-runtime" => EnablementStatus::EnabledRuntime,
            "generated" => EnablementStatus::Generated,
            "indirect" => EnablementStatus::Indirect,
            "linked" => EnablementStatus::Linked,
            "linked-runtime" => EnablementStatus::LinkedRuntime,
            "masked" => EnablementStatus::Masked,
            "masked-runtime" => EnablementStatus::MaskedRuntime,
            "static" => EnablementStatus::Static,
            "transient" => EnablementStatus::Transient,
            "" => EnablementStatus::Unknown,
            _ => {
                warn!("Unknown unit file state: {enablement_status:?}");
                EnablementStatus::Unknown
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnablementStatus::Alias => "alias",
            EnablementStatus::Bad => "bad",
            EnablementStatus::Disabled => DISABLED,
            EnablementStatus::Enabled => ENABLED,
            EnablementStatus::EnabledRuntime => "enabled-runtime",
            EnablementStatus::Generated => "generated",
            EnablementStatus::Indirect => "indirect",
            EnablementStatus::Linked => "linked",
            EnablementStatus::LinkedRuntime => "linked-runtime",
            EnablementStatus::Masked => "masked",
            EnablementStatus::MaskedRuntime => "masked-runtime",
            EnablementStatus::Static => "static",
            EnablementStatus::Transient => "transient",
            EnablementStatus::Unknown => "",
        }
    }

    /// The action that flips this state, only `enabled` and `disabled` can be toggled.
    pub fn toggle_action(&self) -> Option<UnitFileAction> {
        match self {
            EnablementStatus::Enabled => Some(UnitFileAction::Disable),
            EnablementStatus::Disabled => Some(UnitFileAction::Enable),
            _ => None,
        }
    }
}

impl Display for EnablementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for EnablementStatus {
    fn from(value: &str) -> Self {
        EnablementStatus::new(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitType {
    Automount,
    Device,
    Mount,
    Path,
    Scope,
    Service,
    Slice,
    Socket,
    Swap,
    Target,
    Timer,
    Unknown(String),
}

impl UnitType {
    /// Takes the suffix of the unit name as input to determine what type of unit it is.
    pub fn new(unit_type: &str) -> UnitType {
        match unit_type {
            "automount" => UnitType::Automount,
            "device" => UnitType::Device,
            "mount" => UnitType::Mount,
            "path" => UnitType::Path,
            "scope" => UnitType::Scope,
            "service" => UnitType::Service,
            "slice" => UnitType::Slice,
            "socket" => UnitType::Socket,
            "swap" => UnitType::Swap,
            "target" => UnitType::Target,
            "timer" => UnitType::Timer,
            _ => {
                debug!("Unknown Unit Type: {unit_type:?}");
                UnitType::Unknown(unit_type.to_string())
            }
        }
    }

    pub fn to_str(&self) -> &str {
        match self {
            Self::Automount => "automount",
            Self::Device => "device",
            Self::Mount => "mount",
            Self::Path => "path",
            Self::Scope => "scope",
            Self::Service => "service",
            Self::Slice => "slice",
            Self::Socket => "socket",
            Self::Swap => "swap",
            Self::Target => "target",
            Self::Timer => "timer",
            Self::Unknown(unit_type) => unit_type,
        }
    }

    /// Interface queried for the kind specific properties.
    ///
    /// Only services, timers and sockets get a dedicated one, every other kind reads the
    /// generic unit interface.
    pub fn interface(&self) -> &'static str {
        match self {
            Self::Service => INTERFACE_SYSTEMD_SERVICE,
            Self::Timer => INTERFACE_SYSTEMD_TIMER,
            Self::Socket => INTERFACE_SYSTEMD_SOCKET,
            _ => INTERFACE_SYSTEMD_UNIT,
        }
    }

    pub(crate) fn has_own_interface(&self) -> bool {
        self.interface() != INTERFACE_SYSTEMD_UNIT
    }
}

impl From<&str> for UnitType {
    fn from(value: &str) -> Self {
        UnitType::new(value)
    }
}

/// Unit interface methods a client may call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
pub enum UnitMethod {
    Start,
    Stop,
    Restart,
}

impl UnitMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitMethod::Start => "Start",
            UnitMethod::Stop => "Stop",
            UnitMethod::Restart => "Restart",
        }
    }
}

impl FromStr for UnitMethod {
    type Err = String;

    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method {
            "Start" => Ok(UnitMethod::Start),
            "Stop" => Ok(UnitMethod::Stop),
            "Restart" => Ok(UnitMethod::Restart),
            _ => Err(method.to_owned()),
        }
    }
}

/// Manager methods a client may call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
pub enum ManagerMethod {
    EnableUnitFiles,
    DisableUnitFiles,
}

impl ManagerMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerMethod::EnableUnitFiles => "EnableUnitFiles",
            ManagerMethod::DisableUnitFiles => "DisableUnitFiles",
        }
    }
}

impl FromStr for ManagerMethod {
    type Err = String;

    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method {
            "EnableUnitFiles" => Ok(ManagerMethod::EnableUnitFiles),
            "DisableUnitFiles" => Ok(ManagerMethod::DisableUnitFiles),
            _ => Err(method.to_owned()),
        }
    }
}

/// The action token handed to the elevated helper.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
pub enum UnitFileAction {
    Enable,
    Disable,
}

impl UnitFileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitFileAction::Enable => "enable",
            UnitFileAction::Disable => "disable",
        }
    }
}

impl Display for UnitFileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitFileAction {
    type Err = String;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "enable" => Ok(UnitFileAction::Enable),
            "disable" => Ok(UnitFileAction::Disable),
            _ => Err(format!("unknown action {action:?}, expected enable or disable")),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, EnumIter)]
pub enum DbusLevel {
    #[default]
    System,
    Session,
}

impl DbusLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbusLevel::System => "system",
            DbusLevel::Session => "session",
        }
    }
}

impl Display for DbusLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbusLevel {
    type Err = String;

    fn from_str(level: &str) -> Result<Self, Self::Err> {
        match level.to_ascii_lowercase().as_str() {
            "system" => Ok(DbusLevel::System),
            "session" | "user" => Ok(DbusLevel::Session),
            _ => Err(format!("unknown bus {level:?}, expected system or session")),
        }
    }
}

/// Signals emitted by the systemd manager object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManagerSignal {
    /// `true` when a reload starts, `false` once it is done
    Reloading(bool),
    JobNew,
    JobRemoved,
    UnitNew,
    UnitRemoved,
    UnitFilesChanged,
    Unknown(String),
}

impl ManagerSignal {
    /// `reloading` is the decoded payload of a `Reloading` signal, `None` if it could not be
    /// read. A missing payload counts as a reload still in progress.
    pub fn from_parts(member: &str, reloading: Option<bool>) -> ManagerSignal {
        match member {
            "Reloading" => ManagerSignal::Reloading(reloading.unwrap_or(true)),
            "JobNew" => ManagerSignal::JobNew,
            "JobRemoved" => ManagerSignal::JobRemoved,
            "UnitNew" => ManagerSignal::UnitNew,
            "UnitRemoved" => ManagerSignal::UnitRemoved,
            "UnitFilesChanged" => ManagerSignal::UnitFilesChanged,
            _ => ManagerSignal::Unknown(member.to_owned()),
        }
    }

    pub fn needs_refresh(&self) -> bool {
        match self {
            ManagerSignal::Reloading(reloading) => !reloading,
            ManagerSignal::JobRemoved | ManagerSignal::UnitFilesChanged => true,
            ManagerSignal::JobNew
            | ManagerSignal::UnitNew
            | ManagerSignal::UnitRemoved
            | ManagerSignal::Unknown(_) => false,
        }
    }
}
