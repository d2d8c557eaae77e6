use std::{
    ffi::OsString,
    fmt::{self, Display, Formatter},
};

const NO_SUCH_UNIT: &str = "org.freedesktop.systemd1.NoSuchUnit";

#[derive(Debug)]
pub enum SystemdErrors {
    /// No bus session, `connect` was never called or the connection was closed.
    NotConnected,
    /// The remote side answered with an error
    RemoteCall {
        name: String,
        message: String,
    },
    NotFound(String),
    /// Method outside of the allow-list, refused before reaching the bus
    ForbiddenMethod(String),
    /// The elevated helper ran but did not succeed.
    HelperExecution {
        unit: String,
        action: String,
        code: Option<i32>,
        output: String,
    },
    HelperSpawn {
        program: OsString,
        error: std::io::Error,
    },
    UnitFileStateUnchangeable {
        unit: String,
        state: String,
    },
    Malformed(String),
    IoError(std::io::Error),
    ZBusError(zbus::Error),
    ZVariantError(zvariant::Error),
}

impl SystemdErrors {
    pub fn human_error_type(&self) -> String {
        match self {
            SystemdErrors::NotConnected => "Not connected to the bus".to_owned(),
            SystemdErrors::RemoteCall { name, message } => {
                if message.is_empty() {
                    name.clone()
                } else {
                    format!("{message} ({name})")
                }
            }
            SystemdErrors::NotFound(unit) => format!("Unit {unit} not found"),
            SystemdErrors::ForbiddenMethod(method) => format!("Method {method} is not allowed"),
            SystemdErrors::HelperExecution {
                unit,
                action,
                code,
                output,
            } => {
                let code = code.map_or_else(|| "none".to_owned(), |c| c.to_string());
                format!("Could not {action} {unit} (exit code {code})\n{output}")
            }
            SystemdErrors::HelperSpawn { program, error } => {
                format!("Could not launch {}: {error}", program.to_string_lossy())
            }
            SystemdErrors::UnitFileStateUnchangeable { unit, state } => {
                format!("Unit file state \"{state}\" of {unit} cannot be changed")
            }
            _ => format!("{self:?}"),
        }
    }

    /// The elevation program reports a dismissed (126) or refused (127) authorization with
    /// these codes.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            SystemdErrors::HelperExecution {
                code: Some(126 | 127),
                ..
            }
        ) || matches!(self, SystemdErrors::RemoteCall { name, .. } if name == "org.freedesktop.DBus.Error.AccessDenied"
                || name == "org.freedesktop.DBus.Error.InteractiveAuthorizationRequired")
    }
}

impl Display for SystemdErrors {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.human_error_type())
    }
}

impl std::error::Error for SystemdErrors {}

impl From<std::io::Error> for SystemdErrors {
    fn from(error: std::io::Error) -> Self {
        SystemdErrors::IoError(error)
    }
}

impl From<zbus::Error> for SystemdErrors {
    fn from(error: zbus::Error) -> Self {
        if let zbus::Error::MethodError(owned_error_name, ref msg, ref _message) = error {
            let err_code = zvariant::Str::from(owned_error_name);
            let message = msg.clone().unwrap_or_default();

            if err_code.eq(NO_SUCH_UNIT) {
                SystemdErrors::NotFound(message)
            } else {
                SystemdErrors::RemoteCall {
                    name: err_code.to_string(),
                    message,
                }
            }
        } else {
            SystemdErrors::ZBusError(error)
        }
    }
}

impl From<zvariant::Error> for SystemdErrors {
    fn from(value: zvariant::Error) -> Self {
        SystemdErrors::ZVariantError(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_call_description() {
        let err = SystemdErrors::RemoteCall {
            name: "org.freedesktop.DBus.Error.AccessDenied".to_owned(),
            message: "Access denied".to_owned(),
        };

        assert_eq!(
            err.to_string(),
            "Access denied (org.freedesktop.DBus.Error.AccessDenied)"
        );
        assert!(err.is_authorization_failure());
    }

    #[test]
    fn test_helper_failure_description() {
        let err = SystemdErrors::HelperExecution {
            unit: "foo.service".to_owned(),
            action: "enable".to_owned(),
            code: Some(1),
            output: "Failed\n".to_owned(),
        };

        assert_eq!(
            err.to_string(),
            "Could not enable foo.service (exit code 1)\nFailed\n"
        );
        assert!(!err.is_authorization_failure());

        let dismissed = SystemdErrors::HelperExecution {
            unit: "foo.service".to_owned(),
            action: "disable".to_owned(),
            code: Some(126),
            output: String::new(),
        };
        assert!(dismissed.is_authorization_failure());
    }
}
