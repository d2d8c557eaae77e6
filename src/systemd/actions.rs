use std::{
    ffi::{OsStr, OsString},
    fmt::Debug,
    path::PathBuf,
    process::Command,
    str::FromStr,
    sync::Arc,
};

use log::{debug, error, info, warn};
use serde::{Serialize, de::DeserializeOwned};
use zvariant::{DynamicType, OwnedObjectPath, Type};

use super::{
    SystemdErrors,
    directory::UnitDirectory,
    enums::{ManagerMethod, UnitFileAction, UnitMethod},
    sysdbus::{
        INTERFACE_SYSTEMD_MANAGER, INTERFACE_SYSTEMD_UNIT, JOB_MODE_FAIL, PATH_SYSTEMD,
        SystemdBus, UnitFileChange, call,
    },
};
use crate::consts::{DEFAULT_ELEVATE_PROGRAM, DEFAULT_HELPER_PATH, ELEVATE_NO_INTERNAL_AGENT};

/// How the unit file helper gets started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperConfig {
    pub helper: PathBuf,
    /// Elevation program, `None` to run the helper as is
    pub elevate: Option<OsString>,
    pub elevate_args: Vec<OsString>,
}

impl Default for HelperConfig {
    fn default() -> Self {
        HelperConfig {
            helper: PathBuf::from(DEFAULT_HELPER_PATH),
            elevate: Some(OsString::from(DEFAULT_ELEVATE_PROGRAM)),
            elevate_args: vec![OsString::from(ELEVATE_NO_INTERNAL_AGENT)],
        }
    }
}

impl HelperConfig {
    pub fn new(helper: impl Into<PathBuf>, elevate: Option<OsString>) -> Self {
        let elevate_args = match elevate.as_deref() {
            Some(program) if is_pkexec(program) => {
                vec![OsString::from(ELEVATE_NO_INTERNAL_AGENT)]
            }
            _ => Vec::new(),
        };

        HelperConfig {
            helper: helper.into(),
            elevate,
            elevate_args,
        }
    }

    /// Helper run straight, no elevation.
    pub fn unelevated(helper: impl Into<PathBuf>) -> Self {
        HelperConfig::new(helper, None)
    }

    /// Root needs no elevation.
    fn command(&self, unit_name: &str, action: UnitFileAction, is_root: bool) -> Command {
        let mut command = match self.elevate.as_ref() {
            Some(program) if !is_root => {
                let mut command = Command::new(program);
                command.args(&self.elevate_args).arg(&self.helper);
                command
            }
            _ => Command::new(&self.helper),
        };

        command.arg(unit_name).arg(action.as_str());
        command
    }

    fn program(&self, is_root: bool) -> OsString {
        match self.elevate.as_ref() {
            Some(program) if !is_root => program.clone(),
            _ => self.helper.clone().into_os_string(),
        }
    }
}

fn is_pkexec(program: &OsStr) -> bool {
    std::path::Path::new(program)
        .file_name()
        .is_some_and(|name| name == DEFAULT_ELEVATE_PROGRAM)
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Unit lifecycle calls and unit file state changes, both limited to a fixed set of methods.
pub struct PrivilegedActionExecutor<B: SystemdBus> {
    directory: UnitDirectory<B>,
    helper: HelperConfig,
}

impl<B: SystemdBus> PrivilegedActionExecutor<B> {
    pub fn new(bus: Arc<B>, helper: HelperConfig) -> Self {
        PrivilegedActionExecutor {
            directory: UnitDirectory::new(bus),
            helper,
        }
    }

    pub fn helper(&self) -> &HelperConfig {
        &self.helper
    }

    /// Calls unit `method` (`Start`, `Stop` or `Restart`) in mode `fail` and returns the job path.
    ///
    /// Any other method is refused before reaching the bus.
    pub fn unit_method(&self, unit_name: &str, method: &str) -> Result<String, SystemdErrors> {
        let method = UnitMethod::from_str(method).map_err(|method| {
            error!("Unit method {method:?} not allowed");
            SystemdErrors::ForbiddenMethod(method)
        })?;

        self.call_unit_method(unit_name, method)
    }

    fn call_unit_method(
        &self,
        unit_name: &str,
        method: UnitMethod,
    ) -> Result<String, SystemdErrors> {
        if unit_name.is_empty() {
            return Err(SystemdErrors::NotFound(String::new()));
        }

        let unit_path = self.directory.get_unit_path(unit_name)?;

        let job: OwnedObjectPath = call(
            self.directory.bus().as_ref(),
            &unit_path,
            INTERFACE_SYSTEMD_UNIT,
            method.as_str(),
            &JOB_MODE_FAIL,
        )
        .inspect_err(|e| warn!("{} {unit_name} failed: {e:?}", method.as_str()))?;

        info!("{} {unit_name} queued job {}", method.as_str(), job.as_str());
        Ok(job.as_str().to_owned())
    }

    pub fn start_unit(&self, unit_name: &str) -> Result<String, SystemdErrors> {
        self.call_unit_method(unit_name, UnitMethod::Start)
    }

    pub fn stop_unit(&self, unit_name: &str) -> Result<String, SystemdErrors> {
        self.call_unit_method(unit_name, UnitMethod::Stop)
    }

    pub fn restart_unit(&self, unit_name: &str) -> Result<String, SystemdErrors> {
        self.call_unit_method(unit_name, UnitMethod::Restart)
    }

    /// Calls manager `method` if it is `EnableUnitFiles` or `DisableUnitFiles`.
    pub fn manager_method<A, R>(&self, method: &str, args: &A) -> Result<R, SystemdErrors>
    where
        A: Serialize + DynamicType + Debug,
        R: DeserializeOwned + Type + Debug,
    {
        let method = ManagerMethod::from_str(method).map_err(|method| {
            error!("Manager method {method:?} not allowed");
            SystemdErrors::ForbiddenMethod(method)
        })?;

        let response: R = call(
            self.directory.bus().as_ref(),
            PATH_SYSTEMD,
            INTERFACE_SYSTEMD_MANAGER,
            method.as_str(),
            args,
        )?;

        info!("{} response {response:?}", method.as_str());
        Ok(response)
    }

    /// `EnableUnitFiles([unit], runtime false, force true)` over the bus.
    pub fn unit_file_enable(&self, unit_name: &str) -> Result<Vec<UnitFileChange>, SystemdErrors> {
        if unit_name.is_empty() {
            return Err(SystemdErrors::NotFound(String::new()));
        }

        let (_carries_install_info, changes): (bool, Vec<UnitFileChange>) = self.manager_method(
            ManagerMethod::EnableUnitFiles.as_str(),
            &(vec![unit_name], false, true),
        )?;
        Ok(changes)
    }

    /// `DisableUnitFiles([unit], runtime false)` over the bus.
    pub fn unit_file_disable(&self, unit_name: &str) -> Result<Vec<UnitFileChange>, SystemdErrors> {
        if unit_name.is_empty() {
            return Err(SystemdErrors::NotFound(String::new()));
        }

        self.manager_method(
            ManagerMethod::DisableUnitFiles.as_str(),
            &(vec![unit_name], false),
        )
    }

    /// Enables or disables the unit file through the elevated helper.
    ///
    /// Returns the helper's combined stdout and stderr.
    pub fn change_unit_file_state(
        &self,
        unit_name: &str,
        action: UnitFileAction,
    ) -> Result<String, SystemdErrors> {
        if unit_name.is_empty() {
            return Err(SystemdErrors::NotFound(String::new()));
        }

        let is_root = is_root();
        let mut command = self.helper.command(unit_name, action, is_root);
        info!("Change unit file state {command:?}");

        let output = command.output().map_err(|error| {
            warn!("Can't launch unit file helper: {error:?}");
            SystemdErrors::HelperSpawn {
                program: self.helper.program(is_root),
                error,
            }
        })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            debug!("Helper output {text:?}");
            Ok(text)
        } else {
            warn!(
                "Could not {action} {unit_name}, helper status {:?}",
                output.status
            );
            Err(SystemdErrors::HelperExecution {
                unit: unit_name.to_owned(),
                action: action.to_string(),
                code: output.status.code(),
                output: text,
            })
        }
    }
}
