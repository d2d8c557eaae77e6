//! Plain data model of the monitor window: one unit kind at a time, rows of formatted columns,
//! the actions offered on a selected unit, and the hidden column lists.

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use log::{debug, info, warn};
use strum::{EnumIter, IntoEnumIterator};
use tokio::runtime::Handle;

use crate::{
    settings::{PreferenceError, PreferenceKey, PreferenceStore},
    systemd::{
        SystemdErrors,
        actions::{HelperConfig, PrivilegedActionExecutor},
        data::{PropertyValue, UnitFilter, UnitRecord},
        directory::UnitDirectory,
        enums::{EnablementStatus, UnitFileAction, UnitType},
        formatter::{format_details, format_property},
        sysdbus::SystemdBus,
    },
    utils::debounce::Debouncer,
};

/// Column holding the status icon name.
pub const COLUMN_STATUS: &str = "S";
pub const KEY_UNIT_FILE_STATE: &str = "UnitFileState";

const STATUS_UPDATES_IN_PROGRESS: &str = "Updates in progress...";
const STATUS_REFRESHING: &str = "Refreshing list...";

const SERVICE_COLUMNS: &[&str] = &[
    "Name",
    COLUMN_STATUS,
    "State",
    "Substate",
    "Unit File State",
    "Type",
    "Fragment Path",
    "Description",
    "Main PID",
];

const SERVICE_DETAILS: &[&str] = &[KEY_UNIT_FILE_STATE, "Type", "FragmentPath", "MainPID"];

const TIMER_COLUMNS: &[&str] = &[
    "Name",
    COLUMN_STATUS,
    "State",
    "Substate",
    "Unit File State",
    "Triggers",
    "LastTriggerUSec",
    "NextElapseUSecRealtime",
    "Unit",
    "FragmentPath",
    "Description",
    "Timers Calendar",
    "Result",
];

const TIMER_DETAILS: &[&str] = &[
    KEY_UNIT_FILE_STATE,
    "Triggers",
    "LastTriggerUSec",
    "NextElapseUSecRealtime",
    "Unit",
    "FragmentPath",
    "TimersCalendar",
    "Result",
];

const SOCKET_COLUMNS: &[&str] = &[
    "Name",
    COLUMN_STATUS,
    "State",
    "Substate",
    "Unit File State",
    "Listen",
    "Triggers",
    "FileDescriptorName",
    "FragmentPath",
    "Result",
    "N Accept",
    "N Connections",
    "Description",
];

const SOCKET_DETAILS: &[&str] = &[
    KEY_UNIT_FILE_STATE,
    "Listen",
    "Triggers",
    "FileDescriptorName",
    "FragmentPath",
    "Result",
    "NAccept",
    "NConnections",
];

/// The unit kinds the monitor has a view for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, EnumIter)]
pub enum MonitoredKind {
    #[default]
    Service,
    Timer,
    Socket,
}

impl MonitoredKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitoredKind::Service => "service",
            MonitoredKind::Timer => "timer",
            MonitoredKind::Socket => "socket",
        }
    }

    pub fn unit_type(&self) -> UnitType {
        match self {
            MonitoredKind::Service => UnitType::Service,
            MonitoredKind::Timer => UnitType::Timer,
            MonitoredKind::Socket => UnitType::Socket,
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            MonitoredKind::Service => SERVICE_COLUMNS,
            MonitoredKind::Timer => TIMER_COLUMNS,
            MonitoredKind::Socket => SOCKET_COLUMNS,
        }
    }

    /// Properties loaded for every listed unit.
    pub fn detail_properties(&self) -> &'static [&'static str] {
        match self {
            MonitoredKind::Service => SERVICE_DETAILS,
            MonitoredKind::Timer => TIMER_DETAILS,
            MonitoredKind::Socket => SOCKET_DETAILS,
        }
    }

    pub fn filter(&self, show_inactive: bool) -> UnitFilter {
        let pattern = format!("*.{}", self.as_str());
        if show_inactive {
            UnitFilter::new::<&str, _>(&[], &[pattern])
        } else {
            UnitFilter::new(&["active"], &[pattern])
        }
    }

    fn hidden_columns_key(&self) -> PreferenceKey {
        match self {
            MonitoredKind::Service => PreferenceKey::HideServiceCols,
            MonitoredKind::Timer => PreferenceKey::HideTimerCols,
            MonitoredKind::Socket => PreferenceKey::HideSocketCols,
        }
    }
}

impl Display for MonitoredKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitoredKind {
    type Err = String;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        MonitoredKind::iter()
            .find(|k| k.as_str() == kind)
            .ok_or_else(|| kind.to_owned())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatusIndicator {
    Green,
    Grey,
    Red,
    Black,
}

impl StatusIndicator {
    pub fn from_sub_state(sub_state: &str) -> Self {
        match sub_state {
            "running" | "listening" => StatusIndicator::Green,
            "exited" | "dead" | "waiting" => StatusIndicator::Grey,
            "failed" => StatusIndicator::Red,
            _ => StatusIndicator::Black,
        }
    }

    pub fn icon_name(&self) -> &'static str {
        match self {
            StatusIndicator::Green => "sm-status-green",
            StatusIndicator::Grey => "sm-status-grey",
            StatusIndicator::Red => "sm-sphere-red",
            StatusIndicator::Black => "sm-status-black",
        }
    }
}

/// What can be done with the selected unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionAvailability {
    pub start: bool,
    pub stop: bool,
    pub restart: bool,
    pub info: bool,
    /// `None` when the unit file state can't be toggled
    pub toggle: Option<UnitFileAction>,
}

impl ActionAvailability {
    pub fn for_record(record: &UnitRecord) -> Self {
        let sub_state = record.sub_state();

        ActionAvailability {
            start: matches!(sub_state, "exited" | "failed" | "dead"),
            stop: sub_state == "running",
            restart: sub_state != "waiting",
            info: true,
            toggle: unit_file_state(record).toggle_action(),
        }
    }
}

fn unit_file_state(record: &UnitRecord) -> EnablementStatus {
    record
        .property(KEY_UNIT_FILE_STATE)
        .and_then(PropertyValue::as_str)
        .map(EnablementStatus::new)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorRow {
    record: UnitRecord,
    cells: Vec<String>,
}

impl MonitorRow {
    fn new(record: UnitRecord, columns: &[&str]) -> Self {
        let cells = columns
            .iter()
            .map(|column| {
                if *column == COLUMN_STATUS {
                    StatusIndicator::from_sub_state(record.sub_state())
                        .icon_name()
                        .to_owned()
                } else {
                    format_property(&record, column)
                }
            })
            .collect();

        MonitorRow { record, cells }
    }

    pub fn name(&self) -> &str {
        self.record.name()
    }

    pub fn record(&self) -> &UnitRecord {
        &self.record
    }

    /// One formatted string per column of the kind, in column order.
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Empty term matches every row.
    pub fn matches(&self, search_term: &str) -> bool {
        search_term.is_empty() || self.cells.concat().contains(search_term)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub rows: Vec<MonitorRow>,
    pub status: String,
}

#[derive(Debug, Default)]
struct MonitorView {
    kind: MonitoredKind,
    rows: Vec<MonitorRow>,
    status: String,
}

struct MonitorModel<B: SystemdBus, S: PreferenceStore> {
    directory: UnitDirectory<B>,
    preferences: Arc<S>,
    view: Mutex<MonitorView>,
}

impl<B: SystemdBus, S: PreferenceStore> MonitorModel<B, S> {
    fn view(&self) -> std::sync::MutexGuard<'_, MonitorView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: &str) {
        self.view().status = status.to_owned();
    }

    fn refresh(&self) -> RefreshOutcome {
        let kind = self.view().kind;
        let show_inactive = self.preferences.get_bool(PreferenceKey::ShowInactive);

        let units = self
            .directory
            .list_with_details(&kind.filter(show_inactive), kind.detail_properties());

        let mut rows: Vec<MonitorRow> = units
            .into_iter()
            .map(|unit| MonitorRow::new(unit, kind.columns()))
            .collect();
        rows.sort_by(|a, b| a.name().cmp(b.name()));

        let status = format!("Refreshed {} {kind} units", rows.len());
        info!("{status}");

        let mut view = self.view();
        if view.kind != kind {
            debug!("Kind changed during the {kind} refresh, drop it");
            return RefreshOutcome {
                rows: view.rows.clone(),
                status: view.status.clone(),
            };
        }

        view.rows = rows.clone();
        view.status = status.clone();
        RefreshOutcome { rows, status }
    }
}

/// Ties the unit directory, the action executor and the preferences to the kind on display.
pub struct UnitMonitor<B: SystemdBus, S: PreferenceStore> {
    model: Arc<MonitorModel<B, S>>,
    executor: PrivilegedActionExecutor<B>,
    refresher: Option<Debouncer>,
    search_term: String,
}

impl<B, S> UnitMonitor<B, S>
where
    B: SystemdBus + 'static,
    S: PreferenceStore + 'static,
{
    pub fn new(bus: Arc<B>, helper: HelperConfig, preferences: Arc<S>) -> Self {
        let model = MonitorModel {
            directory: UnitDirectory::new(bus.clone()),
            preferences,
            view: Mutex::new(MonitorView::default()),
        };

        UnitMonitor {
            model: Arc::new(model),
            executor: PrivilegedActionExecutor::new(bus, helper),
            refresher: None,
            search_term: String::new(),
        }
    }

    /// Starts on `kind` instead of services. Nothing is listed until the next refresh.
    pub fn with_kind(self, kind: MonitoredKind) -> Self {
        self.model.view().kind = kind;
        self
    }

    /// Delays and coalesces the refreshes asked by [`Self::request_refresh`].
    pub fn with_debounce(mut self, runtime: Handle, delay: Duration) -> Self {
        let model: Weak<MonitorModel<B, S>> = Arc::downgrade(&self.model);

        let debouncer = Debouncer::new(runtime, delay, move || {
            let Some(model) = model.upgrade() else {
                debug!("Monitor gone, skip refresh");
                return;
            };
            model.set_status(STATUS_REFRESHING);
            model.refresh();
        });

        self.refresher = Some(debouncer);
        self
    }

    /// Lists the units of the current kind and rebuilds the rows.
    pub fn refresh(&self) -> RefreshOutcome {
        self.model.refresh()
    }

    /// Refreshes after the debounce delay, or right away without debouncer.
    ///
    /// Returns `false` if a refresh was already pending.
    pub fn request_refresh(&self) -> bool {
        match &self.refresher {
            Some(refresher) => {
                let scheduled = refresher.trigger();
                if scheduled {
                    self.model.set_status(STATUS_UPDATES_IN_PROGRESS);
                }
                scheduled
            }
            None => {
                self.refresh();
                true
            }
        }
    }

    /// Callback for the signal coordinator, `None` without debouncer.
    pub fn refresh_trigger(&self) -> Option<impl Fn() + Send + Sync + 'static> {
        let refresher = self.refresher.clone()?;
        let model = Arc::downgrade(&self.model);

        Some(move || {
            if !refresher.trigger() {
                return;
            }
            if let Some(model) = model.upgrade() {
                model.set_status(STATUS_UPDATES_IN_PROGRESS);
            }
        })
    }

    pub fn is_refresh_pending(&self) -> bool {
        self.refresher.as_ref().is_some_and(Debouncer::is_pending)
    }

    pub fn kind(&self) -> MonitoredKind {
        self.model.view().kind
    }

    /// Switches to `kind` and refreshes if it changed.
    pub fn set_kind(&self, kind: MonitoredKind) -> Option<RefreshOutcome> {
        {
            let mut view = self.model.view();
            if view.kind == kind {
                return None;
            }
            view.kind = kind;
            view.rows.clear();
        }

        Some(self.refresh())
    }

    pub fn show_inactive(&self) -> bool {
        self.model.preferences.get_bool(PreferenceKey::ShowInactive)
    }

    pub fn set_show_inactive(&self, show: bool) -> Result<RefreshOutcome, PreferenceError> {
        self.model
            .preferences
            .set_bool(PreferenceKey::ShowInactive, show)?;
        Ok(self.refresh())
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_search_term(&mut self, search_term: impl Into<String>) {
        self.search_term = search_term.into();
    }

    pub fn status(&self) -> String {
        self.model.view().status.clone()
    }

    /// Every row of the last refresh.
    pub fn rows(&self) -> Vec<MonitorRow> {
        self.model.view().rows.clone()
    }

    /// Rows matching the search term.
    pub fn visible_rows(&self) -> Vec<MonitorRow> {
        self.model
            .view()
            .rows
            .iter()
            .filter(|row| row.matches(&self.search_term))
            .cloned()
            .collect()
    }

    fn row(&self, unit_name: &str) -> Option<MonitorRow> {
        self.model
            .view()
            .rows
            .iter()
            .find(|row| row.name() == unit_name)
            .cloned()
    }

    pub fn hidden_columns(&self, kind: MonitoredKind) -> Vec<String> {
        self.model
            .preferences
            .get_str_list(kind.hidden_columns_key())
    }

    /// Stores the hidden columns of `kind`, names that are not columns of it are dropped.
    pub fn set_hidden_columns(
        &self,
        kind: MonitoredKind,
        hidden: &[&str],
    ) -> Result<(), PreferenceError> {
        let columns = kind.columns();
        let hidden: Vec<String> = hidden
            .iter()
            .filter(|column| {
                let known = columns.contains(*column);
                if !known {
                    warn!("{column:?} is not a {kind} column");
                }
                known
            })
            .map(|column| column.to_string())
            .collect();

        self.model
            .preferences
            .set_str_list(kind.hidden_columns_key(), hidden)
    }

    /// Columns of the current kind minus the hidden ones.
    pub fn visible_columns(&self) -> Vec<&'static str> {
        let kind = self.kind();
        let hidden = self.hidden_columns(kind);
        kind.columns()
            .iter()
            .copied()
            .filter(|column| !hidden.iter().any(|h| h == column))
            .collect()
    }

    /// Actions for the unit of the row named `unit_name`, nothing if there is no such row.
    pub fn actions_for(&self, unit_name: &str) -> ActionAvailability {
        self.row(unit_name)
            .map(|row| ActionAvailability::for_record(row.record()))
            .unwrap_or_default()
    }

    /// Runs the unit method `method` (`Start`, `Stop` or `Restart`) and returns the job path.
    pub fn perform(&self, unit_name: &str, method: &str) -> Result<String, SystemdErrors> {
        self.executor
            .unit_method(unit_name, method)
            .inspect_err(|error| warn!("Could not perform {method} on unit {unit_name}: {error:?}"))
    }

    /// Enables a `disabled` unit file or disables an `enabled` one, through the helper.
    ///
    /// On success a refresh is requested.
    pub fn toggle_unit_file_state(&self, unit_name: &str) -> Result<String, SystemdErrors> {
        let row = self
            .row(unit_name)
            .ok_or_else(|| SystemdErrors::NotFound(unit_name.to_owned()))?;

        let state = unit_file_state(row.record());
        let Some(action) = state.toggle_action() else {
            warn!("Unit file state {state:?} of {unit_name} cannot be changed");
            return Err(SystemdErrors::UnitFileStateUnchangeable {
                unit: unit_name.to_owned(),
                state: state.as_str().to_owned(),
            });
        };

        self.set_unit_file_state(unit_name, action)
    }

    pub fn set_unit_file_state(
        &self,
        unit_name: &str,
        action: UnitFileAction,
    ) -> Result<String, SystemdErrors> {
        let output = self.executor.change_unit_file_state(unit_name, action)?;
        self.request_refresh();
        Ok(output)
    }

    /// Every property of `unit_name`, formatted.
    pub fn details(&self, unit_name: &str) -> Option<Vec<(String, String)>> {
        let record = self.model.directory.get_unit_details(unit_name)?;
        let details = format_details(&record);
        info!("Full details {unit_name}: {}", details.len());
        Some(details)
    }
}
