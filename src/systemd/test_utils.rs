use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use serde::Serialize;
use zbus::Message;
use zvariant::{DynamicType, OwnedObjectPath, OwnedValue, Value};

use super::{
    SystemdErrors,
    data::unit_object_path,
    enums::UnitType,
    sysdbus::{
        INTERFACE_PROPERTIES, INTERFACE_SYSTEMD_MANAGER, INTERFACE_SYSTEMD_UNIT, ListedUnit,
        METHOD_GET_ALL, METHOD_GET_UNIT, METHOD_LIST_UNITS_BY_PATTERNS, METHOD_SUBSCRIBE,
        METHOD_UNSUBSCRIBE, SystemdBus, UnitFileChange,
    },
};

pub fn init_logs() {
    let _ = env_logger::builder()
        .target(env_logger::Target::Stdout)
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub fn owned<'a>(value: impl Into<Value<'a>>) -> OwnedValue {
    OwnedValue::try_from(value.into()).expect("no fd in test values")
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub path: String,
    pub interface: String,
    pub method: String,
    /// First string argument, if any
    pub argument: String,
}

pub struct MockUnit {
    pub name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub unit_properties: HashMap<String, OwnedValue>,
    pub kind_properties: HashMap<String, OwnedValue>,
}

impl MockUnit {
    pub fn new(name: &str, description: &str, active_state: &str, sub_state: &str) -> Self {
        let mut unit_properties = HashMap::new();
        unit_properties.insert("Id".to_owned(), owned(name));
        unit_properties.insert("Description".to_owned(), owned(description));
        unit_properties.insert("ActiveState".to_owned(), owned(active_state));
        unit_properties.insert("SubState".to_owned(), owned(sub_state));

        MockUnit {
            name: name.to_owned(),
            description: description.to_owned(),
            load_state: "loaded".to_owned(),
            active_state: active_state.to_owned(),
            sub_state: sub_state.to_owned(),
            unit_properties,
            kind_properties: HashMap::new(),
        }
    }

    pub fn unit_property<'a>(mut self, key: &str, value: impl Into<Value<'a>>) -> Self {
        self.unit_properties.insert(key.to_owned(), owned(value));
        self
    }

    pub fn kind_property<'a>(mut self, key: &str, value: impl Into<Value<'a>>) -> Self {
        self.kind_properties.insert(key.to_owned(), owned(value));
        self
    }

    fn path(&self) -> String {
        unit_object_path(&self.name)
    }

    fn kind_interface(&self) -> &'static str {
        let kind = self.name.rsplit_once('.').map(|(_, k)| k).unwrap_or("");
        UnitType::new(kind).interface()
    }

    fn matches(&self, states: &[String], patterns: &[String]) -> bool {
        let state_ok = states.is_empty()
            || states.iter().any(|s| {
                *s == self.load_state || *s == self.active_state || *s == self.sub_state
            });

        let name_ok = patterns.is_empty()
            || patterns.iter().any(|p| {
                glob::Pattern::new(p)
                    .map(|pattern| pattern.matches(&self.name))
                    .unwrap_or(false)
            });

        state_ok && name_ok
    }

    fn listed(&self) -> ListedUnit {
        ListedUnit {
            primary_unit_name: self.name.clone(),
            description: self.description.clone(),
            load_state: self.load_state.clone(),
            active_state: self.active_state.clone(),
            sub_state: self.sub_state.clone(),
            followed_unit: String::new(),
            unit_object_path: OwnedObjectPath::try_from(self.path()).expect("valid path"),
            numeric_job_id: 0,
            job_type: String::new(),
            job_object_path: OwnedObjectPath::try_from("/").expect("valid path"),
        }
    }

    fn set_state(&mut self, active_state: &str, sub_state: &str) {
        self.active_state = active_state.to_owned();
        self.sub_state = sub_state.to_owned();
        self.unit_properties
            .insert("ActiveState".to_owned(), owned(active_state));
        self.unit_properties
            .insert("SubState".to_owned(), owned(sub_state));
    }
}

/// In memory systemd answering the manager, unit and properties calls used by the crate.
pub struct MockBus {
    connected: AtomicBool,
    units: Mutex<Vec<MockUnit>>,
    calls: Mutex<Vec<RecordedCall>>,
    job_id: AtomicU32,
}

impl MockBus {
    pub fn new(units: Vec<MockUnit>) -> Self {
        MockBus {
            connected: AtomicBool::new(true),
            units: Mutex::new(units),
            calls: Mutex::new(Vec::new()),
            job_id: AtomicU32::new(0),
        }
    }

    pub fn with_sample_units() -> Self {
        let units = vec![
            MockUnit::new("cups.service", "CUPS Scheduler", "active", "running")
                .unit_property("UnitFileState", "enabled")
                .unit_property("FragmentPath", "/usr/lib/systemd/system/cups.service")
                .kind_property("Type", "notify")
                .kind_property("MainPID", 1234u32)
                .kind_property("Description", "CUPS service interface"),
            MockUnit::new("foo.service", "Foo daemon", "inactive", "dead")
                .unit_property("UnitFileState", "disabled")
                .kind_property("Type", "simple")
                .kind_property("MainPID", 0u32),
            MockUnit::new("bar.service", "Bar oneshot", "failed", "failed")
                .unit_property("UnitFileState", "static")
                .kind_property("Type", "oneshot"),
            MockUnit::new("logrotate.timer", "Daily rotation of log files", "active", "waiting")
                .unit_property("UnitFileState", "enabled")
                .kind_property("Unit", "logrotate.service")
                .kind_property("NextElapseUSecRealtime", 1_727_136_000_000_000u64)
                .kind_property("LastTriggerUSec", 1_727_049_600_000_000u64)
                .kind_property("Result", "success"),
            MockUnit::new("cups.socket", "CUPS Scheduler", "active", "listening")
                .unit_property("UnitFileState", "enabled")
                .kind_property("Listen", vec![("Stream", "/run/cups/cups.sock")])
                .kind_property("NAccept", 0u32)
                .kind_property("NConnections", 0u32),
        ];

        MockBus::new(units)
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn unit_count(&self) -> usize {
        self.units.lock().unwrap().len()
    }

    pub fn unit_names(&self) -> Vec<String> {
        self.units
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.name.clone())
            .collect()
    }

    pub fn unit_state(&self, name: &str) -> Option<(String, String)> {
        self.units
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.name == name)
            .map(|u| (u.active_state.clone(), u.sub_state.clone()))
    }

    fn manager_call(&self, method: &str, message: &Message) -> Result<Message, SystemdErrors> {
        let body = message.body();
        let units = self.units.lock().unwrap();

        match method {
            METHOD_GET_UNIT => {
                let name: String = body.deserialize()?;
                match units.iter().find(|u| u.name == name) {
                    Some(unit) => reply(&OwnedObjectPath::try_from(unit.path())?),
                    None => Err(SystemdErrors::NotFound(format!("Unit {name} not loaded."))),
                }
            }
            METHOD_LIST_UNITS_BY_PATTERNS => {
                let (states, patterns): (Vec<String>, Vec<String>) = body.deserialize()?;
                let rows: Vec<ListedUnit> = units
                    .iter()
                    .filter(|u| u.matches(&states, &patterns))
                    .map(MockUnit::listed)
                    .collect();
                reply(&rows)
            }
            "EnableUnitFiles" => {
                let (_names, _runtime, _force): (Vec<String>, bool, bool) = body.deserialize()?;
                reply(&(true, Vec::<UnitFileChange>::new()))
            }
            "DisableUnitFiles" => {
                let (_names, _runtime): (Vec<String>, bool) = body.deserialize()?;
                reply(&Vec::<UnitFileChange>::new())
            }
            METHOD_SUBSCRIBE | METHOD_UNSUBSCRIBE => reply(&()),
            _ => Err(unknown_method(method)),
        }
    }

    fn properties_call(&self, path: &str, message: &Message) -> Result<Message, SystemdErrors> {
        let interface: String = message.body().deserialize()?;
        let units = self.units.lock().unwrap();

        let Some(unit) = units.iter().find(|u| u.path() == path) else {
            return Err(SystemdErrors::RemoteCall {
                name: "org.freedesktop.DBus.Error.UnknownObject".to_owned(),
                message: format!("Unknown object '{path}'."),
            });
        };

        if interface == INTERFACE_SYSTEMD_UNIT {
            reply(&unit.unit_properties)
        } else if interface == unit.kind_interface() {
            reply(&unit.kind_properties)
        } else {
            Err(SystemdErrors::RemoteCall {
                name: "org.freedesktop.DBus.Error.UnknownInterface".to_owned(),
                message: format!("Unknown interface '{interface}'."),
            })
        }
    }

    fn unit_call(&self, path: &str, method: &str, message: &Message) -> Result<Message, SystemdErrors> {
        let _mode: String = message.body().deserialize()?;
        let mut units = self.units.lock().unwrap();

        let Some(unit) = units.iter_mut().find(|u| u.path() == path) else {
            return Err(unknown_method(method));
        };

        match method {
            "Start" | "Restart" => unit.set_state("active", "running"),
            "Stop" => unit.set_state("inactive", "dead"),
            _ => return Err(unknown_method(method)),
        }

        let job = self.job_id.fetch_add(1, Ordering::SeqCst) + 1;
        reply(&OwnedObjectPath::try_from(format!(
            "/org/freedesktop/systemd1/job/{job}"
        ))?)
    }
}

fn reply<T>(body: &T) -> Result<Message, SystemdErrors>
where
    T: Serialize + DynamicType,
{
    Ok(Message::method_call("/", "Reply")?.build(body)?)
}

fn unknown_method(method: &str) -> SystemdErrors {
    SystemdErrors::RemoteCall {
        name: "org.freedesktop.DBus.Error.UnknownMethod".to_owned(),
        message: format!("Unknown method {method}"),
    }
}

impl SystemdBus for MockBus {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send_and_wait(&self, message: &Message) -> Result<Message, SystemdErrors> {
        if !self.is_connected() {
            return Err(SystemdErrors::NotConnected);
        }

        let header = message.header();
        let path = header.path().map(|p| p.to_string()).unwrap_or_default();
        let interface = header.interface().map(|i| i.to_string()).unwrap_or_default();
        let method = header.member().map(|m| m.to_string()).unwrap_or_default();
        let argument = message.body().deserialize::<String>().unwrap_or_default();

        self.calls.lock().unwrap().push(RecordedCall {
            path: path.clone(),
            interface: interface.clone(),
            method: method.clone(),
            argument,
        });

        match interface.as_str() {
            INTERFACE_SYSTEMD_MANAGER => self.manager_call(&method, message),
            INTERFACE_PROPERTIES if method == METHOD_GET_ALL => {
                self.properties_call(&path, message)
            }
            INTERFACE_SYSTEMD_UNIT => self.unit_call(&path, &method, message),
            _ => Err(unknown_method(&method)),
        }
    }
}
