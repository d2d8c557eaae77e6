use std::{borrow::Cow, collections::BTreeMap, fmt::Display};

use zvariant::Value;

use super::{enums::UnitType, sysdbus::PATH_SYSTEMD_UNIT_PREFIX};

/// A property value as read from the bus, stripped of its wire signature.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Integer(i128),
    Bool(bool),
    Double(f64),
    Sequence(Vec<PropertyValue>),
    Tuple(Vec<PropertyValue>),
    Map(Vec<(PropertyValue, PropertyValue)>),
}

impl PropertyValue {
    pub fn from_value(value: &Value) -> PropertyValue {
        match value {
            Value::U8(i) => PropertyValue::Integer(*i as i128),
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::I16(i) => PropertyValue::Integer(*i as i128),
            Value::U16(i) => PropertyValue::Integer(*i as i128),
            Value::I32(i) => PropertyValue::Integer(*i as i128),
            Value::U32(i) => PropertyValue::Integer(*i as i128),
            Value::I64(i) => PropertyValue::Integer(*i as i128),
            Value::U64(i) => PropertyValue::Integer(*i as i128),
            Value::F64(f) => PropertyValue::Double(*f),
            Value::Str(s) => PropertyValue::Str(s.to_string()),
            Value::Signature(s) => PropertyValue::Str(s.to_string()),
            Value::ObjectPath(op) => PropertyValue::Str(op.to_string()),
            Value::Value(v) => PropertyValue::from_value(v),
            Value::Array(a) => {
                PropertyValue::Sequence(a.iter().map(PropertyValue::from_value).collect())
            }
            Value::Dict(d) => PropertyValue::Map(
                d.iter()
                    .map(|(k, v)| (PropertyValue::from_value(k), PropertyValue::from_value(v)))
                    .collect(),
            ),
            Value::Structure(stc) => {
                PropertyValue::Tuple(stc.fields().iter().map(PropertyValue::from_value).collect())
            }
            Value::Fd(fd) => PropertyValue::Str(fd.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i128> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

fn write_joined(
    f: &mut std::fmt::Formatter<'_>,
    open: &str,
    values: &[PropertyValue],
    close: &str,
) -> std::fmt::Result {
    f.write_str(open)?;
    let mut it = values.iter().peekable();
    while let Some(value) = it.next() {
        write!(f, "{value}")?;
        if it.peek().is_some() {
            f.write_str(", ")?;
        }
    }
    f.write_str(close)
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Str(s) => f.write_str(s),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Double(d) => write!(f, "{d}"),
            PropertyValue::Sequence(values) => write_joined(f, "[", values, "]"),
            PropertyValue::Tuple(values) => write_joined(f, "(", values, ")"),
            PropertyValue::Map(entries) => {
                f.write_str("{")?;
                let mut it = entries.iter().peekable();
                while let Some((key, value)) = it.next() {
                    write!(f, "{key}: {value}")?;
                    if it.peek().is_some() {
                        f.write_str(", ")?;
                    }
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_owned())
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::Integer(value as i128)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

pub const KEY_NAME: &str = "Name";
pub const KEY_PATH: &str = "Path";
pub const KEY_DESCRIPTION: &str = "Description";
pub const KEY_LOAD: &str = "Load";
pub const KEY_STATE: &str = "State";
pub const KEY_SUBSTATE: &str = "Substate";
pub const KEY_UNIT_TYPE: &str = "UnitType";

/// One unit as listed by the manager, plus whatever properties were loaded for it.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct UnitRecord {
    name: String,
    path: String,
    description: String,
    load_state: String,
    active_state: String,
    sub_state: String,
    unit_kind: Option<String>,
    properties: BTreeMap<String, PropertyValue>,
}

impl UnitRecord {
    pub fn new(
        name: &str,
        path: &str,
        description: &str,
        load_state: &str,
        active_state: &str,
        sub_state: &str,
    ) -> Self {
        let unit_kind = name
            .rsplit_once('.')
            .map(|(_, kind)| kind)
            .filter(|kind| !kind.is_empty())
            .map(str::to_owned);

        UnitRecord {
            name: name.to_owned(),
            path: path.to_owned(),
            description: description.to_owned(),
            load_state: load_state.to_owned(),
            active_state: active_state.to_owned(),
            sub_state: sub_state.to_owned(),
            unit_kind,
            properties: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn load_state(&self) -> &str {
        &self.load_state
    }

    pub fn active_state(&self) -> &str {
        &self.active_state
    }

    pub fn sub_state(&self) -> &str {
        &self.sub_state
    }

    pub fn unit_kind(&self) -> Option<&str> {
        self.unit_kind.as_deref()
    }

    /// Name without the kind suffix.
    pub fn stem(&self) -> &str {
        match &self.unit_kind {
            Some(kind) => &self.name[..self.name.len() - kind.len() - 1],
            None => &self.name,
        }
    }

    pub fn unit_type(&self) -> Option<UnitType> {
        self.unit_kind.as_deref().map(UnitType::new)
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn insert_property(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.properties.insert(key.into(), value);
    }

    /// Adds every entry of `properties`, replacing the ones already present.
    pub fn merge_properties(&mut self, properties: BTreeMap<String, PropertyValue>) {
        self.properties.extend(properties);
    }

    /// Looks up a column: base fields first, then the loaded properties.
    ///
    /// The capitalized kind (e.g. `Service` for `cups.service`) gives the stem.
    pub fn get(&self, key: &str) -> Option<Cow<'_, PropertyValue>> {
        let base = match key {
            KEY_NAME => Some(self.name.as_str()),
            KEY_PATH => Some(self.path.as_str()),
            KEY_DESCRIPTION => Some(self.description.as_str()),
            KEY_LOAD => Some(self.load_state.as_str()),
            KEY_STATE => Some(self.active_state.as_str()),
            KEY_SUBSTATE => Some(self.sub_state.as_str()),
            KEY_UNIT_TYPE => self.unit_kind.as_deref(),
            _ if self.is_capitalized_kind(key) => Some(self.stem()),
            _ => None,
        };

        match base {
            Some(value) => Some(Cow::Owned(PropertyValue::from(value))),
            None => self.properties.get(key).map(Cow::Borrowed),
        }
    }

    fn is_capitalized_kind(&self, key: &str) -> bool {
        let Some(kind) = self.unit_kind.as_deref() else {
            return false;
        };

        let mut chars = kind.chars();
        let Some(first) = chars.next() else {
            return false;
        };

        let mut capitalized = first.to_uppercase().collect::<String>();
        capitalized.push_str(&chars.as_str().to_lowercase());
        capitalized == key
    }
}

/// States and name globs handed to `ListUnitsByPatterns`. Empty lists match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnitFilter {
    pub states: Vec<String>,
    pub patterns: Vec<String>,
}

impl UnitFilter {
    pub fn new<S: AsRef<str>, P: AsRef<str>>(states: &[S], patterns: &[P]) -> Self {
        UnitFilter {
            states: states.iter().map(|s| s.as_ref().to_owned()).collect(),
            patterns: patterns.iter().map(|p| p.as_ref().to_owned()).collect(),
        }
    }

    pub fn all() -> Self {
        UnitFilter::default()
    }
}

/// Object path systemd exposes for `unit_name`.
pub fn unit_object_path(unit_name: &str) -> String {
    let mut path = String::with_capacity(PATH_SYSTEMD_UNIT_PREFIX.len() + unit_name.len() * 3);
    path.push_str(PATH_SYSTEMD_UNIT_PREFIX);
    path.push_str(&bus_label_escape(unit_name));
    path
}

fn bus_label_escape(label: &str) -> String {
    if label.is_empty() {
        return "_".to_owned();
    }

    let mut escaped = String::with_capacity(label.len() * 3);
    for byte in label.bytes() {
        if byte.is_ascii_alphanumeric() {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("_{byte:02x}"));
        }
    }
    escaped
}
