use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use log::{debug, info, warn};
use zvariant::{OwnedObjectPath, OwnedValue};

use super::{
    SystemdErrors,
    data::{PropertyValue, UnitFilter, UnitRecord},
    enums::UnitType,
    sysdbus::{
        INTERFACE_PROPERTIES, INTERFACE_SYSTEMD_MANAGER, INTERFACE_SYSTEMD_UNIT, ListedUnit,
        METHOD_GET_ALL, METHOD_GET_UNIT, METHOD_LIST_UNITS_BY_PATTERNS, PATH_SYSTEMD, SystemdBus,
        call,
    },
};

impl From<ListedUnit> for UnitRecord {
    fn from(unit: ListedUnit) -> Self {
        UnitRecord::new(
            &unit.primary_unit_name,
            unit.unit_object_path.as_str(),
            &unit.description,
            &unit.load_state,
            &unit.active_state,
            &unit.sub_state,
        )
    }
}

/// Unit discovery and property retrieval.
pub struct UnitDirectory<B: SystemdBus> {
    bus: Arc<B>,
}

impl<B: SystemdBus> UnitDirectory<B> {
    pub fn new(bus: Arc<B>) -> Self {
        UnitDirectory { bus }
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    /// Units matching `filter`, in the order the manager returns them.
    pub fn try_list_units(&self, filter: &UnitFilter) -> Result<Vec<UnitRecord>, SystemdErrors> {
        let rows: Vec<ListedUnit> = call(
            self.bus.as_ref(),
            PATH_SYSTEMD,
            INTERFACE_SYSTEMD_MANAGER,
            METHOD_LIST_UNITS_BY_PATTERNS,
            &(&filter.states, &filter.patterns),
        )?;

        debug!("{} units listed for {filter:?}", rows.len());
        Ok(rows.into_iter().map(UnitRecord::from).collect())
    }

    /// Like [`Self::try_list_units`], a bus failure gives an empty list.
    pub fn list_units(&self, filter: &UnitFilter) -> Vec<UnitRecord> {
        match self.try_list_units(filter) {
            Ok(units) => units,
            Err(error) => {
                warn!("List units {filter:?} failed: {error:?}");
                Vec::new()
            }
        }
    }

    /// All the properties of the interface matching `unit_type`, empty on failure.
    pub fn get_properties(
        &self,
        object_path: &str,
        unit_type: &UnitType,
    ) -> BTreeMap<String, PropertyValue> {
        self.get_interface_properties(object_path, unit_type.interface())
    }

    fn get_interface_properties(
        &self,
        object_path: &str,
        interface: &str,
    ) -> BTreeMap<String, PropertyValue> {
        if object_path.is_empty() {
            return BTreeMap::new();
        }

        let result: Result<HashMap<String, OwnedValue>, SystemdErrors> = call(
            self.bus.as_ref(),
            object_path,
            INTERFACE_PROPERTIES,
            METHOD_GET_ALL,
            &interface,
        );

        match result {
            Ok(properties) => properties
                .into_iter()
                .map(|(key, value)| (key, PropertyValue::from_value(&value)))
                .collect(),
            Err(error) => {
                warn!("Properties {interface} of {object_path} failed: {error:?}");
                BTreeMap::new()
            }
        }
    }

    /// Generic unit properties and kind specific ones. The kind call is skipped when the kind
    /// has no interface of its own.
    fn get_both_properties(
        &self,
        unit: &UnitRecord,
    ) -> (
        BTreeMap<String, PropertyValue>,
        BTreeMap<String, PropertyValue>,
    ) {
        let generic = self.get_interface_properties(unit.path(), INTERFACE_SYSTEMD_UNIT);

        let kind = match unit.unit_type() {
            Some(unit_type) if unit_type.has_own_interface() => {
                self.get_properties(unit.path(), &unit_type)
            }
            _ => BTreeMap::new(),
        };

        (generic, kind)
    }

    /// Lists then adds `detail_properties` to each unit, taken from the generic interface
    /// when it has them, from the kind interface otherwise.
    pub fn list_with_details(
        &self,
        filter: &UnitFilter,
        detail_properties: &[&str],
    ) -> Vec<UnitRecord> {
        let mut units = self.list_units(filter);

        if detail_properties.is_empty() {
            return units;
        }

        for unit in units.iter_mut() {
            let (mut generic, mut kind) = self.get_both_properties(unit);

            for key in detail_properties {
                let value = generic.remove(*key).or_else(|| kind.remove(*key));
                if let Some(value) = value {
                    unit.insert_property(*key, value);
                }
            }
        }

        units
    }

    pub fn get_unit_path(&self, unit_name: &str) -> Result<String, SystemdErrors> {
        let path: OwnedObjectPath = call(
            self.bus.as_ref(),
            PATH_SYSTEMD,
            INTERFACE_SYSTEMD_MANAGER,
            METHOD_GET_UNIT,
            &unit_name,
        )?;

        Ok(path.as_str().to_owned())
    }

    /// The unit named `unit_name` with every property of both its interfaces.
    ///
    /// `None` if it doesn't exist or the bus failed.
    pub fn get_unit_details(&self, unit_name: &str) -> Option<UnitRecord> {
        if unit_name.is_empty() {
            return None;
        }

        let filter = UnitFilter::new::<&str, &str>(&[], &[unit_name]);
        let mut units = match self.try_list_units(&filter) {
            Ok(units) => units,
            Err(error) => {
                warn!("Unit details of {unit_name} failed: {error:?}");
                return None;
            }
        };

        // the bus takes the name as a glob
        units.retain(|unit| unit.name() == unit_name);

        if units.len() > 1 {
            warn!(
                "Received {} other units named {unit_name}, keep the first",
                units.len() - 1
            );
        }

        if units.is_empty() {
            info!("No unit named {unit_name}");
            return None;
        }

        let mut unit = units.swap_remove(0);
        let (generic, kind) = self.get_both_properties(&unit);
        unit.merge_properties(generic);
        unit.merge_properties(kind);

        Some(unit)
    }
}
