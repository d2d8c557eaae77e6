use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::runtime::Handle;
use zvariant::OwnedValue;

use super::{watcher::SignalCoordinator, *};
use crate::systemd::{
    data::UnitFilter, directory::UnitDirectory, enums::DbusLevel, formatter::format_property,
};

pub const TEST_SERVICE: &str = "cups.service";

fn init() {
    let _ = env_logger::builder()
        .target(env_logger::Target::Stdout)
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

fn connected() -> Result<Arc<BusConnection>, SystemdErrors> {
    let bus = Arc::new(BusConnection::new(DbusLevel::System));
    bus.connect()?;
    Ok(bus)
}

#[ignore = "need a connection to a service"]
#[test]
fn test_connect_twice_and_close() -> Result<(), SystemdErrors> {
    init();
    let bus = connected()?;
    bus.connect()?;
    assert!(bus.is_connected());

    assert!(bus.close());
    assert!(!bus.close());

    let res: Result<OwnedObjectPath, _> = call(
        bus.as_ref(),
        PATH_SYSTEMD,
        INTERFACE_SYSTEMD_MANAGER,
        METHOD_GET_UNIT,
        &TEST_SERVICE,
    );
    assert!(matches!(res, Err(SystemdErrors::NotConnected)));
    Ok(())
}

#[ignore = "need a connection to a service"]
#[test]
fn test_get_unit_raw() -> Result<(), SystemdErrors> {
    init();
    let bus = connected()?;

    let path: OwnedObjectPath = call(
        bus.as_ref(),
        PATH_SYSTEMD,
        INTERFACE_SYSTEMD_MANAGER,
        METHOD_GET_UNIT,
        &TEST_SERVICE,
    )?;

    info!("{TEST_SERVICE} path {}", path.as_str());
    assert_eq!(
        path.as_str(),
        crate::systemd::data::unit_object_path(TEST_SERVICE)
    );
    Ok(())
}

#[ignore = "need a connection to a service"]
#[test]
fn test_get_all_raw() -> Result<(), SystemdErrors> {
    init();
    let bus = connected()?;
    let path = crate::systemd::data::unit_object_path(TEST_SERVICE);

    let properties: HashMap<String, OwnedValue> = call(
        bus.as_ref(),
        &path,
        INTERFACE_PROPERTIES,
        METHOD_GET_ALL,
        &INTERFACE_SYSTEMD_SERVICE,
    )?;

    for (key, value) in properties.iter() {
        debug!("{key}: {value:?}");
    }
    assert!(properties.contains_key("MainPID"));
    Ok(())
}

#[ignore = "need a connection to a service"]
#[test]
fn test_list_services() -> Result<(), SystemdErrors> {
    init();
    let bus = connected()?;
    let directory = UnitDirectory::new(bus);

    let filter = UnitFilter::new(&["active"], &["*.service"]);
    let units = directory.list_with_details(&filter, &["UnitFileState", "MainPID"]);

    info!("Listed {} active services", units.len());
    for unit in units.iter() {
        debug!(
            "{} {} pid {}",
            unit.name(),
            format_property(unit, "Unit File State"),
            format_property(unit, "MainPID")
        );
    }

    assert!(units.iter().all(|u| u.name().ends_with(".service")));
    Ok(())
}

#[ignore = "need a connection to a service"]
#[test]
fn test_unit_details() -> Result<(), SystemdErrors> {
    init();
    let bus = connected()?;
    let directory = UnitDirectory::new(bus);

    let Some(record) = directory.get_unit_details(TEST_SERVICE) else {
        warn!("{TEST_SERVICE} not on this system");
        return Ok(());
    };

    for (key, value) in crate::systemd::formatter::format_details(&record) {
        debug!("{key}: {value}");
    }
    Ok(())
}

#[ignore = "need a connection to a service"]
#[tokio::test(flavor = "multi_thread")]
async fn test_subscribe_and_release() -> Result<(), SystemdErrors> {
    init();
    let bus = connected()?;

    let coordinator = SignalCoordinator::new(bus.clone(), Handle::current());
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();

    assert!(coordinator.subscribe(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    assert!(!coordinator.subscribe(|| {}));

    tokio::time::sleep(Duration::from_secs(2)).await;
    info!("Refresh requests {}", count.load(Ordering::SeqCst));

    assert!(coordinator.unsubscribe());
    assert!(!coordinator.unsubscribe());
    bus.close();
    Ok(())
}
