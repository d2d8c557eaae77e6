//! Dbus abstraction
//! Documentation can be found at https://www.freedesktop.org/wiki/Software/systemd/dbus/

pub mod watcher;

#[cfg(test)]
mod tests;

use std::{
    fmt::Debug,
    sync::{Mutex, PoisonError, RwLock},
};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::task::AbortHandle;
use zbus::{
    Message,
    blocking::{Connection, MessageIterator},
    message::{Flags, Type as MessageType},
};
use zvariant::{DynamicType, OwnedObjectPath, Type};

use super::{SystemdErrors, enums::DbusLevel};

pub const DESTINATION_SYSTEMD: &str = "org.freedesktop.systemd1";
pub const PATH_SYSTEMD: &str = "/org/freedesktop/systemd1";
pub const PATH_SYSTEMD_UNIT_PREFIX: &str = "/org/freedesktop/systemd1/unit/";

pub const INTERFACE_SYSTEMD_MANAGER: &str = "org.freedesktop.systemd1.Manager";
pub const INTERFACE_SYSTEMD_UNIT: &str = "org.freedesktop.systemd1.Unit";
pub const INTERFACE_SYSTEMD_SERVICE: &str = "org.freedesktop.systemd1.Service";
pub const INTERFACE_SYSTEMD_TIMER: &str = "org.freedesktop.systemd1.Timer";
pub const INTERFACE_SYSTEMD_SOCKET: &str = "org.freedesktop.systemd1.Socket";
pub const INTERFACE_PROPERTIES: &str = "org.freedesktop.DBus.Properties";

pub const METHOD_GET_UNIT: &str = "GetUnit";
pub const METHOD_LIST_UNITS_BY_PATTERNS: &str = "ListUnitsByPatterns";
pub const METHOD_GET_ALL: &str = "GetAll";
pub const METHOD_SUBSCRIBE: &str = "Subscribe";
pub const METHOD_UNSUBSCRIBE: &str = "Unsubscribe";

/// Job mode of `Start`, `Stop` and `Restart`: fail instead of replacing a conflicting queued job.
pub const JOB_MODE_FAIL: &str = "fail";

/// One row of `ListUnitsByPatterns`, signature `(ssssssouso)`.
#[derive(Deserialize, Serialize, Type, PartialEq, Debug, Clone)]
pub struct ListedUnit {
    pub primary_unit_name: String,
    pub description: String,
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub followed_unit: String,
    pub unit_object_path: OwnedObjectPath,
    ///If there is a job queued for the job unit the numeric job id, 0 otherwise
    pub numeric_job_id: u32,
    pub job_type: String,
    pub job_object_path: OwnedObjectPath,
}

/// `(changes)` triplets returned by the unit file methods: type, file name, destination.
pub type UnitFileChange = (String, String, String);

/// The transport every bus user goes through.
///
/// Implementors only move messages. Building the call and decoding the reply is done once in
/// [`call`], so a fake bus in tests exercises the same encoding as the real one.
pub trait SystemdBus: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Sends `message` and blocks until its reply arrives. A remote error is returned as `Err`.
    fn send_and_wait(&self, message: &Message) -> Result<Message, SystemdErrors>;
}

fn method_call<A>(
    path: &str,
    interface: &str,
    method: &str,
    args: &A,
) -> Result<Message, SystemdErrors>
where
    A: Serialize + DynamicType,
{
    let message = Message::method_call(path, method)?
        .with_flags(Flags::AllowInteractiveAuth)?
        .destination(DESTINATION_SYSTEMD)?
        .interface(interface)?
        .build(args)?;

    Ok(message)
}

/// Calls `method` on the systemd object at `path` and decodes the whole reply as `R`.
///
/// A one element reply decodes into that element directly (e.g. `OwnedObjectPath` for
/// `GetUnit`), a multi element one into a tuple.
pub fn call<B, A, R>(
    bus: &B,
    path: &str,
    interface: &str,
    method: &str,
    args: &A,
) -> Result<R, SystemdErrors>
where
    B: SystemdBus + ?Sized,
    A: Serialize + DynamicType + Debug,
    R: DeserializeOwned + Type + Debug,
{
    let reply = send(bus, path, interface, method, args)?;

    let body = reply.body();
    let value: R = body.deserialize()?;
    trace!("{method} reply {value:?}");
    Ok(value)
}

/// Like [`call`] for methods without a reply body.
pub fn call_no_reply<B, A>(
    bus: &B,
    path: &str,
    interface: &str,
    method: &str,
    args: &A,
) -> Result<(), SystemdErrors>
where
    B: SystemdBus + ?Sized,
    A: Serialize + DynamicType + Debug,
{
    send(bus, path, interface, method, args).map(|_reply| ())
}

fn send<B, A>(
    bus: &B,
    path: &str,
    interface: &str,
    method: &str,
    args: &A,
) -> Result<Message, SystemdErrors>
where
    B: SystemdBus + ?Sized,
    A: Serialize + DynamicType + Debug,
{
    if !bus.is_connected() {
        warn!("Call {interface}.{method} on {path} without bus connection");
        return Err(SystemdErrors::NotConnected);
    }

    debug!("Call {interface}.{method} on {path} args {args:?}");
    let message = method_call(path, interface, method, args)?;
    bus.send_and_wait(&message)
}

/// The process wide bus session.
pub struct BusConnection {
    level: DbusLevel,
    connection: RwLock<Option<Connection>>,
    watchers: Mutex<Vec<AbortHandle>>,
}

impl BusConnection {
    pub fn new(level: DbusLevel) -> Self {
        BusConnection {
            level,
            connection: RwLock::new(None),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn level(&self) -> DbusLevel {
        self.level
    }

    /// Opens the bus. Does nothing if already connected.
    pub fn connect(&self) -> Result<(), SystemdErrors> {
        let mut guard = self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if guard.is_some() {
            debug!("Already connected to the {} bus", self.level);
            return Ok(());
        }

        let connection = match self.level {
            DbusLevel::System => Connection::system()?,
            DbusLevel::Session => Connection::session()?,
        };

        info!(
            "Connected to the {} bus as {:?}",
            self.level,
            connection.unique_name()
        );
        *guard = Some(connection);
        Ok(())
    }

    /// Drops the connection and stops every signal watcher bound to it.
    ///
    /// Returns `false` if there was no connection.
    pub fn close(&self) -> bool {
        let connection = self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let watchers: Vec<AbortHandle> = self
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for watcher in watchers {
            watcher.abort();
        }

        match connection {
            Some(_connection) => {
                info!("Closed the {} bus connection", self.level);
                true
            }
            None => {
                debug!("Close requested without connection");
                false
            }
        }
    }

    pub(crate) fn connection(&self) -> Result<Connection, SystemdErrors> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SystemdErrors::NotConnected)
    }

    /// Ties a signal watcher's lifetime to this connection.
    pub(crate) fn register_watcher(&self, watcher: AbortHandle) {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        watchers.retain(|w| !w.is_finished());
        watchers.push(watcher);
    }
}

impl SystemdBus for BusConnection {
    fn is_connected(&self) -> bool {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn send_and_wait(&self, message: &Message) -> Result<Message, SystemdErrors> {
        let connection = self.connection()?;

        // listen before sending so the reply can't slip by
        let mut stream = MessageIterator::from(connection.clone());

        connection.send(message)?;

        let serial = message.primary_header().serial_num();

        while let Some(message_res) = stream.next() {
            let reply = message_res?;

            if reply.header().reply_serial() != Some(serial) {
                continue;
            }

            match reply.message_type() {
                MessageType::MethodReturn => return Ok(reply),
                MessageType::Error => {
                    let error = zbus::Error::from(reply);
                    warn!("Remote error {error:?}");
                    return Err(SystemdErrors::from(error));
                }
                MessageType::MethodCall | MessageType::Signal => continue,
            }
        }

        warn!("Bus stream ended before the reply to serial {serial}");
        Err(SystemdErrors::Malformed(format!(
            "no reply for serial {serial}"
        )))
    }
}
