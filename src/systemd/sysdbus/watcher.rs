use std::sync::{Arc, Mutex, PoisonError};

use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use tokio::{runtime::Handle, task::JoinHandle};
use zbus::{
    Message, MatchRule, MessageStream, blocking::MessageIterator, message::Type as MessageType,
};

use super::{
    BusConnection, DESTINATION_SYSTEMD, INTERFACE_SYSTEMD_MANAGER, METHOD_SUBSCRIBE,
    METHOD_UNSUBSCRIBE, PATH_SYSTEMD, call_no_reply,
};
use crate::systemd::{SystemdErrors, enums::ManagerSignal};

const SIGNAL_RELOADING: &str = "Reloading";

/// An active stream of manager signals. Dropping it does not stop the stream, use
/// [`SignalCoordinator::unsubscribe`] or [`BusConnection::close`].
#[derive(Debug)]
pub struct SignalSubscription {
    task: JoinHandle<()>,
}

impl SignalSubscription {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Follows the systemd manager signals and calls back when the unit list may have changed.
pub struct SignalCoordinator {
    bus: Arc<BusConnection>,
    runtime: Handle,
    subscription: Mutex<Option<SignalSubscription>>,
}

impl SignalCoordinator {
    pub fn new(bus: Arc<BusConnection>, runtime: Handle) -> Self {
        SignalCoordinator {
            bus,
            runtime,
            subscription: Mutex::new(None),
        }
    }

    /// Starts listening, `on_refresh_needed` runs on the runtime's worker for every signal
    /// that asks for a refresh. Debouncing is up to the callback.
    ///
    /// Returns `false` if already subscribed or the bus is not connected.
    pub fn subscribe<F>(&self, on_refresh_needed: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if subscription.as_ref().is_some_and(SignalSubscription::is_active) {
            warn!("Already subscribed to the manager signals");
            return false;
        }

        let stream = match self.open_stream() {
            Ok(stream) => stream,
            Err(error) => {
                warn!("Can't listen to the manager signals: {error:?}");
                return false;
            }
        };

        // systemd only emits the job and unit signals to subscribed clients
        if let Err(error) = call_no_reply(
            self.bus.as_ref(),
            PATH_SYSTEMD,
            INTERFACE_SYSTEMD_MANAGER,
            METHOD_SUBSCRIBE,
            &(),
        ) {
            warn!("Manager {METHOD_SUBSCRIBE} failed: {error:?}");
        }

        let task = self.runtime.spawn(async move {
            let mut stream = std::pin::pin!(stream);
            while let Some(message_res) = stream.next().await {
                match message_res {
                    Ok(message) => handle_message(&message, &on_refresh_needed),
                    Err(error) => warn!("Signal stream error {error:?}"),
                }
            }
            debug!("Manager signal stream ended");
        });

        self.bus.register_watcher(task.abort_handle());
        *subscription = Some(SignalSubscription { task });

        info!("Subscribed to the manager signals");
        true
    }

    fn open_stream(&self) -> Result<MessageStream, SystemdErrors> {
        let connection = self.bus.connection()?;

        let rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .sender(DESTINATION_SYSTEMD)?
            .interface(INTERFACE_SYSTEMD_MANAGER)?
            .path(PATH_SYSTEMD)?
            .build();

        let iterator = MessageIterator::for_match_rule(rule, &connection, None)?;
        Ok(iterator.into_inner())
    }

    /// Stops listening. Returns `false` if nothing was subscribed.
    pub fn unsubscribe(&self) -> bool {
        let Some(subscription) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            debug!("Nothing to unsubscribe");
            return false;
        };

        if !subscription.is_active() {
            debug!("Subscription already released");
            return false;
        }

        subscription.task.abort();

        if let Err(error) = call_no_reply(
            self.bus.as_ref(),
            PATH_SYSTEMD,
            INTERFACE_SYSTEMD_MANAGER,
            METHOD_UNSUBSCRIBE,
            &(),
        ) {
            warn!("Manager {METHOD_UNSUBSCRIBE} failed: {error:?}");
        }

        info!("Unsubscribed from the manager signals");
        true
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(SignalSubscription::is_active)
    }
}

fn handle_message(message: &Message, on_refresh_needed: &impl Fn()) {
    let header = message.header();

    let path = header.path().map(|path| path.as_str());
    if path != Some(PATH_SYSTEMD) {
        debug!("Ignore signal from path {path:?}");
        return;
    }

    let Some(member) = header.member() else {
        debug!("Signal without member");
        return;
    };

    let reloading = if member.as_str() == SIGNAL_RELOADING {
        match message.body().deserialize::<bool>() {
            Ok(active) => Some(active),
            Err(error) => {
                warn!("Malformed {SIGNAL_RELOADING} payload {error:?}");
                None
            }
        }
    } else {
        None
    };

    let signal = ManagerSignal::from_parts(member.as_str(), reloading);
    dispatch(&signal, on_refresh_needed);
}

pub(crate) fn dispatch(signal: &ManagerSignal, on_refresh_needed: &impl Fn()) {
    if let ManagerSignal::Unknown(member) = signal {
        debug!("Unhandled manager signal {member}");
        return;
    }

    let refresh = signal.needs_refresh();
    debug!("Manager signal {signal:?} refresh {refresh}");

    if refresh {
        on_refresh_needed();
    }
}
