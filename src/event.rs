//! Events delivered to the owner of a client.
//!
//! Everything the listener, heartbeat monitor and sender have to report goes
//! through one [`EventSink`] as a [`ClientEvent`]. Packets and recoverable
//! errors may arrive any number of times; a `Fatal` event is delivered at most
//! once per connection, guarded by the [`Escalator`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::PortAgentError;
use crate::listener::ListenerControl;
use crate::protocol::Packet;

/// Something the client has to tell its owner.
#[derive(Debug)]
pub enum ClientEvent {
    /// A non-heartbeat packet, in wire order.
    Packet(Packet),
    /// A packet could not be decoded or dispatched; the listener keeps going.
    Recoverable(PortAgentError),
    /// The connection is dead and must be torn down.
    Fatal(PortAgentError),
}

impl ClientEvent {
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientEvent::Fatal(_))
    }
}

type Callback = dyn Fn(ClientEvent) + Send + Sync;

/// Destination for client events.
///
/// Cheaply cloneable; the listener task and every sender share one.
#[derive(Clone)]
pub struct EventSink {
    callback: Arc<Callback>,
}

impl EventSink {
    /// Deliver events to a closure.
    ///
    /// The closure runs on the listener task and must not block.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(ClientEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Deliver events into an unbounded channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self::new(move |event| {
            if tx.send(event).is_err() {
                tracing::debug!("Event receiver dropped, discarding event");
            }
        });
        (sink, rx)
    }

    /// Sink that only logs, for owners that registered nothing.
    pub(crate) fn logging() -> Self {
        Self::new(|event| match event {
            ClientEvent::Packet(packet) => {
                tracing::debug!(len = packet.payload_len(), "Unhandled packet")
            }
            ClientEvent::Recoverable(e) => tracing::warn!("Unhandled error: {}", e),
            ClientEvent::Fatal(e) => tracing::error!("Unhandled fatal error: {}", e),
        })
    }

    /// Deliver an event.
    ///
    /// A panic raised by the callback while handling a packet is caught and
    /// handed back as a `Recoverable` event so the listener survives it.
    pub(crate) fn deliver(&self, event: ClientEvent) {
        let is_packet = matches!(event, ClientEvent::Packet(_));
        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(event)));

        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            tracing::error!("Event callback panicked: {}", message);
            if is_packet {
                let retry = panic::catch_unwind(AssertUnwindSafe(|| {
                    (self.callback)(ClientEvent::Recoverable(PortAgentError::CallbackPanicked(
                        message,
                    )))
                }));
                if retry.is_err() {
                    tracing::error!("Event callback panicked again while reporting the panic");
                }
            }
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Per-connection escalation of fatal errors.
///
/// The first escalation stops the listener and delivers a `Fatal` event;
/// later ones are logged and dropped.
#[derive(Debug)]
pub(crate) struct Escalator {
    sink: EventSink,
    control: Arc<ListenerControl>,
    fired: AtomicBool,
}

impl Escalator {
    pub(crate) fn new(sink: EventSink, control: Arc<ListenerControl>) -> Self {
        Self {
            sink,
            control,
            fired: AtomicBool::new(false),
        }
    }

    /// Report a fatal error. Returns `true` if this call delivered it.
    pub(crate) fn escalate(&self, error: PortAgentError) -> bool {
        self.control.request_stop();

        if self.fired.swap(true, Ordering::AcqRel) {
            tracing::debug!("Connection already failed, dropping: {}", error);
            return false;
        }

        tracing::error!("Port agent connection failed: {}", error);
        self.sink.deliver(ClientEvent::Fatal(error));
        true
    }
}
