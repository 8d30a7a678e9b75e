//! The relay event loop
//!
//! Connection tasks never touch relay state directly. They report what
//! happens on their socket as [`RelayEvent`]s, and a single task applies
//! those events one at a time, in arrival order:
//! - `Connected` registers the session
//! - `Inbound` routes the frame and broadcasts the result, if any
//! - `Disconnected` unregisters the session
//!
//! Since the tempo clock and the session registry are owned by that task,
//! a tempo change can never interleave with another read or write.

use crate::auth::Authenticator;
use crate::broadcast::Broadcaster;
use crate::router::{MessageRouter, RouteOutcome};
use crate::session_registry::{Frame, Session, SessionId, SessionRegistry};
use crate::tempo_clock::TempoClock;
use crate::utils::now_micros;
use log::{debug, error, info};
use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use tokio::sync::mpsc;

/// Something that happened on a client connection
#[derive(Debug)]
pub enum RelayEvent {
    Connected {
        id: SessionId,
        addr: SocketAddr,
        outbound: mpsc::Sender<Frame>,
    },
    Inbound {
        id: SessionId,
        addr: SocketAddr,
        payload: String,
    },
    Disconnected {
        id: SessionId,
    },
    /// Panics when handled
    #[cfg(test)]
    Fault,
}

/// What to do when handling an event panics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisorPolicy {
    /// The panic ends the event loop, which shuts the server down.
    #[default]
    Mortal,
    /// The panic is logged and the loop moves on to the next event.
    Immortal,
}

impl SupervisorPolicy {
    pub fn from_flag(immortal: bool) -> Self {
        if immortal {
            SupervisorPolicy::Immortal
        } else {
            SupervisorPolicy::Mortal
        }
    }

    /// In immortal mode, routes panic reports through the logger instead of
    /// stderr so they read like any other relay error.
    pub fn install_panic_hook(self) {
        if self == SupervisorPolicy::Immortal {
            panic::set_hook(Box::new(|info| {
                error!("panic suppressed by immortal mode: {}", info);
            }));
        }
    }
}

/// All mutable relay state
#[derive(Debug)]
pub struct Relay {
    registry: SessionRegistry,
    router: MessageRouter,
    broadcaster: Broadcaster,
    policy: SupervisorPolicy,
}

impl Relay {
    pub fn new(authenticator: Authenticator, clock: TempoClock, policy: SupervisorPolicy) -> Self {
        Self {
            registry: SessionRegistry::new(),
            router: MessageRouter::new(authenticator, clock),
            broadcaster: Broadcaster::new(),
            policy,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn clock(&self) -> &TempoClock {
        self.router.clock()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Applies one event using the current wall-clock time
    pub fn handle_event(&mut self, event: RelayEvent) {
        self.handle_event_at(event, now_micros());
    }

    /// Applies one event as if it arrived at `now_micros`
    pub fn handle_event_at(&mut self, event: RelayEvent, now_micros: i64) {
        match event {
            RelayEvent::Connected { id, addr, outbound } => {
                self.registry.register(Session::new(id, addr, outbound));
            }
            RelayEvent::Inbound { id, addr, payload } => {
                debug!("{} bytes from {} ({})", payload.len(), addr, id);
                if let RouteOutcome::Broadcast(message) =
                    self.router.route(&payload, addr, now_micros)
                {
                    if let Err(e) = self.broadcaster.broadcast(&self.registry, &message) {
                        error!("broadcast aborted: {}", e);
                    }
                }
            }
            RelayEvent::Disconnected { id } => {
                self.registry.unregister(&id);
            }
            #[cfg(test)]
            RelayEvent::Fault => panic!("injected relay fault"),
        }
    }

    /// Applies one event under the supervisor policy.
    ///
    /// In mortal mode a panic unwinds out of the event loop task.
    pub fn handle_supervised(&mut self, event: RelayEvent) {
        match self.policy {
            SupervisorPolicy::Mortal => self.handle_event(event),
            SupervisorPolicy::Immortal => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| self.handle_event(event)));
                if let Err(panic) = result {
                    error!(
                        "ignoring panic while handling relay event: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
    }

    /// Consumes events until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<RelayEvent>) {
        info!("relay event loop started ({:?})", self.policy);

        while let Some(event) = events.recv().await {
            self.handle_supervised(event);
        }

        info!(
            "relay event loop stopped after {} broadcasts",
            self.broadcaster.frames_broadcast()
        );
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Secret;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;
    use shared::encode_inbound;

    const T0: i64 = 1_700_000_000_000_000;

    fn relay(policy: SupervisorPolicy) -> Relay {
        Relay::new(
            Authenticator::new(Secret::new("secret")),
            TempoClock::starting_at(T0),
            policy,
        )
    }

    fn connect(relay: &mut Relay, port: u16) -> (SessionId, SocketAddr, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(16);
        let id = SessionId::generate();
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        relay.handle_event_at(RelayEvent::Connected { id, addr, outbound: tx }, T0);
        (id, addr, rx)
    }

    fn inbound(id: SessionId, addr: SocketAddr, document: serde_json::Value) -> RelayEvent {
        RelayEvent::Inbound {
            id,
            addr,
            payload: encode_inbound(&document).unwrap(),
        }
    }

    #[test]
    fn test_policy_from_flag() {
        assert_eq!(SupervisorPolicy::from_flag(true), SupervisorPolicy::Immortal);
        assert_eq!(SupervisorPolicy::from_flag(false), SupervisorPolicy::Mortal);
        assert_eq!(SupervisorPolicy::default(), SupervisorPolicy::Mortal);
    }

    #[test]
    fn test_connect_and_disconnect() {
        let mut relay = relay(SupervisorPolicy::Mortal);
        let (id, _, _rx) = connect(&mut relay, 5000);
        assert_eq!(relay.registry().len(), 1);

        relay.handle_event(RelayEvent::Disconnected { id });
        relay.handle_event(RelayEvent::Disconnected { id });
        assert!(relay.registry().is_empty());
    }

    #[test]
    fn test_text_edit_reaches_sender_and_peers() {
        let mut relay = relay(SupervisorPolicy::Mortal);
        let (a, a_addr, mut a_rx) = connect(&mut relay, 5001);
        let (_, _, mut b_rx) = connect(&mut relay, 5002);

        let event = inbound(
            a,
            a_addr,
            json!({"password": "secret", "TextEdit": true, "code": "d1 $ s \"bd\""}),
        );
        relay.handle_event_at(event, T0);

        let expected = r#"{"TextEdit":true,"code":"d1 $ s \"bd\"","password":""}"#;
        assert_eq!(a_rx.try_recv().unwrap().as_ref(), expected);
        assert_eq!(b_rx.try_recv().unwrap().as_ref(), expected);
    }

    #[test]
    fn test_tempo_change_is_broadcast() {
        let mut relay = relay(SupervisorPolicy::Mortal);
        let (a, a_addr, mut a_rx) = connect(&mut relay, 5003);

        let event = inbound(a, a_addr, json!({"password": "secret", "TempoChange": 4.0}));
        relay.handle_event_at(event, T0 + 1_000_000);

        let frame = a_rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"Tempo": 4.0, "at": T0 + 1_000_000, "beat": 2.0}));
        assert_eq!(relay.clock().state().cps, 4.0);
    }

    #[test]
    fn test_rejected_messages_broadcast_nothing() {
        let mut relay = relay(SupervisorPolicy::Mortal);
        let (a, a_addr, mut a_rx) = connect(&mut relay, 5004);

        relay.handle_event_at(
            inbound(a, a_addr, json!({"password": "wrong", "TextEdit": true, "code": "x"})),
            T0,
        );
        relay.handle_event_at(
            RelayEvent::Inbound {
                id: a,
                addr: a_addr,
                payload: "{{{".to_string(),
            },
            T0,
        );

        assert!(a_rx.try_recv().is_err());
        assert_eq!(relay.broadcaster().frames_broadcast(), 0);
        assert_eq!(relay.registry().len(), 1);
    }

    #[test]
    fn test_closed_session_stays_registered_until_disconnect() {
        let mut relay = relay(SupervisorPolicy::Mortal);
        let (a, a_addr, mut a_rx) = connect(&mut relay, 5005);
        let (b, _, b_rx) = connect(&mut relay, 5006);
        drop(b_rx);

        relay.handle_event_at(
            inbound(a, a_addr, json!({"password": "secret", "TextEval": true, "code": "x"})),
            T0,
        );

        assert!(a_rx.try_recv().is_ok());
        assert_eq!(relay.broadcaster().delivery_failures(), 1);
        assert!(relay.registry().get(&b).is_some());
    }

    #[tokio::test]
    async fn test_run_processes_events_in_order() {
        let relay = relay(SupervisorPolicy::Immortal);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(16);
        let id = SessionId::generate();
        let addr: SocketAddr = "127.0.0.1:5007".parse().unwrap();

        events_tx
            .send(RelayEvent::Connected { id, addr, outbound: tx })
            .unwrap();
        events_tx
            .send(inbound(id, addr, json!({"password": "secret", "EstuaryEdit": 1, "code": "e"})))
            .unwrap();
        events_tx.send(RelayEvent::Disconnected { id }).unwrap();
        drop(events_tx);

        relay.run(events_rx).await;

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.as_ref(), r#"{"EstuaryEdit":1,"code":"e","password":""}"#);
    }

    #[tokio::test]
    async fn test_immortal_loop_survives_panics() {
        let relay = relay(SupervisorPolicy::Immortal);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(16);
        let id = SessionId::generate();
        let addr: SocketAddr = "127.0.0.1:5008".parse().unwrap();

        events_tx
            .send(RelayEvent::Connected { id, addr, outbound: tx })
            .unwrap();
        events_tx.send(RelayEvent::Fault).unwrap();
        events_tx
            .send(inbound(id, addr, json!({"password": "secret", "TextEdit": true, "code": "after"})))
            .unwrap();
        drop(events_tx);

        let handle = tokio::spawn(relay.run(events_rx));
        assert!(handle.await.is_ok());

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.as_ref(), r#"{"TextEdit":true,"code":"after","password":""}"#);
    }

    #[tokio::test]
    async fn test_mortal_loop_dies_on_panic() {
        let relay = relay(SupervisorPolicy::Mortal);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(16);
        let id = SessionId::generate();
        let addr: SocketAddr = "127.0.0.1:5009".parse().unwrap();

        events_tx
            .send(RelayEvent::Connected { id, addr, outbound: tx })
            .unwrap();
        events_tx.send(RelayEvent::Fault).unwrap();
        events_tx
            .send(inbound(id, addr, json!({"password": "secret", "TextEdit": true, "code": "never"})))
            .unwrap();

        let handle = tokio::spawn(relay.run(events_rx));
        let result = handle.await;
        assert!(matches!(result, Err(ref e) if e.is_panic()));

        // The loop is gone, so nothing after the fault is relayed
        assert!(rx.recv().await.is_none());
        assert!(events_tx.send(RelayEvent::Disconnected { id }).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_tempo_changes_compose_serially() {
        let relay = Relay::new(
            Authenticator::new(Secret::new("secret")),
            TempoClock::starting_at(now_micros()),
            SupervisorPolicy::Mortal,
        );
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(16);
        let id = SessionId::generate();
        let addr: SocketAddr = "127.0.0.1:5010".parse().unwrap();
        events_tx
            .send(RelayEvent::Connected { id, addr, outbound: tx })
            .unwrap();
        let relay_handle = tokio::spawn(relay.run(events_rx));

        let senders: Vec<_> = [3.0, 5.0]
            .into_iter()
            .map(|cps| {
                let events = events_tx.clone();
                tokio::spawn(async move {
                    events
                        .send(inbound(id, addr, json!({"password": "secret", "TempoChange": cps})))
                        .unwrap();
                })
            })
            .collect();
        for sender in senders {
            sender.await.unwrap();
        }
        drop(events_tx);
        relay_handle.await.unwrap();

        let decode = |frame: Frame| serde_json::from_str::<serde_json::Value>(&frame).unwrap();
        let first = decode(rx.recv().await.unwrap());
        let second = decode(rx.recv().await.unwrap());

        let mut rates = [first["Tempo"].as_f64().unwrap(), second["Tempo"].as_f64().unwrap()];
        rates.sort_by(f64::total_cmp);
        assert_eq!(rates, [3.0, 5.0]);

        let cps1 = first["Tempo"].as_f64().unwrap();
        let at1 = first["at"].as_i64().unwrap();
        let at2 = second["at"].as_i64().unwrap();
        let beat1 = first["beat"].as_f64().unwrap();
        let beat2 = second["beat"].as_f64().unwrap();
        assert!(at2 >= at1);
        assert_approx_eq!(beat2, beat1 + cps1 * (at2 - at1) as f64 / 1_000_000.0, 1e-9);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
