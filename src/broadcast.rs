use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::TransportError;
use crate::registry::ClientRegistry;
use crate::session::Session;

/// Fans a message out to every registered session.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Broadcaster { registry }
    }

    /// Queues `message` for every session in a fresh snapshot and returns how
    /// many accepted it. Sessions that went away meanwhile are skipped.
    pub fn broadcast(&self, message: &str) -> usize {
        let recipients = self.registry.snapshot();
        let mut delivered = 0;
        for session in &recipients {
            match session.send(message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("broadcast to {} ({}) failed: {}", session.name(), session.peer(), e),
            }
        }
        debug!("broadcast to {}/{} sessions: {}", delivered, recipients.len(), message);
        delivered
    }

    /// Sends to a single session only.
    pub fn send_to(&self, session: &Session, message: &str) -> Result<(), TransportError> {
        session.send(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use crate::session::Outbox;

    fn join(registry: &ClientRegistry, name: &str) -> (Session, Outbox) {
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let (session, rx) = Session::new(name, peer);
        registry.register(session.clone()).unwrap();
        (session, rx)
    }

    #[test]
    fn every_session_gets_one_copy_in_order() {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let mut receivers: Vec<_> = (0..3).map(|i| join(&registry, &format!("u{i}")).1).collect();

        assert_eq!(broadcaster.broadcast("first"), 3);
        assert_eq!(broadcaster.broadcast("second"), 3);

        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap(), "first");
            assert_eq!(rx.try_recv().unwrap(), "second");
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn closed_recipient_does_not_stop_the_rest() {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let (_gone, gone_rx) = join(&registry, "gone");
        let (_alive, mut alive_rx) = join(&registry, "alive");
        drop(gone_rx);

        assert_eq!(broadcaster.broadcast("still here?"), 1);
        assert_eq!(alive_rx.try_recv().unwrap(), "still here?");
    }

    #[test]
    fn lagging_recipient_does_not_stop_the_rest() {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let peer: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        let (slow, _slow_outbox) = Session::with_capacity("slow", peer, 1);
        registry.register(slow).unwrap();
        let (_fast, mut fast_rx) = join(&registry, "fast");

        assert_eq!(broadcaster.broadcast("one"), 2);
        assert_eq!(broadcaster.broadcast("two"), 1);
        assert_eq!(fast_rx.try_recv().unwrap(), "one");
        assert_eq!(fast_rx.try_recv().unwrap(), "two");
    }

    #[test]
    fn unregistered_session_gets_nothing() {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let (left, mut left_rx) = join(&registry, "left");
        let (_stay, mut stay_rx) = join(&registry, "stay");

        registry.unregister(left.id()).unwrap();
        broadcaster.broadcast("after");

        assert!(left_rx.try_recv().is_err());
        assert_eq!(stay_rx.try_recv().unwrap(), "after");
    }

    #[test]
    fn send_to_reaches_only_target() {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let (target, mut target_rx) = join(&registry, "target");
        let (_other, mut other_rx) = join(&registry, "other");

        broadcaster.send_to(&target, "just you").unwrap();

        assert_eq!(target_rx.try_recv().unwrap(), "just you");
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn broadcasting_during_churn_never_panics() {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let (_anchor, mut anchor_rx) = join(&registry, "anchor");

        let churn = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    let (s, rx) = join(&registry, &format!("c{i}"));
                    if i % 2 == 0 {
                        drop(rx);
                    }
                    tokio::task::yield_now().await;
                    registry.unregister(s.id()).unwrap();
                }
            })
        };
        let sender = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    broadcaster.broadcast(&format!("m{i}"));
                    tokio::task::yield_now().await;
                }
            })
        };
        churn.await.unwrap();
        sender.await.unwrap();

        assert_eq!(registry.len(), 1);
        for i in 0..200 {
            assert_eq!(anchor_rx.recv().await.unwrap(), format!("m{i}"));
        }
    }
}
