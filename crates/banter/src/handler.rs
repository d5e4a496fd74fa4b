//! The typed event handler registry.
//!
//! Handlers register against a payload type; the type alone determines
//! which dispatches they see. Catch-all handlers take the whole [`Event`].
//! Once-handlers fire a single time and unregister themselves; every
//! registration returns a remover that detaches exactly that instance.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use banter_model::{Event, EventKind, TypedEvent};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;

use crate::Session;

type DynHandler = Arc<dyn Fn(Session, Arc<Event>) -> BoxFuture<'static, ()> + Send + Sync>;

struct Entry {
    id: u64,
    handler: DynHandler,
}

#[derive(Default)]
struct RegistryInner {
    permanent: HashMap<EventKind, Vec<Entry>>,
    once: HashMap<EventKind, Vec<Entry>>,
}

/// Registry of permanent and once handlers keyed by event type.
pub struct HandlerRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    next_id: AtomicU64,
}

/// Detaches the handler instance its registration returned.
pub struct HandlerRemover {
    registry: Weak<RwLock<RegistryInner>>,
    kind: EventKind,
    id: u64,
}

impl HandlerRemover {
    /// Remove the handler; removing twice is a no-op.
    pub fn remove(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut inner = registry.write();
        if let Some(entries) = inner.permanent.get_mut(&self.kind) {
            entries.retain(|entry| entry.id != self.id);
        }
        if let Some(entries) = inner.once.get_mut(&self.kind) {
            entries.retain(|entry| entry.id != self.id);
        }
    }
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a permanent handler for the payload type `E`.
    pub fn add<E, F, Fut>(&self, handler: F) -> HandlerRemover
    where
        E: TypedEvent,
        F: Fn(Session, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.install::<E, F, Fut>(handler, false)
    }

    /// Register a handler removed after its first firing.
    pub fn add_once<E, F, Fut>(&self, handler: F) -> HandlerRemover
    where
        E: TypedEvent,
        F: Fn(Session, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.install::<E, F, Fut>(handler, true)
    }

    fn install<E, F, Fut>(&self, handler: F, once: bool) -> HandlerRemover
    where
        E: TypedEvent,
        F: Fn(Session, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let wrapped: DynHandler = Arc::new(move |session, event: Arc<Event>| {
            let payload = E::extract(&event).cloned();
            match payload {
                Some(payload) => Box::pin(handler(session, payload)),
                None => Box::pin(async {}),
            }
        });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            id,
            handler: wrapped,
        };

        let mut inner = self.inner.write();
        let map = if once {
            &mut inner.once
        } else {
            &mut inner.permanent
        };
        map.entry(E::KIND).or_default().push(entry);

        HandlerRemover {
            registry: Arc::downgrade(&self.inner),
            kind: E::KIND,
            id,
        }
    }

    /// Dispatch one event: catch-alls first, then permanent handlers for
    /// its type, then once handlers for its type (which unregister).
    ///
    /// `sync` runs handlers sequentially in registration order; otherwise
    /// each handler runs in its own task.
    pub(crate) async fn dispatch(&self, session: &Session, event: Arc<Event>, sync: bool) {
        let kind = event.kind();

        let mut batch: Vec<DynHandler> = Vec::new();
        {
            let mut inner = self.inner.write();
            if let Some(entries) = inner.permanent.get(&EventKind::Any) {
                batch.extend(entries.iter().map(|e| Arc::clone(&e.handler)));
            }
            if let Some(entries) = inner.once.get_mut(&EventKind::Any) {
                batch.extend(entries.drain(..).map(|e| e.handler));
            }
            if kind != EventKind::Any {
                if let Some(entries) = inner.permanent.get(&kind) {
                    batch.extend(entries.iter().map(|e| Arc::clone(&e.handler)));
                }
                if let Some(entries) = inner.once.get_mut(&kind) {
                    batch.extend(entries.drain(..).map(|e| e.handler));
                }
            }
        }

        for handler in batch {
            if sync {
                handler(session.clone(), Arc::clone(&event)).await;
            } else {
                let session = session.clone();
                let event = Arc::clone(&event);
                tokio::spawn(async move {
                    handler(session, event).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use banter_model::TypingStart;

    use super::*;
    use crate::SessionConfig;

    fn sync_session() -> Session {
        let mut config = SessionConfig::new("test-token");
        config.sync_events = true;
        Session::with_config(config).unwrap()
    }

    fn typing_event() -> Event {
        Event::decode(
            "TYPING_START",
            serde_json::json!({"user_id": "u", "channel_id": "c"}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn permanent_and_once_handlers_fire_in_order() {
        let session = sync_session();

        let catch_all = Arc::new(AtomicU32::new(0));
        let permanent = Arc::new(AtomicU32::new(0));
        let once = Arc::new(AtomicU32::new(0));

        {
            let catch_all = Arc::clone(&catch_all);
            session.add_handler(move |_s: Session, _e: Event| {
                let catch_all = Arc::clone(&catch_all);
                async move {
                    catch_all.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        {
            let permanent = Arc::clone(&permanent);
            session.add_handler(move |_s: Session, _e: TypingStart| {
                let permanent = Arc::clone(&permanent);
                async move {
                    permanent.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        {
            let once = Arc::clone(&once);
            session.add_handler_once(move |_s: Session, _e: TypingStart| {
                let once = Arc::clone(&once);
                async move {
                    once.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        session.dispatch(typing_event()).await;
        session.dispatch(typing_event()).await;

        assert_eq!(catch_all.load(Ordering::SeqCst), 2);
        assert_eq!(permanent.load(Ordering::SeqCst), 2);
        // The once handler fired exactly once, then unregistered.
        assert_eq!(once.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handlers_only_see_their_event_type() {
        let session = sync_session();
        let calls = Arc::new(AtomicU32::new(0));

        {
            let calls = Arc::clone(&calls);
            session.add_handler(move |_s: Session, _e: banter_model::MessageCreate| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        session.dispatch(typing_event()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        session
            .dispatch(
                Event::decode(
                    "MESSAGE_CREATE",
                    serde_json::json!({"id": "1", "channel_id": "c"}),
                )
                .unwrap(),
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remover_detaches_exactly_one_instance() {
        let session = sync_session();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let remover = {
            let first = Arc::clone(&first);
            session.add_handler(move |_s: Session, _e: TypingStart| {
                let first = Arc::clone(&first);
                async move {
                    first.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        {
            let second = Arc::clone(&second);
            session.add_handler(move |_s: Session, _e: TypingStart| {
                let second = Arc::clone(&second);
                async move {
                    second.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        session.dispatch(typing_event()).await;
        remover.remove();
        session.dispatch(typing_event()).await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn catch_all_sees_unknown_events() {
        let session = sync_session();
        let seen = Arc::new(AtomicU32::new(0));

        {
            let seen = Arc::clone(&seen);
            session.add_handler(move |_s: Session, event: Event| {
                let seen = Arc::clone(&seen);
                async move {
                    if event.name() == "BRAND_NEW_EVENT" {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }

        session
            .dispatch(Event::decode("BRAND_NEW_EVENT", serde_json::json!({})).unwrap())
            .await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
