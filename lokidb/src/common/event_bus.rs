use crate::collection::CollectionEventListener;
use crate::common::LOKI_EVENT;
use crate::errors::{ErrorKind, LokiError, LokiResult};
use basu::error::BasuError;
use basu::event::Event;
use basu::{EventBus, Handle, HandlerId};
use std::marker::PhantomData;
use std::sync::Arc;

/// Something that external listeners can subscribe to.
pub trait EventAware {
    fn subscribe(&self, listener: CollectionEventListener) -> LokiResult<SubscriberRef>;

    fn unsubscribe(&self, subscriber: SubscriberRef) -> LokiResult<()>;
}

/// Synchronous publish/subscribe bus for collection events.
///
/// Listeners run on the caller's thread, in registration order, before
/// `publish` returns. Publishing with no listeners registered does not
/// allocate an event.
#[derive(Clone)]
pub struct LokiEventBus<E, L> {
    inner: Arc<LokiEventBusInner<E, L>>,
}

impl<E, L> Default for LokiEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E, L> LokiEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    pub fn new() -> Self {
        LokiEventBus {
            inner: Arc::new(LokiEventBusInner::new()),
        }
    }

    pub fn register(&self, listener: L) -> LokiResult<SubscriberRef> {
        self.inner.register(listener)
    }

    pub fn deregister(&self, subscriber: SubscriberRef) -> LokiResult<()> {
        self.inner.deregister(subscriber)
    }

    pub fn publish(&self, event: E) -> LokiResult<()> {
        self.inner.publish(event)
    }

    /// Drops every registered listener.
    pub fn close(&self) -> LokiResult<()> {
        self.inner.close()
    }

    pub fn has_listeners(&self) -> bool {
        self.inner.has_listeners()
    }
}

/// Handle returned by a subscription, used to unsubscribe later.
#[derive(Debug)]
pub struct SubscriberRef {
    pub(crate) inner: HandlerId,
}

impl SubscriberRef {
    pub(crate) fn new(inner: HandlerId) -> Self {
        SubscriberRef { inner }
    }
}

struct LokiEventBusInner<E, L> {
    event_bus: EventBus<E>,
    phantom_data: PhantomData<L>,
}

impl<E, L> LokiEventBusInner<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn new() -> Self {
        LokiEventBusInner {
            event_bus: EventBus::new(),
            phantom_data: PhantomData,
        }
    }

    fn register(&self, listener: L) -> LokiResult<SubscriberRef> {
        self.event_bus
            .subscribe(LOKI_EVENT, Box::new(listener))
            .map(SubscriberRef::new)
            .map_err(Self::loki_error)
    }

    fn deregister(&self, subscriber: SubscriberRef) -> LokiResult<()> {
        self.event_bus
            .unsubscribe(LOKI_EVENT, &subscriber.inner)
            .map_err(Self::loki_error)
    }

    fn publish(&self, event: E) -> LokiResult<()> {
        if !self.has_listeners() {
            return Ok(());
        }

        let basu_event = Event::new(event);
        self.event_bus
            .publish(LOKI_EVENT, &basu_event)
            .map_err(Self::loki_error)
    }

    fn close(&self) -> LokiResult<()> {
        self.event_bus.clear().map_err(Self::loki_error)
    }

    fn has_listeners(&self) -> bool {
        match self.event_bus.get_handler_count(LOKI_EVENT) {
            Ok(count) => count > 0,
            Err(BasuError::EventTypeNotFOUND) => false,
            Err(e) => {
                log::warn!("Failed to count event listeners: {}", e);
                false
            }
        }
    }

    fn loki_error(e: BasuError) -> LokiError {
        let error = match e {
            BasuError::EventTypeNotFOUND => LokiError::new(
                "Event bus error: no listener is registered for collection events",
                ErrorKind::EventError,
            ),
            BasuError::MutexPoisoned => LokiError::new(
                "Event bus error: internal mutex poisoned",
                ErrorKind::EventError,
            ),
            BasuError::HandlerError(e) => match e.downcast::<LokiError>() {
                Ok(cause) => LokiError::new_with_cause(
                    &format!("Event listener failed: {}", cause),
                    ErrorKind::EventError,
                    cause,
                ),
                Err(other) => LokiError::new(
                    &format!("Event listener failed: {}", other),
                    ErrorKind::EventError,
                ),
            },
        };
        log::error!("{}", error);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionEventInfo, CollectionEvents};
    use parking_lot::Mutex;

    type Bus = LokiEventBus<CollectionEventInfo, CollectionEventListener>;

    #[test]
    fn test_publish_without_listeners_is_noop() {
        let bus = Bus::new();
        assert!(!bus.has_listeners());
        let event = CollectionEventInfo::new(CollectionEvents::Insert, "c", vec![], None);
        assert!(bus.publish(event).is_ok());
    }

    #[test]
    fn test_register_publish_deregister() {
        let bus = Bus::new();
        let seen = Arc::new(Mutex::new(0));
        let seen_clone = seen.clone();
        let subscriber = bus
            .register(CollectionEventListener::new(move |_| {
                *seen_clone.lock() += 1;
                Ok(())
            }))
            .unwrap();
        assert!(bus.has_listeners());

        bus.publish(CollectionEventInfo::new(CollectionEvents::Update, "c", vec![], None))
            .unwrap();
        assert_eq!(*seen.lock(), 1);

        bus.deregister(subscriber).unwrap();
        assert!(!bus.has_listeners());
    }

    #[test]
    fn test_listener_error_maps_to_event_error() {
        let bus = Bus::new();
        bus.register(CollectionEventListener::new(|_| {
            Err(LokiError::new("listener boom", ErrorKind::InternalError))
        }))
        .unwrap();

        let result = bus.publish(CollectionEventInfo::new(CollectionEvents::Delete, "c", vec![], None));
        let error = result.unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::EventError);
    }

    #[test]
    fn test_close_clears_listeners() {
        let bus = Bus::new();
        bus.register(CollectionEventListener::new(|_| Ok(()))).unwrap();
        bus.close().unwrap();
        assert!(!bus.has_listeners());
    }
}
