use crate::collection::Document;
use crate::common::current_time_millis;
use crate::errors::{LokiError, LokiResult};
use anyhow::Error;
use basu::error::BasuError;
use basu::event::Event;
use basu::Handle;
use std::fmt::Debug;
use std::sync::Arc;

/// Write events published by a collection.
///
/// `PreInsert` and `PreUpdate` fire before the store is touched; `Insert`,
/// `Update` and `Delete` fire after the mutation and every index patch have
/// completed. `Error` carries the failure of a rejected mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionEvents {
    PreInsert,
    Insert,
    PreUpdate,
    Update,
    Delete,
    Error,
}

/// Payload delivered to a [CollectionEventListener].
///
/// Listeners get copies of the affected documents, never a handle to the
/// collection, so a listener cannot re-enter the mutation that fired it.
#[derive(Clone)]
pub struct CollectionEventInfo {
    inner: Arc<CollectionEventInner>,
}

impl CollectionEventInfo {
    pub fn new(
        event_type: CollectionEvents,
        collection_name: &str,
        documents: Vec<Document>,
        error: Option<LokiError>,
    ) -> Self {
        CollectionEventInfo {
            inner: Arc::new(CollectionEventInner {
                event_type,
                collection_name: collection_name.to_string(),
                documents,
                error,
                timestamp: current_time_millis(),
            }),
        }
    }

    pub fn event_type(&self) -> CollectionEvents {
        self.inner.event_type
    }

    pub fn collection_name(&self) -> &str {
        &self.inner.collection_name
    }

    /// The documents affected by the operation. For batch writes this holds
    /// every document of the batch.
    pub fn documents(&self) -> &[Document] {
        &self.inner.documents
    }

    pub fn error(&self) -> Option<&LokiError> {
        self.inner.error.as_ref()
    }

    /// Creation time in milliseconds since the unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.inner.timestamp
    }
}

impl Debug for CollectionEventInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEventInfo")
            .field("event_type", &self.event_type())
            .field("collection_name", &self.collection_name())
            .field("documents", &self.documents().len())
            .field("error", &self.error().map(|e| e.message().to_string()))
            .field("timestamp", &self.timestamp())
            .finish()
    }
}

struct CollectionEventInner {
    event_type: CollectionEvents,
    collection_name: String,
    documents: Vec<Document>,
    error: Option<LokiError>,
    timestamp: i64,
}

/// Closure signature accepted by [CollectionEventListener::new].
pub trait CollectionEventCallback: Send + Sync + Fn(CollectionEventInfo) -> LokiResult<()> {}

impl<F> CollectionEventCallback for F where F: Send + Sync + Fn(CollectionEventInfo) -> LokiResult<()> {}

/// A subscriber for collection events.
///
/// ```text
/// collection.subscribe(CollectionEventListener::new(|event| {
///     log::info!("{:?} on {}", event.event_type(), event.collection_name());
///     Ok(())
/// }))?;
/// ```
#[derive(Clone)]
pub struct CollectionEventListener {
    on_event: Arc<dyn CollectionEventCallback>,
}

impl CollectionEventListener {
    pub fn new(on_event: impl CollectionEventCallback + 'static) -> Self {
        CollectionEventListener {
            on_event: Arc::new(on_event),
        }
    }
}

impl Handle<CollectionEventInfo> for CollectionEventListener {
    fn handle(&self, event: &Event<CollectionEventInfo>) -> Result<(), BasuError> {
        (self.on_event)(event.data.clone()).map_err(|e| BasuError::HandlerError(Error::from(e)))
    }
}

impl Debug for CollectionEventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEventListener").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::errors::ErrorKind;

    #[test]
    fn test_event_info_accessors() {
        let event = CollectionEventInfo::new(
            CollectionEvents::Insert,
            "weapons",
            vec![doc! { name: "mjolnir" }],
            None,
        );
        assert_eq!(event.event_type(), CollectionEvents::Insert);
        assert_eq!(event.collection_name(), "weapons");
        assert_eq!(event.documents().len(), 1);
        assert!(event.error().is_none());
        assert!(event.timestamp() > 0);
    }

    #[test]
    fn test_error_event_carries_error() {
        let error = LokiError::new("duplicate", ErrorKind::DuplicateKey);
        let event = CollectionEventInfo::new(CollectionEvents::Error, "weapons", vec![], Some(error));
        assert_eq!(event.error().map(|e| e.kind().clone()), Some(ErrorKind::DuplicateKey));
    }

    #[test]
    fn test_listener_handle_maps_errors() {
        let listener = CollectionEventListener::new(|_| {
            Err(LokiError::new("nope", ErrorKind::InternalError))
        });
        let event = Event::new(CollectionEventInfo::new(CollectionEvents::Update, "c", vec![], None));
        assert!(matches!(listener.handle(&event), Err(BasuError::HandlerError(_))));
    }

    #[test]
    fn test_listener_handle_ok() {
        let listener = CollectionEventListener::new(|event| {
            assert_eq!(event.event_type(), CollectionEvents::Delete);
            Ok(())
        });
        let event = Event::new(CollectionEventInfo::new(CollectionEvents::Delete, "c", vec![], None));
        assert!(listener.handle(&event).is_ok());
    }
}
