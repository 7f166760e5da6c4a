//! 事件模块：模拟 Service Worker 的可延长生命周期事件。
//!
//! # Extendable Events
//!
//! An [`ExtendableEvent`] is what the host hands to the caching runtime for
//! `install`, `activate`, `fetch` and `message`. Work that must outlive the
//! handler's return is registered with [`ExtendableEvent::wait_until`]; the
//! host calls [`ExtendableEvent::settle`] to wait for all of it. Fetch events
//! additionally accept exactly one [`ExtendableEvent::respond_with`].
//!
//! Once an event has settled, further `wait_until` / `respond_with` calls fail
//! with `invalid-state`.

use crate::types::{Request, Response};
use crate::{Error, ErrorContext, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Message,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Message => "message",
        }
    }
}

struct EventInner {
    kind: EventKind,
    request: Option<Request>,
    data: Option<serde_json::Value>,
    pending: Mutex<Vec<JoinHandle<Result<()>>>>,
    response: Mutex<Option<JoinHandle<Result<Response>>>>,
    responded: AtomicBool,
    settled: AtomicBool,
}

/// Host event with lifetime extension. Cloning shares the same event.
#[derive(Clone)]
pub struct ExtendableEvent {
    inner: Arc<EventInner>,
}

impl std::fmt::Debug for ExtendableEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendableEvent")
            .field("kind", &self.inner.kind)
            .field("request", &self.inner.request.as_ref().map(|r| r.url.as_str()))
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl ExtendableEvent {
    fn with_parts(
        kind: EventKind,
        request: Option<Request>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            inner: Arc::new(EventInner {
                kind,
                request,
                data,
                pending: Mutex::new(Vec::new()),
                response: Mutex::new(None),
                responded: AtomicBool::new(false),
                settled: AtomicBool::new(false),
            }),
        }
    }

    pub fn install() -> Self {
        Self::with_parts(EventKind::Install, None, None)
    }

    pub fn activate() -> Self {
        Self::with_parts(EventKind::Activate, None, None)
    }

    pub fn fetch(request: Request) -> Self {
        Self::with_parts(EventKind::Fetch, Some(request), None)
    }

    pub fn message(data: serde_json::Value) -> Self {
        Self::with_parts(EventKind::Message, None, Some(data))
    }

    pub fn kind(&self) -> EventKind {
        self.inner.kind
    }

    /// The intercepted request of a fetch event.
    pub fn request(&self) -> Option<&Request> {
        self.inner.request.as_ref()
    }

    /// The payload of a message event.
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.inner.data.as_ref()
    }

    pub fn is_settled(&self) -> bool {
        self.inner.settled.load(Ordering::Acquire)
    }

    pub fn has_responded(&self) -> bool {
        self.inner.responded.load(Ordering::Acquire)
    }

    /// Keep the event alive until `fut` completes.
    pub fn wait_until<F>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        if self.is_settled() {
            return Err(Error::InvalidState(format!(
                "waitUntil called after the {} event settled",
                self.inner.kind.as_str()
            )));
        }
        let handle = tokio::spawn(fut);
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        Ok(())
    }

    /// Run `fut` inline while keeping the event alive until it finishes; a
    /// failure of `fut` also fails [`settle`](Self::settle).
    pub async fn wait_until_with<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let (tx, rx) = oneshot::channel::<Option<String>>();
        self.wait_until(async move {
            match rx.await {
                Ok(Some(message)) => Err(Error::runtime_with_context(
                    message,
                    ErrorContext::new().with_source("wait_until"),
                )),
                Ok(None) | Err(_) => Ok(()),
            }
        })?;
        let result = fut.await;
        let _ = tx.send(result.as_ref().err().map(|e| e.to_string()));
        result
    }

    /// Provide the response for a fetch event. May be called once.
    ///
    /// [`settle`](Self::settle) waits for `fut`; a failed response does not
    /// fail the settle.
    pub fn respond_with(&self, fut: BoxFuture<'static, Result<Response>>) -> Result<()> {
        if self.is_settled() {
            return Err(Error::InvalidState(
                "respondWith called after the event settled".to_string(),
            ));
        }
        if self.inner.responded.swap(true, Ordering::AcqRel) {
            return Err(Error::InvalidState(
                "respondWith called more than once".to_string(),
            ));
        }
        // The event stays alive until the response is known.
        let (finished_tx, finished_rx) = oneshot::channel::<()>();
        self.wait_until(async move {
            let _ = finished_rx.await;
            Ok(())
        })?;
        let handle = tokio::spawn(async move {
            let response = fut.await;
            let _ = finished_tx.send(());
            response
        });
        *self
            .inner
            .response
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Await the response passed to [`respond_with`](Self::respond_with).
    /// `None` when no response was provided or it was already taken.
    pub async fn response(&self) -> Option<Result<Response>> {
        let handle = self
            .inner
            .response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(join(handle).await)
    }

    /// Wait for every registered task, including tasks registered while
    /// waiting, then mark the event settled. Returns the first failure.
    pub async fn settle(&self) -> Result<()> {
        let mut first_error = None;
        loop {
            let batch: Vec<_> = std::mem::take(
                &mut *self
                    .inner
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                if let Err(e) = join(handle).await {
                    debug!(
                        event = self.inner.kind.as_str(),
                        error = %e,
                        "extended lifetime task failed"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        self.inner.settled.store(true, Ordering::Release);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

pub(crate) async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    flatten(handle.await)
}

pub(crate) fn flatten<T>(joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(Error::runtime_with_context(
            e.to_string(),
            ErrorContext::new().with_source("tokio_task"),
        )),
    }
}
