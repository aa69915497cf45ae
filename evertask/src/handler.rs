//! The typed handler surface and its type-erased registration.
//!
//! A handler is bound to a request type at startup via
//! [`HandlerRegistry::register`]; the registry is a plain map from
//! `requestType` name to a constructor/invoker pair, built once at boot —
//! there is no runtime reflection and no handler base-class hierarchy.

use async_trait::async_trait;
use evertask_core::{HandlerCapabilities, HandlerOutcome, TaskId};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The capability set a host implements for one request type — a value,
/// not a base class.
#[async_trait]
pub trait TaskHandler<Req>: Send + Sync + 'static
where
    Req: Send + Sync + 'static,
{
    async fn handle(&self, request: Req, cancel: CancellationToken) -> anyhow::Result<()>;

    async fn on_started(&self, _task_id: TaskId) {}
    async fn on_completed(&self, _task_id: TaskId) {}
    async fn on_error(&self, _task_id: TaskId, _error: &anyhow::Error) {}

    fn capabilities(&self) -> HandlerCapabilities {
        HandlerCapabilities::default()
    }
}

/// Type-erased form of [`TaskHandler`] so the registry can hold handlers for
/// many distinct request types behind one map.
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    async fn invoke(&self, payload: &[u8], cancel: CancellationToken) -> HandlerOutcome;
    async fn on_started(&self, task_id: TaskId);
    async fn on_completed(&self, task_id: TaskId);
    async fn on_error(&self, task_id: TaskId, error: &anyhow::Error);
    fn capabilities(&self) -> HandlerCapabilities;
    fn handler_type_name(&self) -> &'static str;
}

struct HandlerBinding<Req, H> {
    handler: Arc<H>,
    _marker: PhantomData<fn() -> Req>,
}

#[async_trait]
impl<Req, H> ErasedHandler for HandlerBinding<Req, H>
where
    Req: DeserializeOwned + Serialize + Send + Sync + 'static,
    H: TaskHandler<Req>,
{
    async fn invoke(&self, payload: &[u8], cancel: CancellationToken) -> HandlerOutcome {
        let request: Req = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => return HandlerOutcome::Failed(anyhow::Error::new(e)),
        };
        match self.handler.handle(request, cancel).await {
            Ok(()) => HandlerOutcome::Success,
            Err(e) => HandlerOutcome::Failed(e),
        }
    }

    async fn on_started(&self, task_id: TaskId) {
        self.handler.on_started(task_id).await;
    }

    async fn on_completed(&self, task_id: TaskId) {
        self.handler.on_completed(task_id).await;
    }

    async fn on_error(&self, task_id: TaskId, error: &anyhow::Error) {
        self.handler.on_error(task_id, error).await;
    }

    fn capabilities(&self) -> HandlerCapabilities {
        self.handler.capabilities()
    }

    fn handler_type_name(&self) -> &'static str {
        std::any::type_name::<H>()
    }
}

/// Registration map `requestType -> (constructor, invoker)`, built at
/// startup. `requestType` is the request's Rust type name; there is
/// exactly one handler per request type.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<Req, H>(&mut self, handler: H)
    where
        Req: DeserializeOwned + Serialize + Send + Sync + 'static,
        H: TaskHandler<Req>,
    {
        let binding = HandlerBinding {
            handler: Arc::new(handler),
            _marker: PhantomData,
        };
        self.handlers.insert(std::any::type_name::<Req>(), Arc::new(binding));
    }

    pub(crate) fn resolve(&self, request_type: &str) -> Option<Arc<dyn ErasedHandler>> {
        self.handlers.get(request_type).cloned()
    }

    pub fn request_type_name<Req: 'static>() -> &'static str {
        std::any::type_name::<Req>()
    }
}
