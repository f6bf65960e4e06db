//! Named operations invoked with a loosely typed JSON record
//!
//! This is the host-facing surface: a caller registers handlers by name and
//! later dispatches raw service data to them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use log::{debug, error, info};
use serde_json::Value as JsonValue;

use crate::device::DeviceResolver;
use crate::request::{SetTimeInput, SyncRequest};
use crate::sync::{SyncError, sync};

pub const DOMAIN: &str = "lywsd02";
pub const SET_TIME: &str = "set_time";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unknown service '{}.{}'", DOMAIN, .0)]
    UnknownService(String),
    #[error("invalid service data: {0}")]
    InvalidData(#[from] serde_json::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Operation handler function type
pub type ServiceHandler =
    Box<dyn Fn(JsonValue) -> BoxFuture<'static, Result<(), ServiceError>> + Send + Sync>;

#[derive(Default)]
pub struct ServiceRegistry {
    handlers: HashMap<String, ServiceHandler>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation handler, replacing any previous one with that name
    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        debug!("registering {DOMAIN}.{name}");
        self.handlers.insert(
            name.to_string(),
            Box::new(move |data| handler(data).boxed()),
        );
    }

    pub async fn call(&self, name: &str, data: JsonValue) -> Result<(), ServiceError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ServiceError::UnknownService(name.to_string()))?;
        handler(data).await
    }

    /// Registered operation names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Register `set_time`, which syncs the device named by the record's `mac`
pub fn register_set_time<R>(registry: &mut ServiceRegistry, resolver: Arc<R>)
where
    R: DeviceResolver + Send + Sync + 'static,
    R::Device: Send + Sync,
{
    registry.register(SET_TIME, move |data| {
        let resolver = Arc::clone(&resolver);
        async move { set_time(resolver.as_ref(), data).await }
    });
}

async fn set_time<R: DeviceResolver>(
    resolver: &R,
    data: JsonValue,
) -> Result<(), ServiceError> {
    let input: SetTimeInput = serde_json::from_value(data)?;
    let request = SyncRequest::try_from(input).map_err(SyncError::from)?;

    match sync(resolver, &request).await {
        Ok(report) => {
            info!(
                "Done - refreshed time on '{}' to '{}' with offset of '{}' hours.",
                report.address, report.timestamp, report.tz_offset_hours
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to update time on '{}': {e}", request.address);
            Err(e.into())
        }
    }
}
