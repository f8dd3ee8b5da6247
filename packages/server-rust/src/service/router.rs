//! Call routing: dispatches a `Request` to the handler bound to its
//! `(service, operation)` pair.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use alo_core::{AloInfo, AloRef, Request, Response, SubOperation};
use async_trait::async_trait;
use tower::Service;

use super::operation::OperationError;
use crate::traits::{AloHandler, Handler};

type BoxedFuture = Pin<Box<dyn Future<Output = Result<Response, OperationError>> + Send>>;

// ---------------------------------------------------------------------------
// RegistrationError
// ---------------------------------------------------------------------------

/// Errors from binding a handler to the router.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("service and operation names must not be empty")]
    EmptyName,
    #[error("operation name {operation:?} contains a reserved ALO suffix")]
    ReservedOperationName { operation: String },
    #[error("a handler is already registered for {service}/{operation}")]
    Duplicate { service: String, operation: String },
}

// ---------------------------------------------------------------------------
// OperationRouter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    service: String,
    operation: String,
}

/// Routes requests to handlers by `(service, operation)`.
///
/// Bindings are added during startup with [`register`](Self::register) and
/// [`register_alo`](Self::register_alo). The route table sits behind an `Arc`,
/// so clones of a fully built router are cheap and share one frozen table.
/// Requests for an unbound pair fail with `OperationError::UnknownOperation`.
#[derive(Clone, Default)]
pub struct OperationRouter {
    routes: Arc<HashMap<RouteKey, Arc<dyn Handler>>>,
}

impl OperationRouter {
    /// Create a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a plain handler to `(service, operation)`.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError` if a name is empty, the operation contains a
    /// reserved ALO suffix segment, or the pair is already bound.
    pub fn register<H>(
        &mut self,
        service: &str,
        operation: &str,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        H: Handler + 'static,
    {
        validate_names(service, operation)?;
        self.bind(service, operation.to_string(), Arc::new(handler))
    }

    /// Bind an ALO handler, expanding it into the start, `/get`, `/cancel` and
    /// `/wait` operations.
    ///
    /// Either all four bindings are added or none are.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError` under the same rules as
    /// [`register`](Self::register), checked for all four generated names.
    pub fn register_alo<H>(
        &mut self,
        service: &str,
        operation: &str,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        H: AloHandler + 'static,
    {
        validate_names(service, operation)?;
        for sub in SubOperation::ALL {
            let key = RouteKey {
                service: service.to_string(),
                operation: sub.address(operation),
            };
            if self.routes.contains_key(&key) {
                return Err(RegistrationError::Duplicate {
                    service: key.service,
                    operation: key.operation,
                });
            }
        }

        let handler: Arc<dyn AloHandler> = Arc::new(handler);
        for sub in SubOperation::ALL {
            let route = AloRoute {
                handler: Arc::clone(&handler),
                sub,
            };
            self.bind(service, sub.address(operation), Arc::new(route))?;
        }
        Ok(())
    }

    /// Returns `true` if a handler is bound to `(service, operation)`.
    #[must_use]
    pub fn contains(&self, service: &str, operation: &str) -> bool {
        self.routes.contains_key(&RouteKey {
            service: service.to_string(),
            operation: operation.to_string(),
        })
    }

    /// Number of bound `(service, operation)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn bind(
        &mut self,
        service: &str,
        operation: String,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RegistrationError> {
        let key = RouteKey {
            service: service.to_string(),
            operation,
        };
        let routes = Arc::make_mut(&mut self.routes);
        if routes.contains_key(&key) {
            return Err(RegistrationError::Duplicate {
                service: key.service,
                operation: key.operation,
            });
        }
        routes.insert(key, handler);
        Ok(())
    }

    fn lookup(&self, req: &Request) -> Option<Arc<dyn Handler>> {
        self.routes
            .get(&RouteKey {
                service: req.service.clone(),
                operation: req.operation.clone(),
            })
            .cloned()
    }
}

fn validate_names(service: &str, operation: &str) -> Result<(), RegistrationError> {
    if service.is_empty() || operation.is_empty() {
        return Err(RegistrationError::EmptyName);
    }
    if SubOperation::is_reserved_name(operation) {
        return Err(RegistrationError::ReservedOperationName {
            operation: operation.to_string(),
        });
    }
    Ok(())
}

impl Service<Request> for OperationRouter {
    type Response = Response;
    type Error = OperationError;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        match self.lookup(&req) {
            Some(handler) => Box::pin(async move { handler.serve(req).await }),
            None => Box::pin(async move {
                Err(OperationError::UnknownOperation {
                    service: req.service,
                    operation: req.operation,
                })
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// AloRoute (generated sub-operation handler)
// ---------------------------------------------------------------------------

/// One of the four handlers generated from an `AloHandler`.
struct AloRoute {
    handler: Arc<dyn AloHandler>,
    sub: SubOperation,
}

#[async_trait]
impl Handler for AloRoute {
    async fn serve(&self, req: Request) -> Result<Response, OperationError> {
        // Malformed references short-circuit before reaching the handler.
        match self.sub {
            SubOperation::Start => info_response(&self.handler.start(req).await?),
            SubOperation::GetInfo => {
                let alo = AloRef::from_request(&req)?;
                info_response(&self.handler.info(&alo).await?)
            }
            SubOperation::Cancel => {
                let alo = AloRef::from_request(&req)?;
                self.handler.cancel(&alo).await?;
                Ok(Response::empty())
            }
            SubOperation::Wait => {
                let alo = AloRef::from_request(&req)?;
                self.handler.wait(&alo).await
            }
        }
    }
}

fn info_response(info: &AloInfo) -> Result<Response, OperationError> {
    Ok(Response {
        output: info.to_bytes()?,
        alo_info: true,
        ..Response::default()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
