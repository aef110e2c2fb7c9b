//! Handler lookup and dispatch.
//!
//! # Responsibilities
//! - Define the handler and provider seams
//! - Store explicitly registered providers in order
//! - Return the first matching handler or an explicit no-match
//!
//! # Design Decisions
//! - Providers are registered at construction, nothing is discovered at runtime
//! - Immutable after construction (thread-safe without locks)
//! - First match wins, in registration order

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use futures_util::future::BoxFuture;
use http_body_util::LengthLimitError;

use crate::http::request::RequestContext;
use crate::routing::matcher::{AndMatcher, ExactPathMatcher, Matcher, MethodMatcher};

/// Failure raised by a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Request body error: {0}")]
    Body(#[from] axum::Error),
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    /// Status reported to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Body(e) if exceeded_body_limit(e) => StatusCode::PAYLOAD_TOO_LARGE,
            HandlerError::Body(_) => StatusCode::BAD_REQUEST,
            HandlerError::Io(_) | HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn exceeded_body_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

pub type HandlerResult = Result<Response, HandlerError>;
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// Processes an admitted request.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: RequestContext, request: Request<Body>) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext, Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: RequestContext, request: Request<Body>) -> HandlerFuture {
        Box::pin(self(ctx, request))
    }
}

/// Turn a closure into a [`Handler`], pinning down its argument types.
pub fn handler_fn<F, Fut>(f: F) -> F
where
    F: Fn(RequestContext, Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    f
}

/// Resolves a handler for a method and path.
pub trait HandlerProvider: Send + Sync {
    /// Return a handler if this provider serves `(method, path)`.
    fn resolve(&self, method: &Method, path: &str) -> Option<Arc<dyn Handler>>;
}

struct Route {
    matcher: Box<dyn Matcher>,
    handler: Arc<dyn Handler>,
}

/// Ordered list of matcher → handler routes.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Earlier routes take precedence.
    pub fn route(mut self, matcher: impl Matcher + 'static, handler: impl Handler + 'static) -> Self {
        self.routes.push(Route {
            matcher: Box::new(matcher),
            handler: Arc::new(handler),
        });
        self
    }

    /// Add a route for an exact method and path.
    pub fn on(self, method: Method, path: &str, handler: impl Handler + 'static) -> Self {
        let matcher = AndMatcher::new(vec![
            Box::new(MethodMatcher::new(method)),
            Box::new(ExactPathMatcher::new(path)),
        ]);
        self.route(matcher, handler)
    }

    pub fn get(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| &r.matcher))
            .finish()
    }
}

impl HandlerProvider for RouteTable {
    fn resolve(&self, method: &Method, path: &str) -> Option<Arc<dyn Handler>> {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(method, path))
            .map(|route| Arc::clone(&route.handler))
    }
}

/// Providers consulted in registration order.
#[derive(Clone, Default)]
pub struct HandlerChain {
    providers: Vec<Arc<dyn HandlerProvider>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider.
    pub fn with_provider(mut self, provider: impl HandlerProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Append a shared provider.
    pub fn push(&mut self, provider: Arc<dyn HandlerProvider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl HandlerProvider for HandlerChain {
    fn resolve(&self, method: &Method, path: &str) -> Option<Arc<dyn Handler>> {
        self.providers
            .iter()
            .find_map(|provider| provider.resolve(method, path))
    }
}
