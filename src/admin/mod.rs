//! Admin endpoints.
//!
//! # Endpoints
//! ```text
//! GET  /admin/status                     → server and registry summary
//! GET  /admin/clients                    → every tracked client
//! POST /admin/clients/{address}/unblock  → lift a block early
//! ```
//!
//! All endpoints require `Authorization: Bearer <api_key>`. Admin requests
//! pass through admission like any other request.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::http::request::RequestContext;
use crate::http::{response, GateStatus};
use crate::routing::matcher::{AndMatcher, Matcher, MethodMatcher, PathPrefixMatcher};
use crate::routing::{handler_fn, Handler, HandlerProvider, HandlerResult, RouteTable};

const CLIENTS_PREFIX: &str = "/admin/clients/";
const UNBLOCK_SUFFIX: &str = "/unblock";

/// Handler provider serving the admin endpoints.
pub struct AdminProvider {
    routes: RouteTable,
}

impl AdminProvider {
    pub fn new(api_key: impl Into<String>, state: GateStatus) -> Self {
        let api_key: Arc<str> = Arc::from(api_key.into());

        let status_handler = {
            let (key, state) = (Arc::clone(&api_key), state.clone());
            handler_fn(move |_ctx: RequestContext, request: Request<Body>| {
                let reply = guarded(&request, &key, || json(&handlers::status(&state)));
                async move { reply }
            })
        };

        let clients_handler = {
            let (key, state) = (Arc::clone(&api_key), state.clone());
            handler_fn(move |_ctx: RequestContext, request: Request<Body>| {
                let reply = guarded(&request, &key, || json(&handlers::clients(&state)));
                async move { reply }
            })
        };

        let unblock_handler = {
            let (key, state) = (Arc::clone(&api_key), state);
            handler_fn(move |_ctx: RequestContext, request: Request<Body>| {
                let reply = guarded(&request, &key, || {
                    let Some(address) = unblock_target(request.uri().path()) else {
                        return Ok(response::not_found());
                    };
                    match handlers::unblock(&state, address) {
                        Some(outcome) => json(&outcome),
                        None => Ok(response::plain(StatusCode::NOT_FOUND, "Unknown client")),
                    }
                });
                async move { reply }
            })
        };

        let routes = RouteTable::new()
            .get("/admin/status", status_handler)
            .get("/admin/clients", clients_handler)
            .route(UnblockMatcher::new(), unblock_handler);

        Self { routes }
    }
}

impl HandlerProvider for AdminProvider {
    fn resolve(&self, method: &Method, path: &str) -> Option<Arc<dyn Handler>> {
        self.routes.resolve(method, path)
    }
}

/// Matches `POST /admin/clients/{address}/unblock`.
#[derive(Debug)]
struct UnblockMatcher {
    inner: AndMatcher,
}

impl UnblockMatcher {
    fn new() -> Self {
        Self {
            inner: AndMatcher::new(vec![
                Box::new(MethodMatcher::new(Method::POST)),
                Box::new(PathPrefixMatcher::new(CLIENTS_PREFIX)),
            ]),
        }
    }
}

impl Matcher for UnblockMatcher {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.inner.matches(method, path) && unblock_target(path).is_some()
    }
}

/// Extract `{address}` from `/admin/clients/{address}/unblock`.
fn unblock_target(path: &str) -> Option<&str> {
    let address = path
        .strip_prefix(CLIENTS_PREFIX)?
        .strip_suffix(UNBLOCK_SUFFIX)?;
    (!address.is_empty() && !address.contains('/')).then_some(address)
}

fn guarded(
    request: &Request<Body>,
    api_key: &str,
    f: impl FnOnce() -> HandlerResult,
) -> HandlerResult {
    if !auth::authorized(request.headers(), api_key) {
        tracing::warn!(path = %request.uri().path(), "Admin request rejected: bad credentials");
        return Ok(auth::unauthorized());
    }
    f()
}

fn json<T: Serialize>(value: &T) -> HandlerResult {
    Ok(Json(value).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant, SystemTime};

    use axum::http::header;

    use crate::clients::ClientRegistry;
    use crate::net::{AdmissionLimiter, ConnectionTracker};

    fn provider() -> (AdminProvider, Arc<ClientRegistry>) {
        let registry = Arc::new(ClientRegistry::new());
        let state = GateStatus {
            registry: Arc::clone(&registry),
            limiter: AdmissionLimiter::new(2),
            tracker: ConnectionTracker::new(),
            started_at: Instant::now(),
        };
        (AdminProvider::new("key", state), registry)
    }

    async fn call(provider: &AdminProvider, method: Method, path: &str, key: Option<&str>) -> Response {
        let handler = provider.resolve(&method, path).expect("admin route");
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        let request = builder.body(Body::empty()).unwrap();
        handler.call(RequestContext::detached(), request).await.unwrap()
    }

    #[test]
    fn unblock_target_parsing() {
        assert_eq!(unblock_target("/admin/clients/10.0.0.1/unblock"), Some("10.0.0.1"));
        assert_eq!(unblock_target("/admin/clients/::1/unblock"), Some("::1"));
        assert_eq!(unblock_target("/admin/clients//unblock"), None);
        assert_eq!(unblock_target("/admin/clients/a/b/unblock"), None);
        assert_eq!(unblock_target("/admin/clients/10.0.0.1"), None);
    }

    #[test]
    fn resolves_only_admin_routes() {
        let (provider, _) = provider();
        assert!(provider.resolve(&Method::GET, "/admin/status").is_some());
        assert!(provider.resolve(&Method::GET, "/admin/clients").is_some());
        assert!(provider.resolve(&Method::POST, "/admin/clients/1.2.3.4/unblock").is_some());
        assert!(provider.resolve(&Method::GET, "/admin/clients/1.2.3.4/unblock").is_none());
        assert!(provider.resolve(&Method::GET, "/index.html").is_none());
    }

    #[tokio::test]
    async fn requires_bearer_key() {
        let (provider, _) = provider();
        let response = call(&provider, Method::GET, "/admin/status", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = call(&provider, Method::GET, "/admin/status", Some("wrong")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = call(&provider, Method::GET, "/admin/status", Some("key")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unblock_endpoint_lifts_block() {
        let (provider, registry) = provider();
        let now = SystemTime::now();
        registry.get_or_create("10.1.1.1", now);
        registry.update("10.1.1.1", |record, _| record.block(now, Duration::from_secs(60)));

        let response = call(&provider, Method::POST, "/admin/clients/10.1.1.1/unblock", Some("key")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!registry.get("10.1.1.1").unwrap().record.blocked);

        let response = call(&provider, Method::POST, "/admin/clients/10.9.9.9/unblock", Some("key")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clients_endpoint_lists_records() {
        let (provider, registry) = provider();
        registry.get_or_create("10.2.2.2", SystemTime::now());

        let response = call(&provider, Method::GET, "/admin/clients", Some("key")).await;
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body[0]["address"], "10.2.2.2");
        assert_eq!(body[0]["blocked"], false);
    }
}
