//! Method + path-template request routing.
//!
//! Routes are registered as `(method, template, handler)` where the template
//! may contain `{name}` parameter segments, e.g. `/activities/{activityId}`.
//! Matching is linear and first-match-wins, in registration order.
//!
//! # Example
//!
//! ```no_run
//! use skillwire::router::{RequestRouter, RouteContext};
//!
//! let mut router = RequestRouter::new();
//! router.route("POST", "/activities/{activityId}", |ctx: RouteContext| async move {
//!     let id = ctx.param("activityId").unwrap_or_default().to_string();
//!     Ok(id.into_bytes())
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::protocol::{StreamingRequest, StreamingResponse};

/// Boxed future returned by route handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-request context handed to a matched handler.
#[derive(Debug)]
pub struct RouteContext {
    params: HashMap<String, String>,
    body: Vec<u8>,
}

impl RouteContext {
    /// Value captured for a `{name}` template segment.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Request body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consume the context, returning the body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// Handles one matched request, producing the success response body.
pub trait RouteHandler: Send + Sync {
    /// Process the request. An error becomes a 500 response with the message
    /// serialized into the fault body.
    fn handle(&self, ctx: RouteContext) -> BoxFuture<'static, Result<Vec<u8>>>;
}

impl<F, Fut> RouteHandler for F
where
    F: Fn(RouteContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
{
    fn handle(&self, ctx: RouteContext) -> BoxFuture<'static, Result<Vec<u8>>> {
        Box::pin(self(ctx))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct RouteTemplate {
    segments: Vec<Segment>,
}

impl RouteTemplate {
    fn parse(template: &str) -> Self {
        let segments = split_segments(template)
            .into_iter()
            .map(|s| {
                if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Param(name.to_string())
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// Match a concrete path, capturing parameter segments. Segment counts
    /// must match exactly; empty segments (doubled or trailing slashes) are
    /// significant, not collapsed.
    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts = split_segments(path);
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some(params)
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.strip_prefix('/').unwrap_or(path).split('/').collect()
}

struct Route {
    method: String,
    template: RouteTemplate,
    handler: Box<dyn RouteHandler>,
}

/// Request dispatcher: registered routes tried in order, first match wins.
#[derive(Default)]
pub struct RequestRouter {
    routes: Vec<Route>,
}

impl RequestRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a route. Methods compare exactly, so register the canonical
    /// uppercase verb.
    pub fn route<H>(&mut self, method: impl Into<String>, template: &str, handler: H) -> &mut Self
    where
        H: RouteHandler + 'static,
    {
        self.routes.push(Route {
            method: method.into(),
            template: RouteTemplate::parse(template),
            handler: Box::new(handler),
        });
        self
    }

    /// Dispatch an inbound request.
    ///
    /// Always produces a response: 200 with the handler's body on success,
    /// 404 when no route matches, 500 with fault detail when the matched
    /// handler errors.
    pub async fn process_request(&self, request: &StreamingRequest) -> StreamingResponse {
        for route in &self.routes {
            if route.method != request.method {
                continue;
            }
            let Some(params) = route.template.matches(&request.path) else {
                continue;
            };

            let ctx = RouteContext {
                params,
                body: request.body.clone(),
            };
            return match route.handler.handle(ctx).await {
                Ok(body) => StreamingResponse::ok(body),
                Err(e) => {
                    tracing::error!(
                        method = %request.method,
                        path = %request.path,
                        error = %e,
                        "route handler faulted"
                    );
                    StreamingResponse::server_error(fault_body(&e.to_string()))
                }
            };
        }

        tracing::warn!(method = %request.method, path = %request.path, "no route matched");
        StreamingResponse::not_found(fault_body(&format!(
            "no route for {} {}",
            request.method, request.path
        )))
    }
}

fn fault_body(message: &str) -> Vec<u8> {
    serde_json::json!({ "message": message })
        .to_string()
        .into_bytes()
}
