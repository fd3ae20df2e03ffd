//! The request pipeline placed in front of every route.
//!
//! Links run in a fixed order, outermost first:
//!
//! 1. fault containment: a panic anywhere below, or a handler overrunning
//!    [`REQUEST_TIMEOUT`], becomes a generic 500
//! 2. method allow-list: anything but `GET`, `HEAD`, `OPTIONS` is a 405
//! 3. user-agent check: a missing or blank `User-Agent` is a 400
//! 4. policy headers: `Privacy-Policy` and `Terms-Of-Service` links
//! 5. cross-origin headers
//!
//! A rejecting link writes the response itself and returns without calling
//! the rest of the chain.

use std::{any::Any, time::Duration};

use axum::{
    error_handling::HandleErrorLayer,
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    Router,
};
use common::{error::ALLOWED_METHODS, ServiceError};
use thiserror::Error;
use tower::{timeout::error::Elapsed, BoxError, ServiceBuilder};
use tower_http::{catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer};
use tracing::{error, warn};

use super::error::error_response;

/// Per-request handling deadline applied around the pipeline.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const PRIVACY_POLICY: HeaderName = HeaderName::from_static("privacy-policy");
pub const TERMS_OF_SERVICE: HeaderName = HeaderName::from_static("terms-of-service");

/// Errors raised while building the policy link headers.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("{0} link is missing")]
    Missing(&'static str),

    #[error("{name} link is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{0} link cannot be sent as a header value")]
    InvalidHeader(&'static str),
}

/// Validated header values for the policy links.
#[derive(Debug, Clone)]
pub struct PolicyLinks {
    privacy_policy: HeaderValue,
    terms_of_service: HeaderValue,
}

impl PolicyLinks {
    /// Validate both links.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if either link is empty, not an absolute URL, or
    /// not representable as a header value.
    pub fn new(privacy_policy: &str, terms_of_service: &str) -> Result<Self, PolicyError> {
        Ok(Self {
            privacy_policy: link_header("privacy policy", privacy_policy)?,
            terms_of_service: link_header("terms of service", terms_of_service)?,
        })
    }
}

fn link_header(name: &'static str, link: &str) -> Result<HeaderValue, PolicyError> {
    let link = link.trim();
    if link.is_empty() {
        return Err(PolicyError::Missing(name));
    }
    let url = url::Url::parse(link).map_err(|source| PolicyError::InvalidUrl { name, source })?;
    HeaderValue::from_str(url.as_str()).map_err(|_| PolicyError::InvalidHeader(name))
}

/// Wrap every route and the fallback of `router` in the pipeline.
pub fn wrap<S>(router: Router<S>, links: &PolicyLinks) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(CatchPanicLayer::custom(contain_fault))
            .layer(HandleErrorLayer::new(contain_error))
            .timeout(REQUEST_TIMEOUT)
            .layer(middleware::from_fn(allow_methods))
            .layer(middleware::from_fn(require_user_agent))
            .layer(SetResponseHeaderLayer::overriding(
                PRIVACY_POLICY,
                links.privacy_policy.clone(),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                TERMS_OF_SERVICE,
                links.terms_of_service.clone(),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type, User-Agent"),
            )),
    )
}

/// Convert a caught panic into the generic 500. The payload is logged only.
fn contain_fault(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "non-string panic payload"
    };
    error!(panic = detail, "request handler panicked");
    error_response(&ServiceError::Internal)
}

/// Convert a timeout (or any other middleware error) into the generic 500.
async fn contain_error(err: BoxError) -> Response {
    if err.is::<Elapsed>() {
        warn!(timeout_ms = REQUEST_TIMEOUT.as_millis() as u64, "request timed out");
    } else {
        error!(error = %err, "request failed in middleware");
    }
    error_response(&ServiceError::Internal)
}

async fn allow_methods(request: Request, next: Next) -> Response {
    let method = request.method();
    if method != Method::GET && method != Method::HEAD && method != Method::OPTIONS {
        return error_response(&ServiceError::MethodNotAllowed(method.to_string()));
    }
    next.run(request).await
}

async fn require_user_agent(request: Request, next: Next) -> Response {
    let present = request
        .headers()
        .get(header::USER_AGENT)
        .is_some_and(|ua| !ua.as_bytes().iter().all(u8::is_ascii_whitespace));
    if !present {
        return error_response(&ServiceError::RequestInvalid(
            "User agent is missing. Please provide a valid user agent.".into(),
        ));
    }
    next.run(request).await
}
