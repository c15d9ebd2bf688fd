//! Axum integration: a [`RequestContext`] adapter over request parts and
//! helpers that turn an [`AuthOutcome`]'s side effects into a response.
//!
//! ```rust,no_run
//! use axum::extract::Request;
//! use axum::response::IntoResponse;
//! use raven_webauth::middleware::{redirect_response, AxumRequest};
//! use raven_webauth::{AuthOptions, Config, WebauthAgent};
//!
//! async fn handler(request: Request) -> axum::response::Response {
//!     let config = Config::new("www.example.ac.uk").with_cookie_key("secret");
//!     let agent = WebauthAgent::new(config);
//!     let (parts, _body) = request.into_parts();
//!     let outcome = agent.authenticate(&AxumRequest::new(&parts), &AuthOptions::default());
//!     if let Some(response) = redirect_response(&outcome) {
//!         return response;
//!     }
//!     format!("hello {}", outcome.principal.as_deref().unwrap_or("anonymous")).into_response()
//! }
//! ```

use axum::http::request::Parts;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use time::Duration;

use crate::agent::{AuthOutcome, CookieDirective, CookieLifetime, RequestContext};

/// [`RequestContext`] over borrowed axum request parts.
///
/// TLS detection looks at the `x-forwarded-proto` header and the request
/// URI scheme; behind a proxy that sets neither, fix it with
/// [`with_secure`](Self::with_secure).
pub struct AxumRequest<'a> {
    parts: &'a Parts,
    secure: Option<bool>,
}

impl<'a> AxumRequest<'a> {
    #[must_use]
    pub fn new(parts: &'a Parts) -> Self {
        Self {
            parts,
            secure: None,
        }
    }

    /// Override TLS detection.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    fn host_header(&self) -> Option<&str> {
        self.parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
    }
}

impl RequestContext for AxumRequest<'_> {
    fn host(&self) -> Option<String> {
        self.host_header()
            .map(|h| h.rsplit_once(':').map_or(h, |(name, _)| name).to_owned())
    }

    fn port(&self) -> u16 {
        if let Some(port) = self
            .host_header()
            .and_then(|h| h.rsplit_once(':'))
            .and_then(|(_, port)| port.parse().ok())
        {
            return port;
        }
        if let Some(port) = self.parts.uri.port_u16() {
            return port;
        }
        if self.is_secure() {
            443
        } else {
            80
        }
    }

    fn is_secure(&self) -> bool {
        if let Some(secure) = self.secure {
            return secure;
        }
        if let Some(proto) = self
            .parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
        {
            return proto.eq_ignore_ascii_case("https");
        }
        self.parts.uri.scheme_str() == Some("https")
    }

    fn request_uri(&self) -> String {
        self.parts
            .uri
            .path_and_query()
            .map_or_else(|| self.parts.uri.path().to_owned(), |pq| pq.as_str().to_owned())
    }

    fn query_string(&self) -> Option<String> {
        self.parts.uri.query().map(str::to_owned)
    }

    fn method(&self) -> String {
        self.parts.method.as_str().to_owned()
    }

    fn cookie(&self, name: &str) -> Option<String> {
        CookieJar::from_headers(&self.parts.headers)
            .get(name)
            .map(|cookie| cookie.value().to_owned())
    }
}

/// Materialize a [`CookieDirective`] as a cookie. The value is URL-encoded
/// here, matching what the agent expects to find on the way back in.
#[must_use]
pub fn build_cookie(directive: &CookieDirective) -> Cookie<'static> {
    let value = urlencoding::encode(&directive.value).into_owned();
    let mut builder = Cookie::build((directive.name.clone(), value))
        .secure(directive.secure)
        .http_only(directive.http_only);
    if !directive.path.is_empty() {
        builder = builder.path(directive.path.clone());
    }
    if !directive.domain.is_empty() {
        builder = builder.domain(directive.domain.clone());
    }
    if directive.lifetime == CookieLifetime::Expired {
        builder = builder.max_age(Duration::ZERO);
    }
    builder.build()
}

/// Apply an outcome's side effects: when a redirect is pending, build the
/// redirect response with any set-cookie attached. `None` means the
/// attempt completed on this request and the caller should render a page
/// (setting [`AuthOutcome::set_cookie`] itself if present).
#[must_use]
pub fn redirect_response(outcome: &AuthOutcome) -> Option<Response> {
    let target = outcome.redirect.as_deref()?;
    let mut response = Redirect::to(target).into_response();
    if let Some(directive) = &outcome.set_cookie {
        if let Ok(value) = HeaderValue::from_str(&build_cookie(directive).to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    Some(response)
}
