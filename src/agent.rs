//! The protocol state machine.
//!
//! One call to [`WebauthAgent::authenticate`] evaluates a single inbound
//! request through the three protocol phases: session check, WLS response
//! processing, authentication request. The agent never touches the HTTP
//! layer itself — request data comes in through [`RequestContext`] and all
//! side effects (set-cookie, redirect) come back as data in the
//! [`AuthOutcome`] for the caller to apply.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::Config;
use crate::crypto::{FileKeyStore, RsaSha1Verifier, WlsSignatureVerifier};
use crate::status;
use crate::timestamp;
use crate::token::{SessionTicket, WlsResponse};
use crate::validate;

/// Protocol version spoken by this agent (and required of the WLS).
pub const PROTOCOL_VERSION: &str = "3";

/// Query-string parameter carrying the WLS assertion.
pub const WLS_RESPONSE_PARAM: &str = "WLS-Response";

/// Reserved cookie value set before redirecting to the WLS, proving on the
/// way back that the browser accepts cookies.
const PRE_SESSION_VALUE: &str = "Test";

/// Reserved cookie value some agents leave behind on logout. Never parsed
/// as a session ticket.
const LOGGED_OUT_VALUE: &str = "Not-authenticated";

/// Read access to the inbound HTTP request.
///
/// `cookie` returns the raw (still URL-encoded) cookie value; the agent
/// decodes it.
pub trait RequestContext {
    /// The `Host:` header, if present.
    fn host(&self) -> Option<String>;
    /// The server port the request arrived on.
    fn port(&self) -> u16;
    /// Whether the connection is secure (TLS).
    fn is_secure(&self) -> bool;
    /// Path plus query string, e.g. `/secret/?a=b`.
    fn request_uri(&self) -> String;
    /// The raw query string, without the leading `?`.
    fn query_string(&self) -> Option<String>;
    /// The request method.
    fn method(&self) -> String;
    /// Look up a cookie value by name.
    fn cookie(&self, name: &str) -> Option<String>;
}

/// How long a cookie the agent asks for should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieLifetime {
    /// Browser-session cookie (no explicit expiry).
    Session,
    /// Delete: expire the cookie immediately.
    Expired,
}

/// A set-cookie instruction for the caller to apply. The value is raw;
/// URL-encode it when emitting a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CookieDirective {
    pub name: String,
    pub value: String,
    pub lifetime: CookieLifetime,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub http_only: bool,
}

/// Where an authentication attempt ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// A valid session cookie covered the request.
    SessionValid,
    /// A WLS response was validated and a session established; apply the
    /// cookie and redirect.
    ResponseAccepted,
    /// The attempt failed terminally; `status`/`message` say why.
    ResponseRejected,
    /// The browser must visit the WLS; apply the cookie (if any) and
    /// redirect. Not terminal — the flow continues on the next request.
    RequestIssued,
}

/// The result of one authentication attempt, including any side effects
/// the caller must apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AuthOutcome {
    pub state: AuthState,
    /// Protocol status code, when one applies (see [`crate::status`]).
    pub status: Option<u16>,
    pub message: Option<String>,
    pub issue: Option<String>,
    pub expire: Option<String>,
    /// Assertion identifier backing this session.
    pub id: Option<String>,
    /// Authenticated principal.
    pub principal: Option<String>,
    pub ptags: Option<String>,
    pub auth: Option<String>,
    pub sso: Option<String>,
    pub params: Option<String>,
    /// Cookie the caller must set, if any.
    pub set_cookie: Option<CookieDirective>,
    /// URL the caller must redirect the browser to, if any.
    pub redirect: Option<String>,
}

impl AuthOutcome {
    fn new(state: AuthState) -> Self {
        Self {
            state,
            status: None,
            message: None,
            issue: None,
            expire: None,
            id: None,
            principal: None,
            ptags: None,
            auth: None,
            sso: None,
            params: None,
            set_cookie: None,
            redirect: None,
        }
    }

    fn rejected(status: u16, message: impl Into<String>) -> Self {
        let mut outcome = Self::new(AuthState::ResponseRejected);
        outcome.status = Some(status);
        outcome.message = Some(message.into());
        outcome
    }

    fn from_ticket(ticket: &SessionTicket, state: AuthState) -> Self {
        let non_empty = |s: &String| (!s.is_empty()).then(|| s.clone());
        let mut outcome = Self::new(state);
        outcome.status = ticket.status.parse().ok();
        outcome.message = non_empty(&ticket.msg);
        outcome.issue = non_empty(&ticket.issue);
        outcome.expire = non_empty(&ticket.expire);
        outcome.id = non_empty(&ticket.id);
        outcome.principal = non_empty(&ticket.principal);
        outcome.ptags = non_empty(&ticket.ptags);
        outcome.auth = non_empty(&ticket.auth);
        outcome.sso = non_empty(&ticket.sso);
        outcome.params = non_empty(&ticket.params);
        outcome
    }

    /// Whether authentication succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(status::SUCCESS)
    }

    /// `true` when the attempt finished on this request (render a page),
    /// `false` when a redirect was issued and the flow continues.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.redirect.is_none()
    }
}

/// Per-call options for [`WebauthAgent::authenticate`].
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct AuthOptions {
    /// Treat a session derived from exactly this assertion id as stale and
    /// force re-authentication at the WLS.
    pub auth_assertion_id: Option<String>,
    /// Dummy run: evaluate only, suppress all cookie and redirect side
    /// effects. Requires session management.
    pub test_auth_only: bool,
}

/// The Web Authentication Agent.
///
/// Holds the immutable [`Config`] and a [`WlsSignatureVerifier`]; all
/// per-request state lives on the stack of [`authenticate`](Self::authenticate).
pub struct WebauthAgent<V> {
    config: Config,
    verifier: V,
}

impl WebauthAgent<RsaSha1Verifier<FileKeyStore>> {
    /// Create an agent with the stock RSA verifier reading keys from the
    /// configured key directory.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let verifier = RsaSha1Verifier::new(FileKeyStore::new(config.key_dir().to_path_buf()));
        Self { config, verifier }
    }
}

impl<V: WlsSignatureVerifier> WebauthAgent<V> {
    /// Create an agent with a custom assertion verifier.
    #[must_use]
    pub fn with_verifier(config: Config, verifier: V) -> Self {
        Self { config, verifier }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one authentication attempt against the inbound request.
    pub fn authenticate(
        &self,
        request: &impl RequestContext,
        options: &AuthOptions,
    ) -> AuthOutcome {
        let config = &self.config;

        // Preamble consistency checks.
        if options.test_auth_only && !config.do_session {
            return AuthOutcome::rejected(
                status::LOCAL_ERROR,
                "Requested dummy run but session cookie not managed",
            );
        }
        if config.do_session && config.cookie_key.is_none() {
            return AuthOutcome::rejected(
                status::LOCAL_ERROR,
                "No key defined for session cookie",
            );
        }
        if request.method() == "POST" {
            warn!("webauth agent invoked for a POST request, which the protocol does not support");
        }
        if config.hostname.is_empty() {
            warn!("hostname not set in webauth configuration, but is mandatory");
            return AuthOutcome::rejected(
                status::LOCAL_ERROR,
                "Webauth configuration error - mandatory hostname not defined",
            );
        }

        let secure = request.is_secure();
        let cookie_name = self.full_cookie_name(secure);
        let cookie_key = config.cookie_key.as_deref().unwrap_or("");
        let now = unix_now();

        // Message and opaque params carried from an expired session into
        // the next WLS request.
        let mut carried_message: Option<String> = None;
        let mut carried_params: Option<String> = None;

        // Phase 1: session check. A valid cookie concludes the attempt
        // without contacting the WLS.
        if config.do_session {
            debug!("session management on, checking session cookie");
            let cookie_value = request.cookie(&cookie_name).map(decode_cookie_value);
            if let Some(value) = cookie_value {
                if value != PRE_SESSION_VALUE && value != LOGGED_OUT_VALUE {
                    debug!(cookie = %value, "found session cookie");
                    let ticket = SessionTicket::decode(&value);
                    if !ticket.verify(cookie_key) {
                        // A tampered cookie is not salvageable by silently
                        // re-authenticating; the caller sees it.
                        warn!("session cookie signature invalid");
                        let mut outcome =
                            AuthOutcome::from_ticket(&ticket, AuthState::ResponseRejected);
                        outcome.status = Some(status::LOCAL_ERROR);
                        outcome.message = Some("Session cookie signature invalid".to_owned());
                        return outcome;
                    }

                    let issue = timestamp::decode(&ticket.issue);
                    let expire = timestamp::decode(&ticket.expire);
                    if issue <= now && now < expire {
                        // A session derived from exactly the caller-supplied
                        // assertion id is stale: force a fresh login.
                        if options.auth_assertion_id.as_deref() == Some(ticket.id.as_str()) {
                            debug!(id = %ticket.id, "stale assertion id, denying session ticket");
                            carried_message = config.forced_reauth_message.clone();
                        } else {
                            let mut outcome =
                                AuthOutcome::from_ticket(&ticket, AuthState::SessionValid);
                            if ticket.status != status::SUCCESS.to_string()
                                && !options.test_auth_only
                            {
                                // Destroy the cookie so a recorded failure is
                                // not replayed as a stale-authentication error.
                                outcome.set_cookie = Some(self.clear_cookie(secure));
                            }
                            debug!("authentication complete from existing session");
                            return outcome;
                        }
                    } else {
                        debug!(issue, now, expire, "session cookie expired");
                        carried_message = Some(config.timeout_message.clone());
                    }
                    if !ticket.params.is_empty() {
                        carried_params = Some(ticket.params.clone());
                    }
                }
            }
        }

        // Phase 2: WLS response processing.
        let wls_response = request.query_string().and_then(|qs| {
            let mut found = None;
            for (key, value) in url::form_urlencoded::parse(qs.as_bytes()) {
                if key == WLS_RESPONSE_PARAM {
                    found = Some(value.into_owned());
                }
            }
            found
        });

        if let Some(raw_response) = wls_response {
            debug!(response = %raw_response, "processing WLS response");
            let response = WlsResponse::decode(&raw_response);
            let current_url = self.canonical_url(request);

            if let Err(rejection) =
                validate::validate_response(&response, config, &self.verifier, now, &current_url)
            {
                warn!(
                    status = rejection.status(),
                    message = %rejection.message(),
                    "WLS response rejected"
                );
                return AuthOutcome::rejected(rejection.status(), rejection.message());
            }

            let expiry = validate::session_lifetime(config, &response.life);
            let issue = timestamp::encode(now);
            let expire = timestamp::encode(now + expiry);
            let ticket = SessionTicket::from_response(&response, &issue, &expire);
            let mut outcome = AuthOutcome::from_ticket(&ticket, AuthState::ResponseAccepted);

            if !config.do_session {
                return outcome;
            }

            // The pre-session cookie must have come back, otherwise setting
            // a session cookie now would only start a redirect loop.
            let pre_session = request.cookie(&cookie_name).map(decode_cookie_value);
            if pre_session.as_deref() != Some(PRE_SESSION_VALUE) {
                warn!("pre-session cookie missing, browser is not accepting cookies");
                outcome.state = AuthState::ResponseRejected;
                outcome.status = Some(status::COOKIE_REJECTED);
                outcome.message = Some("Browser is not accepting session cookie".to_owned());
                return outcome;
            }

            let cookie_value = ticket.encode_signed(cookie_key);
            debug!("session cookie established, redirecting to clean the location bar");
            if !options.test_auth_only {
                outcome.set_cookie = Some(CookieDirective {
                    name: cookie_name,
                    value: cookie_value,
                    lifetime: CookieLifetime::Session,
                    path: config.cookie_path.clone(),
                    domain: config.cookie_domain.clone(),
                    secure,
                    http_only: false,
                });
                outcome.redirect = Some(response.url.clone());
            }
            return outcome;
        }

        // Phase 3: authentication request.
        debug!("no session and no WLS response, issuing authentication request");
        let mut outcome = AuthOutcome::new(AuthState::RequestIssued);

        if config.do_session {
            // A Host: header that disagrees with the configured hostname
            // means the session cookie may not come back. Redirect to the
            // equivalent URL under the configured hostname first.
            if let Some(host) = request.host() {
                if !basic_hostname(&config.hostname).eq_ignore_ascii_case(&host) {
                    debug!(
                        request_host = %host,
                        configured = %config.hostname,
                        "redirecting to tidy up hostname mismatch"
                    );
                    if !options.test_auth_only {
                        outcome.redirect = Some(self.canonical_url(request));
                    }
                    return outcome;
                }
            }
            debug!("setting pre-session cookie");
            if !options.test_auth_only {
                outcome.set_cookie = Some(CookieDirective {
                    name: cookie_name,
                    value: PRE_SESSION_VALUE.to_owned(),
                    lifetime: CookieLifetime::Session,
                    path: config.cookie_path.clone(),
                    domain: config.cookie_domain.clone(),
                    secure,
                    http_only: false,
                });
            }
        }

        let mut dest = config.auth_service.clone();
        {
            let mut query = dest.query_pairs_mut();
            query.append_pair("ver", PROTOCOL_VERSION);
            query.append_pair("url", &self.canonical_url(request));
            if let Some(description) = &config.description {
                query.append_pair("desc", description);
            }
            if let Some(aauth) = &config.aauth {
                query.append_pair("aauth", aauth);
            }
            if let Some(interact) = config.interact {
                query.append_pair("iact", if interact { "yes" } else { "no" });
            }
            if let Some(message) = &carried_message {
                query.append_pair("msg", message);
            }
            if let Some(params) = &carried_params {
                query.append_pair("params", params);
            }
            query.append_pair("date", &timestamp::encode(now));
            if config.fail {
                query.append_pair("fail", "yes");
            }
        }
        debug!(url = %dest, "redirecting to WLS");
        if !options.test_auth_only {
            outcome.redirect = Some(dest.into());
        }
        outcome
    }

    /// Produce the delete-cookie directive that (partially) logs the user
    /// out. The WLS keeps its own session cookie, which cannot be cleared
    /// from here; only the local session ends.
    #[must_use]
    pub fn logout(&self, request: &impl RequestContext) -> CookieDirective {
        self.clear_cookie(request.is_secure())
    }

    /// Canonical URL of the current request, built from the *configured*
    /// hostname (never the Host: header): `scheme://host[:port]` plus the
    /// request URI, with the port omitted when it is the scheme default.
    #[must_use]
    pub fn canonical_url(&self, request: &impl RequestContext) -> String {
        let basic_hostname = basic_hostname(&self.config.hostname);

        let secure = request.is_secure();
        let scheme = if secure { "https" } else { "http" };
        let default_port = if secure { 443 } else { 80 };
        let port = request.port();

        let mut url = format!("{scheme}://{basic_hostname}");
        if port != default_port {
            url.push_str(&format!(":{port}"));
        }
        url.push_str(&request.request_uri());
        url
    }

    /// The session cookie name for this connection: the configured name,
    /// suffixed `-S` over TLS so secure and plain sessions never share a
    /// cookie.
    #[must_use]
    pub fn full_cookie_name(&self, secure: bool) -> String {
        if secure {
            format!("{}-S", self.config.cookie_name)
        } else {
            self.config.cookie_name.clone()
        }
    }

    fn clear_cookie(&self, secure: bool) -> CookieDirective {
        CookieDirective {
            name: self.full_cookie_name(secure),
            value: String::new(),
            lifetime: CookieLifetime::Expired,
            path: self.config.cookie_path.clone(),
            domain: self.config.cookie_domain.clone(),
            secure,
            http_only: false,
        }
    }
}

/// The configured hostname with any trailing `:port` removed. The port
/// travels in the canonical URL separately, and [`RequestContext::host`]
/// values are port-stripped, so comparisons must use this form.
fn basic_hostname(hostname: &str) -> &str {
    match hostname.rfind(':') {
        Some(i)
            if !hostname[i + 1..].is_empty()
                && hostname[i + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &hostname[..i]
        }
        _ => hostname,
    }
}

fn decode_cookie_value(raw: String) -> String {
    match urlencoding::decode(&raw) {
        Ok(Cow::Borrowed(_)) => raw,
        Ok(Cow::Owned(decoded)) => decoded,
        Err(_) => raw,
    }
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
