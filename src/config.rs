use std::path::PathBuf;

use url::Url;

use crate::error::Error;

const DEFAULT_AUTH_SERVICE: &str = "https://raven.cam.ac.uk/auth/authenticate.html";
const DEFAULT_KEY_DIR: &str = "/etc/httpd/conf/webauth_keys";
const DEFAULT_COOKIE_NAME: &str = "Ucam-WebAuth-Session";
const DEFAULT_TIMEOUT_MESSAGE: &str = "your logon to the site has expired";

/// Immutable agent configuration.
///
/// The required field (`hostname`) is a constructor parameter — the agent
/// never trusts the inbound `Host:` header for it.
///
/// ```rust
/// use raven_webauth::Config;
///
/// let config = Config::new("www.example.ac.uk")
///     .with_cookie_key("a long random secret")
///     .with_max_session_life(4 * 60 * 60);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    pub(crate) hostname: String,
    pub(crate) auth_service: Url,
    pub(crate) key_dir: PathBuf,
    pub(crate) description: Option<String>,
    pub(crate) response_timeout: i64,
    pub(crate) clock_skew: i64,
    pub(crate) do_session: bool,
    pub(crate) max_session_life: i64,
    pub(crate) timeout_message: String,
    pub(crate) forced_reauth_message: Option<String>,
    pub(crate) cookie_key: Option<String>,
    pub(crate) cookie_name: String,
    pub(crate) cookie_path: String,
    pub(crate) cookie_domain: String,
    pub(crate) fail: bool,
    pub(crate) interact: Option<bool>,
    pub(crate) aauth: Option<String>,
}

impl Config {
    /// Create a configuration for the given canonical hostname.
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            auth_service: DEFAULT_AUTH_SERVICE.parse().expect("valid default URL"),
            key_dir: DEFAULT_KEY_DIR.into(),
            description: None,
            response_timeout: 30,
            clock_skew: 5,
            do_session: true,
            max_session_life: 2 * 60 * 60,
            timeout_message: DEFAULT_TIMEOUT_MESSAGE.into(),
            forced_reauth_message: None,
            cookie_key: None,
            cookie_name: DEFAULT_COOKIE_NAME.into(),
            cookie_path: String::new(),
            cookie_domain: String::new(),
            fail: false,
            interact: None,
            aauth: None,
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `RAVEN_HOSTNAME`: canonical hostname of this site
    ///
    /// # Optional env vars
    /// - `RAVEN_AUTH_SERVICE`: WLS endpoint URL
    /// - `RAVEN_KEY_DIR`: directory holding `<kid>.crt` key files
    /// - `RAVEN_COOKIE_KEY`: session cookie signing key
    /// - `RAVEN_COOKIE_NAME`: session cookie name
    /// - `RAVEN_DESCRIPTION`: site description shown on the login page
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `RAVEN_HOSTNAME` is missing or
    /// `RAVEN_AUTH_SERVICE` is not a valid URL.
    pub fn from_env() -> Result<Self, Error> {
        let hostname = std::env::var("RAVEN_HOSTNAME")
            .map_err(|_| Error::Config("RAVEN_HOSTNAME is required".into()))?;
        let mut config = Self::new(hostname);

        if let Ok(url_str) = std::env::var("RAVEN_AUTH_SERVICE") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("RAVEN_AUTH_SERVICE: {e}")))?;
            config = config.with_auth_service(url);
        }
        if let Ok(dir) = std::env::var("RAVEN_KEY_DIR") {
            config = config.with_key_dir(dir);
        }
        if let Ok(key) = std::env::var("RAVEN_COOKIE_KEY") {
            config = config.with_cookie_key(key);
        }
        if let Ok(name) = std::env::var("RAVEN_COOKIE_NAME") {
            config = config.with_cookie_name(name);
        }
        if let Ok(desc) = std::env::var("RAVEN_DESCRIPTION") {
            config = config.with_description(desc);
        }

        Ok(config)
    }

    /// Override the WLS endpoint (default: the central Raven service).
    #[must_use]
    pub fn with_auth_service(mut self, url: Url) -> Self {
        self.auth_service = url;
        self
    }

    /// Override the key directory used by the stock file key store.
    #[must_use]
    pub fn with_key_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.key_dir = dir.into();
        self
    }

    /// Description of this site, shown on the WLS login page.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Freshness window for WLS responses, in seconds (default 30).
    #[must_use]
    pub fn with_response_timeout(mut self, seconds: i64) -> Self {
        self.response_timeout = seconds;
        self
    }

    /// Clock drift tolerance between this host and the WLS, in seconds
    /// (default 5).
    #[must_use]
    pub fn with_clock_skew(mut self, seconds: i64) -> Self {
        self.clock_skew = seconds;
        self
    }

    /// Enable or disable session cookie management (default on). When off,
    /// every request triggers a fresh WLS round trip.
    #[must_use]
    pub fn with_session_management(mut self, enabled: bool) -> Self {
        self.do_session = enabled;
        self
    }

    /// Upper bound on session lifetime in seconds (default 2 hours). The
    /// WLS may shorten, but never extend, this.
    #[must_use]
    pub fn with_max_session_life(mut self, seconds: i64) -> Self {
        self.max_session_life = seconds;
        self
    }

    /// Message forwarded to the WLS when an expired session forces
    /// re-authentication.
    #[must_use]
    pub fn with_timeout_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_message = message.into();
        self
    }

    /// Message forwarded to the WLS when a caller-requested freshness check
    /// forces re-authentication.
    #[must_use]
    pub fn with_forced_reauth_message(mut self, message: impl Into<String>) -> Self {
        self.forced_reauth_message = Some(message.into());
        self
    }

    /// Session cookie signing key. Mandatory when session management is
    /// enabled.
    #[must_use]
    pub fn with_cookie_key(mut self, key: impl Into<String>) -> Self {
        self.cookie_key = Some(key.into());
        self
    }

    /// Session cookie name (default `Ucam-WebAuth-Session`; a `-S` suffix
    /// is added automatically on secure connections).
    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Session cookie path.
    #[must_use]
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Session cookie domain.
    #[must_use]
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = domain.into();
        self
    }

    /// Fail-closed mode: ask the WLS to display errors itself rather than
    /// redirecting back with a failure status (`fail=yes`).
    #[must_use]
    pub fn with_fail_closed(mut self, fail: bool) -> Self {
        self.fail = fail;
        self
    }

    /// Force (`true`) or forbid (`false`) user interaction at the WLS.
    /// Unset (the default) leaves the decision to the WLS.
    #[must_use]
    pub fn with_interact(mut self, interact: bool) -> Self {
        self.interact = Some(interact);
        self
    }

    /// Acceptable authentication types hint (`aauth` request parameter).
    #[must_use]
    pub fn with_auth_types(mut self, aauth: impl Into<String>) -> Self {
        self.aauth = Some(aauth.into());
        self
    }

    /// Canonical hostname of this site.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// WLS endpoint URL.
    #[must_use]
    pub fn auth_service(&self) -> &Url {
        &self.auth_service
    }

    /// Directory the stock key store reads `<kid>.crt` files from.
    #[must_use]
    pub fn key_dir(&self) -> &std::path::Path {
        &self.key_dir
    }

    /// Configured maximum session lifetime in seconds.
    #[must_use]
    pub fn max_session_life(&self) -> i64 {
        self.max_session_life
    }

    /// Base session cookie name.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Whether session cookie management is enabled.
    #[must_use]
    pub fn session_management(&self) -> bool {
        self.do_session
    }
}
