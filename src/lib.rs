#![doc = include_str!("../README.md")]

pub mod agent;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
#[cfg(feature = "axum")]
pub mod middleware;
pub mod status;
pub mod timestamp;
pub mod token;
pub mod validate;

pub use agent::{
    AuthOptions, AuthOutcome, AuthState, CookieDirective, CookieLifetime, RequestContext,
    WebauthAgent, PROTOCOL_VERSION, WLS_RESPONSE_PARAM,
};
pub use config::Config;
pub use crypto::{FileKeyStore, KeyStore, RsaSha1Verifier, WlsSignatureVerifier};
pub use error::Error;
pub use token::{SessionTicket, WlsResponse};
pub use validate::Rejection;
