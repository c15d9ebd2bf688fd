#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Key material could not be read (not "key absent", which is a normal
    /// outcome — this is an actual I/O or access failure).
    #[error("key store error: {0}")]
    KeyStore(String),
}
