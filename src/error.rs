use thiserror::Error;

pub type Result<T> = std::result::Result<T, PatsError>;

/// Errors surfaced by the PATS client. The API documents no recoverable
/// failures, so callers typically propagate these straight up and exit
/// non-zero.
#[derive(Debug, Error)]
pub enum PatsError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response, in the server's own "<endpoint> failed: <status>,
    /// msg: <text>" phrasing.
    #[error("{endpoint} failed: {status}, msg: {message}")]
    Api {
        endpoint: &'static str,
        status: u16,
        message: String,
    },

    #[error("decoding {endpoint} response failed: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid bin mode {0:?}, expected 'D' or 'H'")]
    InvalidBinMode(String),

    #[error("invalid snapping mode {0:?}, expected disabled, auto, row or post")]
    InvalidSnappingMode(String),

    #[error("invalid server {0:?}, expected production, beta, local or an http(s):// URL")]
    InvalidServer(String),

    #[error("could not build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}
