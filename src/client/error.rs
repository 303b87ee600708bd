use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("could not build the http client: {0}")]
    Build(String),

    #[error("request to `{url}` failed: {reason}")]
    Request { url: String, reason: String },

    #[error("unexpected status {status} from `{url}`")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("invalid response from `{url}`: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("writing object: {0}")]
    Io(#[from] std::io::Error),
}
