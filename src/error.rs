//! Error taxonomy for calls against the classification service.

use reqwest::StatusCode;

use crate::extract::ExtractError;

/// Coarse error category, used by callers to pick what to tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Decode,
    Parse,
    Image,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned {status} for {url}")]
    Status { url: String, status: StatusCode },

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response from {url} is not valid UTF-8")]
    Encoding { url: String },

    #[error(transparent)]
    Parse(#[from] ExtractError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } | Self::Status { .. } => ErrorKind::Transport,
            Self::Decode { .. } | Self::Encoding { .. } => ErrorKind::Decode,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Image(_) => ErrorKind::Image,
        }
    }

    pub(crate) fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }
}
