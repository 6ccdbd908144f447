use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Incomplete token data: missing {0}")]
    IncompleteTokens(&'static str),

    #[error("Login response did not contain an access token")]
    MissingAccessToken,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Token storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}
