use axum::{
    http::status::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TwitchSigError {
    #[error("Missing header {0}")]
    Missing(&'static str),
    #[error("Invalid signature")]
    Invalid,
    #[error("Invalid header value")]
    InvalidHeader(#[from] axum::http::header::ToStrError),
}

#[derive(Error, Debug)]
pub enum TwitchError {
    #[error("Invalid signature {0:?}")]
    InvalidSig(#[from] TwitchSigError),

    #[error("Cannot parse eventsub payload: {0}")]
    BadPayload(#[from] serde_json::Error),

    #[error("HttpError {0}")]
    HttpError(StatusCode),
}

impl std::convert::From<StatusCode> for TwitchError {
    fn from(value: StatusCode) -> Self {
        TwitchError::HttpError(value)
    }
}

impl IntoResponse for TwitchSigError {
    fn into_response(self) -> Response {
        log::warn!("Rejecting eventsub request: {self}");
        (StatusCode::FORBIDDEN, format!("{self}")).into_response()
    }
}

impl IntoResponse for TwitchError {
    fn into_response(self) -> Response {
        match self {
            TwitchError::InvalidSig(e) => e.into_response(),
            e @ TwitchError::BadPayload(_) => {
                log::error!("{e}");
                (StatusCode::BAD_REQUEST, format!("{e}")).into_response()
            }
            TwitchError::HttpError(code) => code.into_response(),
        }
    }
}
