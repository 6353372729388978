use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("path escapes the configured media folders")]
    UnsafePath,

    #[error("object id does not resolve to an existing file")]
    ObjectNotFound,

    #[error("no active subscription with this SID")]
    UnknownSubscription,

    #[error(transparent)]
    Catalog(#[from] mediaserver_catalog::Error),

    #[error(transparent)]
    Didl(#[from] mediaserver_didl::Error),

    #[error(transparent)]
    Soap(#[from] crate::soap::SoapParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::UnsafePath => StatusCode::FORBIDDEN,
            Error::ObjectNotFound => StatusCode::NOT_FOUND,
            Error::UnknownSubscription => StatusCode::PRECONDITION_FAILED,
            Error::Catalog(mediaserver_catalog::Error::UnsafePath(_)) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
