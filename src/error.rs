use std::fmt::{Display, Formatter};

use actix_web::{ResponseError, http::StatusCode};
use lportal::error::SimpleError;

#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.1)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.0
    }
}

impl From<SimpleError> for ApiError {
    fn from(err: SimpleError) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, err.msg)
    }
}
