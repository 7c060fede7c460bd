use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("{0}")]
  Validation(String),
  #[error("extraction failed: {0}")]
  Extraction(String),
  #[error("file not found after download: {0}")]
  NotFoundAfterFetch(String),
  #[error("invalid configuration: {0}")]
  Config(String),
  #[error("io error: {0}")]
  IO(#[from] std::io::Error),
  #[error("server error: {0}")]
  Server(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  fn status(&self) -> StatusCode {
    match self {
      Error::Validation(_)
      | Error::Extraction(_)
      | Error::NotFoundAfterFetch(_) => StatusCode::BAD_REQUEST,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }

    let body = json!({ "success": false, "error": self.to_string() });
    (status, Json(body)).into_response()
  }
}
