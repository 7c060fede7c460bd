use std::sync::Arc;

use async_trait::async_trait;
use axum::{
  body::{self, HttpBody, StreamBody},
  extract::{FromRequest, State},
  headers::ContentType,
  http::{header, Request, StatusCode},
  response::{IntoResponse, Response},
  routing::{get, post},
  BoxError, Form, Json, Router, TypedHeader,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::{
  deferred::DeferredDeletion,
  orchestrator::{DownloadRequest, Orchestrator, VideoInfo},
  util::{content_disposition, mime_type_for},
  Error, Result,
};

#[derive(Clone)]
pub struct AppState {
  pub orchestrator: Arc<Orchestrator>,
  /// Present only when storage is ephemeral.
  pub deferred: Option<DeferredDeletion>,
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/", get(homepage))
    .route("/health", get(health))
    .route("/get-info", post(get_info))
    .route("/download", post(download))
    .with_state(state)
}

pub const HOMEPAGE_HTML: &str = include_str!("../html/homepage.html");

async fn homepage() -> impl IntoResponse {
  (
    TypedHeader::<ContentType>(ContentType::html()),
    HOMEPAGE_HTML,
  )
}

async fn health() -> impl IntoResponse {
  Json(json!({ "status": "healthy", "message": "App is running!" }))
}

#[derive(Deserialize)]
pub struct InfoReq {
  #[serde(default)]
  url: String,
}

#[derive(Serialize)]
struct InfoResp {
  success: bool,
  #[serde(flatten)]
  info: VideoInfo,
}

async fn get_info(
  State(state): State<AppState>,
  req: Option<Json<InfoReq>>,
) -> Result<impl IntoResponse> {
  let Some(Json(req)) = req else {
    return Err(Error::Validation("URL must not be empty".into()));
  };

  let info = state.orchestrator.info(&req.url).await?;
  Ok(Json(InfoResp {
    success: true,
    info,
  }))
}

#[derive(Deserialize, Default)]
pub struct DownloadFields {
  #[serde(default)]
  url: String,
  format: Option<String>,
  resolution: Option<String>,
}

/// Download fields from either a JSON body or a submitted form.
pub struct DownloadForm(pub DownloadFields);

#[async_trait]
impl<S, B> FromRequest<S, B> for DownloadForm
where
  B: HttpBody + Send + 'static,
  B::Data: Send,
  B::Error: Into<BoxError>,
  S: Send + Sync,
{
  type Rejection = Error;

  async fn from_request(req: Request<B>, state: &S) -> Result<Self> {
    let is_json = req
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .is_some_and(|ct| ct.starts_with("application/json"));

    let fields = if is_json {
      Json::<DownloadFields>::from_request(req, state)
        .await
        .map(|Json(fields)| fields)
        .map_err(|e| Error::Validation(e.body_text()))?
    } else {
      Form::<DownloadFields>::from_request(req, state)
        .await
        .map(|Form(fields)| fields)
        .map_err(|e| Error::Validation(e.body_text()))?
    };

    Ok(DownloadForm(fields))
  }
}

async fn download(
  State(state): State<AppState>,
  DownloadForm(fields): DownloadForm,
) -> Result<Response> {
  let request = DownloadRequest::parse(
    &fields.url,
    fields.format.as_deref(),
    fields.resolution.as_deref(),
  )?;
  let artifact = state.orchestrator.download(&request).await?;

  // open before scheduling deletion: the open handle keeps the data
  // readable even if the deletion fires mid-transfer
  let file = File::open(&artifact.path)
    .await
    .map_err(|e| Error::Server(format!("failed to send file: {e}")))?;
  let len = match file.metadata().await {
    Ok(meta) => Some(meta.len()),
    Err(e) => {
      warn!(path = %artifact.path.display(), error = %e, "cannot stat artifact");
      None
    }
  };

  if let Some(deferred) = &state.deferred {
    deferred.schedule(artifact.path.clone());
  }

  let mut resp = Response::builder()
    .status(StatusCode::OK)
    .header(header::CONTENT_TYPE, mime_type_for(&artifact.path))
    .header(
      header::CONTENT_DISPOSITION,
      content_disposition(&artifact.filename),
    );
  if let Some(len) = len {
    resp = resp.header(header::CONTENT_LENGTH, len);
  }

  let body = StreamBody::new(ReaderStream::new(file));
  resp
    .body(body::boxed(body))
    .map_err(|e| Error::Server(e.to_string()))
}
