use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::AppError;
use crate::filestore::ByteStream;
use crate::middleware::{authenticate, require_activated};
use crate::services::{Filters, Visibility};
use crate::state::AppState;
use crate::validate;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Framework body limit sits above the application cap; the inline size
    // check in the upload pipeline fires first.
    let body_limit = state.config.storage.max_upload_size as usize + 64 * 1024;

    let activated_only = Router::new()
        .route("/upload", post(upload).layer(DefaultBodyLimit::max(body_limit)))
        .route("/me", get(list_my_files))
        .route("/{id}", get(get_metadata).put(soft_delete))
        .route("/{id}/visible", put(set_visibility))
        .route("/{id}/edit", put(rename))
        .route_layer(from_fn(require_activated));

    Router::new()
        .route("/", get(list_public_files))
        .route("/{id}/download", get(download))
        .merge(activated_only)
        .route_layer(from_fn_with_state(state, authenticate))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<u64>,
    page_size: Option<u64>,
}

impl ListQuery {
    fn filters(&self) -> Filters {
        let defaults = Filters::default();
        Filters {
            page: self.page.unwrap_or(defaults.page),
            page_size: self.page_size.unwrap_or(defaults.page_size),
        }
    }
}

async fn upload(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut field = loop {
        match multipart
            .next_field()
            .await
            .map_err(|_| AppError::bad_request("file too big or malformed body"))?
        {
            Some(candidate) if candidate.name() == Some("file") => break candidate,
            Some(_) => continue,
            None => return Err(AppError::bad_request("missing 'file' field")),
        }
    };

    let filename = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| AppError::field("filename", "must have a filename"))?;
    validate::validate_filename(&filename)?;

    // The multipart field borrows the request body, so it cannot move into
    // the owned stream the service consumes. Pump it through a channel and
    // run both halves concurrently in this task.
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(8);
    let data: ByteStream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();

    let service = state.services.file();
    let upload = service.upload_file(&principal, &filename, data);
    let pump = async move {
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    let _ = tx.send(Err(std::io::Error::other(err))).await;
                    break;
                }
            }
        }
    };

    let (record, ()) = tokio::join!(upload, pump);
    let record = record?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "File uploaded successfully",
            "file": record,
        })),
    ))
}

async fn list_public_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (files, metadata) = state
        .services
        .file()
        .list_public_files(query.filters())
        .await?;

    Ok(Json(json!({ "metadata": metadata, "files": files })))
}

async fn list_my_files(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (files, metadata) = state
        .services
        .file()
        .list_user_files(&principal.user_id, query.filters())
        .await?;

    Ok(Json(json!({ "metadata": metadata, "files": files })))
}

async fn get_metadata(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.services.file().get_metadata(&id, &principal).await?;
    Ok(Json(json!({ "file": record })))
}

async fn download(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (record, data) = state.services.file().download(&id, &principal).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", record.filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(record.size_bytes));

    Ok((headers, Body::from_stream(data)))
}

#[derive(Debug, Deserialize)]
struct SetVisibilityRequest {
    version: i32,
    visibility: String,
}

async fn set_visibility(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(body): Json<SetVisibilityRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate::validate_version(body.version)?;
    let visibility = Visibility::try_from(body.visibility.as_str())
        .map_err(|()| AppError::field("visibility", "must be either 'public' or 'private'"))?;

    let updated = state
        .services
        .file()
        .set_visibility(&id, &principal, body.version, visibility)
        .await?;

    Ok(Json(json!({
        "message": "file visibility updated successfully",
        "visibility": updated.as_str(),
    })))
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    version: i32,
    filename: String,
}

async fn rename(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(body): Json<RenameRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate::validate_version(body.version)?;
    validate::validate_filename(&body.filename)?;

    let filename = state
        .services
        .file()
        .rename(&id, &principal, body.version, &body.filename)
        .await?;

    Ok(Json(json!({
        "message": "file renamed successfully",
        "filename": filename,
    })))
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    version: i32,
}

async fn soft_delete(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(body): Json<DeleteRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate::validate_version(body.version)?;

    state
        .services
        .file()
        .soft_delete(&id, &principal, body.version)
        .await?;

    Ok(Json(json!({ "message": "file deleted successfully" })))
}
