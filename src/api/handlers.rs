//! API request handlers

use axum::{
    extract::{
        multipart::{Field, MultipartError},
        rejection::JsonRejection,
        Multipart, Path, State,
    },
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::types::*;
use crate::models::*;
use crate::store::StagedFile;
use crate::{DiskService, ErrorKind};

pub type AppState = Arc<DiskService>;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

// === Health ===

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// === Disks ===

pub async fn list_disks(State(svc): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let disks = blocking(svc, |svc| svc.list_disks()).await?;
    Ok(Json(disks))
}

pub async fn create_disk(
    State(svc): State<AppState>,
    body: Result<Json<CreateDiskRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiSuccess>)> {
    let Json(req) = body.map_err(bad_body)?;
    let request = CreateDisk {
        name: req.name,
        size: req.size,
        format: req.format,
    };

    let output = blocking(svc, move |svc| svc.create_disk_image(&request)).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiSuccess::new("Virtual disk created successfully").with_output(output)),
    ))
}

pub async fn convert_disk(
    State(svc): State<AppState>,
    Path(disk_id): Path<String>,
    body: Result<Json<ConvertDiskRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiSuccess>)> {
    let Json(req) = body.map_err(bad_body)?;

    let output = blocking(svc, move |svc| {
        svc.change_format(&disk_id, req.new_format.as_deref())
    })
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiSuccess::new("Virtual disk format changed successfully").with_output(output)),
    ))
}

pub async fn resize_disk(
    State(svc): State<AppState>,
    Path(disk_id): Path<String>,
    body: Result<Json<ResizeDiskRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiSuccess>)> {
    let Json(req) = body.map_err(bad_body)?;

    let output = blocking(svc, move |svc| svc.grow_disk(&disk_id, req.new_size.as_ref())).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiSuccess::new("Virtual disk resized successfully").with_output(output)),
    ))
}

pub async fn disk_info(
    State(svc): State<AppState>,
    Path(disk_id): Path<String>,
) -> ApiResult<Json<DiskInfo>> {
    let info = blocking(svc, move |svc| svc.inspect_disk(&disk_id)).await?;
    Ok(Json(info))
}

// === Machines ===

/// Multipart form: `name`, `cpu`, `memory`, `diskName` and an optional
/// `isoFile` upload used as install medium. Responds once the machine exits;
/// a client that disconnects first takes the machine down with it.
pub async fn start_machine(
    State(svc): State<AppState>,
    mut form: Multipart,
) -> ApiResult<Json<ApiSuccess>> {
    let mut request = StartMachine::default();
    let mut upload: Option<StagedFile> = None;

    while let Some(mut field) = form.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => request.name = Some(field.text().await.map_err(bad_multipart)?),
            "cpu" => request.cpu = Some(field.text().await.map_err(bad_multipart)?),
            "memory" => request.memory = Some(field.text().await.map_err(bad_multipart)?),
            "diskName" => request.disk_name = Some(field.text().await.map_err(bad_multipart)?),
            "isoFile" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                // browsers send an empty part for an untouched file input
                if file_name.is_empty() {
                    continue;
                }
                let staged = svc.stage_install_medium(&file_name).map_err(to_api_error)?;
                receive_upload(&mut field, &staged).await?;
                upload = Some(staged);
            }
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    // nothing uploaded becomes visible unless the request is valid
    let mut spec = svc.machine_spec(&request).map_err(to_api_error)?;
    if let Some(staged) = upload {
        let path = blocking(svc.clone(), move |svc| svc.adopt_install_medium(staged)).await?;
        spec = spec.with_install_medium(path);
    }

    svc.launch(&spec).await.map_err(to_api_error)?;
    Ok(Json(ApiSuccess::new(format!(
        "Virtual machine '{}' started successfully.",
        spec.name
    ))))
}

// === Helpers ===

/// Run a service call on the blocking pool; disk operations wait on
/// `qemu-img`.
async fn blocking<T, F>(svc: AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&DiskService) -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&svc))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Blocking task failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", e.to_string())
        })?
        .map_err(to_api_error)
}

async fn receive_upload(field: &mut Field<'_>, staged: &StagedFile) -> ApiResult<()> {
    let io_error = |e: std::io::Error| to_api_error(e.into());

    let mut file = tokio::fs::File::create(staged.path()).await.map_err(io_error)?;
    let mut written = 0usize;
    while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
        file.write_all(&chunk).await.map_err(io_error)?;
        written += chunk.len();
    }
    file.flush().await.map_err(io_error)?;

    tracing::debug!(file = %staged.name(), bytes = written, "Install medium received");
    Ok(())
}

fn to_api_error(e: crate::Error) -> (StatusCode, Json<ApiError>) {
    let status = match e.kind() {
        ErrorKind::Validation | ErrorKind::NotFound => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        // established tool-failure status for existing clients
        ErrorKind::Execution => StatusCode::UNAUTHORIZED,
        ErrorKind::Launch => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %e, "Request failed");
    } else {
        tracing::debug!(error = %e, status = %status, "Request rejected");
    }

    api_error(status, e.name(), e.diagnostic())
}

fn bad_body(rejection: JsonRejection) -> (StatusCode, Json<ApiError>) {
    api_error(StatusCode::BAD_REQUEST, "ValidationError", rejection.body_text())
}

fn bad_multipart(e: MultipartError) -> (StatusCode, Json<ApiError>) {
    let status = if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StatusCode::PAYLOAD_TOO_LARGE
    } else {
        StatusCode::BAD_REQUEST
    };
    api_error(status, "ValidationError", e.body_text())
}

fn api_error(status: StatusCode, error: &str, message: String) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: error.to_string(),
            message,
        }),
    )
}
