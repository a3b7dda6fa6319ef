#![allow(clippy::unused_async)]
use std::fmt::Display;
use std::path::PathBuf;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use axum_extra::extract::cookie::CookieJar;
use kernel::{CreateFolder, ErrorReply, FileEntry, Message, UploadReply, UserInfo, DEFAULT_FOLDER};
use serde::Deserialize;

use crate::auth::{self, Identity, SESSION_COOKIE};
use crate::domain::{NewFile, Storage};
use crate::error::ApiError;
use crate::file_reply::FileReply;
use crate::gateway::{self, StoredBlob};
use crate::pages;
use crate::policy::{self, Action};
use crate::sqlite::{execute, Mode};
use crate::AppState;

const FOLDER_FIELD: &str = "folder";

#[derive(Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login_page() -> impl IntoResponse {
    pages::login()
}

pub async fn register_page() -> impl IntoResponse {
    pages::register()
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(credentials): Form<Credentials>,
) -> Response {
    match auth::login(&state, &credentials.email, &credentials.password).await {
        Ok(session_id) => {
            let cookie = auth::session_cookie(session_id, &state.config);
            (jar.add(cookie), Redirect::to("/dashboard")).into_response()
        }
        Err(e @ ApiError::AuthFailure(_)) => {
            pages::failure(e.status(), &e.public_message(), "/login").into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn register(
    State(state): State<AppState>,
    Form(credentials): Form<Credentials>,
) -> Response {
    match auth::register(&state, &credentials.email, &credentials.password).await {
        Ok(_) => Redirect::to("/login").into_response(),
        Err(e @ (ApiError::Validation(_) | ApiError::DuplicateEmail)) => {
            pages::failure(e.status(), &e.public_message(), "/register").into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn dashboard(identity: Identity) -> impl IntoResponse {
    pages::dashboard(identity.is_admin())
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(e) = auth::logout(&state, cookie.value()) {
            return e.into_response();
        }
    }
    (jar.remove(auth::removal_cookie()), Redirect::to("/login")).into_response()
}

/// Describes the logged in account.
#[utoipa::path(
    get,
    path = "/user-info",
    responses(
        (status = 200, description = "Current account", body = UserInfo),
        (status = 303, description = "No session, redirect to login")
    ),
    tag = "account",
)]
pub async fn user_info(identity: Identity) -> Json<UserInfo> {
    Json(UserInfo {
        email: identity.email,
        role: identity.role,
    })
}

/// Uploads several files from a multipart form into the caller's namespace.
///
/// File parts may use any field name; the optional `folder` text field labels
/// every file of the batch.
#[utoipa::path(
    post,
    path = "/upload",
    responses(
        (status = 200, description = "Files stored", body = UploadReply),
        (status = 400, description = "Malformed form", body = ErrorReply),
        (status = 413, description = "File too large", body = ErrorReply),
        (status = 500, description = "Server error", body = ErrorReply)
    ),
    tag = "files",
)]
pub async fn upload(
    State(state): State<AppState>,
    identity: Identity,
    mut multipart: Multipart,
) -> Result<Json<UploadReply>, ApiError> {
    policy::authorize(&identity, Action::Upload, None)?;
    let dir = gateway::namespace(&state.config.uploads_dir, &identity);

    let mut folder: Option<String> = None;
    let mut blobs: Vec<StoredBlob> = vec![];
    if let Err(e) = read_upload(&state, &dir, &mut multipart, &mut blobs, &mut folder).await {
        discard(&blobs).await;
        return Err(e);
    }

    let folder = folder
        .map(|f| f.trim().to_owned())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| DEFAULT_FOLDER.to_owned());

    let owner_id = identity.user_id;
    let registered = execute(&state.config.db, Mode::ReadWrite, |mut repository| {
        let mut ids = Vec::with_capacity(blobs.len());
        let mut orphans = vec![];
        for blob in &blobs {
            let file = NewFile {
                owner_id,
                stored_filename: blob.stored_filename.clone(),
                original_filename: blob.original_filename.clone(),
                storage_path: blob.path.to_string_lossy().into_owned(),
                size_bytes: blob.size,
                blake3_hash: blob.blake3_hash.clone(),
                folder: folder.clone(),
            };
            let insert_result = repository.insert_file(&file);
            match log_file_operation_result(insert_result, &blob.original_filename, blob.size) {
                Some(id) => ids.push(id),
                None => orphans.push(blob.path.clone()),
            }
        }
        Ok((ids, orphans))
    });

    let (ids, orphans) = match registered {
        Ok(r) => r,
        Err(e) => {
            discard(&blobs).await;
            return Err(e);
        }
    };
    for path in orphans {
        if let Err(e) = gateway::remove(&path).await {
            tracing::error!("unregistered file {} not removed: {e}", path.display());
        }
    }

    Ok(Json(UploadReply {
        message: format!("{} file(s) uploaded", ids.len()),
        ids,
    }))
}

/// Lists files visible to the caller: own files, or every file for an admin.
#[utoipa::path(
    get,
    path = "/files",
    responses(
        (status = 200, description = "Visible files", body = [FileEntry]),
        (status = 303, description = "No session, redirect to login")
    ),
    tag = "files",
)]
pub async fn list_files(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<FileEntry>>, ApiError> {
    policy::authorize(&identity, Action::List, None)?;
    let scope = policy::list_scope(&identity);
    let files = execute(&state.config.db, Mode::ReadOnly, |repository| {
        Ok(repository.list_files(scope)?)
    })?;
    Ok(Json(files))
}

/// Deletes file by id. Admin only.
#[utoipa::path(
    delete,
    path = "/files/{id}",
    responses(
        (status = 200, description = "File successfully deleted", body = Message),
        (status = 403, description = "Caller is not an admin", body = ErrorReply),
        (status = 404, description = "File not found", body = ErrorReply)
    ),
    tag = "files",
    params(
        ("id" = i64, Path, description = "File id")
    ),
)]
pub async fn delete_file(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Message>, ApiError> {
    policy::authorize(&identity, Action::Delete, None)?;

    let record = execute(&state.config.db, Mode::ReadOnly, |repository| {
        Ok(repository.get_file(id)?)
    })?
    .ok_or(ApiError::NotFound)?;

    // bytes before the record
    let path = PathBuf::from(&record.storage_path);
    if let Err(e) = gateway::remove(&path).await {
        tracing::error!("bytes of file {id} at {} not removed: {e}", path.display());
    }

    let deleted = execute(&state.config.db, Mode::ReadWrite, |mut repository| {
        Ok(repository.delete_file(id)?)
    })?;
    if deleted == 0 {
        tracing::info!("file: {id} not exist");
        return Err(ApiError::NotFound);
    }
    tracing::info!("file: {id} deleted by {}", identity.email);
    Ok(Json(Message::new("File deleted")))
}

/// Gets file binary content by file id.
#[utoipa::path(
    get,
    path = "/download/{id}",
    responses(
        (status = 200, description = "File binary content", content_type = "application/octet-stream"),
        (status = 403, description = "File belongs to someone else", body = ErrorReply),
        (status = 404, description = "File not found", body = ErrorReply)
    ),
    tag = "files",
    params(
        ("id" = i64, Path, description = "File id")
    ),
)]
pub async fn download(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    identity: Identity,
) -> Result<FileReply, ApiError> {
    let record = execute(&state.config.db, Mode::ReadOnly, |repository| {
        Ok(repository.get_file(id)?)
    })?;
    policy::authorize(&identity, Action::Download, record.as_ref())?;
    let record = record.ok_or(ApiError::NotFound)?;

    let data = gateway::open(&PathBuf::from(&record.storage_path)).await?;
    tracing::info!("file: {id} size: {} sent to {}", record.size_bytes, identity.email);
    Ok(FileReply::new(data, record))
}

/// Acknowledges a folder name. Folders are labels on files, nothing is stored.
#[utoipa::path(
    post,
    path = "/create-folder",
    request_body = CreateFolder,
    responses(
        (status = 200, description = "Folder acknowledged", body = Message),
        (status = 400, description = "Blank folder name", body = ErrorReply)
    ),
    tag = "files",
)]
pub async fn create_folder(
    identity: Identity,
    Json(request): Json<CreateFolder>,
) -> Result<Json<Message>, ApiError> {
    policy::authorize(&identity, Action::CreateFolder, None)?;
    let name = request.folder_name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("folder name is required".to_owned()));
    }
    Ok(Json(Message::new(format!("\"{name}\" folder created"))))
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorReply {
            error: "Not found".to_owned(),
        }),
    )
}

async fn read_upload(
    state: &AppState,
    dir: &std::path::Path,
    multipart: &mut Multipart,
    blobs: &mut Vec<StoredBlob>,
    folder: &mut Option<String>,
) -> Result<(), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("invalid multipart body: {e}")))?
    {
        if let Some(file_name) = field
            .file_name()
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
        {
            if blobs.len() >= state.config.max_files {
                return Err(ApiError::Validation(format!(
                    "at most {} files per upload",
                    state.config.max_files
                )));
            }
            let blob = gateway::store(field, dir, &file_name, state.config.max_file_size).await?;
            blobs.push(blob);
        } else if field.name() == Some(FOLDER_FIELD) {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::Validation(format!("invalid folder field: {e}")))?;
            *folder = Some(text);
        }
    }
    Ok(())
}

async fn discard(blobs: &[StoredBlob]) {
    for blob in blobs {
        if let Err(e) = gateway::remove(&blob.path).await {
            tracing::error!("file {} not removed: {e}", blob.path.display());
        }
    }
}

fn log_file_operation_result<E: Display>(
    operation_result: Result<i64, E>,
    file_name: &str,
    read_bytes: u64,
) -> Option<i64> {
    match operation_result {
        Ok(id) => {
            tracing::info!("file: {} read: {} file id: {}", file_name, read_bytes, id);
            Some(id)
        }
        Err(e) => {
            tracing::error!("file '{}' not inserted. Error: {}", file_name, e);
            None
        }
    }
}
