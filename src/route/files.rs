use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::ContentType;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::data::error_log::ErrorLogDbExt;
use crate::data::file::{EntityKind, FileDbExt, FileRecord, Owner};
use crate::data::store::Store;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

#[derive(FromForm)]
pub struct UploadForm<'r> {
    pub file: TempFile<'r>,
    pub folder: Option<String>,
    pub entity_kind: EntityKind,
    /// Omitted when uploading for a record that doesn't exist yet; the save
    /// that creates the record claims the file afterwards.
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub url: String,
    pub file_id: Uuid,
}

fn sanitize_folder(folder: &str) -> Result<&str, Problem> {
    let folder = folder.trim_matches('/');
    if folder.is_empty()
        || folder
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
    {
        return Err(problems::validation(
            "Bad upload folder.",
            "Upload folders are single alphanumeric path segments.",
        ));
    }
    Ok(folder)
}

/// Store a supporting document (PDF only) and record its attachment owner.
#[utoipa::path(
    responses(
        (status = 200, description = "Stored file url and id", body = UploadResponse),
        (status = 400, description = "Missing file or not a PDF", body = Problem),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/upload", data = "<upload>")]
#[tracing::instrument(skip(upload, db, c))]
pub async fn upload_file(
    upload: Form<UploadForm<'_>>,
    _auth: UserRoleToken,
    db: &State<Store>,
    c: &State<Config>,
) -> Result<Json<UploadResponse>, Problem> {
    let form = upload.into_inner();
    let mut file = form.file;

    if file.content_type() != Some(&ContentType::PDF) {
        return Err(problems::validation(
            "Unsupported file type.",
            "Only PDF uploads are accepted.",
        ));
    }

    let folder = match &form.folder {
        Some(folder) => sanitize_folder(folder)?.to_string(),
        None => c.upload_folder.clone(),
    };

    let file_name = format!(
        "{}-{}.pdf",
        Uuid::new_v4(),
        file.name().unwrap_or("document")
    );

    let target_dir = c.public_content.join(&folder);
    tokio::fs::create_dir_all(&target_dir).await?;

    let target = target_dir.join(&file_name);
    match file.copy_to(&target).await {
        Ok(()) => {}
        Err(e) => {
            db.log_error("UPLOAD_FILE_ERROR", &e).await;
            return Err(Problem::from(e));
        }
    }

    let owner = Owner::new(form.entity_kind, form.entity_id.unwrap_or_else(Uuid::new_v4));
    let record = FileRecord::new(owner, format!("/{}/{}", folder, file_name));
    db.insert_file(&record).await?;

    Ok(Json(UploadResponse {
        url: record.path.clone(),
        file_id: record.id,
    }))
}

/// List stored file records.
#[utoipa::path(
    responses(
        (status = 200, description = "All file records", body = Vec<FileRecord>),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/files")]
#[tracing::instrument(skip(db))]
pub async fn file_list(
    _auth: UserRoleToken,
    db: &State<Store>,
) -> Result<Json<Vec<FileRecord>>, Problem> {
    Ok(Json(db.list_files().await?))
}

/// Delete a file record and, best-effort, its bytes on disk.
#[utoipa::path(
    params(("id", description = "file ID")),
    responses(
        (status = 200, description = "The removed file record", body = FileRecord),
        (status = 403, description = "Caller isn't an admin", body = Problem),
        (status = 404, description = "Queried file doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/files/<id>")]
#[tracing::instrument(skip(db, c))]
pub async fn file_delete(
    id: Uuid,
    auth: UserRoleToken,
    db: &State<Store>,
    c: &State<Config>,
) -> Result<Json<FileRecord>, Problem> {
    if auth.role < Role::Admin {
        return Err(problems::forbidden("Only admins can delete files."));
    }

    let record = db
        .delete_file(id)
        .await?
        .ok_or_else(|| problems::not_found("File", id))?;

    let on_disk = c.public_content.join(record.path.trim_start_matches('/'));
    if let Err(e) = tokio::fs::remove_file(&on_disk).await {
        tracing::warn!("stored file '{}' wasn't removed: {}", on_disk.display(), e);
    }

    Ok(Json(record))
}
