use bson::doc;
use chrono::{DateTime, Utc};
use rocket::futures::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::filter;
use crate::data::store::Store;
use crate::resp::problem::{problems, Problem};

pub static FILE_COLLECTION_NAME: &str = "files";

/// The kind of record a stored document is attached to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, FromFormField, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Student,
    Orphan,
    Disability,
    #[field(value = "special_needs")]
    SpecialNeeds,
    Wartime,
    Scholarship,
    #[field(value = "risk_registry")]
    RiskRegistry,
    Committee,
    Dormitory,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Student => "student",
            EntityKind::Orphan => "orphan",
            EntityKind::Disability => "disability",
            EntityKind::SpecialNeeds => "special_needs",
            EntityKind::Wartime => "wartime",
            EntityKind::Scholarship => "scholarship",
            EntityKind::RiskRegistry => "risk_registry",
            EntityKind::Committee => "committee",
            EntityKind::Dormitory => "dormitory",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed attachment owner. Replaces a loose string tag with an enum so a
/// file can only ever reference a known record kind.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Owner {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl Owner {
    pub fn new(kind: EntityKind, id: Uuid) -> Owner {
        Owner { kind, id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    #[serde(default = "Uuid::new_v4", rename = "_id")]
    pub id: Uuid,
    pub owner: Owner,
    pub path: String,
    #[serde(default = "Utc::now")]
    pub uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(owner: Owner, path: impl ToString) -> FileRecord {
        FileRecord {
            id: Uuid::new_v4(),
            owner,
            path: path.to_string(),
            uploaded_at: Utc::now(),
        }
    }
}

#[inline]
pub fn by_owner(owner: Owner) -> bson::Document {
    doc! {
        "owner.kind": owner.kind.as_str(),
        "owner.id": filter::uuid_bson(owner.id),
    }
}

pub trait FileDbExt {
    async fn insert_file(&self, file: &FileRecord) -> Result<(), Problem>;
    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>, Problem>;
    async fn list_files(&self) -> Result<Vec<FileRecord>, Problem>;
    async fn files_for(&self, owner: Owner) -> Result<Vec<FileRecord>, Problem>;
    async fn has_files(&self, owner: Owner) -> Result<bool, Problem>;

    /// Re-points the given file documents at `owner`. Status saves call this
    /// after an upsert so uploads made before the record existed become owned
    /// by it.
    async fn claim_files(&self, ids: &[Uuid], owner: Owner) -> Result<(), Problem>;

    async fn delete_file(&self, id: Uuid) -> Result<Option<FileRecord>, Problem>;

    /// Rejects with a conflict while `owner` still has attached files.
    async fn assert_no_files(&self, owner: Owner, entity: &'static str) -> Result<(), Problem>;
}

impl FileDbExt for Store {
    async fn insert_file(&self, file: &FileRecord) -> Result<(), Problem> {
        self.collection::<FileRecord>(FILE_COLLECTION_NAME)
            .insert_one(file, None)
            .await
            .map_err(Problem::from)?;
        Ok(())
    }

    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>, Problem> {
        self.collection::<FileRecord>(FILE_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>, Problem> {
        let mut cursor = self
            .collection::<FileRecord>(FILE_COLLECTION_NAME)
            .find(None, None)
            .await
            .map_err(Problem::from)?;

        let mut files = vec![];
        while let Some(file) = cursor.next().await {
            match file {
                Ok(file) => files.push(file),
                Err(_) => tracing::warn!("Unable to deserialize file document."),
            }
        }

        Ok(files)
    }

    async fn files_for(&self, owner: Owner) -> Result<Vec<FileRecord>, Problem> {
        let mut cursor = self
            .collection::<FileRecord>(FILE_COLLECTION_NAME)
            .find(by_owner(owner), None)
            .await
            .map_err(Problem::from)?;

        let mut files = vec![];
        while let Some(file) = cursor.next().await {
            files.push(file.map_err(Problem::from)?);
        }

        Ok(files)
    }

    async fn has_files(&self, owner: Owner) -> Result<bool, Problem> {
        let count = self
            .collection::<FileRecord>(FILE_COLLECTION_NAME)
            .count_documents(by_owner(owner), None)
            .await
            .map_err(Problem::from)?;
        Ok(count > 0)
    }

    async fn claim_files(&self, ids: &[Uuid], owner: Owner) -> Result<(), Problem> {
        if ids.is_empty() {
            return Ok(());
        }

        self.collection::<FileRecord>(FILE_COLLECTION_NAME)
            .update_many(
                doc! { "_id": filter::uuid_in(ids.iter().copied()) },
                doc! { "$set": {
                    "owner.kind": owner.kind.as_str(),
                    "owner.id": filter::uuid_bson(owner.id),
                }},
                None,
            )
            .await
            .map_err(Problem::from)?;
        Ok(())
    }

    async fn delete_file(&self, id: Uuid) -> Result<Option<FileRecord>, Problem> {
        self.collection::<FileRecord>(FILE_COLLECTION_NAME)
            .find_one_and_delete(filter::by_id(id), None)
            .await
            .map_err(Problem::from)
    }

    async fn assert_no_files(&self, owner: Owner, entity: &'static str) -> Result<(), Problem> {
        if self.has_files(owner).await? {
            return Err(problems::conflict(
                "Record still has attached files.",
                format!(
                    "{} record {} can't be removed while documents reference it.",
                    entity, owner.id
                ),
            ));
        }
        Ok(())
    }
}
