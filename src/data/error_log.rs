use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::data::store::Store;
use crate::resp::problem::Problem;

pub static ERROR_LOG_COLLECTION_NAME: &str = "error.log";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    #[serde(default = "Uuid::new_v4", rename = "_id")]
    pub id: Uuid,
    pub error_code: String,
    pub message: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

pub trait ErrorLogDbExt {
    /// Best-effort record of an unexpected failure; never fails the request
    /// that triggered it.
    async fn log_error(&self, error_code: &str, message: impl ToString);

    /// Logs `problem` under `error_code` when it is a server-side failure.
    async fn log_if_internal(&self, error_code: &str, problem: &Problem);
}

impl ErrorLogDbExt for Store {
    async fn log_error(&self, error_code: &str, message: impl ToString) {
        let entry = ErrorLogEntry {
            id: Uuid::new_v4(),
            error_code: error_code.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        };

        if let Err(e) = self
            .collection::<ErrorLogEntry>(ERROR_LOG_COLLECTION_NAME)
            .insert_one(&entry, None)
            .await
        {
            tracing::warn!("unable to record error log entry: {}", e);
        }
    }

    async fn log_if_internal(&self, error_code: &str, problem: &Problem) {
        if problem.status == rocket::http::Status::InternalServerError {
            self.log_error(error_code, problem).await;
        }
    }
}
