use std::path::PathBuf;

use rocket::fs::NamedFile;
use rocket::State;

use crate::config::Config;

async fn app_index_file(c: &State<Config>) -> Option<NamedFile> {
    NamedFile::open(c.public_content.as_path().join("index.html"))
        .await
        .ok()
}

#[get("/")]
pub async fn app(c: &State<Config>) -> Option<NamedFile> {
    app_index_file(c).await
}

#[get("/<path..>", rank = 10)]
pub async fn app_path(path: PathBuf, c: &State<Config>) -> Option<NamedFile> {
    match NamedFile::open(c.public_content.as_path().join(path.as_path())).await {
        Ok(file) => Some(file),
        Err(_) => app_index_file(c).await,
    }
}
