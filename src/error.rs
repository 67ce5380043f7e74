use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("session setup failed: {0}")]
    Session(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unparseable cell value: {0}")]
    DataFormat(String),

    #[error("station not in catalog: {0}")]
    UnknownStation(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("no datastore resource for alias: {0}")]
    ResourceNotFound(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
