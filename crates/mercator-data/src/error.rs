use thiserror::Error;
pub type Result<T> = std::result::Result<T, DataError>;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("Duplicate place id {0}")]
    DuplicatePlace(i64),
    #[error("Place {place_id} references unknown parent {parent_place_id}")]
    UnknownParent { place_id: i64, parent_place_id: i64 },
    #[error("Word table entry {0} is malformed: {1}")]
    InvalidWord(String, String),
}
