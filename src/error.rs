use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum SceneError {
    #[error("No scene entry found for the requested identity")]
    NotFound,

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    #[error("Scene table is not initialized")]
    InvalidState,

    #[error("Malformed scene record: {0}")]
    Decode(String),

    #[error("Serialized data does not fit the output buffer")]
    BufferTooSmall,

    #[error("No handler registered for cluster {0:#06x}")]
    UnsupportedCluster(u32),

    #[error("Scene id is the undefined sentinel")]
    InvalidSceneId,

    #[error("Scene handler failed: {0}")]
    Handler(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SceneError>;
