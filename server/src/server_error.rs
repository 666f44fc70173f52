use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot load configuration: {0}")]
    ConfigLoad(#[from] figment::Error),
    #[error("the streams dir is not active")]
    StreamsDirNotActive,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
