use thiserror::Error;

/// Boxed error returned by [`crate::TextureLoader`] implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("animation not found: {name}")]
    AnimationNotFound { name: String },

    #[error("unknown skin: {name}")]
    UnknownSkin { name: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error("invalid bone hierarchy at '{bone}': {message}")]
    InvalidHierarchy { bone: String, message: String },

    #[error("invalid skeleton data: {message}")]
    InvalidData { message: String },

    #[error("state misuse: {message}")]
    StateMisuse { message: String },

    #[error("failed to parse atlas: {message}")]
    AtlasParse { message: String },

    #[error("failed to load texture '{path}'")]
    TextureLoad {
        path: String,
        #[source]
        source: BoxError,
    },

    #[cfg(feature = "binary")]
    #[error("failed to parse skeleton binary: {message}")]
    BinaryParse { message: String },

    #[cfg(feature = "binary")]
    #[error("unsupported skeleton binary version: {value}")]
    UnsupportedVersion { value: String },

    #[cfg(feature = "json")]
    #[error("failed to parse skeleton JSON: {message}")]
    JsonParse { message: String },
}

/// Coarse classification of [`Error`] values.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed or unreadable resource: atlas, texture or skeleton data.
    ResourceLoad,
    AnimationNotFound,
    InvalidHierarchy,
    /// An operation was called out of order or on the wrong object.
    StateMisuse,
    InvalidArgument,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AnimationNotFound { .. } => ErrorKind::AnimationNotFound,
            Error::InvalidHierarchy { .. } => ErrorKind::InvalidHierarchy,
            Error::StateMisuse { .. } => ErrorKind::StateMisuse,
            Error::UnknownSkin { .. } | Error::InvalidValue { .. } => ErrorKind::InvalidArgument,
            Error::InvalidData { .. } | Error::AtlasParse { .. } | Error::TextureLoad { .. } => {
                ErrorKind::ResourceLoad
            }
            #[cfg(feature = "binary")]
            Error::BinaryParse { .. } | Error::UnsupportedVersion { .. } => ErrorKind::ResourceLoad,
            #[cfg(feature = "json")]
            Error::JsonParse { .. } => ErrorKind::ResourceLoad,
        }
    }

    pub(crate) fn invalid_data(message: impl Into<String>) -> Self {
        Error::InvalidData {
            message: message.into(),
        }
    }

    pub(crate) fn state_misuse(message: impl Into<String>) -> Self {
        Error::StateMisuse {
            message: message.into(),
        }
    }
}
