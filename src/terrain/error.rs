use std::path::PathBuf;

use crate::config::ConfigError;

/// Failure while loading one of the terrain's source files or creating its GPU resources.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Could not read file ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not decode image ({path}): {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Syntax error in {path} on line {line}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid content in {path}: {message}")]
    Content { path: PathBuf, message: String },

    #[error("GPU resource error: {0}")]
    Gpu(#[from] renderer::RendererError),
}

impl LoadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn content(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Content {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error("Could not load terrain \"{name}\": {source}")]
    Load {
        name: String,
        #[source]
        source: LoadError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TerrainError {
    pub fn load(name: impl Into<String>, source: impl Into<LoadError>) -> Self {
        Self::Load {
            name: name.into(),
            source: source.into(),
        }
    }
}
