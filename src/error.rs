//! Error types for nodepack

use std::{
    io,
    path::{Path, PathBuf},
    process::ExitStatus,
};

use thiserror::Error;

/// Fatal errors. Any of these aborts a packaging run.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("required runtime asset missing: {asset} not found at {}", path.display())]
    MandatoryAssetMissing { asset: String, path: PathBuf },

    #[error("I/O failure at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk '{}': {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to parse config file '{}': {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to render launcher template: {0}")]
    Template(#[from] minijinja::Error),
}

impl PackError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T, E = PackError> = std::result::Result<T, E>;

/// A package manifest that could not be used. The resolver only ever logs these.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed manifest '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The external compile step failed. Never fatal to packaging.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to run compiler '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("compiler '{program}' exited with {status}")]
    Failed { program: String, status: ExitStatus },
}
