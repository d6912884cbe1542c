use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a single adversarial update or by the training loop.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("real image batch is empty")]
    EmptyBatch,

    #[error("expected images shaped [B, {}, {}, {}], got {found:?}", .expected[0], .expected[1], .expected[2])]
    ImageShape {
        expected: [usize; 3],
        found: [usize; 4],
    },

    #[error("batch size must be positive, got {0}")]
    InvalidBatchSize(usize),

    #[error("generator expects latent vectors of length {expected}, trainer samples {found}")]
    LatentDim { expected: usize, found: usize },

    #[error("discriminator produced {found} scores for {expected} labels")]
    LabelMismatch { expected: usize, found: usize },

    #[error("failed to render image grid: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors raised while reading, writing or applying a state dict.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to access checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed safetensors data: {0}")]
    Format(String),

    #[error("checkpoint is missing keys: {0:?}")]
    MissingKeys(Vec<String>),

    #[error("checkpoint has unexpected keys: {0:?}")]
    UnexpectedKeys(Vec<String>),

    #[error("shape mismatch for {key}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("unsupported dtype for {key}: {dtype}")]
    Dtype { key: String, dtype: String },
}

/// Errors raised while assembling the image-folder dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset root {0} is not a directory")]
    MissingRoot(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("failed to decode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("no class directories found under {0}")]
    NoClasses(PathBuf),

    #[error("no images found under {0}")]
    Empty(PathBuf),
}
