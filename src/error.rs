use thiserror::Error;

/// Why a single image was left as it is.
///
/// Never fatal: the reducer logs it and keeps the original stream.
#[derive(Error, Debug)]
pub enum UnsupportedImage {
    #[error("object is not an image stream")]
    NotAnImage,

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode JPEG: {0}")]
    Encode(#[source] image::ImageError),

    #[error("sample buffer is {actual} bytes, expected {expected} for {width}x{height}")]
    SampleLayout {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported colour space {0}")]
    ColorSpace(String),

    #[error("unsupported bit depth {0}")]
    BitDepth(i64),

    #[error("unsupported /Decode array {0}")]
    DecodeArray(String),

    #[error("unsupported filter chain {0}")]
    Filter(String),

    #[error("stream decompression failed: {0}")]
    Stream(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid target size: {0}")]
    InvalidTarget(String),

    #[error("invalid quality settings: {0}")]
    InvalidQuality(String),

    #[error("quality step must be at least 1")]
    InvalidStep,

    #[error("iteration budget must be at least 1")]
    InvalidIterations,
}

/// Errors that abort a whole reduction run.
#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("malformed PDF document: {0}")]
    MalformedDocument(#[source] lopdf::Error),

    #[error("document is encrypted and cannot be opened with an empty password: {0}")]
    Encrypted(#[source] lopdf::Error),

    #[error("failed to serialize PDF: {0}")]
    Serialize(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
