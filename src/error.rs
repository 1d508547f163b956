// One error type for the whole crate.
// Every variant states *where* things went wrong.
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("image decode error: {0}")]
    Decode(#[source] image::ImageError), // Upload bytes were not a readable image
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String), // Decoded fine but is neither PNG nor JPEG
    #[error("image has no pixels")]
    EmptyImage,
    #[error("pixel access denied for this image")]
    PixelAccessDenied, // Extraction may not read the source pixels
    #[error("persisted transform record is corrupt: {0}")]
    RecordCorrupt(String),
    #[error("could not serialize store contents: {0}")]
    RecordWrite(#[source] serde_json::Error), // Serializing the store on save
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error), // Reading an upload or writing the store/export
    #[error("image encode error: {0}")]
    Encode(#[source] image::ImageError), // Export could not produce a PNG
    #[error("both background and signature must be placed first")]
    NotReady,
    #[error("window init error: {0}")]
    WindowInit(String), // Creating the window failed
    #[error("window update error: {0}")]
    WindowUpdate(String), // Updating the window buffer failed
}

pub type Result<T> = std::result::Result<T, Error>;
