//! Signature composer: overlay a signature scan onto a background image,
//! strip the paper out of the scan, drag/resize it inside the background,
//! and export the flattened result as `signed-image.png`.

pub mod composer;
pub mod config;
pub mod draw;
pub mod error;
pub mod extract;
pub mod gamma;
pub mod join;
pub mod loader;
pub mod logging;
pub mod persist;
pub mod scene;
pub mod transform;
pub mod types;

pub use composer::{Composer, LoadOutcome};
pub use error::{Error, Result};
pub use join::{AssetSlot, LoadTicket};
pub use loader::{ImageAsset, PixelAccess};
pub use persist::{FileStore, KeyValueStore, MemoryStore};
pub use scene::{EXPORT_FILE_NAME, ExportArtifact};
pub use transform::{Handle, SignatureTransform};
pub use types::{Rect, Thresholds, Viewport};
