// ============================================================================
// Command line + runtime configuration
// ============================================================================
//
// Usage examples:
//   signature-composer -b contract.jpg -s signature.png
//   signature-composer -b page.png -s scan.jpg --alpha-min 10 --alpha-max 250
//   signature-composer -b page.png -s scan.png --export --output-dir out/

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::types::{Thresholds, Viewport};

/// Default host viewport, matching the embedded canvas height.
pub const DEFAULT_WIDTH: u32 = 960;
pub const DEFAULT_HEIGHT: u32 = 520;

/// Overlay a signature onto a background image, position it, export a PNG.
#[derive(Parser, Debug)]
#[command(name = "signature-composer", version, about)]
pub struct CliArgs {
    /// Background image (PNG or JPEG).
    #[arg(short, long, value_name = "FILE")]
    pub background: PathBuf,

    /// Signature image (PNG recommended).
    #[arg(short, long, value_name = "FILE")]
    pub signature: PathBuf,

    /// Keep signature pixels whose alpha is at least this.
    #[arg(long, default_value_t = 0)]
    pub alpha_min: u8,

    /// Keep signature pixels whose alpha is at most this.
    #[arg(long, default_value_t = 255)]
    pub alpha_max: u8,

    /// Reset the signature size/position once it has been placed.
    #[arg(long)]
    pub reset: bool,

    /// Viewport width in pixels.
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub width: u32,

    /// Viewport height in pixels.
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,

    /// Where `signed-image.png` is written.
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// JSON file holding the session's saved transform.
    #[arg(long, value_name = "FILE")]
    pub session_file: Option<PathBuf>,

    /// Keep the transform in memory only.
    #[arg(long)]
    pub no_persist: bool,

    /// No window: place the signature, export, exit.
    #[arg(long)]
    pub export: bool,

    /// Debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Where the transform record is kept for this session.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    Memory,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ComposerConfig {
    pub background: PathBuf,
    pub signature: PathBuf,
    pub thresholds: Thresholds,
    pub reset_requested: bool,
    pub viewport: Viewport,
    pub output_dir: PathBuf,
    pub store: StoreConfig,
    pub headless: bool,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            background: PathBuf::new(),
            signature: PathBuf::new(),
            thresholds: Thresholds::default(),
            reset_requested: false,
            viewport: Viewport::new(f64::from(DEFAULT_WIDTH), f64::from(DEFAULT_HEIGHT)),
            output_dir: PathBuf::from("."),
            store: StoreConfig::File(default_session_file()),
            headless: false,
        }
    }
}

/// `<tmp>/signature-composer/session.json`
pub fn default_session_file() -> PathBuf {
    std::env::temp_dir().join("signature-composer").join("session.json")
}

/// MIME type an upload is declared with, from its extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

impl CliArgs {
    pub fn into_config(self) -> ComposerConfig {
        let store = if self.no_persist {
            StoreConfig::Memory
        } else {
            StoreConfig::File(self.session_file.unwrap_or_else(default_session_file))
        };
        ComposerConfig {
            background: self.background,
            signature: self.signature,
            thresholds: Thresholds::new(self.alpha_min, self.alpha_max),
            reset_requested: self.reset,
            viewport: Viewport::new(f64::from(self.width.max(1)), f64::from(self.height.max(1))),
            output_dir: self.output_dir,
            store,
            headless: self.export,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_minimal_args() {
        let args = CliArgs::try_parse_from(["signature-composer", "-b", "bg.jpg", "-s", "sig.png"]).unwrap();
        let config = args.into_config();
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.viewport, Viewport::new(960.0, 520.0));
        assert_eq!(config.store, StoreConfig::File(default_session_file()));
        assert!(!config.reset_requested && !config.headless);
    }

    #[test]
    fn thresholds_are_bounded_to_a_byte() {
        let parsed = CliArgs::try_parse_from(["x", "-b", "a", "-s", "b", "--alpha-max", "256"]);
        assert!(parsed.is_err());
        let args = CliArgs::try_parse_from([
            "x", "-b", "a", "-s", "b", "--alpha-min", "10", "--alpha-max", "250", "--no-persist", "--reset",
        ])
        .unwrap();
        let config = args.into_config();
        assert_eq!(config.thresholds, Thresholds::new(10, 250));
        assert_eq!(config.store, StoreConfig::Memory);
        assert!(config.reset_requested);
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for_path(Path::new("a/Sig.PNG")), Some("image/png"));
        assert_eq!(mime_for_path(Path::new("scan.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("scan.gif")), None);
        assert_eq!(mime_for_path(Path::new("noext")), None);
    }
}
