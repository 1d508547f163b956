// What you SEE:
// • The background fitted inside the window, the signature centered on it
//   at a fifth of its width (or wherever you left it last time).
// • Drag the signature to move it; drag a handle square to resize it.
// • R resets size/position, S saves signed-image.png, H toggles handles,
//   O reloads both files from disk, [ ] change alpha min, - = change alpha max.
// • ESC quits.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;

use clap::Parser;
use minifb::Key;
use tracing::{error, info, warn};

use signature_composer::composer::{Composer, LoadOutcome};
use signature_composer::config::{self, CliArgs, ComposerConfig, StoreConfig};
use signature_composer::draw::{self, Drawer, PointerEvent, PointerTracker};
use signature_composer::error::Error;
use signature_composer::gamma::GammaLut;
use signature_composer::join::{AssetSlot, LoadTicket};
use signature_composer::loader::{self, ImageAsset};
use signature_composer::logging;
use signature_composer::persist::{FileStore, KeyValueStore, MemoryStore};
use signature_composer::types::{FrameBuffer, Thresholds, Viewport};

const THRESHOLD_STEP: u8 = 5;
const HUD_HEIGHT: i32 = 13;

type Decoded = (LoadTicket, Result<ImageAsset, Error>);

fn main() -> ExitCode {
    let args = CliArgs::parse();
    logging::init(args.verbose);
    let config = args.into_config();

    let result = if config.headless { run_headless(&config) } else { run_window(&config) };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "signature-composer failed");
            ExitCode::FAILURE
        }
    }
}

fn open_store(config: &ComposerConfig) -> Box<dyn KeyValueStore> {
    match &config.store {
        StoreConfig::Memory => Box::new(MemoryStore::default()),
        StoreConfig::File(path) => {
            info!(path = %path.display(), "session store");
            Box::new(FileStore::open(path))
        }
    }
}

fn new_composer(config: &ComposerConfig) -> Composer {
    let mut composer = Composer::new(config.viewport, config.thresholds, open_store(config));
    if config.reset_requested {
        composer.request_reset_on_place();
    }
    composer
}

/// Start decoding one upload on a worker; the result comes back tagged.
fn spawn_decode(composer: &mut Composer, slot: AssetSlot, path: PathBuf, tx: &mpsc::Sender<Decoded>) {
    let ticket = composer.begin_load(slot);
    let tx = tx.clone();
    std::thread::spawn(move || {
        let result = std::fs::read(&path)
            .map_err(Error::from)
            .and_then(|bytes| loader::decode_as(&bytes, config::mime_for_path(&path)));
        // Receiver gone means the app is shutting down.
        let _ = tx.send((ticket, result));
    });
}

fn upload_both(composer: &mut Composer, config: &ComposerConfig, tx: &mpsc::Sender<Decoded>) {
    spawn_decode(composer, AssetSlot::Background, config.background.clone(), tx);
    spawn_decode(composer, AssetSlot::Signature, config.signature.clone(), tx);
}

fn run_headless(config: &ComposerConfig) -> Result<(), Error> {
    let mut composer = new_composer(config);
    let (tx, rx) = mpsc::channel();
    upload_both(&mut composer, config, &tx);
    drop(tx);

    for (ticket, result) in rx {
        composer.finish_load(ticket, result);
    }
    let artifact = composer.export()?;
    let path = artifact.write_into(&config.output_dir)?;
    info!(path = %path.display(), "saved");
    Ok(())
}

fn run_window(config: &ComposerConfig) -> Result<(), Error> {
    let (vw, vh) = config.viewport.pixel_size();
    let mut drawer = Drawer::new("Signature Composer", vw as usize, vh as usize)?;
    let mut composer = new_composer(config);
    let (tx, rx) = mpsc::channel::<Decoded>();
    upload_both(&mut composer, config, &tx);

    let lut = GammaLut::new();
    let mut screen = FrameBuffer::new(vw as usize, vh as usize);
    let mut pointer = PointerTracker::default();
    let mut status = String::from("LOADING");
    let mut last_hud = String::new();

    /* ------------------------------ Main loop ------------------------------ */
    while drawer.is_open() && !drawer.esc_pressed() {
        /* 1) Finished decodes (stale ones are dropped by the composer). */
        while let Ok((ticket, result)) = rx.try_recv() {
            match composer.finish_load(ticket, result) {
                LoadOutcome::Placed => status = String::from("READY"),
                LoadOutcome::Failed => status = String::from("LOAD FAILED"),
                LoadOutcome::Waiting | LoadOutcome::Stale => {}
            }
        }

        /* 2) Window resized → refit the background. */
        let (w, h) = drawer.size();
        if (w, h) != (screen.width, screen.height) && w > 0 && h > 0 {
            screen = FrameBuffer::new(w, h);
            composer.resize_viewport(Viewport::new(w as f64, h as f64));
        }

        /* 3) Pointer: press / drag / release. */
        match pointer.sample(drawer.left_mouse_down(), drawer.mouse_pos()) {
            Some(PointerEvent::Down(x, y)) => {
                composer.pointer_down(x, y);
            }
            Some(PointerEvent::Move(x, y)) => {
                composer.pointer_move(x, y);
            }
            Some(PointerEvent::Up) => {
                composer.pointer_up();
            }
            None => {}
        }

        /* 4) Keys: the control panel. */
        if drawer.pressed_once(Key::R) && composer.reset().is_some() {
            status = String::from("RESET");
        }
        if drawer.pressed_once(Key::H) {
            let visible = composer.handles_visible();
            composer.set_handles_visible(!visible);
        }
        if drawer.pressed_once(Key::O) {
            upload_both(&mut composer, config, &tx);
            status = String::from("RELOADING");
        }
        if let Some(t) = adjusted_thresholds(&drawer, composer.thresholds()) {
            composer.set_thresholds(t);
        }
        if drawer.pressed_once(Key::S) {
            status = match composer.export().and_then(|a| a.write_into(&config.output_dir)) {
                Ok(path) => {
                    info!(path = %path.display(), "saved");
                    String::from("SAVED")
                }
                Err(err) => {
                    warn!(%err, "export failed");
                    String::from("SAVE FAILED")
                }
            };
        }

        /* 5) Redraw only when the scene or HUD changed; otherwise just pump events. */
        let t = composer.thresholds();
        let hud = format!(
            "{status} | MIN {} MAX {} | R:RESET S:SAVE H:HANDLES O:RELOAD [ ] - =",
            t.min, t.max
        );
        if composer.redraw() || hud != last_hud {
            draw::blit_over_backdrop(&mut screen, composer.canvas(), &lut);
            draw::fill_bar(&mut screen, 0, HUD_HEIGHT, 0x00_11_11_11);
            draw::draw_text_5x7(&mut screen, 4, 3, &hud, 0x00_FF_FF_FF);
            drawer.present(&screen)?;
            last_hud = hud;
        } else {
            drawer.poll();
        }
    }

    Ok(())
}

fn adjusted_thresholds(drawer: &Drawer, current: Thresholds) -> Option<Thresholds> {
    let mut t = current;
    if drawer.pressed_once(Key::LeftBracket) {
        t.min = t.min.saturating_sub(THRESHOLD_STEP);
    }
    if drawer.pressed_once(Key::RightBracket) {
        t.min = t.min.saturating_add(THRESHOLD_STEP);
    }
    if drawer.pressed_once(Key::Minus) {
        t.max = t.max.saturating_sub(THRESHOLD_STEP);
    }
    if drawer.pressed_once(Key::Equal) {
        t.max = t.max.saturating_add(THRESHOLD_STEP);
    }
    (t != current).then_some(t)
}
