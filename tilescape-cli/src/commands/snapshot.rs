//! Snapshot command - render a viewport into a PNG file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use image::{Rgba, RgbaImage};
use tokio::sync::Notify;

use tilescape::scheduler::Frame;
use tilescape::{CanvasSize, RedrawNotifier, TileEngine, Viewport};

use super::load_config;
use crate::error::CliError;
use crate::renderer::DebugRenderer;

/// Arguments for the snapshot command.
#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Map-data source to load
    #[arg(long, default_value = "demo.map")]
    pub source: PathBuf,

    /// Latitude of the viewport center
    #[arg(long, default_value_t = 48.7758)]
    pub lat: f64,

    /// Longitude of the viewport center
    #[arg(long, default_value_t = 9.1829)]
    pub lon: f64,

    /// Zoom level
    #[arg(long, default_value_t = 12)]
    pub zoom: u8,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 1024)]
    pub width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 768)]
    pub height: u32,

    /// Output PNG path
    #[arg(long, short, default_value = "snapshot.png")]
    pub output: PathBuf,

    /// Give up waiting for pending tiles after this many seconds
    #[arg(long, default_value_t = 60)]
    pub deadline_secs: u64,
}

/// Repaint signal bridging worker notifications to the waiting command.
#[derive(Default)]
struct RepaintSignal {
    notify: Notify,
}

impl RepaintSignal {
    async fn wait(&self) {
        self.notify.notified().await;
    }
}

impl RedrawNotifier for RepaintSignal {
    fn request_redraw(&self) {
        self.notify.notify_waiters();
    }
}

/// Run the snapshot command.
pub async fn run(config: Option<&Path>, args: SnapshotArgs) -> Result<(), CliError> {
    let config = load_config(config)?;
    let signal = Arc::new(RepaintSignal::default());

    let engine = TileEngine::new(
        config.engine_config(),
        Arc::new(DebugRenderer::new()),
        Arc::clone(&signal) as Arc<dyn RedrawNotifier>,
    )?;

    engine.load(&args.source)?;
    engine.set_viewport(Viewport::new(args.lat, args.lon, args.zoom));
    engine.set_canvas_size(CanvasSize::new(args.width, args.height));

    let mut frame = engine.redraw(true)?;
    engine.execute();

    // Repaint whenever background work lands, until the picture settles
    // or the deadline passes (failed tiles keep their placeholder).
    let deadline = Instant::now() + Duration::from_secs(args.deadline_secs);
    while !frame.is_complete() && Instant::now() < deadline {
        let _ = tokio::time::timeout(Duration::from_millis(250), signal.wait()).await;
        frame = engine.redraw(false)?;
        engine.execute();
    }

    let image = compose(&frame, args.width, args.height);
    image
        .save(&args.output)
        .map_err(|e| CliError::Image(e.to_string()))?;

    println!(
        "Wrote {} ({}x{}, {} tiles, {} pending)",
        args.output.display(),
        args.width,
        args.height,
        frame.tiles.len(),
        frame.pending_count()
    );
    println!(
        "Memory cache: {}/{} tiles",
        engine.memory_len(),
        engine.memory_capacity()
    );
    println!(
        "Disk cache:   {} tiles at {}",
        engine.disk_load(),
        config.cache.directory.display()
    );
    println!("Traffic:      {}", engine.stats());

    engine.destroy().await?;
    Ok(())
}

/// Blit the frame's tiles onto one image, clipping at the canvas edges.
fn compose(frame: &Frame, width: u32, height: u32) -> RgbaImage {
    let mut image = RgbaImage::new(width, height);

    for tile in &frame.tiles {
        let pixels = tile.bitmap.pixels();
        let tile_width = tile.bitmap.width();
        let tile_height = tile.bitmap.height();

        for y in 0..tile_height {
            let canvas_y = tile.canvas_y + f64::from(y);
            if canvas_y < 0.0 || canvas_y >= f64::from(height) {
                continue;
            }
            for x in 0..tile_width {
                let canvas_x = tile.canvas_x + f64::from(x);
                if canvas_x < 0.0 || canvas_x >= f64::from(width) {
                    continue;
                }
                let offset = ((y * tile_width + x) * 4) as usize;
                image.put_pixel(
                    canvas_x as u32,
                    canvas_y as u32,
                    Rgba([
                        pixels[offset],
                        pixels[offset + 1],
                        pixels[offset + 2],
                        pixels[offset + 3],
                    ]),
                );
            }
        }
    }

    image
}
