use anyhow::{bail, Context, Result};
use glance_core::{Facing, Frame, SessionManager, TracingSink};
use glance_hw::V4lBackend;
use image::GrayImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

/// Frames read while waiting for auto-exposure to produce a usable image.
const MAX_ATTEMPTS: usize = 15;

/// Write a grayscale frame as an image; the format follows the extension.
pub fn save_frame(frame: &Frame, path: &Path) -> Result<()> {
    let img = GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
        .context("frame buffer does not match its dimensions")?;
    img.save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Open the camera, save the first non-dark frame, and release it again.
pub async fn capture(config: &Config, facing: Facing, output: &Path) -> Result<()> {
    let (width, height) = config.frame_size;
    let manager = Arc::new(
        SessionManager::new(V4lBackend::new(config.overrides.clone()), TracingSink)
            .with_frame_size(width, height),
    );
    manager.start(facing).await?;

    let result = first_usable_frame(&manager).await;
    manager.stop();

    let frame = result?;
    save_frame(&frame, output)?;
    println!(
        "saved {}x{} frame to {} (brightness {:.0})",
        frame.width,
        frame.height,
        output.display(),
        frame.avg_brightness()
    );
    Ok(())
}

async fn first_usable_frame(manager: &Arc<SessionManager<V4lBackend>>) -> Result<Frame> {
    let mut dark = 0;
    for _ in 0..MAX_ATTEMPTS {
        let Some(read) = manager.next_frame().await else {
            bail!("camera stopped while capturing");
        };
        let frame = read?;
        if !frame.is_dark {
            return Ok(frame);
        }
        dark += 1;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    bail!("all {dark} captured frames were too dark")
}
