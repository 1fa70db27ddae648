//! Training-image input: directory scan, grayscale decode, fixed-size grouping.

use anyhow::{bail, Context, Result};
use eigenface_core::TrainingGroup;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "ppm", "pgm", "pnm", "bmp"];

/// A decoded face image as a flattened grayscale pixel vector.
pub struct DecodedImage {
    /// File name, used as the face's identifier.
    pub identifier: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f64>,
}

/// Image files directly inside `dir`, sorted by file name.
pub fn scan_training_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading training directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an image file to 8-bit luma, one `f64` per pixel in row-major order.
pub fn decode_image(path: &Path) -> Result<DecodedImage> {
    let gray = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_luma8();
    let (width, height) = gray.dimensions();
    let pixels = gray.into_raw().into_iter().map(f64::from).collect();
    let identifier = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(DecodedImage {
        identifier,
        width,
        height,
        pixels,
    })
}

/// Split images into consecutive groups of `group_size`.
///
/// All images must share one size. A trailing partial group is skipped.
pub fn assemble_groups(images: Vec<DecodedImage>, group_size: usize) -> Result<Vec<TrainingGroup>> {
    if group_size == 0 {
        bail!("group size must be positive");
    }
    let Some(first) = images.first() else {
        return Ok(Vec::new());
    };
    let (width, height) = (first.width, first.height);
    if let Some(odd) = images.iter().find(|i| (i.width, i.height) != (width, height)) {
        bail!(
            "{} is {}x{}, but training images must all be {width}x{height}",
            odd.identifier,
            odd.width,
            odd.height
        );
    }

    let total = images.len();
    let group_count = total / group_size;
    let leftover = total - group_count * group_size;
    if leftover > 0 {
        tracing::warn!(skipped = leftover, group_size, "trailing partial training group skipped");
    }

    let mut images = images.into_iter();
    let groups = (0..group_count)
        .map(|_| {
            let (identifiers, faces) = images
                .by_ref()
                .take(group_size)
                .map(|image| (image.identifier, image.pixels))
                .unzip();
            TrainingGroup {
                faces,
                identifiers,
                width: width as usize,
                height: height as usize,
            }
        })
        .collect();

    Ok(groups)
}

/// Scan, decode, and group every training image in `dir`.
pub fn load_training_groups(dir: &Path, group_size: usize) -> Result<Vec<TrainingGroup>> {
    let files = scan_training_dir(dir)?;
    tracing::info!(dir = %dir.display(), images = files.len(), group_size, "loading training images");

    let images = files
        .iter()
        .map(|path| decode_image(path))
        .collect::<Result<Vec<_>>>()?;
    assemble_groups(images, group_size)
}
