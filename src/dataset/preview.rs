//! 3x3 preview grid of augmented training images

use std::path::Path;

use image::{imageops, Rgb, RgbImage};
use tracing::info;

use crate::dataset::labels::LabelEncoder;
use crate::dataset::pipeline::PreparedBatch;
use crate::utils::error::{Result, SpoofError};

const GRID: usize = 3;
const GAP: u32 = 4;

/// Tile up to nine images from `batch` into one PNG and return their labels
pub fn save_preview_grid(batch: &PreparedBatch, encoder: &LabelEncoder, path: &Path) -> Result<Vec<String>> {
    let items: Vec<_> = batch.items.iter().take(GRID * GRID).collect();
    let first = items
        .first()
        .ok_or_else(|| SpoofError::Dataset("Cannot build a preview from an empty batch".to_string()))?;

    let tile_w = first.image.width as u32;
    let tile_h = first.image.height as u32;
    let side = GRID as u32;
    let mut canvas = RgbImage::from_pixel(
        side * tile_w + (side + 1) * GAP,
        side * tile_h + (side + 1) * GAP,
        Rgb([255, 255, 255]),
    );

    let mut labels = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let col = (i % GRID) as u32;
        let row = (i / GRID) as u32;
        let x = GAP + col * (tile_w + GAP);
        let y = GAP + row * (tile_h + GAP);
        imageops::replace(&mut canvas, &item.image.to_rgb8(), x as i64, y as i64);

        let name = encoder.inverse_transform(item.label).unwrap_or("?").to_string();
        labels.push(name);
    }

    canvas
        .save(path)
        .map_err(|e| SpoofError::Export(format!("Failed to save preview {:?}: {}", path, e)))?;

    info!("Saved training preview to {:?} (row-major labels: {:?})", path, labels);
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::burn_dataset::SpoofItem;
    use crate::dataset::preprocess::ImageTensor;

    #[test]
    fn test_grid_dimensions_and_labels() {
        let items = (0..10)
            .map(|i| SpoofItem {
                image: ImageTensor::zeros(8, 6),
                label: i % 2,
                path: format!("{}.png", i).into(),
            })
            .collect();
        let batch = PreparedBatch { items };
        let encoder = LabelEncoder::fit(&["real", "spoof"]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let labels = save_preview_grid(&batch, &encoder, &path).unwrap();

        assert_eq!(labels.len(), 9);
        assert_eq!(labels[0], "real");
        assert_eq!(labels[1], "spoof");

        let saved = image::open(&path).unwrap();
        assert_eq!(saved.width(), 3 * 6 + 4 * GAP);
        assert_eq!(saved.height(), 3 * 8 + 4 * GAP);
    }

    #[test]
    fn test_empty_batch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let batch = PreparedBatch { items: vec![] };
        let encoder = LabelEncoder::fit(&["real"]);
        assert!(save_preview_grid(&batch, &encoder, &dir.path().join("p.png")).is_err());
    }
}
