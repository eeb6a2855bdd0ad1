//! Batch-level data augmentation
//!
//! Applied to training batches after preprocessing, one independent draw per
//! image:
//!
//! - horizontal and vertical flips
//! - rotation by up to `rotation_factor * 2π` radians either way
//! - zoom with independent height and width factors
//!
//! Rotation and zoom resample bilinearly and fill uncovered pixels by
//! reflecting the image across its border. Validation data is never augmented.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::preprocess::ImageTensor;
use crate::utils::error::{Result, SpoofError};

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    pub enabled: bool,
    /// Probability of a horizontal flip
    pub horizontal_flip_prob: f32,
    /// Probability of a vertical flip
    pub vertical_flip_prob: f32,
    /// Maximum rotation as a fraction of a full turn
    pub rotation_factor: f32,
    /// Zoom range for height, as a fraction (0.2 -> [-20%, +20%])
    pub zoom_height_factor: f32,
    /// Zoom range for width
    pub zoom_width_factor: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            horizontal_flip_prob: 0.5,
            vertical_flip_prob: 0.5,
            rotation_factor: 0.02,
            zoom_height_factor: 0.2,
            zoom_width_factor: 0.2,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations
    pub fn none() -> Self {
        Self {
            enabled: false,
            horizontal_flip_prob: 0.0,
            vertical_flip_prob: 0.0,
            rotation_factor: 0.0,
            zoom_height_factor: 0.0,
            zoom_width_factor: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let probs = [self.horizontal_flip_prob, self.vertical_flip_prob];
        if probs.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(SpoofError::Config("flip probabilities must be in [0, 1]".to_string()));
        }
        if self.rotation_factor < 0.0 || self.rotation_factor > 0.5 {
            return Err(SpoofError::Config("rotation_factor must be in [0, 0.5]".to_string()));
        }
        let zooms = [self.zoom_height_factor, self.zoom_width_factor];
        if zooms.iter().any(|z| !(0.0..1.0).contains(z)) {
            return Err(SpoofError::Config("zoom factors must be in [0, 1)".to_string()));
        }
        Ok(())
    }
}

/// Applies random geometric transforms to preprocessed images
#[derive(Clone, Debug)]
pub struct BatchAugmenter {
    config: AugmentationConfig,
}

impl BatchAugmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Draw one set of transforms and apply it to `img`
    pub fn augment(&self, img: ImageTensor, rng: &mut ChaCha8Rng) -> ImageTensor {
        if !self.config.enabled {
            return img;
        }

        let mut result = img;

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            result = flip_horizontal(&result);
        }
        if rng.gen::<f32>() < self.config.vertical_flip_prob {
            result = flip_vertical(&result);
        }

        if self.config.rotation_factor > 0.0 {
            let max_angle = self.config.rotation_factor * 2.0 * std::f32::consts::PI;
            let angle = rng.gen_range(-max_angle..=max_angle);
            result = rotate(&result, angle);
        }

        let (hf, wf) = (self.config.zoom_height_factor, self.config.zoom_width_factor);
        if hf > 0.0 || wf > 0.0 {
            let zoom_y = 1.0 + if hf > 0.0 { rng.gen_range(-hf..=hf) } else { 0.0 };
            let zoom_x = 1.0 + if wf > 0.0 { rng.gen_range(-wf..=wf) } else { 0.0 };
            result = zoom(&result, zoom_y, zoom_x);
        }

        result
    }
}

pub fn flip_horizontal(img: &ImageTensor) -> ImageTensor {
    let mut out = ImageTensor::zeros(img.height, img.width);
    for y in 0..img.height {
        for x in 0..img.width {
            for c in 0..ImageTensor::CHANNELS {
                let i = out.index(y, x, c);
                out.data[i] = img.get(y, img.width - 1 - x, c);
            }
        }
    }
    out
}

pub fn flip_vertical(img: &ImageTensor) -> ImageTensor {
    let mut out = ImageTensor::zeros(img.height, img.width);
    let row = img.width * ImageTensor::CHANNELS;
    for y in 0..img.height {
        let src = (img.height - 1 - y) * row;
        out.data[y * row..(y + 1) * row].copy_from_slice(&img.data[src..src + row]);
    }
    out
}

/// Rotate counter-clockwise by `angle` radians about the image center
pub fn rotate(img: &ImageTensor, angle: f32) -> ImageTensor {
    let (sin_a, cos_a) = angle.sin_cos();
    warp(img, |dx, dy| (dx * cos_a + dy * sin_a, -dx * sin_a + dy * cos_a))
}

/// Zoom about the image center; factors above 1 zoom out, below 1 zoom in
pub fn zoom(img: &ImageTensor, zoom_y: f32, zoom_x: f32) -> ImageTensor {
    warp(img, |dx, dy| (dx * zoom_x, dy * zoom_y))
}

/// Inverse-map every output pixel through `map` (offsets from the center)
fn warp<F: Fn(f32, f32) -> (f32, f32)>(img: &ImageTensor, map: F) -> ImageTensor {
    let cx = (img.width as f32 - 1.0) / 2.0;
    let cy = (img.height as f32 - 1.0) / 2.0;

    let mut out = ImageTensor::zeros(img.height, img.width);
    for y in 0..img.height {
        for x in 0..img.width {
            let (sx, sy) = map(x as f32 - cx, y as f32 - cy);
            let px = bilinear_sample(img, cx + sx, cy + sy);
            for (c, v) in px.iter().enumerate() {
                let i = out.index(y, x, c);
                out.data[i] = *v;
            }
        }
    }
    out
}

/// Reflect an out-of-range index back into `[0, n)` (d c b a | a b c d | d c b a)
fn reflect(i: i64, n: usize) -> usize {
    let n = n as i64;
    if n == 1 {
        return 0;
    }
    let period = 2 * n;
    let t = i.rem_euclid(period);
    (if t >= n { period - 1 - t } else { t }) as usize
}

fn bilinear_sample(img: &ImageTensor, x: f32, y: f32) -> [f32; 3] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let xs = [reflect(x0 as i64, img.width), reflect(x0 as i64 + 1, img.width)];
    let ys = [reflect(y0 as i64, img.height), reflect(y0 as i64 + 1, img.height)];

    let mut result = [0.0f32; 3];
    for (c, out) in result.iter_mut().enumerate() {
        let v00 = img.get(ys[0], xs[0], c);
        let v10 = img.get(ys[0], xs[1], c);
        let v01 = img.get(ys[1], xs[0], c);
        let v11 = img.get(ys[1], xs[1], c);

        *out = v00 * (1.0 - fx) * (1.0 - fy)
            + v10 * fx * (1.0 - fy)
            + v01 * (1.0 - fx) * fy
            + v11 * fx * fy;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn create_test_image(h: usize, w: usize) -> ImageTensor {
        let mut img = ImageTensor::zeros(h, w);
        for y in 0..h {
            for x in 0..w {
                let i = img.index(y, x, 0);
                img.data[i] = x as f32 * 4.0;
                img.data[i + 1] = y as f32 * 4.0;
                img.data[i + 2] = 128.0;
            }
        }
        img
    }

    #[test]
    fn test_default_matches_reference_augmentation() {
        let config = AugmentationConfig::default();
        assert_eq!(config.horizontal_flip_prob, 0.5);
        assert_eq!(config.vertical_flip_prob, 0.5);
        assert_eq!(config.rotation_factor, 0.02);
        assert_eq!(config.zoom_height_factor, 0.2);
        assert_eq!(config.zoom_width_factor, 0.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flips() {
        let img = create_test_image(4, 5);
        let h = flip_horizontal(&img);
        assert_eq!(h.get(0, 0, 0), img.get(0, 4, 0));
        let v = flip_vertical(&img);
        assert_eq!(v.get(0, 2, 1), img.get(3, 2, 1));
        assert_eq!(flip_horizontal(&h), img);
    }

    #[test]
    fn test_zero_rotation_is_identity() {
        let img = create_test_image(8, 8);
        let out = rotate(&img, 0.0);
        for (a, b) in img.data.iter().zip(out.data.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_unit_zoom_is_identity() {
        let img = create_test_image(6, 9);
        let out = zoom(&img, 1.0, 1.0);
        for (a, b) in img.data.iter().zip(out.data.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_reflect_mode() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 4), 2);
        assert_eq!(reflect(9, 1), 0);
    }

    #[test]
    fn test_augment_preserves_shape_and_range() {
        let aug = BatchAugmenter::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..5 {
            let out = aug.augment(create_test_image(16, 16), &mut rng);
            assert_eq!(out.shape(), [16, 16, 3]);
            assert!(out.data.iter().all(|v| (0.0..=255.0).contains(v)));
        }
    }

    #[test]
    fn test_augment_is_reproducible_for_a_seed() {
        let aug = BatchAugmenter::new(AugmentationConfig::default());
        let a = aug.augment(create_test_image(12, 12), &mut ChaCha8Rng::seed_from_u64(9));
        let b = aug.augment(create_test_image(12, 12), &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_disabled_augmentation_is_identity() {
        let aug = BatchAugmenter::new(AugmentationConfig::none());
        let img = create_test_image(10, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(aug.augment(img.clone(), &mut rng), img);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AugmentationConfig::default();
        config.horizontal_flip_prob = 1.5;
        assert!(config.validate().is_err());
    }
}
