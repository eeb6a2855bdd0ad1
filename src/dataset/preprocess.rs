//! Per-image preprocessing
//!
//! Decodes a file to RGB, resizes it and converts it to an `f32` HWC tensor in
//! the `[0, 255]` range. The model rescales internally, so no normalisation
//! happens here.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageReader, Rgb, RgbImage};
use rand::Rng;

use crate::utils::error::{Result, SpoofError};

/// A decoded image as `f32` values in HWC layout
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub data: Vec<f32>,
    pub height: usize,
    pub width: usize,
}

impl ImageTensor {
    pub const CHANNELS: usize = 3;

    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            data: vec![0.0; height * width * Self::CHANNELS],
            height,
            width,
        }
    }

    pub fn from_rgb(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: img.as_raw().iter().map(|&v| v as f32).collect(),
            height: height as usize,
            width: width as usize,
        }
    }

    /// `[height, width, channels]`
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, Self::CHANNELS]
    }

    #[inline]
    pub fn index(&self, y: usize, x: usize, c: usize) -> usize {
        (y * self.width + x) * Self::CHANNELS + c
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize, c: usize) -> f32 {
        self.data[self.index(y, x, c)]
    }

    /// Round and clamp back to 8-bit RGB
    pub fn to_rgb8(&self) -> RgbImage {
        RgbImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let mut px = [0u8; 3];
            for (c, v) in px.iter_mut().enumerate() {
                *v = self.get(y as usize, x as usize, c).round().clamp(0.0, 255.0) as u8;
            }
            Rgb(px)
        })
    }
}

/// Read and decode an image file to 3-channel RGB
pub fn decode_rgb(path: &Path) -> Result<RgbImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| SpoofError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| SpoofError::ImageLoad(path.to_path_buf(), e.to_string()))?;
    let img = reader
        .decode()
        .map_err(|e| SpoofError::ImageLoad(path.to_path_buf(), e.to_string()))?;
    Ok(img.to_rgb8())
}

fn resize_square(img: &RgbImage, size: usize) -> RgbImage {
    imageops::resize(img, size as u32, size as u32, FilterType::Triangle)
}

/// Uniformly placed `size x size` crop
pub fn random_crop<R: Rng>(img: &RgbImage, size: usize, rng: &mut R) -> RgbImage {
    let (width, height) = img.dimensions();
    let size = size as u32;
    let x = rng.gen_range(0..=width.saturating_sub(size));
    let y = rng.gen_range(0..=height.saturating_sub(size));
    imageops::crop_imm(img, x, y, size.min(width), size.min(height)).to_image()
}

/// Training transform: resize to `resize_to`, random crop to `image_size`
pub fn preprocess_train<R: Rng>(
    path: &Path,
    resize_to: usize,
    image_size: usize,
    rng: &mut R,
) -> Result<ImageTensor> {
    let img = decode_rgb(path)?;
    let resized = resize_square(&img, resize_to);
    Ok(ImageTensor::from_rgb(&random_crop(&resized, image_size, rng)))
}

/// Evaluation transform: resize straight to `image_size`
pub fn preprocess_eval(path: &Path, image_size: usize) -> Result<ImageTensor> {
    let img = decode_rgb(path)?;
    Ok(ImageTensor::from_rgb(&resize_square(&img, image_size)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Gradient test image written as PNG
    pub(crate) fn write_test_image(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
        });
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        img.save(path).unwrap();
    }

    #[test]
    fn test_train_transform_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_test_image(&path, 50, 30);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tensor = preprocess_train(&path, 40, 32, &mut rng).unwrap();
        assert_eq!(tensor.shape(), [32, 32, 3]);
        assert_eq!(tensor.data.len(), 32 * 32 * 3);
    }

    #[test]
    fn test_eval_transform_shape_and_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.png");
        write_test_image(&path, 17, 23);

        let tensor = preprocess_eval(&path, 24).unwrap();
        assert_eq!(tensor.shape(), [24, 24, 3]);
        assert!(tensor.data.iter().all(|v| (0.0..=255.0).contains(v)));
        assert!(tensor.data.iter().any(|v| *v > 1.0));
    }

    #[test]
    fn test_default_sizes_produce_224_square() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("full.png");
        write_test_image(&path, 320, 240);
        let config = crate::config::PreprocessingConfig::default();

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let train = preprocess_train(&path, config.resize_to, config.image_size, &mut rng).unwrap();
        let eval = preprocess_eval(&path, config.image_size).unwrap();
        for tensor in [train, eval] {
            assert_eq!(tensor.shape(), [224, 224, 3]);
            assert_eq!(tensor.data.len(), 224 * 224 * 3);
        }
    }

    #[test]
    fn test_eval_transform_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.png");
        write_test_image(&path, 40, 40);

        assert_eq!(preprocess_eval(&path, 16).unwrap(), preprocess_eval(&path, 16).unwrap());
    }

    #[test]
    fn test_random_crop_stays_in_bounds() {
        let img = RgbImage::new(26, 26);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..20 {
            let crop = random_crop(&img, 22, &mut rng);
            assert_eq!(crop.dimensions(), (22, 22));
        }
    }

    #[test]
    fn test_corrupt_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let err = preprocess_eval(&path, 8).unwrap_err();
        assert!(matches!(err, SpoofError::ImageLoad(p, _) if p == path));
    }

    #[test]
    fn test_rgb_round_trip() {
        let img = RgbImage::from_fn(4, 3, |x, y| Rgb([x as u8 * 10, y as u8 * 20, 7]));
        let tensor = ImageTensor::from_rgb(&img);
        assert_eq!(tensor.get(2, 3, 0), 30.0);
        assert_eq!(tensor.get(2, 3, 1), 40.0);
        assert_eq!(tensor.to_rgb8(), img);
    }
}
