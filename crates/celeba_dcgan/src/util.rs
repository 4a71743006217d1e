use std::path::Path;

use burn::{
    prelude::{Backend, Tensor},
    tensor::DataError,
};
use image::{RgbImage, imageops};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per channel statistics the real images are normalized with.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// Measured on the reduced CelebA set.
    pub const CELEBA: Self = Self {
        mean: [0.5066, 0.4261, 0.3836],
        std: [0.2589, 0.2380, 0.2340],
    };

    fn channel_tensor<B: Backend>(values: [f32; 3], device: &B::Device) -> Tensor<B, 4> {
        Tensor::<B, 1>::from_floats(values, device).reshape([1, 3, 1, 1])
    }

    /// `images` in [0, 1], dim [N, 3, H, W].
    pub fn normalize<B: Backend>(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = images.device();
        let mean = Self::channel_tensor::<B>(self.mean, &device);
        let std = Self::channel_tensor::<B>(self.std, &device);
        (images - mean) / std
    }

    /// Inverse of [`Normalization::normalize`], clamped to [0, 1].
    pub fn unnormalize<B: Backend>(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = images.device();
        let mean = Self::channel_tensor::<B>(self.mean, &device);
        let std = Self::channel_tensor::<B>(self.std, &device);
        (images * std + mean).clamp(0.0, 1.0)
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self::CELEBA
    }
}

#[derive(Error, Debug)]
pub enum ImageSaveError {
    #[error("Expected an RGB image tensor but got {} channels", .0)]
    ChannelError(usize),
    #[error("Failed to read tensor data due to {:?}", .0)]
    DataError(DataError),
    #[error("Pixel buffer does not match a {}x{} image", .0, .1)]
    BufferError(u32, u32),
    #[error("Failed to write image due to {:?}", .0)]
    EncodingError(#[from] image::ImageError),
}

/// Converts a normalized batch, dim [N, 3, H, W], into 8 bit RGB images.
pub fn tensor_to_images<B: Backend>(
    images: Tensor<B, 4>,
    normalization: &Normalization,
) -> Result<Vec<RgbImage>, ImageSaveError> {
    let [_, channels, height, width] = images.dims();
    if channels != 3 {
        return Err(ImageSaveError::ChannelError(channels));
    }
    let pixels = normalization
        .unnormalize(images)
        .permute([0, 2, 3, 1])
        .into_data()
        .to_vec::<f32>()
        .map_err(ImageSaveError::DataError)?;
    let (width, height) = (width as u32, height as u32);
    pixels
        .chunks((width * height * 3) as usize)
        .map(|chunk| {
            let bytes = chunk.iter().map(|v| (v * 255.0).round() as u8).collect();
            RgbImage::from_raw(width, height, bytes)
                .ok_or(ImageSaveError::BufferError(width, height))
        })
        .collect()
}

/// Converts a single normalized image, dim [3, H, W].
pub fn tensor_to_image<B: Backend>(
    image: Tensor<B, 3>,
    normalization: &Normalization,
) -> Result<RgbImage, ImageSaveError> {
    let [channels, height, width] = image.dims();
    let mut images = tensor_to_images(image.unsqueeze::<4>(), normalization)?;
    images
        .pop()
        .ok_or(ImageSaveError::BufferError(width as u32, height as u32))
        .and_then(|image| {
            if channels == 3 {
                Ok(image)
            } else {
                Err(ImageSaveError::ChannelError(channels))
            }
        })
}

/// Writes a single normalized image, dim [3, H, W], as PNG.
pub fn save_image<B: Backend>(
    image: Tensor<B, 3>,
    path: &Path,
    normalization: &Normalization,
) -> Result<(), ImageSaveError> {
    tensor_to_image(image, normalization)?.save(path)?;
    Ok(())
}

#[derive(Default, Clone, Debug, PartialEq)]
pub enum ImageGridOptions {
    Columns(usize),
    Rows(usize),
    Exact {
        rows: usize,
        columns: usize,
    },
    #[default]
    Auto,
}

impl ImageGridOptions {
    pub fn into_row_column(self, batch_size: usize) -> (usize, usize) {
        match self {
            ImageGridOptions::Columns(c) => (batch_size.div_ceil(c.max(1)), c.max(1)),
            ImageGridOptions::Rows(r) => (r.max(1), batch_size.div_ceil(r.max(1))),
            ImageGridOptions::Exact { rows, columns } if rows * columns >= batch_size => {
                (rows, columns)
            }
            ImageGridOptions::Exact { columns, .. } => {
                (batch_size.div_ceil(columns.max(1)), columns.max(1))
            }
            ImageGridOptions::Auto => {
                let root = (batch_size as f32).sqrt();
                if root % 1. == 0. {
                    (root as usize, root as usize)
                } else {
                    (root.floor() as usize + 1, root.round() as usize)
                }
            }
        }
    }
}

/// Stitches equally sized images into one, row major.
pub fn image_grid(images: &[RgbImage], options: ImageGridOptions) -> RgbImage {
    let Some(first) = images.first() else {
        return RgbImage::new(0, 0);
    };
    let (w, h) = first.dimensions();
    let (rows, columns) = options.into_row_column(images.len());
    let mut grid = RgbImage::new(columns as u32 * w, rows as u32 * h);
    for (i, image) in images.iter().enumerate() {
        let row = (i / columns) as i64;
        let col = (i % columns) as i64;
        imageops::replace(&mut grid, image, col * w as i64, row * h as i64);
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_auto_batch_size_2() {
        let (rows, columns) = ImageGridOptions::Auto.into_row_column(2);
        assert_eq!(rows, 2);
        assert_eq!(columns, 1);
    }

    #[test]
    fn test_auto_batch_size_3() {
        let (rows, columns) = ImageGridOptions::Auto.into_row_column(3);
        assert_eq!(rows, 2);
        assert_eq!(columns, 2);
    }

    #[test]
    fn test_auto_batch_size_16() {
        let (rows, columns) = ImageGridOptions::Auto.into_row_column(16);
        assert_eq!((rows, columns), (4, 4));
    }

    #[test]
    fn test_exact_too_small_grows_rows() {
        let (rows, columns) = ImageGridOptions::Exact { rows: 1, columns: 2 }.into_row_column(5);
        assert_eq!((rows, columns), (3, 2));
    }

    #[test]
    fn normalize_then_unnormalize_is_identity() {
        let device = NdArrayDevice::Cpu;
        let images = Tensor::<TestBackend, 4>::full([2, 3, 4, 4], 0.25, &device);
        let normalization = Normalization::CELEBA;
        let restored = normalization.unnormalize(normalization.normalize(images.clone()));
        restored.into_data().assert_approx_eq(&images.into_data(), 5);
    }

    #[test]
    fn tanh_bounds_map_to_valid_pixels() {
        let device = NdArrayDevice::Cpu;
        let images = Tensor::<TestBackend, 4>::from_floats(
            [[[[-1.0, 1.0]], [[-1.0, 1.0]], [[-1.0, 1.0]]]],
            &device,
        );
        let converted = tensor_to_images(images, &Normalization::CELEBA).unwrap();
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].dimensions(), (2, 1));
        // -1 is below zero after unnormalization for every channel
        assert_eq!(converted[0].get_pixel(0, 0).0, [0, 0, 0]);
        let expected = [
            ((0.2589_f32 + 0.5066) * 255.0).round() as u8,
            ((0.2380_f32 + 0.4261) * 255.0).round() as u8,
            ((0.2340_f32 + 0.3836) * 255.0).round() as u8,
        ];
        assert_eq!(converted[0].get_pixel(1, 0).0, expected);
    }

    #[test]
    fn grid_places_images_row_major() {
        let red = RgbImage::from_pixel(2, 2, image::Rgb([255, 0, 0]));
        let blue = RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 255]));
        let grid = image_grid(&[red, blue.clone(), blue], ImageGridOptions::Columns(2));
        assert_eq!(grid.dimensions(), (4, 4));
        assert_eq!(grid.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(grid.get_pixel(3, 0).0, [0, 0, 255]);
        assert_eq!(grid.get_pixel(1, 3).0, [0, 0, 255]);
        assert_eq!(grid.get_pixel(3, 3).0, [0, 0, 0]);
    }
}
