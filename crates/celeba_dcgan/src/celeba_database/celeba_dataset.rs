use burn::data::dataset::Dataset;
use image::RgbImage;
use log::info;
use ron::de::{SpannedError, from_reader};
use ron::ser::to_writer;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use walkdir::WalkDir;

use crate::util::Normalization;

/// Size of the reduced set used for quick runs.
pub const REDUX_SIZE: usize = 10_000;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CelebaItem {
    pub image: PathBuf,
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("failed to load image due to {:?}", .0)]
    LoadingError(#[from] io::Error),
    #[error("Failed to decode image due to {:?}", .0)]
    DecodingError(#[from] image::error::ImageError),
}

impl CelebaItem {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
        }
    }

    pub fn load_image(&self) -> Result<RgbImage, ImageError> {
        let image = image::ImageReader::open(&self.image)?.decode()?;
        Ok(image.into_rgb8())
    }
}

#[derive(Error, Debug)]
pub enum CelebaDatasetError {
    #[error("The path {} is not valid because {}", .path, .reason)]
    InvalidPath { path: String, reason: String },
    #[error("No images found below {}", .0)]
    EmptyDataset(String),
    #[error("Unable to deserialize ron file due to {:?}", .0)]
    RonDeserializationError(#[from] SpannedError),
    #[error("Unable load ron file due to {:?}", .0)]
    RonFileLoadingError(#[from] io::Error),
    #[error("Unable to serialize ron file due to {:?}", .0)]
    RonSerializationError(#[from] ron::error::Error),
}

/// Flat list of face images, CelebA's `img_align_celeba` layout or any
/// other folder of pictures.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct CelebaDataset {
    items: Vec<CelebaItem>,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

impl CelebaDataset {
    /// Scans `root` recursively in file name order. `limit` keeps only the
    /// first images.
    pub fn new(root: &Path, limit: Option<usize>) -> Result<Self, CelebaDatasetError> {
        if !(root.exists() && root.is_dir()) {
            return Err(CelebaDatasetError::InvalidPath {
                path: format!("{:?}", root),
                reason: "the image path does not exist or is not a directory".into(),
            });
        }
        let items: Vec<CelebaItem> = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .flat_map(Result::ok)
            .filter(|e| e.file_type().is_file() && is_image(e.path()))
            .take(limit.unwrap_or(usize::MAX))
            .map(|e| CelebaItem::new(e.path()))
            .collect();

        if items.is_empty() {
            return Err(CelebaDatasetError::EmptyDataset(format!("{:?}", root)));
        }
        info!("Found {} images below {:?}", items.len(), root);
        Ok(Self { items })
    }

    pub fn from_items(items: Vec<CelebaItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[CelebaItem] {
        &self.items
    }

    /// Per channel mean and standard deviation of the pixels in `[0, 1]`.
    /// Each image contributes its own channel mean and (unbiased) std; the
    /// result is the average of those over the set, not pooled pixel stats.
    pub fn channel_statistics(&self) -> Result<Normalization, ImageError> {
        let mut means = [0f64; 3];
        let mut stds = [0f64; 3];
        for (i, item) in self.items.iter().enumerate() {
            let image = item.load_image()?;
            let (mean, std) = image_channel_statistics(&image);
            for c in 0..3 {
                means[c] += mean[c];
                stds[c] += std[c];
            }
            if (i + 1) % 1000 == 0 {
                info!("{} images processed", i + 1);
            }
        }
        let n = self.items.len().max(1) as f64;
        Ok(Normalization {
            mean: means.map(|m| (m / n) as f32),
            std: stds.map(|s| (s / n) as f32),
        })
    }

    pub fn save_to_ron(&self, path: &Path) -> Result<(), CelebaDatasetError> {
        if path.exists() {
            if path.is_dir() {
                return Err(CelebaDatasetError::InvalidPath {
                    path: format!("{:?}", path),
                    reason: "Invalid Path. Please enter a .ron path".into(),
                });
            }
            info!("Replacing {:?}", path);
            fs::remove_file(path)?;
        }
        to_writer(File::create_new(path)?, self)?;
        Ok(())
    }

    pub fn load_from_ron(path: &Path) -> Result<Self, CelebaDatasetError> {
        if !path.is_file() {
            return Err(CelebaDatasetError::InvalidPath {
                path: format!("{:?}", path),
                reason: "The path does not lead to a valid .ron file".into(),
            });
        }
        Ok(from_reader(File::open(path)?)?)
    }
}

/// Channel means and unbiased stds of a single image, pixels in `[0, 1]`.
fn image_channel_statistics(image: &RgbImage) -> ([f64; 3], [f64; 3]) {
    let n = (image.width() * image.height()) as f64;
    let mut sum = [0f64; 3];
    let mut sum_sq = [0f64; 3];
    for pixel in image.pixels() {
        for c in 0..3 {
            let v = pixel.0[c] as f64 / 255.;
            sum[c] += v;
            sum_sq[c] += v * v;
        }
    }
    let mut mean = [0f64; 3];
    let mut std = [0f64; 3];
    if n == 0. {
        return (mean, std);
    }
    for c in 0..3 {
        mean[c] = sum[c] / n;
        if n > 1. {
            std[c] = ((sum_sq[c] - n * mean[c] * mean[c]) / (n - 1.)).max(0.).sqrt();
        }
    }
    (mean, std)
}

impl Dataset<CelebaItem> for CelebaDataset {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Option<CelebaItem> {
        self.items.get(index).cloned()
    }
}
