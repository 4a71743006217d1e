use burn::{
    data::dataloader::batcher::Batcher,
    prelude::Backend,
    tensor::{Tensor, TensorData},
};
use image::imageops::FilterType;
use log::warn;

use crate::util::Normalization;

use super::celeba_dataset::CelebaItem;

#[derive(Clone, Debug)]
pub struct CelebaBatch<B: Backend> {
    /// normalized, dim [N, 3, image_size, image_size]
    pub images: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct CelebaBatcher<B: Backend> {
    device: B::Device,
    image_size: u32,
    normalization: Normalization,
}

impl<B: Backend> CelebaBatcher<B> {
    pub fn new(device: B::Device, image_size: u32, normalization: Normalization) -> Self {
        Self {
            device,
            image_size,
            normalization,
        }
    }
}

impl<B: Backend> Batcher<CelebaItem, CelebaBatch<B>> for CelebaBatcher<B> {
    /// Images that fail to load are dropped, so the batch may come out
    /// smaller than `items`.
    fn batch(&self, items: Vec<CelebaItem>) -> CelebaBatch<B> {
        let size = self.image_size;
        let images: Vec<Tensor<B, 4>> = items
            .iter()
            .filter_map(|item| match item.load_image() {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!("Skipping {:?}: {}", item.image, e);
                    None
                }
            })
            .map(|image| {
                let image = if image.dimensions() == (size, size) {
                    image
                } else {
                    image::imageops::resize(&image, size, size, FilterType::Triangle)
                };
                let pixels: Vec<f32> = image.into_raw().iter().map(|p| *p as f32 / 255.).collect();
                let data = TensorData::new(pixels, [1, size as usize, size as usize, 3]);
                Tensor::<B, 4>::from_data(data, &self.device)
            })
            .collect();

        if images.is_empty() {
            let size = size as usize;
            return CelebaBatch {
                images: Tensor::zeros([0, 3, size, size], &self.device),
            };
        }
        let images = Tensor::cat(images, 0).permute([0, 3, 1, 2]);
        CelebaBatch {
            images: self.normalization.normalize(images),
        }
    }
}
