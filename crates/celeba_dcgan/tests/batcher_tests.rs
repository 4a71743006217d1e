#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use burn::{
        backend::{NdArray, ndarray::NdArrayDevice},
        data::dataloader::batcher::Batcher,
        tensor::Shape,
    };
    use celeba_dcgan::{
        celeba_database::{
            celeba_batcher::{CelebaBatch, CelebaBatcher},
            celeba_dataset::CelebaItem,
        },
        util::Normalization,
    };

    type TestBackend = NdArray<f32>;

    fn solid_image(name: &str, rgb: [u8; 3]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("celeba_dcgan_batcher_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{name}.png"));
        image::RgbImage::from_pixel(8, 8, image::Rgb(rgb))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_shape() {
        let device = NdArrayDevice::Cpu;
        let batcher = CelebaBatcher::<TestBackend>::new(device, 16, Normalization::CELEBA);
        let items = vec![
            CelebaItem::new(solid_image("shape_a", [255, 0, 0])),
            CelebaItem::new(solid_image("shape_b", [0, 255, 0])),
        ];

        let b: CelebaBatch<TestBackend> = batcher.batch(items);

        assert_eq!(Shape::new([2, 3, 16, 16]), b.images.shape());
    }

    #[test]
    fn test_pixels_are_normalized() {
        let device = NdArrayDevice::Cpu;
        let normalization = Normalization::CELEBA;
        let batcher = CelebaBatcher::<TestBackend>::new(device, 8, normalization);
        let rgb = [128u8, 64, 32];

        let b: CelebaBatch<TestBackend> =
            batcher.batch(vec![CelebaItem::new(solid_image("normalized", rgb))]);

        let values = b.images.into_data().to_vec::<f32>().unwrap();
        for c in 0..3 {
            let expected = (rgb[c] as f32 / 255. - normalization.mean[c]) / normalization.std[c];
            let channel = &values[c * 64..(c + 1) * 64];
            assert!(channel.iter().all(|v| (v - expected).abs() < 1e-4));
        }
    }

    #[test]
    fn test_unreadable_images_are_skipped() {
        let device = NdArrayDevice::Cpu;
        let batcher = CelebaBatcher::<TestBackend>::new(device, 8, Normalization::CELEBA);
        let items = vec![
            CelebaItem::new(solid_image("skipped_ok", [1, 2, 3])),
            CelebaItem::new("/definitely/not/here.png"),
        ];

        let b: CelebaBatch<TestBackend> = batcher.batch(items);
        assert_eq!(Shape::new([1, 3, 8, 8]), b.images.shape());

        let b: CelebaBatch<TestBackend> =
            batcher.batch(vec![CelebaItem::new("/definitely/not/here.png")]);
        assert_eq!(Shape::new([0, 3, 8, 8]), b.images.shape());
    }
}
