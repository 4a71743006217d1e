#[cfg(test)]
mod generator {
    use burn::{
        backend::{NdArray, ndarray::NdArrayDevice},
        tensor::{Distribution, Shape, Tensor},
    };
    use celeba_dcgan::dcgan::generator::{DcganGenerator, DcganGeneratorConfig};

    type MyBackend = NdArray<f32>;

    fn small_generator(device: &NdArrayDevice) -> DcganGenerator<MyBackend> {
        DcganGeneratorConfig::new()
            .with_latent_dim(8)
            .with_base_channels(4)
            .init(device)
    }

    #[test]
    fn init() {
        let device = NdArrayDevice::Cpu;
        let _generator: DcganGenerator<MyBackend> = DcganGeneratorConfig::new().init(&device);
    }

    #[test]
    fn test_forward_and_check_shape() {
        let device = NdArrayDevice::Cpu;
        let generator = small_generator(&device);

        let z = Tensor::<MyBackend, 4>::random([2, 8, 1, 1], Distribution::Normal(0., 1.), &device);
        let result = generator.forward(z);

        assert_eq!(Shape::new([2, 3, 64, 64]), result.shape());
    }

    #[test]
    fn test_output_is_tanh_bounded() {
        let device = NdArrayDevice::Cpu;
        let generator = small_generator(&device);

        let z = Tensor::<MyBackend, 4>::random([3, 8, 1, 1], Distribution::Normal(0., 5.), &device);
        let values = generator.forward(z).into_data().to_vec::<f32>().unwrap();

        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_forward_is_deterministic() {
        let device = NdArrayDevice::Cpu;
        let generator = small_generator(&device);

        let z = Tensor::<MyBackend, 4>::random([1, 8, 1, 1], Distribution::Normal(0., 1.), &device);
        let first = generator.forward(z.clone());
        let second = generator.forward(z);

        first.into_data().assert_approx_eq(&second.into_data(), 6);
    }
}
