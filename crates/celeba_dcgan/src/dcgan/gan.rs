use std::{fmt, path::PathBuf, str::FromStr};

use burn::{
    module::AutodiffModule,
    nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig},
    optim::{GradientsParams, Optimizer},
    prelude::*,
    record::{FileRecorder, RecorderError},
    tensor::{TensorData, activation::sigmoid, backend::AutodiffBackend, cast::ToElement},
};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    discriminator::{DcganDiscriminator, DcganDiscriminatorConfig},
    generator::{DcganGenerator, DcganGeneratorConfig},
};

/// Number of frames produced by [`Dcgan::interpolate`].
pub const INTERPOLATION_FRAMES: usize = 11;

/// Adversarial objective used by both training steps.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossVariant {
    /// minimax game on binary cross-entropy
    Original,
    /// critic score difference, paired with a weight constraint on the critic
    Wasserstein,
    /// least squares GAN, accepted as a name but not implemented
    LeastSquares,
}

impl LossVariant {
    pub fn name(&self) -> &'static str {
        match self {
            LossVariant::Original => "og",
            LossVariant::Wasserstein => "wasserstein",
            LossVariant::LeastSquares => "lsgan",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LossVariant::Original => "Deep convolutional GAN (min_G max_D)",
            LossVariant::Wasserstein => "Wasserstein GAN (WGAN)",
            LossVariant::LeastSquares => "Least squares GAN (LSGAN)",
        }
    }
}

impl fmt::Display for LossVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LossVariant {
    type Err = GanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "og" | "gan" => Ok(Self::Original),
            "wasserstein" | "wgan" => Ok(Self::Wasserstein),
            "lsgan" => Ok(Self::LeastSquares),
            anything_else => Err(GanError::NotImplemented(format!(
                "the {anything_else:?} loss"
            ))),
        }
    }
}

#[derive(Debug, Error)]
pub enum GanError {
    #[error("{} is not implemented", .0)]
    NotImplemented(String),
    #[error("Expected a batch of {} images but got {}", .expected, .actual)]
    BatchSizeMismatch { expected: usize, actual: usize },
}

#[derive(Config, Debug)]
pub struct DcganConfig {
    pub generator_config: DcganGeneratorConfig,
    pub discriminator_config: DcganDiscriminatorConfig,
    #[config(default = "LossVariant::Original")]
    pub loss: LossVariant,
    #[config(default = "128")]
    pub batch_size: usize,
}

impl DcganConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Dcgan<B> {
        Dcgan::from_parts(
            self.generator_config.init(device),
            self.discriminator_config.init(device),
            self.clone(),
            device,
        )
    }
}

/// Generator/discriminator pair plus everything both training steps share.
#[derive(Debug, Clone)]
pub struct Dcgan<B: Backend> {
    pub generator: DcganGenerator<B>,
    pub discriminator: DcganDiscriminator<B>,
    config: DcganConfig,
    y_real: Tensor<B, 1, Int>,
    y_fake: Tensor<B, 1, Int>,
    bce_loss: BinaryCrossEntropyLoss<B>,
    device: B::Device,
}

impl<B: Backend> Dcgan<B> {
    pub fn from_parts(
        generator: DcganGenerator<B>,
        discriminator: DcganDiscriminator<B>,
        config: DcganConfig,
        device: &B::Device,
    ) -> Self {
        Self {
            generator,
            discriminator,
            y_real: Tensor::ones([config.batch_size], device),
            y_fake: Tensor::zeros([config.batch_size], device),
            bce_loss: BinaryCrossEntropyLossConfig::new()
                .with_logits(true)
                .init(device),
            config,
            device: device.clone(),
        }
    }

    pub fn config(&self) -> &DcganConfig {
        &self.config
    }

    pub fn loss(&self) -> LossVariant {
        self.config.loss
    }

    pub fn latent_dim(&self) -> usize {
        self.config.generator_config.latent_dim
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Parameter counts as `(discriminator, generator)`.
    pub fn num_params(&self) -> (usize, usize) {
        (self.discriminator.num_params(), self.generator.num_params())
    }

    /// Standard normal latent batch, dim [N, latent_dim, 1, 1].
    pub fn create_latent_variable<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Tensor<B, 4> {
        let latent_dim = self.latent_dim();
        let values: Vec<f32> = (0..batch_size * latent_dim)
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect();
        Tensor::from_data(
            TensorData::new(values, [batch_size, latent_dim, 1, 1]),
            &self.device,
        )
    }

    /// Discriminator output flattened to one score in `(0, 1)` per image.
    pub fn score(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        sigmoid(self.logits(images))
    }

    /// Pre-sigmoid discriminator output, one value per image.
    pub fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        self.discriminator.forward_logits(images).flatten::<1>(0, 3)
    }

    /// Takes discriminator logits. The original loss applies BCE on the
    /// logits directly, the Wasserstein loss works on the sigmoid scores.
    pub fn discriminator_loss(
        &self,
        real_logits: Tensor<B, 1>,
        fake_logits: Tensor<B, 1>,
    ) -> Result<Tensor<B, 1>, GanError> {
        match self.config.loss {
            LossVariant::Original => {
                let real_loss = self.bce_loss.forward(real_logits, self.y_real.clone());
                let fake_loss = self.bce_loss.forward(fake_logits, self.y_fake.clone());
                Ok(real_loss + fake_loss)
            }
            LossVariant::Wasserstein => {
                let real_loss = sigmoid(real_logits).mean().neg();
                let fake_loss = sigmoid(fake_logits).mean().neg();
                Ok(real_loss - fake_loss)
            }
            LossVariant::LeastSquares => Err(self.not_implemented()),
        }
    }

    /// Takes discriminator logits of generated images.
    pub fn generator_loss(&self, fake_logits: Tensor<B, 1>) -> Result<Tensor<B, 1>, GanError> {
        match self.config.loss {
            LossVariant::Original => Ok(self.bce_loss.forward(fake_logits, self.y_real.clone())),
            LossVariant::Wasserstein => Ok(sigmoid(fake_logits).mean().neg()),
            LossVariant::LeastSquares => Err(self.not_implemented()),
        }
    }

    fn not_implemented(&self) -> GanError {
        GanError::NotImplemented(format!("training with the {} loss", self.config.loss))
    }

    /// Runs the generator only, dim [N, 3, 64, 64].
    pub fn generate_images(&self, latent: Tensor<B, 4>) -> Tensor<B, 4> {
        self.generator.forward(latent)
    }

    /// `latent` must hold a single vector; returns dim [3, 64, 64].
    pub fn generate_image(&self, latent: Tensor<B, 4>) -> Tensor<B, 3> {
        self.generate_images(latent).squeeze::<3>(0)
    }

    pub fn sample_image<R: Rng>(&self, rng: &mut R) -> Tensor<B, 3> {
        let latent = self.create_latent_variable(1, rng);
        self.generate_image(latent)
    }

    /// Decodes `(1 - a) * z0 + a * z1` for a = 0.0, 0.1, ..., 1.0.
    pub fn interpolate(&self, z0: Tensor<B, 4>, z1: Tensor<B, 4>) -> Vec<Tensor<B, 3>> {
        let steps = INTERPOLATION_FRAMES - 1;
        (0..INTERPOLATION_FRAMES)
            .map(|i| {
                let alpha = i as f64 / steps as f64;
                let z = z0.clone().mul_scalar(1.0 - alpha) + z1.clone().mul_scalar(alpha);
                self.generate_image(z)
            })
            .collect()
    }

    pub fn save_generator<R: FileRecorder<B>>(
        &self,
        file_path: impl Into<PathBuf>,
        recorder: &R,
    ) -> Result<(), RecorderError> {
        self.generator.clone().save_file(file_path, recorder)
    }

    pub fn load_generator<R: FileRecorder<B>>(
        mut self,
        file_path: impl Into<PathBuf>,
        recorder: &R,
    ) -> Result<Self, RecorderError> {
        self.generator = self.generator.load_file(file_path, recorder, &self.device)?;
        Ok(self)
    }
}

impl<B: AutodiffBackend> Dcgan<B> {
    /// One generator update on a fresh latent batch. Returns the loss.
    pub fn train_generator<O, R>(
        &mut self,
        optimizer: &mut O,
        learning_rate: f64,
        rng: &mut R,
    ) -> Result<f64, GanError>
    where
        O: Optimizer<DcganGenerator<B>, B>,
        R: Rng,
    {
        let latent = self.create_latent_variable(self.batch_size(), rng);
        let fake_logits = self.logits(self.generator.forward(latent));
        let loss = self.generator_loss(fake_logits)?;
        let loss_value = loss.clone().into_scalar().to_f64();

        let grads = GradientsParams::from_grads(loss.backward(), &self.generator);
        self.generator = optimizer.step(learning_rate, self.generator.clone(), grads);
        Ok(loss_value)
    }

    /// One discriminator update on `real_images` against a fresh fake batch.
    /// Returns the loss.
    pub fn train_discriminator<O, R>(
        &mut self,
        real_images: Tensor<B, 4>,
        optimizer: &mut O,
        learning_rate: f64,
        rng: &mut R,
    ) -> Result<f64, GanError>
    where
        O: Optimizer<DcganDiscriminator<B>, B>,
        R: Rng,
    {
        let [actual, _, _, _] = real_images.dims();
        if actual != self.batch_size() {
            return Err(GanError::BatchSizeMismatch {
                expected: self.batch_size(),
                actual,
            });
        }
        let real_logits = self.logits(real_images);

        let latent = self.create_latent_variable(self.batch_size(), rng);
        // IMPORTANT: the generator is not part of this update.
        let fake_images = self.generator.forward(latent).detach();
        let fake_logits = self.logits(fake_images);

        let loss = self.discriminator_loss(real_logits, fake_logits)?;
        let loss_value = loss.clone().into_scalar().to_f64();

        let grads = GradientsParams::from_grads(loss.backward(), &self.discriminator);
        self.discriminator = optimizer.step(learning_rate, self.discriminator.clone(), grads);

        if self.config.loss == LossVariant::Wasserstein {
            let discriminator_config = &self.config.discriminator_config;
            self.discriminator = self.discriminator.clone().clip(
                discriminator_config.weight_constraint,
                discriminator_config.clip_value,
            );
        }
        Ok(loss_value)
    }

    /// Same container on the inner backend: no gradient tracking, batch
    /// norm switches to its running statistics.
    pub fn valid(&self) -> Dcgan<B::InnerBackend> {
        let generator = self.generator.valid();
        let discriminator = self.discriminator.valid();
        let device = generator.conv_t1.weight.val().device();
        Dcgan::from_parts(generator, discriminator, self.config.clone(), &device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray, ndarray::NdArrayDevice},
        optim::AdamConfig,
        tensor::Distribution,
    };
    use rand::{SeedableRng, rngs::StdRng};

    type TestBackend = Autodiff<NdArray<f32>>;

    type Critic = DcganDiscriminator<TestBackend>;

    /// Critic before and after one step with a zero learning rate.
    fn critic_step(loss: LossVariant) -> (Critic, Critic) {
        let device = NdArrayDevice::Cpu;
        let config = DcganConfig::new(
            DcganGeneratorConfig::new()
                .with_latent_dim(8)
                .with_base_channels(4),
            DcganDiscriminatorConfig::new().with_base_channels(4),
        )
        .with_loss(loss)
        .with_batch_size(2);
        let mut gan: Dcgan<TestBackend> = config.init(&device);
        let before = gan.discriminator.clone();
        let mut optimizer = AdamConfig::new().init::<TestBackend, DcganDiscriminator<_>>();
        let real = Tensor::random([2, 3, 64, 64], Distribution::Uniform(-1., 1.), &device);

        gan.train_discriminator(real, &mut optimizer, 0.0, &mut StdRng::seed_from_u64(0))
            .unwrap();
        (before, gan.discriminator)
    }

    #[test]
    fn wasserstein_step_scales_the_critic() {
        let (before, after) = critic_step(LossVariant::Wasserstein);

        after
            .bn3
            .gamma
            .val()
            .into_data()
            .assert_approx_eq(&before.bn3.gamma.val().mul_scalar(0.05).into_data(), 6);
        after
            .conv2
            .weight
            .val()
            .into_data()
            .assert_approx_eq(&before.conv2.weight.val().mul_scalar(0.05).into_data(), 6);
    }

    #[test]
    fn original_step_leaves_the_critic_unscaled() {
        let (before, after) = critic_step(LossVariant::Original);

        after
            .bn3
            .gamma
            .val()
            .into_data()
            .assert_approx_eq(&before.bn3.gamma.val().into_data(), 6);
        after
            .conv2
            .weight
            .val()
            .into_data()
            .assert_approx_eq(&before.conv2.weight.val().into_data(), 6);
    }
}
