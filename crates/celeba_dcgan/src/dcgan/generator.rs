use burn::{
    config::Config,
    module::Module,
    nn::{
        BatchNorm, BatchNormConfig, Initializer, Relu, Tanh,
        conv::{ConvTranspose2d, ConvTranspose2dConfig},
    },
    prelude::Backend,
    tensor::Tensor,
};

use super::map_param;

/// DCGAN generator G(z): projects a `[N, latent_dim, 1, 1]` latent onto a
/// 4x4 map, then doubles the resolution four times up to a 64x64 RGB image.
#[derive(Module, Debug)]
pub struct DcganGenerator<B: Backend> {
    pub(crate) conv_t1: ConvTranspose2d<B>,
    pub(crate) bn1: BatchNorm<B, 2>,
    pub(crate) conv_t2: ConvTranspose2d<B>,
    pub(crate) bn2: BatchNorm<B, 2>,
    pub(crate) conv_t3: ConvTranspose2d<B>,
    pub(crate) bn3: BatchNorm<B, 2>,
    pub(crate) conv_t4: ConvTranspose2d<B>,
    pub(crate) bn4: BatchNorm<B, 2>,
    pub(crate) conv_t_out: ConvTranspose2d<B>,
    relu: Relu,
    tanh: Tanh,
}

#[derive(Config, Debug)]
pub struct DcganGeneratorConfig {
    #[config(default = "100")]
    pub latent_dim: usize,
    /// Width of the last hidden stage; the stages are 8x, 4x, 2x and 1x this.
    #[config(default = "128")]
    pub base_channels: usize,
    #[config(default = "3")]
    pub out_channels: usize,
    #[config(default = "0.02")]
    pub init_stddev: f64,
}

impl DcganGeneratorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DcganGenerator<B> {
        let init = Initializer::Normal {
            mean: 0.0,
            std: self.init_stddev,
        };
        let conv_t_cfg = |cin, cout| {
            ConvTranspose2dConfig::new([cin, cout], [4, 4])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_initializer(init.clone())
        };
        let c = self.base_channels;
        DcganGenerator {
            // projection: stride 1, no padding, 1x1 -> 4x4
            conv_t1: zero_bias(
                ConvTranspose2dConfig::new([self.latent_dim, c * 8], [4, 4])
                    .with_initializer(init.clone())
                    .init(device),
            ),
            bn1: BatchNormConfig::new(c * 8).init(device),
            conv_t2: zero_bias(conv_t_cfg(c * 8, c * 4).init(device)),
            bn2: BatchNormConfig::new(c * 4).init(device),
            conv_t3: zero_bias(conv_t_cfg(c * 4, c * 2).init(device)),
            bn3: BatchNormConfig::new(c * 2).init(device),
            conv_t4: zero_bias(conv_t_cfg(c * 2, c).init(device)),
            bn4: BatchNormConfig::new(c).init(device),
            conv_t_out: zero_bias(conv_t_cfg(c, self.out_channels).init(device)),
            relu: Relu::new(),
            tanh: Tanh::new(),
        }
    }
}

/// burn draws conv biases from the same initializer as the weights.
fn zero_bias<B: Backend>(mut conv: ConvTranspose2d<B>) -> ConvTranspose2d<B> {
    conv.bias = conv
        .bias
        .map(|bias| map_param(bias, |tensor| tensor.zeros_like()));
    conv
}

impl<B: Backend> DcganGenerator<B> {
    pub fn forward(&self, z: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.bn1.forward(self.conv_t1.forward(z))); // 8c @ 4x4
        let x = self.relu.forward(self.bn2.forward(self.conv_t2.forward(x))); // 4c @ 8x8
        let x = self.relu.forward(self.bn3.forward(self.conv_t3.forward(x))); // 2c @ 16x16
        let x = self.relu.forward(self.bn4.forward(self.conv_t4.forward(x))); // c @ 32x32
        self.tanh.forward(self.conv_t_out.forward(x)) // 3 @ 64x64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    type TestBackend = NdArray<f32>;

    fn values(tensor: Tensor<TestBackend, 4>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn biases_start_at_zero() {
        let device = NdArrayDevice::Cpu;
        let generator: DcganGenerator<TestBackend> = DcganGeneratorConfig::new()
            .with_latent_dim(8)
            .with_base_channels(4)
            .init(&device);
        for conv in [
            &generator.conv_t1,
            &generator.conv_t2,
            &generator.conv_t3,
            &generator.conv_t4,
            &generator.conv_t_out,
        ] {
            let bias = conv.bias.as_ref().unwrap().val();
            let bias = bias.into_data().to_vec::<f32>().unwrap();
            assert!(bias.iter().all(|b| *b == 0.0));
        }
    }

    #[test]
    fn weights_follow_init_stddev() {
        let device = NdArrayDevice::Cpu;
        let generator: DcganGenerator<TestBackend> = DcganGeneratorConfig::new()
            .with_latent_dim(8)
            .with_base_channels(8)
            .init(&device);
        // 64 x 32 x 4 x 4 samples
        let weights = values(generator.conv_t2.weight.val());
        let n = weights.len() as f32;
        let mean = weights.iter().sum::<f32>() / n;
        let std = (weights.iter().map(|w| (w - mean).powi(2)).sum::<f32>() / n).sqrt();
        assert!(mean.abs() < 0.002, "mean {mean}");
        assert!((std - 0.02).abs() < 0.002, "std {std}");
    }
}
