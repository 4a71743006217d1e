use burn::{
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
};
use nn::{
    BatchNorm, BatchNormConfig, Initializer, LeakyRelu, LeakyReluConfig, PaddingConfig2d, Sigmoid,
};
use serde::{Deserialize, Serialize};

use super::map_param;

/// How the Wasserstein critic keeps its weights bounded after each step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub enum WeightConstraint {
    /// multiply every parameter by `c`
    #[default]
    Scale,
    /// clamp every parameter to `[-c, c]`
    Clamp,
}

#[derive(Module, Debug)]
pub struct DcganDiscriminator<B: Backend> {
    pub(crate) conv1: Conv2d<B>,
    pub(crate) conv2: Conv2d<B>,
    pub(crate) bn2: BatchNorm<B, 2>,
    pub(crate) conv3: Conv2d<B>,
    pub(crate) bn3: BatchNorm<B, 2>,
    pub(crate) conv4: Conv2d<B>,
    pub(crate) bn4: BatchNorm<B, 2>,
    pub(crate) conv_out: Conv2d<B>,
    lrelu: LeakyRelu,
    sigmoid: Sigmoid,
}

#[derive(Config, Debug)]
pub struct DcganDiscriminatorConfig {
    #[config(default = "3")]
    pub in_channels: usize,
    /// Width of the first stage; the stages are 1x, 2x, 4x and 8x this.
    #[config(default = "128")]
    pub base_channels: usize,
    #[config(default = "0.02")]
    pub init_stddev: f64,
    #[config(default = "0.05")]
    pub clip_value: f64,
    #[config(default = "WeightConstraint::Scale")]
    pub weight_constraint: WeightConstraint,
}

impl DcganDiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DcganDiscriminator<B> {
        let init = Initializer::Normal {
            mean: 0.0,
            std: self.init_stddev,
        };
        let conv_cfg = |cin, cout| {
            Conv2dConfig::new([cin, cout], [4, 4])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_initializer(init.clone())
        };
        let c = self.base_channels;
        DcganDiscriminator {
            // no batch norm on the first stage
            conv1: zero_bias(conv_cfg(self.in_channels, c).init(device)),
            conv2: zero_bias(conv_cfg(c, c * 2).init(device)),
            bn2: BatchNormConfig::new(c * 2).init(device),
            conv3: zero_bias(conv_cfg(c * 2, c * 4).init(device)),
            bn3: BatchNormConfig::new(c * 4).init(device),
            conv4: zero_bias(conv_cfg(c * 4, c * 8).init(device)),
            bn4: BatchNormConfig::new(c * 8).init(device),
            // 4x4 -> 1x1 realness score
            conv_out: zero_bias(
                Conv2dConfig::new([c * 8, 1], [4, 4])
                    .with_padding(PaddingConfig2d::Valid)
                    .with_initializer(init.clone())
                    .init(device),
            ),
            lrelu: LeakyReluConfig::new().with_negative_slope(0.2).init(),
            sigmoid: Sigmoid::new(),
        }
    }
}

fn zero_bias<B: Backend>(mut conv: Conv2d<B>) -> Conv2d<B> {
    conv.bias = conv
        .bias
        .map(|bias| map_param(bias, |tensor| tensor.zeros_like()));
    conv
}

/// Applies `constraint` with bound `c` to a single parameter tensor.
pub fn constrain_tensor<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    constraint: WeightConstraint,
    c: f64,
) -> Tensor<B, D> {
    match constraint {
        WeightConstraint::Scale => tensor.mul_scalar(c),
        WeightConstraint::Clamp => tensor.clamp(-c, c),
    }
}

impl<B: Backend> DcganDiscriminator<B> {
    /// Returns the realness score in `(0, 1)`, dim [N, 1, 1, 1].
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        self.sigmoid.forward(self.forward_logits(images))
    }

    /// Pre-sigmoid realness score, dim [N, 1, 1, 1].
    pub fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.lrelu.forward(self.conv1.forward(images));
        let x = self.lrelu.forward(self.bn2.forward(self.conv2.forward(x)));
        let x = self.lrelu.forward(self.bn3.forward(self.conv3.forward(x)));
        let x = self.lrelu.forward(self.bn4.forward(self.conv4.forward(x)));
        self.conv_out.forward(x)
    }

    /// Bounds every learnable parameter (conv weights and biases, batch norm
    /// gamma and beta). Running statistics are left alone.
    pub fn clip(self, constraint: WeightConstraint, c: f64) -> Self {
        let conv = |layer: Conv2d<B>| constrain_conv(layer, constraint, c);
        let bn = |layer: BatchNorm<B, 2>| constrain_batch_norm(layer, constraint, c);
        Self {
            conv1: conv(self.conv1),
            conv2: conv(self.conv2),
            bn2: bn(self.bn2),
            conv3: conv(self.conv3),
            bn3: bn(self.bn3),
            conv4: conv(self.conv4),
            bn4: bn(self.bn4),
            conv_out: conv(self.conv_out),
            lrelu: self.lrelu,
            sigmoid: self.sigmoid,
        }
    }
}

fn constrain_conv<B: Backend>(mut conv: Conv2d<B>, constraint: WeightConstraint, c: f64) -> Conv2d<B> {
    conv.weight = map_param(conv.weight, |t| constrain_tensor(t, constraint, c));
    conv.bias = conv
        .bias
        .map(|bias| map_param(bias, |t| constrain_tensor(t, constraint, c)));
    conv
}

fn constrain_batch_norm<B: Backend>(
    mut bn: BatchNorm<B, 2>,
    constraint: WeightConstraint,
    c: f64,
) -> BatchNorm<B, 2> {
    bn.gamma = map_param(bn.gamma, |t| constrain_tensor(t, constraint, c));
    bn.beta = map_param(bn.beta, |t| constrain_tensor(t, constraint, c));
    bn
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn scale_turns_ones_into_clip_value() {
        let device = NdArrayDevice::Cpu;
        let ones = Tensor::<TestBackend, 2>::ones([3, 4], &device);
        let scaled = constrain_tensor(ones, WeightConstraint::Scale, 0.05);
        let values = scaled.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 0.05).abs() < 1e-7));
    }

    #[test]
    fn clamp_bounds_to_interval() {
        let device = NdArrayDevice::Cpu;
        let tensor = Tensor::<TestBackend, 1>::from_floats([-1.0, -0.01, 0.0, 0.02, 3.0], &device);
        let clamped = constrain_tensor(tensor, WeightConstraint::Clamp, 0.05);
        let values = clamped.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![-0.05, -0.01, 0.0, 0.02, 0.05]);
    }

    #[test]
    fn clip_scales_every_parameter() {
        let device = NdArrayDevice::Cpu;
        let discriminator: DcganDiscriminator<TestBackend> = DcganDiscriminatorConfig::new()
            .with_base_channels(4)
            .init(&device);
        let weight = discriminator.conv2.weight.val();
        let gamma = discriminator.bn3.gamma.val();

        let clipped = discriminator.clip(WeightConstraint::Scale, 0.05);

        clipped
            .conv2
            .weight
            .val()
            .into_data()
            .assert_approx_eq(&weight.mul_scalar(0.05).into_data(), 6);
        // gamma starts at one
        clipped
            .bn3
            .gamma
            .val()
            .into_data()
            .assert_approx_eq(&gamma.mul_scalar(0.05).into_data(), 6);
        // running variance starts at one and is not a parameter
        let running_var = clipped.bn3.running_var.value();
        let ones = running_var.clone().ones_like();
        running_var.into_data().assert_approx_eq(&ones.into_data(), 6);
    }
}
