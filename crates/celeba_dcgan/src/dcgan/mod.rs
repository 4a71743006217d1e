pub mod discriminator;
pub mod gan;
pub mod generator;
pub mod interpolation;
pub mod training;

use burn::{module::Param, prelude::Backend, tensor::Tensor};

/// Replaces the value of a parameter, keeping its id and its autodiff leaf status.
pub(crate) fn map_param<B: Backend, const D: usize>(
    param: Param<Tensor<B, D>>,
    func: impl FnOnce(Tensor<B, D>) -> Tensor<B, D>,
) -> Param<Tensor<B, D>> {
    param.map(|tensor| {
        let require_grad = tensor.is_require_grad();
        func(tensor.detach()).set_require_grad(require_grad)
    })
}
