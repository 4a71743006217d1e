use std::panic::{self, AssertUnwindSafe};

use burn::{
    backend::{Wgpu, wgpu::WgpuDevice},
    tensor::Tensor,
};
use log::warn;

/// Backend a binary ends up running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    Wgpu,
    NdArray,
}

/// Allocates and reads back a one element tensor on the default wgpu
/// device. burn-wgpu panics here when no adapter can be found.
pub fn touch_wgpu_device() {
    let device = WgpuDevice::DefaultDevice;
    let _ = Tensor::<Wgpu<f32, i32>, 1>::zeros([1], &device).into_data();
}

/// `NdArray` unless `gpu` is requested and `check` runs without panicking.
/// A failed check falls back to `NdArray` with a warning.
pub fn select_backend<F: FnOnce()>(gpu: bool, check: F) -> BackendChoice {
    if !gpu {
        return BackendChoice::NdArray;
    }
    let hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let checked = panic::catch_unwind(AssertUnwindSafe(check));
    panic::set_hook(hook);

    match checked {
        Ok(()) => BackendChoice::Wgpu,
        Err(_) => {
            warn!("No wgpu adapter available, falling back to the CPU backend");
            BackendChoice::NdArray
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_unless_requested() {
        let choice = select_backend(false, || panic!("the device must not be touched"));
        assert_eq!(choice, BackendChoice::NdArray);
    }

    #[test]
    fn gpu_when_the_device_answers() {
        assert_eq!(select_backend(true, || {}), BackendChoice::Wgpu);
    }

    #[test]
    fn falls_back_when_no_adapter() {
        let choice = select_backend(true, || panic!("No possible adapter available"));
        assert_eq!(choice, BackendChoice::NdArray);
    }
}
