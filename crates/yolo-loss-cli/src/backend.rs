//! Backend used by the command-line tools.
//!
//! Picked at compile time from cargo features: `cuda`, then `wgpu`, falling
//! back to `ndarray` on the CPU.

use burn::tensor::backend::Backend;
use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        /// Backend the loss is evaluated on.
        pub type LossBackend = burn::backend::Cuda;
        /// Human-readable backend name for logs.
        pub const BACKEND_NAME: &str = "CUDA (NVIDIA GPU)";
    } else if #[cfg(feature = "wgpu")] {
        /// Backend the loss is evaluated on.
        pub type LossBackend = burn::backend::Wgpu;
        /// Human-readable backend name for logs.
        pub const BACKEND_NAME: &str = "WGPU (GPU)";
    } else {
        /// Backend the loss is evaluated on.
        pub type LossBackend = burn::backend::NdArray;
        /// Human-readable backend name for logs.
        pub const BACKEND_NAME: &str = "NdArray (CPU)";
    }
}

/// Device of [`LossBackend`].
pub type LossDevice = <LossBackend as Backend>::Device;

/// Default device of the selected backend.
pub fn default_device() -> LossDevice {
    LossDevice::default()
}
