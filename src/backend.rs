//! Backend selection.
//!
//! The CUDA backend runs the forward/backward passes in f16 for throughput;
//! the loss scaler in `training::scaler` keeps gradients out of the underflow
//! range. The NdArray backend is the f32 CPU fallback used by tests and by
//! machines without a GPU.

use burn::backend::Autodiff;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda<burn::tensor::f16, i32>;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn::backend::NdArray;

/// Autodiff wrapper of the default backend, used for training.
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Default device for the selected backend.
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    #[cfg(feature = "cuda")]
    {
        burn_cuda::CudaDevice::default()
    }
    #[cfg(not(feature = "cuda"))]
    {
        burn::backend::ndarray::NdArrayDevice::default()
    }
}

/// Human-readable name for the compiled-in backend.
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (f16)"
    }
    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU, f32)"
    }
}
