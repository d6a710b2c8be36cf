//! Dynamic loss scaling for mixed-precision training.
//!
//! With a reduced-precision backend the loss is multiplied by a large scale
//! before the backward pass so small gradients survive the limited exponent
//! range. Gradients are unscaled before the optimizer step; if any gradient
//! came out non-finite the step is skipped and the scale backs off, while a
//! long run of clean steps grows it again.

use std::marker::PhantomData;

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use tracing::debug;

/// Dynamic gradient scaler.
#[derive(Debug, Clone)]
pub struct GradScaler {
    scale: f32,
    growth_factor: f32,
    backoff_factor: f32,
    growth_interval: usize,
    steps_since_overflow: usize,
}

impl Default for GradScaler {
    fn default() -> Self {
        Self {
            scale: 65536.0,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
            steps_since_overflow: 0,
        }
    }
}

impl GradScaler {
    /// Current loss scale.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Multiply the loss by the current scale before `backward()`.
    pub fn scale_loss<B: AutodiffBackend>(&self, loss: Tensor<B, 1>) -> Tensor<B, 1> {
        loss.mul_scalar(self.scale)
    }

    /// Divide all gradients by the current scale in place.
    ///
    /// Returns `false` if any gradient is non-finite, in which case the
    /// optimizer step must be skipped for this batch.
    pub fn unscale<B, M>(&self, model: &M, grads: &mut GradientsParams) -> bool
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        let mut visitor = UnscaleVisitor::<B> {
            grads,
            inv_scale: 1.0 / self.scale,
            found_non_finite: false,
            _backend: PhantomData,
        };
        model.visit(&mut visitor);
        !visitor.found_non_finite
    }

    /// Advance the scaler state after a batch.
    pub fn update(&mut self, overflowed: bool) {
        if overflowed {
            self.scale *= self.backoff_factor;
            self.steps_since_overflow = 0;
            debug!(scale = self.scale, "gradient overflow, loss scale backed off");
        } else {
            self.steps_since_overflow += 1;
            if self.steps_since_overflow >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.steps_since_overflow = 0;
                debug!(scale = self.scale, "loss scale grown");
            }
        }
    }
}

struct UnscaleVisitor<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    inv_scale: f32,
    found_non_finite: bool,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for UnscaleVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            let magnitude = grad.clone().abs().sum().into_scalar().elem::<f32>();
            if !magnitude.is_finite() {
                self.found_non_finite = true;
            }
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.inv_scale));
        }
    }
}
