//! Self-test: evaluates the loss on synthetic tensors.
//!
//! The target marks every cell as containing an object with unit box
//! coordinates, the predictions are standard normal noise. A healthy build
//! produces one finite, non-negative loss value.

use std::collections::HashMap;

use anyhow::{ensure, Result};
use burn::tensor::{backend::Backend, Distribution, Tensor};
use yolo_loss::{YoloLossConfig, BOX_ATTRIBUTES};

/// Inputs of a self-test run.
#[derive(Debug, Clone)]
pub struct SelfTestConfig {
    /// Loss hyperparameters.
    pub loss: YoloLossConfig,
    /// Number of synthetic images.
    pub batch_size: usize,
    /// Seed for the backend RNG; unseeded when `None`.
    pub seed: Option<u64>,
}

impl SelfTestConfig {
    /// Creates a self-test configuration.
    pub const fn new(loss: YoloLossConfig, batch_size: usize, seed: Option<u64>) -> Self {
        Self {
            loss,
            batch_size,
            seed,
        }
    }
}

/// Outcome of a self-test run.
#[derive(Debug, Clone)]
pub struct SelfTestReport {
    /// Shape of the target tensor, `[N, S, S, 5 * B]`.
    pub target_shape: [usize; 4],
    /// Shape of the prediction tensor, `[N, S * S * 5 * B]`.
    pub prediction_shape: [usize; 2],
    /// Batch-mean loss.
    pub loss: f64,
    /// Unweighted batch-summed terms plus `total`.
    pub terms: HashMap<String, f64>,
}

/// Runs the loss once on synthetic tensors.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the batch is empty, or
/// the loss is not a finite non-negative number.
pub fn run_self_test<B: Backend>(config: &SelfTestConfig, device: &B::Device) -> Result<SelfTestReport> {
    config.loss.validate()?;
    ensure!(config.batch_size > 0, "batch size must be at least 1");

    if let Some(seed) = config.seed {
        B::seed(seed);
    }

    let s = config.loss.grid_size;
    let channels = BOX_ATTRIBUTES * config.loss.num_boxes;
    let target_shape = [config.batch_size, s, s, channels];
    let prediction_shape = [config.batch_size, s * s * channels];

    let target = Tensor::<B, 4>::ones(target_shape, device);
    let predictions =
        Tensor::<B, 2>::random(prediction_shape, Distribution::Normal(0.0, 1.0), device);
    tracing::debug!(?target_shape, ?prediction_shape, "synthetic tensors created");

    let loss = config.loss.init();
    loss.check_shapes(&predictions, &target)?;
    let terms = loss.forward_detailed(predictions, target).into_loss_dict();
    let value = terms["total"];

    ensure!(
        value.is_finite() && value >= 0.0,
        "loss must be finite and non-negative, got {value}"
    );

    Ok(SelfTestReport {
        target_shape,
        prediction_shape,
        loss: value,
        terms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, LossBackend};

    #[test]
    fn self_test_default_grid_produces_finite_loss() {
        let config = SelfTestConfig::new(YoloLossConfig::new(), 13, Some(7));

        let report = run_self_test::<LossBackend>(&config, &default_device()).expect("self-test");

        assert_eq!(report.target_shape, [13, 7, 7, 10]);
        assert_eq!(report.prediction_shape, [13, 490]);
        assert!(report.loss.is_finite() && report.loss >= 0.0);
        assert_eq!(report.terms.len(), 4);
        // Every cell holds an object, so nothing is suppressed.
        assert_eq!(report.terms["no_object"], 0.0);
    }

    #[test]
    fn self_test_follows_configured_grid() {
        let loss = YoloLossConfig::new().with_grid_size(4).with_num_boxes(3);
        let config = SelfTestConfig::new(loss, 2, None);

        let report = run_self_test::<LossBackend>(&config, &default_device()).expect("self-test");

        assert_eq!(report.target_shape, [2, 4, 4, 15]);
        assert_eq!(report.prediction_shape, [2, 240]);
    }

    #[test]
    fn self_test_rejects_empty_batch() {
        let config = SelfTestConfig::new(YoloLossConfig::new(), 0, None);

        let err = run_self_test::<LossBackend>(&config, &default_device()).unwrap_err();

        assert!(err.to_string().contains("batch size"), "got {err}");
    }

    #[test]
    fn self_test_rejects_invalid_configuration() {
        let config = SelfTestConfig::new(YoloLossConfig::new().with_grid_size(0), 1, None);

        assert!(run_self_test::<LossBackend>(&config, &default_device()).is_err());
    }
}
