//! YOLO v1 grid loss.
//!
//! Predictions hold, for each of the `S x S` grid cells, `B` candidate boxes
//! laid out as `[obj, x, y, w, h]`. Targets hold one ground-truth box per
//! cell as `[indicator, x, y, w, h]`, with `indicator = 1` when an object
//! center falls in the cell.
//!
//! Per cell, the candidate with the highest IoU against the ground truth is
//! the responsible predictor. The loss per image is
//!
//! ```text
//! lambda_coord * sum_obj (xy - xy')^2 + (sqrt(wh) - sqrt(wh'))^2
//!     + sum_obj (obj_resp - 1)^2
//!     + lambda_noobj * sum_noobj sum_b obj_b^2
//! ```
//!
//! and [`YoloLoss::forward`] averages it over the batch. Every candidate in
//! an empty cell is penalised, not only the responsible one.

use std::collections::HashMap;

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    nn::loss::{MseLoss, Reduction},
    tensor::{backend::Backend, cast::ToElement, Int, Tensor},
};

use crate::{
    error::{YoloLossError, YoloLossResult},
    iou::{intersection_over_union_with_eps, BoxFormat},
};

/// Values per predicted box: objectness followed by `(x, y, w, h)`.
pub const BOX_ATTRIBUTES: usize = 5;

/// Configuration for creating a [YOLO loss](YoloLoss).
#[derive(Config, Debug)]
pub struct YoloLossConfig {
    /// Grid resolution `S`. Default: 7
    #[config(default = 7)]
    pub grid_size: usize,
    /// Candidate boxes per grid cell `B`. Default: 2
    #[config(default = 2)]
    pub num_boxes: usize,
    /// Weight of the coordinate term. Default: 5.0
    #[config(default = 5.0)]
    pub lambda_coord: f64,
    /// Weight of the no-object term. Default: 0.5
    #[config(default = 0.5)]
    pub lambda_noobj: f64,
    /// Stabiliser for IoU and the width/height square root. Default: 1e-6
    #[config(default = 1e-6)]
    pub eps: f64,
}

impl YoloLossConfig {
    /// Initialize [YOLO loss](YoloLoss).
    ///
    /// # Panics
    ///
    /// If [`validate`](Self::validate) fails.
    pub fn init(&self) -> YoloLoss {
        self.assertions();
        YoloLoss {
            grid_size: self.grid_size,
            num_boxes: self.num_boxes,
            lambda_coord: self.lambda_coord,
            lambda_noobj: self.lambda_noobj,
            eps: self.eps,
        }
    }

    /// Checks every hyperparameter, returning the first violation.
    pub fn validate(&self) -> YoloLossResult<()> {
        if self.grid_size == 0 {
            return Err(invalid("grid_size", "must be at least 1"));
        }
        if self.num_boxes == 0 {
            return Err(invalid("num_boxes", "must be at least 1"));
        }
        if !(self.lambda_coord >= 0.0) {
            return Err(invalid(
                "lambda_coord",
                format!("must be non-negative, got {}", self.lambda_coord),
            ));
        }
        if !(self.lambda_noobj >= 0.0) {
            return Err(invalid(
                "lambda_noobj",
                format!("must be non-negative, got {}", self.lambda_noobj),
            ));
        }
        if !(self.eps > 0.0) {
            return Err(invalid("eps", format!("must be positive, got {}", self.eps)));
        }
        checked_prediction_width(self.grid_size, self.num_boxes)?;
        Ok(())
    }

    /// Width of a flattened prediction row, `S * S * B * 5`.
    ///
    /// `None` when the product does not fit in `usize`.
    pub fn prediction_width(&self) -> Option<usize> {
        checked_prediction_width(self.grid_size, self.num_boxes).ok()
    }

    fn assertions(&self) {
        if let Err(err) = self.validate() {
            panic!("{err}");
        }
    }
}

fn checked_prediction_width(grid_size: usize, num_boxes: usize) -> YoloLossResult<usize> {
    grid_size
        .checked_mul(grid_size)
        .and_then(|cells| cells.checked_mul(num_boxes))
        .and_then(|boxes| boxes.checked_mul(BOX_ATTRIBUTES))
        .ok_or_else(|| {
            let reason = format!(
                "{grid_size}x{grid_size} cells with {num_boxes} boxes overflow the prediction width"
            );
            invalid("grid_size", reason)
        })
}

fn invalid(parameter: &'static str, reason: impl Into<String>) -> YoloLossError {
    YoloLossError::InvalidParameter {
        parameter,
        reason: reason.into(),
    }
}

/// YOLO v1 detection loss.
///
/// Holds only hyperparameters; it is immutable after construction.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct YoloLoss {
    /// Grid resolution `S`.
    pub grid_size: usize,
    /// Candidate boxes per grid cell `B`.
    pub num_boxes: usize,
    /// Weight of the coordinate term.
    pub lambda_coord: f64,
    /// Weight of the no-object term.
    pub lambda_noobj: f64,
    /// Stabiliser for IoU and the width/height square root.
    pub eps: f64,
}

impl Default for YoloLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for YoloLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("grid_size", &self.grid_size)
            .add("num_boxes", &self.num_boxes)
            .add("lambda_coord", &self.lambda_coord)
            .add("lambda_noobj", &self.lambda_noobj)
            .add("eps", &self.eps)
            .optional()
    }
}

/// Loss terms of one call, for monitoring.
///
/// `box_loss`, `object_loss` and `no_object_loss` are unweighted and summed
/// over the batch; `total` is the weighted loss after reduction.
#[derive(Debug, Clone)]
pub struct YoloLossTerms<B: Backend> {
    /// Weighted, reduced loss. Shape `[1]`.
    pub total: Tensor<B, 1>,
    /// Coordinate term. Shape `[1]`.
    pub box_loss: Tensor<B, 1>,
    /// Objectness term of the responsible predictors. Shape `[1]`.
    pub object_loss: Tensor<B, 1>,
    /// Objectness term of every predictor in empty cells. Shape `[1]`.
    pub no_object_loss: Tensor<B, 1>,
    /// Index of the responsible predictor per cell. Shape `[N, S, S]`.
    pub responsible_box: Tensor<B, 3, Int>,
    /// IoU of the responsible predictor per cell. Shape `[N, S, S]`.
    pub best_iou: Tensor<B, 3>,
}

impl<B: Backend> YoloLossTerms<B> {
    /// Reads the scalar terms back as `f64`, keyed `total`, `box`, `object`, `no_object`.
    pub fn into_loss_dict(self) -> HashMap<String, f64> {
        [
            ("total", self.total),
            ("box", self.box_loss),
            ("object", self.object_loss),
            ("no_object", self.no_object_loss),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value.into_scalar().to_f64()))
        .collect()
    }
}

/// Per-image terms before weighting.
struct ImageTerms<B: Backend> {
    box_loss: Tensor<B, 1>,
    object_loss: Tensor<B, 1>,
    no_object_loss: Tensor<B, 1>,
    responsible_box: Tensor<B, 4>,
    best_iou: Tensor<B, 4>,
}

impl YoloLoss {
    /// Create a new YOLO loss with default configuration.
    pub fn new() -> Self {
        YoloLossConfig::new().init()
    }

    /// Compute the loss averaged over the batch.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch_size, S * S * B * 5]`
    /// - target: `[batch_size, S, S, C]` with `C >= 5`; channels past the fifth are ignored
    /// - output: `[1]`
    ///
    /// # Panics
    ///
    /// If the shapes do not match the configured grid, see [`try_forward`](Self::try_forward).
    pub fn forward<B: Backend>(&self, predictions: Tensor<B, 2>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        self.forward_with_reduction(predictions, target, Reduction::Mean)
    }

    /// Compute the loss with the given batch reduction.
    ///
    /// `Mean` and `Auto` divide by the batch size, `Sum` does not.
    pub fn forward_with_reduction<B: Backend>(
        &self,
        predictions: Tensor<B, 2>,
        target: Tensor<B, 4>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let loss = self.forward_no_reduction(predictions, target);
        match reduction {
            Reduction::Mean | Reduction::Auto => loss.mean(),
            Reduction::Sum => loss.sum(),
        }
    }

    /// Compute the weighted loss of each image.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch_size, S * S * B * 5]`
    /// - target: `[batch_size, S, S, C]` with `C >= 5`
    /// - output: `[batch_size]`
    pub fn forward_no_reduction<B: Backend>(
        &self,
        predictions: Tensor<B, 2>,
        target: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        self.assertions(&predictions, &target);
        let terms = self.image_terms(predictions, target);
        self.weighted(terms.box_loss, terms.object_loss, terms.no_object_loss)
    }

    /// Compute the loss, returning an error instead of panicking on malformed shapes.
    pub fn try_forward<B: Backend>(
        &self,
        predictions: Tensor<B, 2>,
        target: Tensor<B, 4>,
    ) -> YoloLossResult<Tensor<B, 1>> {
        self.check_shapes(&predictions, &target)?;
        Ok(self.forward(predictions, target))
    }

    /// Compute the batch-mean loss together with its individual terms.
    pub fn forward_detailed<B: Backend>(
        &self,
        predictions: Tensor<B, 2>,
        target: Tensor<B, 4>,
    ) -> YoloLossTerms<B> {
        self.assertions(&predictions, &target);
        let [batch_size, _] = predictions.dims();
        let s = self.grid_size;

        let terms = self.image_terms(predictions, target);
        let total = self
            .weighted(
                terms.box_loss.clone(),
                terms.object_loss.clone(),
                terms.no_object_loss.clone(),
            )
            .mean();

        YoloLossTerms {
            total,
            box_loss: terms.box_loss.sum(),
            object_loss: terms.object_loss.sum(),
            no_object_loss: terms.no_object_loss.sum(),
            responsible_box: terms.responsible_box.reshape([batch_size, s, s]).int(),
            best_iou: terms.best_iou.reshape([batch_size, s, s]),
        }
    }

    /// Checks predictions and target against the configured grid.
    pub fn check_shapes<B: Backend>(
        &self,
        predictions: &Tensor<B, 2>,
        target: &Tensor<B, 4>,
    ) -> YoloLossResult<()> {
        let s = self.grid_size;
        let width = checked_prediction_width(s, self.num_boxes)?;

        let [pred_batch, pred_width] = predictions.dims();
        if pred_width != width {
            return Err(YoloLossError::PredictionShape {
                expected: format!("[batch_size, {width}]"),
                actual: predictions.dims().to_vec(),
            });
        }

        let [target_batch, rows, cols, channels] = target.dims();
        if rows != s || cols != s || channels < BOX_ATTRIBUTES {
            return Err(YoloLossError::TargetShape {
                expected: format!("[batch_size, {s}, {s}, >= {BOX_ATTRIBUTES}]"),
                actual: target.dims().to_vec(),
            });
        }

        if pred_batch != target_batch {
            return Err(YoloLossError::BatchMismatch {
                predictions: pred_batch,
                target: target_batch,
            });
        }

        if pred_batch == 0 {
            return Err(YoloLossError::EmptyBatch);
        }
        Ok(())
    }

    fn assertions<B: Backend>(&self, predictions: &Tensor<B, 2>, target: &Tensor<B, 4>) {
        if let Err(err) = self.check_shapes(predictions, target) {
            panic!("{err}");
        }
    }

    fn weighted<B: Backend>(
        &self,
        box_loss: Tensor<B, 1>,
        object_loss: Tensor<B, 1>,
        no_object_loss: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        box_loss.mul_scalar(self.lambda_coord)
            + object_loss
            + no_object_loss.mul_scalar(self.lambda_noobj)
    }

    fn image_terms<B: Backend>(
        &self,
        predictions: Tensor<B, 2>,
        target: Tensor<B, 4>,
    ) -> ImageTerms<B> {
        let [batch_size, _] = predictions.dims();
        let s = self.grid_size;
        let predictions = predictions.reshape([batch_size, s, s, self.num_boxes * BOX_ATTRIBUTES]);

        let objectness = |b: usize| predictions.clone().narrow(3, b * BOX_ATTRIBUTES, 1);
        let coordinates = |b: usize| predictions.clone().narrow(3, b * BOX_ATTRIBUTES + 1, 4);

        // [N, S, S, 1]
        let indicator = target.clone().narrow(3, 0, 1);
        let exists_box = indicator.clone();
        let no_object = exists_box.clone().neg().add_scalar(1.0);
        // [N, S, S, 4]
        let target_box = target.narrow(3, 1, 4);

        let iou = |boxes: Tensor<B, 4>| {
            intersection_over_union_with_eps(
                boxes,
                target_box.clone(),
                BoxFormat::Midpoint,
                self.eps,
            )
        };

        let mut best_box = coordinates(0);
        let mut best_objectness = objectness(0);
        let mut best_iou = iou(best_box.clone());
        let mut responsible_box = best_iou.zeros_like();
        let mut no_object_loss = squared_error_per_image(
            no_object.clone() * best_objectness.clone(),
            no_object.clone() * indicator.clone(),
        );

        for b in 1..self.num_boxes {
            let candidate_box = coordinates(b);
            let candidate_objectness = objectness(b);
            let candidate_iou = iou(candidate_box.clone());

            // Strictly greater, so ties stay with the lower index.
            let better = candidate_iou.clone().greater(best_iou.clone()).float();

            best_box = select(better.clone(), candidate_box, best_box);
            best_objectness = select(better.clone(), candidate_objectness.clone(), best_objectness);
            responsible_box = select(
                better,
                responsible_box.ones_like().mul_scalar(b as f64),
                responsible_box,
            );
            best_iou = best_iou.max_pair(candidate_iou);

            no_object_loss = no_object_loss
                + squared_error_per_image(
                    no_object.clone() * candidate_objectness,
                    no_object.clone() * indicator.clone(),
                );
        }

        let box_predictions = best_box * exists_box.clone();
        let box_targets = target_box.clone() * exists_box.clone();

        let pred_wh = box_predictions.clone().narrow(3, 2, 2);
        let pred_wh = pred_wh.clone().sign() * pred_wh.abs().add_scalar(self.eps).sqrt();
        let target_wh = box_targets.clone().narrow(3, 2, 2).sqrt();

        let box_loss = squared_error_per_image(
            box_predictions.narrow(3, 0, 2),
            box_targets.narrow(3, 0, 2),
        ) + squared_error_per_image(pred_wh, target_wh);

        let object_loss = squared_error_per_image(
            exists_box.clone() * best_objectness,
            exists_box * indicator,
        );

        ImageTerms {
            box_loss,
            object_loss,
            no_object_loss,
            responsible_box,
            best_iou,
        }
    }
}

/// Branchless `gate ? when_true : when_false` for a 0/1 gate broadcast over the last axis.
fn select<B: Backend>(
    gate: Tensor<B, 4>,
    when_true: Tensor<B, 4>,
    when_false: Tensor<B, 4>,
) -> Tensor<B, 4> {
    let inverse = gate.clone().neg().add_scalar(1.0);
    when_true * gate + when_false * inverse
}

/// Sum of squared errors over every axis but the batch. Output shape `[N]`.
fn squared_error_per_image<B: Backend>(
    predictions: Tensor<B, 4>,
    targets: Tensor<B, 4>,
) -> Tensor<B, 1> {
    let [batch_size, ..] = predictions.dims();
    MseLoss::new()
        .forward_no_reduction(predictions, targets)
        .reshape([batch_size as i32, -1])
        .sum_dim(1)
        .reshape([batch_size])
}
