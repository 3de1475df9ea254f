//! YOLO v1 detection loss for the Burn deep learning framework.
//!
//! The crate provides two building blocks:
//!
//! - **[`intersection_over_union`]**: IoU between batches of boxes in midpoint
//!   `(cx, cy, w, h)` or corner `(x1, y1, x2, y2)` form.
//! - **[`YoloLoss`]**: the composite grid loss. For every cell the predictor
//!   with the highest IoU against the ground truth is made responsible for
//!   it; the loss combines coordinate regression, objectness of the
//!   responsible predictor and no-object suppression of every predictor.
//!
//! ```text
//! loss = (lambda_coord * box + object + lambda_noobj * no_object) / N
//! ```
//!
//! ## Usage Example
//!
//! ```rust
//! use burn::prelude::*;
//! use yolo_loss::{YoloLoss, YoloLossConfig};
//!
//! fn detection_loss<B: Backend>(
//!     predictions: Tensor<B, 2>,
//!     targets: Tensor<B, 4>,
//! ) -> Tensor<B, 1> {
//!     let loss: YoloLoss = YoloLossConfig::new().with_grid_size(7).with_num_boxes(2).init();
//!     loss.forward(predictions, targets)
//! }
//! ```
//!
//! All operations are backend agnostic and differentiable; the module holds
//! no parameters and can be shared between training steps.

pub mod error;
pub mod iou;
pub mod yolo;

pub use error::{YoloLossError, YoloLossResult};
pub use iou::{
    corners_to_midpoint, intersection_over_union, intersection_over_union_with_eps,
    midpoint_to_corners, BoxFormat, DEFAULT_IOU_EPS,
};
pub use yolo::{YoloLoss, YoloLossConfig, YoloLossTerms, BOX_ATTRIBUTES};

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    pub type TestBackend = NdArray;
}
