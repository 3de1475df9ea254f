//! Intersection over Union (IoU) between batches of axis-aligned boxes.
//!
//! Boxes live on the last axis of a tensor of shape `[..., 4]`, either as
//! `(cx, cy, w, h)` ([`BoxFormat::Midpoint`]) or `(x1, y1, x2, y2)`
//! ([`BoxFormat::Corners`]). The result keeps the trailing axis:
//!
//! ```text
//! inter = max(x2 - x1, 0) * max(y2 - y1, 0)
//! union = |area(a)| + |area(b)| - inter
//! IoU   = inter / (union + eps)
//! ```

use burn::tensor::{backend::Backend, Tensor};

/// Stabiliser added to the union so degenerate box pairs yield 0 instead of NaN.
pub const DEFAULT_IOU_EPS: f64 = 1e-6;

/// Encoding of the four box coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoxFormat {
    /// `(cx, cy, w, h)`
    #[default]
    Midpoint,
    /// `(x1, y1, x2, y2)`
    Corners,
}

/// Computes IoU with the default epsilon.
///
/// # Shapes
///
/// - boxes_a: `[..., 4]`
/// - boxes_b: `[..., 4]` (same shape as `boxes_a`)
/// - output: `[..., 1]`
pub fn intersection_over_union<B: Backend, const D: usize>(
    boxes_a: Tensor<B, D>,
    boxes_b: Tensor<B, D>,
    format: BoxFormat,
) -> Tensor<B, D> {
    intersection_over_union_with_eps(boxes_a, boxes_b, format, DEFAULT_IOU_EPS)
}

/// Computes IoU, adding `eps` to the union.
///
/// # Panics
///
/// If the two batches differ in shape or the last axis is not 4 wide.
pub fn intersection_over_union_with_eps<B: Backend, const D: usize>(
    boxes_a: Tensor<B, D>,
    boxes_b: Tensor<B, D>,
    format: BoxFormat,
    eps: f64,
) -> Tensor<B, D> {
    assertions(&boxes_a, &boxes_b);

    let [a_x1, a_y1, a_x2, a_y2] = corner_coordinates(boxes_a, format);
    let [b_x1, b_y1, b_x2, b_y2] = corner_coordinates(boxes_b, format);

    let x1 = a_x1.clone().max_pair(b_x1.clone());
    let y1 = a_y1.clone().max_pair(b_y1.clone());
    let x2 = a_x2.clone().min_pair(b_x2.clone());
    let y2 = a_y2.clone().min_pair(b_y2.clone());

    // Clamp each span before multiplying; two negative spans must not produce area.
    let intersection = (x2 - x1).clamp_min(0.0) * (y2 - y1).clamp_min(0.0);

    let area_a = ((a_x2 - a_x1) * (a_y2 - a_y1)).abs();
    let area_b = ((b_x2 - b_x1) * (b_y2 - b_y1)).abs();

    let union = area_a + area_b - intersection.clone();
    intersection / union.add_scalar(eps)
}

/// Converts `(cx, cy, w, h)` boxes to `(x1, y1, x2, y2)`.
pub fn midpoint_to_corners<B: Backend, const D: usize>(boxes: Tensor<B, D>) -> Tensor<B, D> {
    Tensor::cat(corner_coordinates(boxes, BoxFormat::Midpoint).to_vec(), D - 1)
}

/// Converts `(x1, y1, x2, y2)` boxes to `(cx, cy, w, h)`.
pub fn corners_to_midpoint<B: Backend, const D: usize>(boxes: Tensor<B, D>) -> Tensor<B, D> {
    let [x1, y1, x2, y2] = corner_coordinates(boxes, BoxFormat::Corners);
    let cx = (x1.clone() + x2.clone()).div_scalar(2.0);
    let cy = (y1.clone() + y2.clone()).div_scalar(2.0);
    Tensor::cat(vec![cx, cy, x2 - x1, y2 - y1], D - 1)
}

/// Splits boxes into `[x1, y1, x2, y2]`, each of shape `[..., 1]`.
fn corner_coordinates<B: Backend, const D: usize>(
    boxes: Tensor<B, D>,
    format: BoxFormat,
) -> [Tensor<B, D>; 4] {
    let last = D - 1;
    let coordinate = |index: usize| boxes.clone().narrow(last, index, 1);

    match format {
        BoxFormat::Midpoint => {
            let (cx, cy) = (coordinate(0), coordinate(1));
            let half_w = coordinate(2).div_scalar(2.0);
            let half_h = coordinate(3).div_scalar(2.0);
            [
                cx.clone() - half_w.clone(),
                cy.clone() - half_h.clone(),
                cx + half_w,
                cy + half_h,
            ]
        }
        BoxFormat::Corners => [coordinate(0), coordinate(1), coordinate(2), coordinate(3)],
    }
}

fn assertions<B: Backend, const D: usize>(boxes_a: &Tensor<B, D>, boxes_b: &Tensor<B, D>) {
    let a_dims = boxes_a.dims();
    let b_dims = boxes_b.dims();
    assert_eq!(
        a_dims, b_dims,
        "Shape of boxes_a ({a_dims:?}) must match boxes_b ({b_dims:?})"
    );
    assert_eq!(
        a_dims[D - 1],
        4,
        "Boxes must have 4 coordinates on the last axis, got shape {a_dims:?}"
    );
}
