//! Command-line tooling around the `yolo-loss` crate.
//!
//! Provides backend selection, JSON configuration files and a self-test
//! that evaluates the loss on synthetic tensors.

pub mod backend;
pub mod config;
pub mod self_test;

#[doc(inline)]
pub use yolo_loss as loss;
