//! # Graph Analysis Module
//!
//! Analysis passes that process the ASG before execution.
//!
//! - [`ShapeInference`](shape_inference::ShapeInference): propagates tensor shapes
//!   through the graph while it is built, so that shape and rank errors are
//!   reported at declaration time instead of at execution time.
//!
//! ```text
//! Tensor op -> new node -> ShapeInference::infer_in_place -> node.shape / node.dtype
//! ```

pub mod shape_inference;
