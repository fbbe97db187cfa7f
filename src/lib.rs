//! # rustyasg-streaming: Streaming Evaluation Metrics on a Deferred Graph
//!
//! Metrics here are evaluated **batch by batch**: each batch folds its
//! contribution into a running weighted average, and the running value can be
//! read at any time without reprocessing earlier batches.
//!
//! Work is split into two phases:
//! 1. **Declaration.** `StreamingMetric::call` builds graph nodes for the
//!    scoring function and returns a value handle plus an update action.
//! 2. **Execution.** `UpdateOp::run` evaluates the graph on one batch and
//!    updates the shared state; `StateRead::get` reads it.
//!
//! ## Usage Example
//!
//! ```no_run
//! use rustyasg_streaming::prelude::*;
//! use std::collections::HashMap;
//! use ndarray::array;
//!
//! let context = GraphContext::shared();
//! let targets = Tensor::new_input_with_shape(&context, "targets", vec![3], DType::I32);
//! let predictions = Tensor::new_input_with_shape(&context, "predictions", vec![3, 4], DType::F32);
//!
//! let mut accuracy = StreamingMetric::accuracy();
//! let (value, update) = accuracy
//!     .call(&targets, &predictions, None, ComputeOptions::new())
//!     .unwrap();
//!
//! let batch = HashMap::from([
//!     ("targets".to_string(), Value::Tensor(array![0.0f32, 1.0, 3.0].into_dyn())),
//!     ("predictions".to_string(), Value::Tensor(ndarray::ArrayD::zeros(vec![3, 4]))),
//! ]);
//! update.run(&CpuBackend::new(), &batch).unwrap();
//! println!("accuracy: {}", value.get());
//! ```

pub mod analysis;
pub mod asg;
pub mod collections;
pub mod config;
pub mod metrics;
pub mod runtime;
pub mod streaming;
pub mod tensor;

/// Commonly used types, for `use rustyasg_streaming::prelude::*`.
pub mod prelude {
    pub use crate::asg::{DType, Value};
    pub use crate::collections::{CollectionEntry, Collections};
    pub use crate::metrics::{ComputeOptions, MetricError, MetricFn, MetricResult, ScoringFn, StreamingMetric};
    pub use crate::runtime::backend::Backend;
    pub use crate::runtime::cpu_backend::CpuBackend;
    pub use crate::streaming::{
        AccumulatorState, ResetOp, Scope, StateRead, StreamingAverage, StreamingComputation, UpdateOp,
    };
    pub use crate::tensor::{GraphContext, Tensor};
}
