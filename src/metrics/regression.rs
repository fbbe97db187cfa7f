// --- Файл: src/metrics/regression.rs ---

//! Оценочные функции для задач регрессии.
//!
//! Обе функции поэлементные и возвращают ошибку без весов: усреднение по
//! батчам и умножение на веса делает `StreamingAverage`.

use super::MetricResult;
use crate::tensor::Tensor;

/// Mean Absolute Error: значения `|targets - predictions|`.
pub fn mean_absolute_error(targets: &Tensor, predictions: &Tensor, weights: &Tensor) -> MetricResult<(Tensor, Tensor)> {
    let error = (targets - predictions).abs();
    Ok((error, weights.clone()))
}

/// Mean Squared Error: значения `(targets - predictions)²`.
pub fn mean_squared_error(targets: &Tensor, predictions: &Tensor, weights: &Tensor) -> MetricResult<(Tensor, Tensor)> {
    let diff = targets - predictions;
    Ok((&diff * &diff, weights.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ComputeOptions, MetricFn, StreamingMetric};
    use crate::runtime::cpu_backend::CpuBackend;
    use crate::tensor::GraphContext;
    use crate::asg::Value;
    use ndarray::array;
    use std::collections::HashMap;

    fn feed(targets: [f32; 2], predictions: [f32; 2]) -> HashMap<String, Value> {
        HashMap::from([
            ("y".to_string(), Value::Tensor(array![targets[0], targets[1]].into_dyn())),
            ("y_hat".to_string(), Value::Tensor(array![predictions[0], predictions[1]].into_dyn())),
        ])
    }

    #[test]
    fn test_streaming_mae() {
        let context = GraphContext::shared();
        let y = Tensor::new_input(&context, "y");
        let y_hat = Tensor::new_input(&context, "y_hat");
        let mut mae = StreamingMetric::mean_absolute_error();
        let (value, update) = mae.call(&y, &y_hat, None, ComputeOptions::new()).unwrap();

        let backend = CpuBackend::new();
        update.run(&backend, &feed([1.0, 2.0], [2.0, 2.0])).unwrap();
        update.run(&backend, &feed([0.0, 0.0], [-3.0, 0.0])).unwrap();

        // (1 + 0 + 3 + 0) / 4
        assert!((value.get() - 1.0).abs() < 1e-9);
        assert!((mae.batch_value().get() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_streaming_mse_with_weights() {
        let context = GraphContext::shared();
        let y = Tensor::new_input(&context, "y");
        let y_hat = Tensor::new_input(&context, "y_hat");
        let w = Tensor::new_literal(&context, array![1.0f32, 3.0].into_dyn(), "w");
        let mut mse = StreamingMetric::mean_squared_error();
        let (value, update) = mse.call(&y, &y_hat, Some(&w), ComputeOptions::new()).unwrap();

        update.run(&CpuBackend::new(), &feed([1.0, 0.0], [3.0, 1.0])).unwrap();

        // (4 * 1 + 1 * 3) / (1 + 3)
        assert!((value.get() - 7.0 / 4.0).abs() < 1e-9);
        assert_eq!(mse.count().get(), 4.0);
        assert_eq!(mse.total().get(), 7.0);
    }

    #[test]
    fn test_weighted_mae_counts_weights_once() {
        let context = GraphContext::shared();
        let y = Tensor::new_input(&context, "y");
        let y_hat = Tensor::new_input(&context, "y_hat");
        let w = Tensor::new_literal(&context, array![2.0f32, 0.5].into_dyn(), "w");
        let mut mae = StreamingMetric::mean_absolute_error();
        let (value, update) = mae.call(&y, &y_hat, Some(&w), ComputeOptions::new()).unwrap();

        update.run(&CpuBackend::new(), &feed([0.0, 0.0], [3.0, -1.0])).unwrap();

        // (3 * 2 + 1 * 0.5) / (2 + 0.5)
        assert!((value.get() - 6.5 / 2.5).abs() < 1e-9);
        assert!((mae.total().get() - 6.5).abs() < 1e-9);
    }
}
