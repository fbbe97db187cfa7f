// --- Файл: src/metrics/classification.rs ---

//! Оценочные функции для задач классификации.

use super::{MetricError, MetricResult};
use crate::analysis::shape_inference::{ShapeInference, ShapeInferenceError};
use crate::asg::DType;
use crate::tensor::Tensor;
use log::trace;

/// Точность (accuracy): 1.0 там, где метка совпала, умноженное на вес.
///
/// `targets` содержит целочисленные метки ранга R. `predictions` либо
/// метки того же ранга, либо распределения вероятностей ранга R+1: тогда
/// метка берется как argmax по последней оси и приводится к типу `targets`.
///
/// Возвращает `(correct * weights, weights)`.
///
/// # Ошибки
///
/// * `MetricError::UnknownRank`, если ранг одного из входов не известен.
/// * `MetricError::ShapeError`, если ранг `predictions` больше ранга
///   `targets` более чем на 1. Граф при этом не меняется.
/// * `MetricError::Shape`, если формы меток несовместимы или `weights`
///   не расширяются до формы `targets`.
///
/// Накопитель еще раз умножает значения на веса, поэтому в итоговом
/// среднем верный пример с весом `w` дает вклад `w²` в числитель и `w`
/// в знаменатель. Для весов 0/1 это обычная доля верных.
pub fn accuracy(targets: &Tensor, predictions: &Tensor, weights: &Tensor) -> MetricResult<(Tensor, Tensor)> {
    let targets_rank = targets.rank().ok_or(MetricError::UnknownRank(targets.node_id))?;
    let predictions_rank = predictions.rank().ok_or(MetricError::UnknownRank(predictions.node_id))?;

    if predictions_rank > targets_rank + 1 {
        return Err(MetricError::ShapeError {
            predictions_rank,
            targets_rank,
        });
    }
    if let (Some(ts), Some(ws)) = (targets.shape(), weights.shape()) {
        if ShapeInference::broadcast_shapes(&ws, &ts)? != ts {
            return Err(ShapeInferenceError::BroadcastError(ws, ts).into());
        }
    }

    let labels = if predictions_rank == targets_rank + 1 {
        trace!("accuracy: decoding predictions of rank {} via argmax", predictions_rank);
        predictions.argmax().cast(targets.dtype().unwrap_or(DType::I32))
    } else {
        predictions.clone()
    };

    if let (Some(ts), Some(ls)) = (targets.shape(), labels.shape()) {
        ShapeInference::broadcast_shapes(&ts, &ls)?;
    }

    let correct = targets.equal(&labels).cast(DType::F32);
    let scored = &correct * weights;
    Ok((scored, weights.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asg::Value;
    use crate::runtime::backend::run_with_feed;
    use crate::runtime::cpu_backend::CpuBackend;
    use crate::tensor::GraphContext;
    use ndarray::{array, ArrayD};
    use std::collections::HashMap;

    fn evaluate(scored: &Tensor, feed: Vec<(&str, ArrayD<f32>)>) -> ArrayD<f32> {
        let mut graph = scored.context.borrow().main_graph().clone();
        graph.set_outputs(vec![scored.node_id]);
        let feed: HashMap<String, Value> = feed.into_iter().map(|(k, v)| (k.to_string(), Value::Tensor(v))).collect();
        let mut out = run_with_feed(&CpuBackend::new(), &graph, &feed).unwrap();
        out.remove(0).into_tensor()
    }

    #[test]
    fn test_label_predictions() {
        let context = GraphContext::shared();
        let t = Tensor::new_input_with_shape(&context, "t", vec![3], DType::I32);
        let p = Tensor::new_input_with_shape(&context, "p", vec![3], DType::I32);
        let w = Tensor::new_input_with_shape(&context, "w", vec![3], DType::F32);

        let (scored, weights) = accuracy(&t, &p, &w).unwrap();
        assert_eq!(weights.node_id, w.node_id);

        let out = evaluate(
            &scored,
            vec![
                ("t", array![0.0f32, 1.0, 2.0].into_dyn()),
                ("p", array![0.0f32, 1.0, 1.0].into_dyn()),
                ("w", array![1.0f32, 1.0, 1.0].into_dyn()),
            ],
        );
        assert_eq!(out, array![1.0f32, 1.0, 0.0].into_dyn());
    }

    #[test]
    fn test_probability_predictions_are_decoded() {
        let context = GraphContext::shared();
        let t = Tensor::new_input_with_shape(&context, "t", vec![1], DType::I32);
        let p = Tensor::new_input_with_shape(&context, "p", vec![1, 3], DType::F32);
        let w = Tensor::scalar(&context, 1.0, "w");

        let (scored, _) = accuracy(&t, &p, &w).unwrap();
        assert_eq!(scored.shape(), Some(vec![1]));

        let out = evaluate(
            &scored,
            vec![("t", array![1.0f32].into_dyn()), ("p", array![[0.1f32, 0.7, 0.2]].into_dyn())],
        );
        assert_eq!(out, array![1.0f32].into_dyn());
    }

    #[test]
    fn test_weights_scale_correctness() {
        let context = GraphContext::shared();
        let t = Tensor::new_input_with_shape(&context, "t", vec![2], DType::I32);
        let p = Tensor::new_input_with_shape(&context, "p", vec![2], DType::I32);
        let w = Tensor::new_input_with_shape(&context, "w", vec![2], DType::F32);

        let (scored, _) = accuracy(&t, &p, &w).unwrap();
        let out = evaluate(
            &scored,
            vec![
                ("t", array![3.0f32, 4.0].into_dyn()),
                ("p", array![3.0f32, 4.0].into_dyn()),
                ("w", array![0.5f32, 2.0].into_dyn()),
            ],
        );
        assert_eq!(out, array![0.5f32, 2.0].into_dyn());
    }

    #[test]
    fn test_rank_violation() {
        let context = GraphContext::shared();
        let t = Tensor::new_input_with_shape(&context, "t", vec![4], DType::I32);
        let p = Tensor::new_input_with_shape(&context, "p", vec![4, 3, 2], DType::F32);
        let w = Tensor::scalar(&context, 1.0, "w");
        let nodes_before = context.borrow().main_graph().nodes.len();

        let err = accuracy(&t, &p, &w).unwrap_err();
        assert_eq!(
            err,
            MetricError::ShapeError {
                predictions_rank: 3,
                targets_rank: 1
            }
        );
        let message = err.to_string();
        assert!(message.contains('3') && message.contains('1'));
        assert_eq!(context.borrow().main_graph().nodes.len(), nodes_before);
    }

    #[test]
    fn test_unknown_rank_and_bad_shapes() {
        let context = GraphContext::shared();
        let t = Tensor::new_input(&context, "t");
        let p = Tensor::new_input_with_shape(&context, "p", vec![3], DType::I32);
        let w = Tensor::scalar(&context, 1.0, "w");
        assert_eq!(accuracy(&t, &p, &w).unwrap_err(), MetricError::UnknownRank(t.node_id));

        let t = Tensor::new_input_with_shape(&context, "t2", vec![2], DType::I32);
        assert!(matches!(accuracy(&t, &p, &w), Err(MetricError::Shape(_))));
    }

    #[test]
    fn test_weights_must_broadcast_to_targets() {
        let context = GraphContext::shared();
        let t = Tensor::new_input_with_shape(&context, "t", vec![3], DType::I32);
        let p = Tensor::new_input_with_shape(&context, "p", vec![3], DType::I32);
        let wide = Tensor::new_input_with_shape(&context, "wide", vec![2, 3], DType::F32);
        let nodes_before = context.borrow().main_graph().nodes.len();

        let err = accuracy(&t, &p, &wide).unwrap_err();
        assert_eq!(
            err,
            MetricError::Shape(ShapeInferenceError::BroadcastError(vec![2, 3], vec![3]))
        );
        assert_eq!(context.borrow().main_graph().nodes.len(), nodes_before);

        let row = Tensor::new_input_with_shape(&context, "row", vec![3], DType::F32);
        let scalar = Tensor::scalar(&context, 2.0, "scalar");
        assert!(accuracy(&t, &p, &row).is_ok());
        assert!(accuracy(&t, &p, &scalar).is_ok());
    }
}
