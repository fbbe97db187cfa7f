// --- Файл: src/metrics/mod.rs ---

//! Потоковые метрики для оценки качества моделей.
//!
//! `StreamingMetric` связывает произвольную оценочную функцию (`ScoringFn`)
//! с потоковым средним (`StreamingAverage`):
//!
//! ```text
//! (targets, predictions, weights) -> ScoringFn -> (values, weights') -> StreamingAverage
//! ```
//!
//! # Пример использования
//!
//! ```rust,ignore
//! use rustyasg_streaming::prelude::*;
//!
//! let mut accuracy = StreamingMetric::accuracy();
//! let (value, update) = accuracy.call(&targets, &predictions, None, ComputeOptions::new())?;
//! for batch in batches {
//!     update.run(&backend, &batch)?;
//!     println!("accuracy: {:.4}", value.get());
//! }
//! accuracy.reset_op().run();
//! ```

pub mod classification;
pub mod regression;

pub use classification::accuracy;
pub use regression::{mean_absolute_error, mean_squared_error};

use crate::analysis::shape_inference::ShapeInferenceError;
use crate::asg::{AsgError, NodeId};
use crate::collections::Collections;
use crate::runtime::backend::RuntimeError;
use crate::streaming::{ResetOp, Scope, StateRead, StreamingAverage, StreamingComputation, UpdateOp};
use crate::tensor::Tensor;
use log::debug;
use thiserror::Error;

/// Ошибки уровня метрик.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("Ранг predictions должен быть равен рангу targets или больше на 1, \
             получено predictions: {predictions_rank}, targets: {targets_rank}")]
    ShapeError {
        predictions_rank: usize,
        targets_rank: usize,
    },

    #[error("Неизвестен ранг узла {0}. Объявите вход через Tensor::new_input_with_shape().")]
    UnknownRank(NodeId),

    #[error("Тензоры принадлежат разным GraphContext")]
    ContextMismatch,

    #[error("Заданы ключи коллекций {0:?}, но не передан реестр Collections")]
    MissingCollections(Vec<String>),

    #[error("Ошибка формы: {0}")]
    Shape(#[from] ShapeInferenceError),

    #[error("Ошибка графа: {0}")]
    Graph(#[from] AsgError),

    #[error("Ошибка выполнения: {0}")]
    Runtime(#[from] RuntimeError),
}

pub type MetricResult<T> = std::result::Result<T, MetricError>;

/// Оценочная функция: `(targets, predictions, weights) -> (values, weights)`.
///
/// Функция только строит узлы графа и не имеет состояния. Возвращенные
/// `values` и `weights` усредняются потоковым средним.
pub trait ScoringFn {
    fn score(&self, targets: &Tensor, predictions: &Tensor, weights: &Tensor) -> MetricResult<(Tensor, Tensor)>;
}

impl<F> ScoringFn for F
where
    F: Fn(&Tensor, &Tensor, &Tensor) -> MetricResult<(Tensor, Tensor)>,
{
    fn score(&self, targets: &Tensor, predictions: &Tensor, weights: &Tensor) -> MetricResult<(Tensor, Tensor)> {
        self(targets, predictions, weights)
    }
}

/// Указатель на оценочную функцию, как у встроенных `accuracy` и т.п.
pub type ScoringFnPtr = fn(&Tensor, &Tensor, &Tensor) -> MetricResult<(Tensor, Tensor)>;

/// Параметры объявления метрики.
#[derive(Debug, Default)]
pub struct ComputeOptions<'a> {
    metrics_collections: Vec<String>,
    updates_collections: Vec<String>,
    scope: Option<Scope>,
    collections: Option<&'a mut Collections>,
}

impl<'a> ComputeOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Реестр, в который публикуются дескрипторы.
    pub fn with_collections(mut self, collections: &'a mut Collections) -> Self {
        self.collections = Some(collections);
        self
    }

    /// Коллекции, получающие дескриптор текущего значения.
    pub fn with_metrics_collections<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics_collections = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Коллекции, получающие действие обновления.
    pub fn with_updates_collections<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.updates_collections = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Сигнатура "функции метрики": объявить и сразу получить оба дескриптора.
///
/// Реализуется `StreamingMetric` и любым замыканием той же формы, так что
/// код, принимающий `impl MetricFn`, не зависит от конкретной метрики.
pub trait MetricFn {
    fn call(
        &mut self,
        targets: &Tensor,
        predictions: &Tensor,
        weights: Option<&Tensor>,
        options: ComputeOptions<'_>,
    ) -> MetricResult<(StateRead, UpdateOp)>;
}

impl<F> MetricFn for F
where
    F: FnMut(&Tensor, &Tensor, Option<&Tensor>, ComputeOptions<'_>) -> MetricResult<(StateRead, UpdateOp)>,
{
    fn call(
        &mut self,
        targets: &Tensor,
        predictions: &Tensor,
        weights: Option<&Tensor>,
        options: ComputeOptions<'_>,
    ) -> MetricResult<(StateRead, UpdateOp)> {
        self(targets, predictions, weights, options)
    }
}

/// Потоковая метрика поверх оценочной функции.
///
/// Все свойства (`value`, `count`, ...) просто делегируют аккумулятору.
#[derive(Debug)]
pub struct StreamingMetric<F> {
    name: String,
    func: F,
    avg: StreamingAverage,
}

impl<F: ScoringFn> StreamingMetric<F> {
    pub fn new(func: F) -> Self {
        Self::with_average(func, StreamingAverage::new())
    }

    pub fn with_average(func: F, average: StreamingAverage) -> Self {
        Self {
            name: "streaming_metric".to_string(),
            func,
            avg: average,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Сумма весов, увиденных с последнего сброса.
    pub fn count(&self) -> StateRead {
        self.avg.count()
    }

    /// Ненормированная сумма взвешенных значений метрики.
    pub fn total(&self) -> StateRead {
        self.avg.total()
    }

    pub fn batch_value(&self) -> StateRead {
        self.avg.batch_value()
    }

    pub fn batch_count(&self) -> StateRead {
        self.avg.batch_count()
    }

    pub fn batch_total(&self) -> StateRead {
        self.avg.batch_total()
    }

    pub fn average(&self) -> &StreamingAverage {
        &self.avg
    }

    /// Объявляет вычисление метрики на одном батче.
    ///
    /// Если `weights` не заданы, используется скаляр 1.0. Под scope
    /// `options.scope` (по умолчанию имя метрики) вызывает оценочную
    /// функцию и объявляет накопление ее результата, затем публикует
    /// `value` и `update_op` в запрошенные коллекции.
    ///
    /// При ошибке ничего не публикуется и состояние не меняется.
    pub fn compute(
        &mut self,
        targets: &Tensor,
        predictions: &Tensor,
        weights: Option<&Tensor>,
        options: ComputeOptions<'_>,
    ) -> MetricResult<()> {
        self.declare(targets, predictions, weights, options).map(|_| ())
    }

    fn declare(
        &mut self,
        targets: &Tensor,
        predictions: &Tensor,
        weights: Option<&Tensor>,
        options: ComputeOptions<'_>,
    ) -> MetricResult<(StateRead, UpdateOp)> {
        let ComputeOptions {
            metrics_collections,
            updates_collections,
            scope,
            collections,
        } = options;

        let has_keys = !metrics_collections.is_empty() || !updates_collections.is_empty();
        if has_keys && collections.is_none() {
            let mut keys = metrics_collections;
            keys.extend(updates_collections);
            return Err(MetricError::MissingCollections(keys));
        }
        if !targets.same_context(predictions) || weights.is_some_and(|w| !targets.same_context(w)) {
            return Err(MetricError::ContextMismatch);
        }

        let scope = scope.unwrap_or_else(|| Scope::new(&self.name));
        let default_weights;
        let weights = match weights {
            Some(w) => w,
            None => {
                default_weights = Tensor::scalar(&targets.context, 1.0, &scope.join("weights"));
                &default_weights
            }
        };

        let (values, weights) = self.func.score(targets, predictions, weights)?;
        let (value, update_op) = self.avg.compute(&values, &weights, Some(&scope))?;
        debug!("{}: declared metric", scope);

        if let Some(collections) = collections {
            collections.add_to_collections(metrics_collections.as_slice(), value.clone());
            collections.add_to_collections(updates_collections.as_slice(), update_op.clone());
        }
        Ok((value, update_op))
    }
}

impl StreamingMetric<ScoringFnPtr> {
    /// Потоковая точность классификации.
    pub fn accuracy() -> Self {
        Self::new(accuracy as ScoringFnPtr).with_name("accuracy")
    }

    pub fn mean_absolute_error() -> Self {
        Self::new(mean_absolute_error as ScoringFnPtr).with_name("mean_absolute_error")
    }

    pub fn mean_squared_error() -> Self {
        Self::new(mean_squared_error as ScoringFnPtr).with_name("mean_squared_error")
    }
}

impl<F: ScoringFn> MetricFn for StreamingMetric<F> {
    /// `compute`, затем `(value, update_op)`.
    fn call(
        &mut self,
        targets: &Tensor,
        predictions: &Tensor,
        weights: Option<&Tensor>,
        options: ComputeOptions<'_>,
    ) -> MetricResult<(StateRead, UpdateOp)> {
        self.declare(targets, predictions, weights, options)
    }
}

impl<F: ScoringFn> StreamingComputation for StreamingMetric<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> StateRead {
        self.avg.value()
    }

    fn update_op(&self) -> Option<UpdateOp> {
        self.avg.update_op()
    }

    fn reset_op(&self) -> ResetOp {
        self.avg.reset_op()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asg::{DType, Value};
    use crate::runtime::cpu_backend::CpuBackend;
    use crate::tensor::GraphContext;
    use ndarray::array;
    use std::collections::HashMap;

    fn labels(context: &std::rc::Rc<std::cell::RefCell<GraphContext>>, name: &str) -> Tensor {
        Tensor::new_input_with_shape(context, name, vec![3], DType::I32)
    }

    fn feed(targets: [f32; 3], predictions: [f32; 3]) -> HashMap<String, Value> {
        HashMap::from([
            ("targets".to_string(), Value::Tensor(array![targets[0], targets[1], targets[2]].into_dyn())),
            ("predictions".to_string(), Value::Tensor(array![predictions[0], predictions[1], predictions[2]].into_dyn())),
        ])
    }

    #[test]
    fn test_call_returns_value_and_update() {
        let context = GraphContext::shared();
        let targets = labels(&context, "targets");
        let predictions = labels(&context, "predictions");
        let mut metric = StreamingMetric::accuracy();

        let (value, update) = metric.call(&targets, &predictions, None, ComputeOptions::new()).unwrap();
        update.run(&CpuBackend::new(), &feed([0.0, 1.0, 2.0], [0.0, 1.0, 1.0])).unwrap();

        assert!((value.get() - 2.0 / 3.0).abs() < 1e-9);
        assert!(value.shares_state_with(&metric.value()));
        assert_eq!(metric.count().get(), 3.0);
        assert_eq!(metric.total().get(), 2.0);
        assert_eq!(update.name(), "accuracy/update_op");
    }

    #[test]
    fn test_publishes_into_collections() {
        let context = GraphContext::shared();
        let targets = labels(&context, "targets");
        let predictions = labels(&context, "predictions");
        let mut collections = Collections::new();
        collections.add_to_collection("metrics", StreamingAverage::new().count());

        let mut metric = StreamingMetric::accuracy();
        let options = ComputeOptions::new()
            .with_collections(&mut collections)
            .with_metrics_collections(["metrics", "eval"])
            .with_updates_collections(["updates"])
            .with_scope(Scope::new("eval/acc"));
        metric.compute(&targets, &predictions, None, options).unwrap();

        assert_eq!(collections.get("metrics").len(), 2);
        assert_eq!(collections.get("metrics")[1].name(), "eval/acc/value");
        assert_eq!(collections.get("eval").len(), 1);
        assert_eq!(collections.updates("updates").count(), 1);
        assert_eq!(collections.values("updates").count(), 0);
    }

    #[test]
    fn test_keys_without_registry_fail_early() {
        let context = GraphContext::shared();
        let targets = labels(&context, "targets");
        let predictions = labels(&context, "predictions");
        let mut metric = StreamingMetric::accuracy();
        let nodes_before = context.borrow().main_graph().nodes.len();

        let err = metric
            .compute(&targets, &predictions, None, ComputeOptions::new().with_updates_collections(["updates"]))
            .unwrap_err();

        assert_eq!(err, MetricError::MissingCollections(vec!["updates".to_string()]));
        assert!(metric.update_op().is_none());
        assert_eq!(context.borrow().main_graph().nodes.len(), nodes_before);
    }

    #[test]
    fn test_custom_scoring_closure() {
        let context = GraphContext::shared();
        let targets = Tensor::new_input(&context, "targets");
        let predictions = Tensor::new_input(&context, "predictions");
        // Доля предсказаний, совпавших с целью, считается только там, где цель != 0.
        let func = |t: &Tensor, p: &Tensor, w: &Tensor| -> MetricResult<(Tensor, Tensor)> {
            let zero = Tensor::scalar(&t.context, 0.0, "zero");
            let mask = t.equal(&zero).cast(DType::F32);
            let one = Tensor::scalar(&t.context, 1.0, "one");
            let keep = &(&one - &mask) * w;
            Ok((t.equal(p).cast(DType::F32), keep))
        };
        let mut metric = StreamingMetric::new(func).with_name("nonzero_hits");

        let (value, update) = metric.call(&targets, &predictions, None, ComputeOptions::new()).unwrap();
        update.run(&CpuBackend::new(), &feed([0.0, 1.0, 2.0], [0.0, 1.0, 1.0])).unwrap();

        assert!((value.get() - 0.5).abs() < 1e-9);
        assert_eq!(metric.name(), "nonzero_hits");
    }

    #[test]
    fn test_metric_fn_is_substitutable() {
        fn declare(
            metric: &mut impl MetricFn,
            targets: &Tensor,
            predictions: &Tensor,
        ) -> MetricResult<(StateRead, UpdateOp)> {
            metric.call(targets, predictions, None, ComputeOptions::new())
        }

        let context = GraphContext::shared();
        let targets = labels(&context, "targets");
        let predictions = labels(&context, "predictions");

        let mut metric = StreamingMetric::accuracy();
        let (value, update) = declare(&mut metric, &targets, &predictions).unwrap();

        let mut inner = StreamingMetric::accuracy();
        let mut wrapped = |t: &Tensor, p: &Tensor, w: Option<&Tensor>, o: ComputeOptions<'_>| inner.call(t, p, w, o);
        let (other_value, other_update) = declare(&mut wrapped, &targets, &predictions).unwrap();

        let backend = CpuBackend::new();
        let batch = feed([1.0, 1.0, 1.0], [1.0, 0.0, 1.0]);
        update.run(&backend, &batch).unwrap();
        other_update.run(&backend, &batch).unwrap();
        other_update.run(&backend, &batch).unwrap();

        assert!((value.get() - other_value.get()).abs() < 1e-9);
        assert_eq!(metric.count().get(), 3.0);
        assert_eq!(other_value.snapshot().running_weight, 6.0);
    }
}
