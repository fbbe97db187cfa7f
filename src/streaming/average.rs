// --- Файл: src/streaming/average.rs ---

//! Потоковое взвешенное среднее.
//!
//! `StreamingAverage::compute` только объявляет шаг накопления: добавляет в
//! граф расширение весов до формы значений и возвращает два дескриптора.
//! Арифметика происходит позже, при каждом вызове `UpdateOp::run`.
//!
//! Состояние (`AccumulatorState`) создается вместе с аккумулятором и
//! разделяется всеми выданными дескрипторами через `Arc<RwLock<_>>`:
//! каждый переход (update или reset) меняет все четыре поля под одной
//! блокировкой записи, поэтому читатель никогда не видит пару
//! (sum, weight) из разных переходов.

use super::scope::Scope;
use super::StreamingComputation;
use crate::analysis::shape_inference::{ShapeInference, ShapeInferenceError};
use crate::asg::{Asg, NodeId, Value};
use crate::metrics::{MetricError, MetricResult};
use crate::runtime::backend::{run_with_feed, Backend, RuntimeError};
use crate::tensor::Tensor;
use log::{debug, trace};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type SharedState = Arc<RwLock<AccumulatorState>>;

/// Накопленное состояние одного аккумулятора.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorState {
    /// Сумма `values * weights` по всем батчам с последнего сброса.
    pub running_sum: f64,
    /// Сумма весов по всем батчам с последнего сброса.
    pub running_weight: f64,
    /// Вклад последнего батча (перезаписывается, не накапливается).
    pub batch_sum: f64,
    pub batch_weight: f64,
}

impl AccumulatorState {
    /// Среднее по всем батчам, 0 при нулевом весе.
    pub fn value(&self) -> f64 {
        safe_div(self.running_sum, self.running_weight)
    }

    /// Среднее по последнему батчу, 0 при нулевом весе.
    pub fn batch_value(&self) -> f64 {
        safe_div(self.batch_sum, self.batch_weight)
    }

    pub fn read(&self, kind: ReadKind) -> f64 {
        match kind {
            ReadKind::Value => self.value(),
            ReadKind::Count => self.running_weight,
            ReadKind::Total => self.running_sum,
            ReadKind::BatchValue => self.batch_value(),
            ReadKind::BatchCount => self.batch_weight,
            ReadKind::BatchTotal => self.batch_sum,
        }
    }

    fn apply(&mut self, sum: f64, weight: f64) {
        self.batch_sum = sum;
        self.batch_weight = weight;
        self.running_sum += sum;
        self.running_weight += weight;
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Какое представление состояния читает `StateRead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadKind {
    Value,
    Count,
    Total,
    BatchValue,
    BatchCount,
    BatchTotal,
}

impl ReadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadKind::Value => "value",
            ReadKind::Count => "count",
            ReadKind::Total => "total",
            ReadKind::BatchValue => "batch_value",
            ReadKind::BatchCount => "batch_count",
            ReadKind::BatchTotal => "batch_total",
        }
    }
}

impl fmt::Display for ReadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Дескриптор чтения одного представления состояния.
///
/// Значение берется в момент вызова `get`, а не в момент создания дескриптора.
#[derive(Debug, Clone)]
pub struct StateRead {
    name: String,
    kind: ReadKind,
    state: SharedState,
}

impl StateRead {
    pub fn get(&self) -> f64 {
        self.state.read().read(self.kind)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ReadKind {
        self.kind
    }

    /// Согласованная копия всех четырех полей.
    pub fn snapshot(&self) -> AccumulatorState {
        *self.state.read()
    }

    /// Читают ли два дескриптора одно и то же состояние.
    pub fn shares_state_with(&self, other: &StateRead) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Действие обновления: вычисляет батч и складывает его в состояние.
#[derive(Debug, Clone)]
pub struct UpdateOp {
    name: String,
    graph: Arc<Asg>,
    values: NodeId,
    weights: NodeId,
    state: SharedState,
}

impl UpdateOp {
    /// Выполняет граф на данных батча и применяет переход обновления.
    ///
    /// `feed` сопоставляет имена входов графа их значениям. Возвращает
    /// среднее по всем батчам после обновления. Ошибки бэкенда
    /// пробрасываются как есть, состояние при этом не меняется.
    pub fn run<B: Backend>(&self, backend: &B, feed: &HashMap<String, Value>) -> MetricResult<f64> {
        let outputs = run_with_feed(backend, &self.graph, feed)?;
        let [values, weights]: [Value; 2] = outputs.try_into().map_err(|outputs: Vec<Value>| {
            MetricError::Runtime(RuntimeError::ShapeError(format!(
                "граф обновления должен вернуть 2 выхода (values, weights), получено {}",
                outputs.len()
            )))
        })?;
        let (values, weights) = (values.into_tensor(), weights.into_tensor());
        if values.shape() != weights.shape() {
            return Err(MetricError::Runtime(RuntimeError::ShapeError(format!(
                "values (узел {}) {:?} и weights (узел {}) {:?} должны совпадать по форме",
                self.values,
                values.shape(),
                self.weights,
                weights.shape()
            ))));
        }

        let sum: f64 = values
            .iter()
            .zip(weights.iter())
            .map(|(&v, &w)| f64::from(v) * f64::from(w))
            .sum();
        let weight: f64 = weights.iter().map(|&w| f64::from(w)).sum();

        let running = {
            let mut state = self.state.write();
            state.apply(sum, weight);
            state.value()
        };
        trace!("{}: batch sum={} weight={}, running value={}", self.name, sum, weight, running);
        Ok(running)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Граф, из которого берутся значения и веса батча.
    pub fn graph(&self) -> &Asg {
        &self.graph
    }

    pub fn shares_state_with(&self, read: &StateRead) -> bool {
        Arc::ptr_eq(&self.state, &read.state)
    }
}

/// Действие сброса: обнуляет все четыре поля разом.
#[derive(Debug, Clone)]
pub struct ResetOp {
    name: String,
    state: SharedState,
}

impl ResetOp {
    pub fn run(&self) {
        self.state.write().reset();
        debug!("{}: state reset", self.name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Потоковое взвешенное среднее (аккумулятор).
///
/// ```rust,ignore
/// let mut avg = StreamingAverage::new();
/// let (mean, update) = avg.compute(&values, &weights, None)?;
/// update.run(&CpuBackend::new(), &batch)?; // один раз на батч
/// println!("{}", mean.get());
/// ```
#[derive(Debug)]
pub struct StreamingAverage {
    name: String,
    scope: Option<Scope>,
    state: SharedState,
    update_op: Option<UpdateOp>,
}

impl StreamingAverage {
    pub fn new() -> Self {
        Self::with_name("streaming_average")
    }

    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scope: None,
            state: Arc::new(RwLock::new(AccumulatorState::default())),
            update_op: None,
        }
    }

    /// Объявляет шаг накопления для пары (values, weights).
    ///
    /// Веса расширяются до формы значений, так что скалярный вес 1.0
    /// учитывает каждый элемент. Повторный вызов объявляет новый
    /// `UpdateOp` над тем же состоянием; выданные ранее остаются рабочими.
    pub fn compute(
        &mut self,
        values: &Tensor,
        weights: &Tensor,
        scope: Option<&Scope>,
    ) -> MetricResult<(StateRead, UpdateOp)> {
        if !values.same_context(weights) {
            return Err(MetricError::ContextMismatch);
        }
        if let (Some(vs), Some(ws)) = (values.shape(), weights.shape()) {
            if ShapeInference::broadcast_shapes(&ws, &vs)? != vs {
                return Err(ShapeInferenceError::BroadcastError(ws, vs).into());
            }
        }

        let scope = scope.cloned().unwrap_or_else(|| Scope::new(&self.name));
        let weights = weights.broadcast_like(values);

        let mut graph = values.context.borrow().main_graph().clone();
        graph.set_outputs(vec![values.node_id, weights.node_id]);

        let update_op = UpdateOp {
            name: scope.join("update_op"),
            graph: Arc::new(graph),
            values: values.node_id,
            weights: weights.node_id,
            state: Arc::clone(&self.state),
        };
        debug!(
            "{}: declared accumulation of node {} weighted by node {}",
            update_op.name, values.node_id, weights.node_id
        );

        self.scope = Some(scope);
        self.update_op = Some(update_op.clone());
        Ok((self.read(ReadKind::Value), update_op))
    }

    fn scope(&self) -> Scope {
        self.scope.clone().unwrap_or_else(|| Scope::new(&self.name))
    }

    fn read(&self, kind: ReadKind) -> StateRead {
        StateRead {
            name: self.scope().join(kind.as_str()),
            kind,
            state: Arc::clone(&self.state),
        }
    }

    /// Сумма весов с последнего сброса.
    pub fn count(&self) -> StateRead {
        self.read(ReadKind::Count)
    }

    /// Ненормированная сумма `values * weights` с последнего сброса.
    pub fn total(&self) -> StateRead {
        self.read(ReadKind::Total)
    }

    pub fn batch_value(&self) -> StateRead {
        self.read(ReadKind::BatchValue)
    }

    pub fn batch_count(&self) -> StateRead {
        self.read(ReadKind::BatchCount)
    }

    pub fn batch_total(&self) -> StateRead {
        self.read(ReadKind::BatchTotal)
    }

    pub fn snapshot(&self) -> AccumulatorState {
        *self.state.read()
    }
}

impl Default for StreamingAverage {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingComputation for StreamingAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> StateRead {
        self.read(ReadKind::Value)
    }

    fn update_op(&self) -> Option<UpdateOp> {
        self.update_op.clone()
    }

    fn reset_op(&self) -> ResetOp {
        ResetOp {
            name: self.scope().join("reset_op"),
            state: Arc::clone(&self.state),
        }
    }
}
