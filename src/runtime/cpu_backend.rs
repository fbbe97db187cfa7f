//! Модуль, реализующий бэкенд для выполнения ASG на CPU.
//!
//! Этот бэкенд обходит граф вычислений (ASG) и для каждого узла
//! выполняет соответствующую операцию с помощью `ndarray`.

use super::backend::{Backend, Memo, RuntimeError};
use crate::analysis::shape_inference::ShapeInference;
use crate::asg::{Asg, AsgId, DType, NodeId, NodeType, Value};
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use std::collections::HashMap;

/// Контекст выполнения одного графа на CPU.
struct ExecutionContext<'a> {
    asg: &'a Asg,
    /// Кэш для уже вычисленных значений узлов.
    memo: Memo<Value>,
}

impl<'a> ExecutionContext<'a> {
    fn new(asg: &'a Asg, initial_memo: Memo<Value>) -> Self {
        Self { asg, memo: initial_memo }
    }

    /// Рекурсивно вычисляет значение для заданного узла.
    fn evaluate_node(&mut self, asg_id: AsgId, node_id: NodeId) -> Result<Value, RuntimeError> {
        if let Some(value) = self.memo.get(&(asg_id, node_id)) {
            return Ok(value.clone());
        }

        let node = self
            .asg
            .nodes
            .get(&node_id)
            .ok_or(RuntimeError::NodeNotFound(node_id, asg_id))?;

        let result = match &node.node_type {
            NodeType::Input { name } => {
                return Err(RuntimeError::MissingInput(name.clone(), node.id));
            }
            NodeType::Literal(value) => Ok(value.clone().into_tensor()),

            NodeType::Subtract(l, r) | NodeType::Multiply(l, r) | NodeType::Equal(l, r) |
            NodeType::Broadcast(l, r) => {
                let lhs = self.evaluate_node(asg_id, *l)?.into_tensor();
                let rhs = self.evaluate_node(asg_id, *r)?.into_tensor();
                match &node.node_type {
                    NodeType::Subtract(_, _) => op_binary(&lhs, &rhs, |a, b| a - b),
                    NodeType::Multiply(_, _) => op_binary(&lhs, &rhs, |a, b| a * b),
                    NodeType::Equal(_, _) => op_binary(&lhs, &rhs, |a, b| if a == b { 1.0 } else { 0.0 }),
                    NodeType::Broadcast(_, _) => op_broadcast(lhs, &rhs),
                    _ => unreachable!(),
                }
            }

            NodeType::Abs(op) | NodeType::ArgMax(op) | NodeType::Cast(op, _) => {
                let operand = self.evaluate_node(asg_id, *op)?.into_tensor();
                match &node.node_type {
                    NodeType::Abs(_) => Ok(operand.mapv(f32::abs)),
                    NodeType::ArgMax(_) => op_argmax(&operand),
                    NodeType::Cast(_, dtype) => Ok(op_cast(operand, *dtype)),
                    _ => unreachable!(),
                }
            }
        }
        .map(Value::Tensor)?;

        self.memo.insert((asg_id, node_id), result.clone());
        Ok(result)
    }
}

/// Бэкенд для выполнения графа на CPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self { Self }
}

impl Backend for CpuBackend {
    type DeviceData = Value;

    fn load_data(
        &self,
        data: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Self::DeviceData>, RuntimeError> {
        Ok(data.clone())
    }

    fn run(
        &self,
        main_asg: &Asg,
        initial_memo: Memo<Self::DeviceData>,
    ) -> Result<(Vec<Self::DeviceData>, Memo<Self::DeviceData>), RuntimeError> {
        let sorted_nodes = ShapeInference::topological_sort(main_asg)
            .map_err(|e| RuntimeError::ShapeError(format!("Topological sort failed: {:?}", e)))?;

        let mut context = ExecutionContext::new(main_asg, initial_memo);

        for node_id in sorted_nodes {
            context.evaluate_node(main_asg.id, node_id)?;
        }

        let mut results = Vec::new();
        for output_node_id in &main_asg.outputs {
            let result = context.memo.get(&(main_asg.id, *output_node_id))
                .ok_or(RuntimeError::NodeNotFound(*output_node_id, main_asg.id))?
                .clone();
            results.push(result);
        }
        Ok((results, context.memo))
    }

    fn retrieve_data(&self, device_data: &[Self::DeviceData]) -> Result<Vec<Value>, RuntimeError> {
        Ok(device_data.to_vec())
    }
}

fn op_binary(
    lhs: &ArrayD<f32>,
    rhs: &ArrayD<f32>,
    f: impl Fn(f32, f32) -> f32,
) -> Result<ArrayD<f32>, RuntimeError> {
    let shape = ShapeInference::broadcast_shapes(lhs.shape(), rhs.shape())
        .map_err(|e| RuntimeError::ShapeError(e.to_string()))?;
    let (a, b) = match (lhs.broadcast(IxDyn(&shape)), rhs.broadcast(IxDyn(&shape))) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(RuntimeError::ShapeError(format!(
                "Cannot broadcast {:?} and {:?}",
                lhs.shape(),
                rhs.shape()
            )))
        }
    };
    Ok(Zip::from(&a).and(&b).map_collect(|&x, &y| f(x, y)))
}

fn op_broadcast(source: ArrayD<f32>, target: &ArrayD<f32>) -> Result<ArrayD<f32>, RuntimeError> {
    let target_shape = target.shape();
    if source.shape() == target_shape {
        return Ok(source);
    }
    let broadcasted = source.broadcast(target_shape)
        .ok_or_else(|| RuntimeError::ShapeError(
            format!("Cannot broadcast {:?} to {:?}", source.shape(), target_shape)
        ))?;
    Ok(broadcasted.to_owned())
}

/// Первый максимум выигрывает при равенстве значений.
fn op_argmax(operand: &ArrayD<f32>) -> Result<ArrayD<f32>, RuntimeError> {
    if operand.ndim() == 0 {
        return Err(RuntimeError::ShapeError("ArgMax требует хотя бы одну ось".to_string()));
    }
    let last_axis = Axis(operand.ndim() - 1);
    if operand.len_of(last_axis) == 0 {
        return Err(RuntimeError::ShapeError("ArgMax по пустой оси".to_string()));
    }
    Ok(operand.map_axis(last_axis, |lane| {
        let mut best = 0;
        for (i, &v) in lane.iter().enumerate() {
            if v > lane[best] {
                best = i;
            }
        }
        best as f32
    }))
}

fn op_cast(operand: ArrayD<f32>, dtype: DType) -> ArrayD<f32> {
    match dtype {
        DType::F32 => operand,
        DType::I32 => operand.mapv(f32::trunc),
        DType::Bool => operand.mapv(|x| if x != 0.0 { 1.0 } else { 0.0 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::backend::run_with_feed;
    use crate::tensor::{GraphContext, Tensor};
    use ndarray::array;

    fn feed(pairs: Vec<(&str, ArrayD<f32>)>) -> HashMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), Value::Tensor(v))).collect()
    }

    #[test]
    fn test_argmax_first_maximum_wins() {
        let x = array![[0.1, 0.7, 0.2], [0.5, 0.5, 0.0]].into_dyn();
        let out = op_argmax(&x).unwrap();
        assert_eq!(out, array![1.0f32, 0.0].into_dyn());
    }

    #[test]
    fn test_argmax_on_scalar_fails() {
        let x = ndarray::arr0(1.0f32).into_dyn();
        assert!(matches!(op_argmax(&x), Err(RuntimeError::ShapeError(_))));
    }

    #[test]
    fn test_binary_broadcasts_scalar() {
        let a = array![1.0, 2.0, 3.0].into_dyn();
        let b = ndarray::arr0(2.0f32).into_dyn();
        let out = op_binary(&a, &b, |x, y| x * y).unwrap();
        assert_eq!(out, array![2.0f32, 4.0, 6.0].into_dyn());
    }

    #[test]
    fn test_binary_shape_mismatch() {
        let a = array![1.0f32, 2.0, 3.0].into_dyn();
        let b = array![1.0f32, 2.0].into_dyn();
        assert!(matches!(op_binary(&a, &b, |x, y| x + y), Err(RuntimeError::ShapeError(_))));
    }

    #[test]
    fn test_run_graph_with_feed() {
        let context = GraphContext::shared();
        let t = Tensor::new_input(&context, "t");
        let p = Tensor::new_input(&context, "p");
        let hits = t.equal(&p.argmax().cast(DType::I32)).cast(DType::F32);

        let mut graph = context.borrow().main_graph().clone();
        graph.set_outputs(vec![hits.node_id]);

        let data = feed(vec![
            ("t", array![1.0, 0.0].into_dyn()),
            ("p", array![[0.1, 0.7, 0.2], [0.1, 0.7, 0.2]].into_dyn()),
        ]);
        let out = run_with_feed(&CpuBackend::new(), &graph, &data).unwrap();
        assert_eq!(out, vec![Value::Tensor(array![1.0, 0.0].into_dyn())]);
    }

    #[test]
    fn test_missing_input_is_reported() {
        let context = GraphContext::shared();
        let x = Tensor::new_input(&context, "x");
        let y = x.abs();
        let mut graph = context.borrow().main_graph().clone();
        graph.set_outputs(vec![y.node_id]);

        let err = run_with_feed(&CpuBackend::new(), &graph, &HashMap::new()).unwrap_err();
        assert_eq!(err, RuntimeError::MissingInput("x".to_string(), x.node_id));
    }
}
