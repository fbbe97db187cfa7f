//! ASG: Абстрактный семантический граф
//!
//! Граф описывает вычисление, но ничего не вычисляет. Узлы добавляются
//! только в конец, поэтому `NodeId` однажды выданного узла остается
//! валидным и в любом последующем снимке графа.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Идентификатор узла
pub type NodeId = usize;
/// Идентификатор графа
pub type AsgId = usize;
/// Форма тензора
pub type Shape = Vec<usize>;

pub type AsgResult<T> = std::result::Result<T, AsgError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AsgError {
    #[error("Узел с ID {0} не найден")]
    NodeNotFound(NodeId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    F32,
    I32,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// ID узла (дублируем ключ HashMap для удобства вызовов в других модулях)
    pub id: NodeId,
    pub name: Option<String>,
    pub node_type: NodeType,
    pub shape: Option<Shape>,
    pub dtype: Option<DType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeType {
    // Данные
    Input { name: String },
    Literal(Value),

    // Бинарные (с broadcasting)
    Subtract(NodeId, NodeId),
    Multiply(NodeId, NodeId),
    Equal(NodeId, NodeId),

    // Унарные
    Abs(NodeId),
    /// Индекс максимума по последней оси, ось удаляется.
    ArgMax(NodeId),
    Cast(NodeId, DType),

    // Трансформации
    /// Расширяет первый операнд до формы второго.
    Broadcast(NodeId, NodeId),
}

impl NodeType {
    /// Операнды узла в порядке их объявления.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            NodeType::Input { .. } | NodeType::Literal(_) => vec![],
            NodeType::Subtract(a, b)
            | NodeType::Multiply(a, b)
            | NodeType::Equal(a, b)
            | NodeType::Broadcast(a, b) => vec![*a, *b],
            NodeType::Abs(a) | NodeType::ArgMax(a) | NodeType::Cast(a, _) => vec![*a],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Tensor(ArrayD<f32>),
    ScalarF32(f32),
    ScalarI32(i32),
    ScalarBool(bool),
}

impl Value {
    /// Приводит значение к тензору; скаляры становятся 0-мерными массивами.
    pub fn into_tensor(self) -> ArrayD<f32> {
        match self {
            Value::Tensor(arr) => arr,
            Value::ScalarF32(x) => ndarray::arr0(x).into_dyn(),
            Value::ScalarI32(x) => ndarray::arr0(x as f32).into_dyn(),
            Value::ScalarBool(x) => ndarray::arr0(if x { 1.0 } else { 0.0 }).into_dyn(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asg {
    pub id: AsgId,
    pub name: Option<String>,
    pub nodes: HashMap<NodeId, Node>,
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
}

impl Asg {
    pub fn new(id: AsgId, name: Option<String>) -> Self {
        Self { id, name, nodes: HashMap::new(), inputs: vec![], outputs: vec![] }
    }

    pub fn add_node(&mut self, name: Option<String>, node_type: NodeType) -> NodeId {
        let new_id = self.nodes.len();
        let mut node = Node { id: new_id, name, node_type, shape: None, dtype: None };

        // Автопроставление shape/dtype для литералов
        match &node.node_type {
            NodeType::Literal(Value::Tensor(arr)) => {
                node.shape = Some(arr.shape().to_vec());
                node.dtype = Some(DType::F32);
            }
            NodeType::Literal(Value::ScalarF32(_)) => {
                node.shape = Some(vec![]);
                node.dtype = Some(DType::F32);
            }
            NodeType::Literal(Value::ScalarI32(_)) => {
                node.shape = Some(vec![]);
                node.dtype = Some(DType::I32);
            }
            NodeType::Literal(Value::ScalarBool(_)) => {
                node.shape = Some(vec![]);
                node.dtype = Some(DType::Bool);
            }
            _ => {}
        }

        self.nodes.insert(new_id, node);
        new_id
    }

    pub fn set_outputs(&mut self, outputs: Vec<NodeId>) { self.outputs = outputs; }

    pub fn get_node(&self, id: NodeId) -> AsgResult<&Node> {
        self.nodes.get(&id).ok_or(AsgError::NodeNotFound(id))
    }
    pub fn get_node_mut(&mut self, id: NodeId) -> AsgResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(AsgError::NodeNotFound(id))
    }
}
