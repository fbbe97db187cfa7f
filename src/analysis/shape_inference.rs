//! Module for shape and data type inference (Shape Inference).
//!
//! Determines the shape and data type of each node from the shapes of its
//! operands. Inference is done eagerly, node by node, while the graph is
//! being built: a node whose operands all have known shapes gets its own
//! shape filled in immediately.

use crate::asg::{Asg, AsgError, DType, Node, NodeId, NodeType, Shape, Value};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeInferenceError {
    #[error("Graph error: {0}")]
    AsgError(#[from] AsgError),

    #[error("Shape information missing for node {0}. \
             Declare the input with Tensor::new_input_with_shape() if its shape is needed at build time.")]
    MissingShapeInfo(NodeId),

    #[error("Invalid tensor rank for node {node_id}: expected at least {expected}D, got {actual}D.")]
    InvalidRank {
        node_id: NodeId,
        expected: usize,
        actual: usize,
    },

    #[error("Broadcast error: cannot broadcast shapes {0:?} and {1:?} to a common shape.")]
    BroadcastError(Shape, Shape),
}

type Result<T> = std::result::Result<T, ShapeInferenceError>;

/// Structure that performs shape inference for ASG.
pub struct ShapeInference;

impl ShapeInference {
    /// Infers `shape` and `dtype` of a single node and stores them in the graph.
    ///
    /// Returns `Ok(false)` (leaving the node untouched) when some operand has
    /// no shape yet, which is the normal case for inputs declared without shape.
    pub fn infer_in_place(asg: &mut Asg, node_id: NodeId) -> Result<bool> {
        let node = asg.get_node(node_id)?.clone();
        if node.shape.is_some() && node.dtype.is_some() {
            return Ok(true);
        }

        match Self::infer_node_shape(asg, &node) {
            Ok((shape, dtype)) => {
                let node = asg.get_node_mut(node_id)?;
                node.shape = Some(shape);
                node.dtype = Some(dtype);
                Ok(true)
            }
            Err(ShapeInferenceError::MissingShapeInfo(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Main shape inference logic for a single node.
    pub fn infer_node_shape(asg: &Asg, node: &Node) -> Result<(Shape, DType)> {
        match &node.node_type {
            NodeType::Input { .. } => match (&node.shape, node.dtype) {
                (Some(shape), Some(dtype)) => Ok((shape.clone(), dtype)),
                _ => Err(ShapeInferenceError::MissingShapeInfo(node.id)),
            },

            NodeType::Literal(value) => match value {
                Value::Tensor(arr) => Ok((arr.shape().to_vec(), DType::F32)),
                Value::ScalarF32(_) => Ok((vec![], DType::F32)),
                Value::ScalarI32(_) => Ok((vec![], DType::I32)),
                Value::ScalarBool(_) => Ok((vec![], DType::Bool)),
            },

            NodeType::Subtract(l, r) | NodeType::Multiply(l, r) => {
                let (ls, ld) = Self::get_shape_dtype(asg, *l)?;
                let (rs, _) = Self::get_shape_dtype(asg, *r)?;
                Ok((Self::broadcast_shapes(&ls, &rs)?, ld))
            }

            NodeType::Equal(l, r) => {
                let (ls, _) = Self::get_shape_dtype(asg, *l)?;
                let (rs, _) = Self::get_shape_dtype(asg, *r)?;
                Ok((Self::broadcast_shapes(&ls, &rs)?, DType::Bool))
            }

            NodeType::Abs(id) => Self::get_shape_dtype(asg, *id),

            NodeType::ArgMax(id) => {
                let (mut shape, _) = Self::get_shape_dtype(asg, *id)?;
                if shape.pop().is_none() {
                    return Err(ShapeInferenceError::InvalidRank {
                        node_id: node.id,
                        expected: 1,
                        actual: 0,
                    });
                }
                Ok((shape, DType::I32))
            }

            NodeType::Cast(id, dtype) => {
                let (shape, _) = Self::get_shape_dtype(asg, *id)?;
                Ok((shape, *dtype))
            }

            NodeType::Broadcast(source, like) => {
                let (ss, sd) = Self::get_shape_dtype(asg, *source)?;
                let (ts, _) = Self::get_shape_dtype(asg, *like)?;
                let out = Self::broadcast_shapes(&ss, &ts)?;
                if out != ts {
                    return Err(ShapeInferenceError::BroadcastError(ss, ts));
                }
                Ok((ts, sd))
            }
        }
    }

    /// Numpy-style broadcasting of two shapes: trailing dimensions are
    /// aligned, a dimension of 1 stretches to the other one.
    pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Shape> {
        let rank = a.len().max(b.len());
        let mut out = vec![0; rank];
        for i in 0..rank {
            let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
            let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
            out[i] = match (da, db) {
                (x, y) if x == y => x,
                (1, y) => y,
                (x, 1) => x,
                _ => return Err(ShapeInferenceError::BroadcastError(a.to_vec(), b.to_vec())),
            };
        }
        Ok(out)
    }

    fn get_shape_dtype(asg: &Asg, node_id: NodeId) -> Result<(Shape, DType)> {
        let node = asg.get_node(node_id)?;
        match (&node.shape, node.dtype) {
            (Some(shape), Some(dtype)) => Ok((shape.clone(), dtype)),
            _ => Err(ShapeInferenceError::MissingShapeInfo(node_id)),
        }
    }

    /// Topological order of every node the graph outputs depend on.
    pub fn topological_sort(asg: &Asg) -> Result<Vec<NodeId>> {
        let mut sorted = Vec::new();
        let mut visited = HashSet::new();
        // IMPORTANT: need to traverse all outputs, not just one
        for output_id in &asg.outputs {
            Self::build_sorted_graph(*output_id, asg, &mut visited, &mut sorted)?;
        }
        Ok(sorted)
    }

    fn build_sorted_graph(
        node_id: NodeId,
        asg: &Asg,
        visited: &mut HashSet<NodeId>,
        sorted: &mut Vec<NodeId>,
    ) -> Result<()> {
        if visited.contains(&node_id) {
            return Ok(());
        }

        let node = asg.get_node(node_id)?;
        for input_id in node.node_type.operands() {
            Self::build_sorted_graph(input_id, asg, visited, sorted)?;
        }

        visited.insert(node_id);
        sorted.push(node_id);
        Ok(())
    }
}
