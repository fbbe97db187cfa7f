//! Модуль, определяющий `Tensor` и `GraphContext`.
//!
//! `Tensor` не является контейнером для данных. Это легковесный
//! "дескриптор" (handle), который представляет узел в
//! `Абстрактном Семантическом Графе` (ASG).
//!
//! Все операции над тензорами (`equal`, `argmax`, `*` и т.д.) не выполняют
//! вычисления немедленно, а добавляют соответствующие узлы в граф.
//! Реальные данные появляются только при выполнении графа бэкендом.

use crate::analysis::shape_inference::ShapeInference;
use crate::asg::{Asg, DType, NodeId, NodeType, Shape, Value};
use ndarray::ArrayD;
use std::cell::RefCell;
use std::ops::{Mul, Sub};
use std::rc::Rc;

/// Контекст, который владеет и управляет построением ASG.
///
/// Этот объект обернут в `Rc<RefCell<>>`, чтобы его можно было
/// разделять между множеством `Tensor` дескрипторов.
#[derive(Debug, Clone)]
pub struct GraphContext {
    main_graph: Asg,
}

impl GraphContext {
    /// Создает новый, пустой контекст графа.
    pub fn new() -> Self {
        Self {
            main_graph: Asg::new(0, Some("main".to_string())),
        }
    }

    /// Создает контекст, уже обернутый в `Rc<RefCell<>>`.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Получает изменяемую ссылку на основной граф для его построения.
    pub fn main_graph_mut(&mut self) -> &mut Asg {
        &mut self.main_graph
    }

    /// Получает иммутабельную ссылку на основной граф.
    pub fn main_graph(&self) -> &Asg {
        &self.main_graph
    }
}

impl Default for GraphContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Символьный дескриптор, представляющий узел в графе вычислений (ASG).
///
/// Этот объект не содержит реальных данных. Он состоит из ID узла и ссылки
/// на `GraphContext`, в котором этот узел существует.
#[derive(Debug, Clone)]
pub struct Tensor {
    /// ID узла в ASG, который представляет этот тензор.
    pub node_id: NodeId,
    /// Разделяемая ссылка на контекст, в котором строится граф.
    pub context: Rc<RefCell<GraphContext>>,
}

impl Tensor {
    /// Создает новый "входной" узел без статической формы.
    /// Во входные узлы подаются реальные данные батча во время выполнения.
    pub fn new_input(context: &Rc<RefCell<GraphContext>>, name: &str) -> Self {
        let mut ctx = context.borrow_mut();
        let graph = ctx.main_graph_mut();

        let node_id = graph.add_node(
            Some(name.to_string()),
            NodeType::Input {
                name: name.to_string(),
            },
        );
        graph.inputs.push(node_id);

        Self {
            node_id,
            context: Rc::clone(context),
        }
    }

    /// Создает входной узел с известной формой и типом.
    ///
    /// Форма нужна в момент построения там, где от нее зависит сам граф
    /// (например, `accuracy` сравнивает ранги targets и predictions).
    pub fn new_input_with_shape(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        shape: Shape,
        dtype: DType,
    ) -> Self {
        let tensor = Self::new_input(context, name);
        {
            let mut ctx = context.borrow_mut();
            if let Ok(node) = ctx.main_graph_mut().get_node_mut(tensor.node_id) {
                node.shape = Some(shape);
                node.dtype = Some(dtype);
            }
        }
        tensor
    }

    /// Создает новый узел-константу (литерал) из реальных данных.
    pub fn new_literal(context: &Rc<RefCell<GraphContext>>, data: ArrayD<f32>, name: &str) -> Self {
        Self::from_value(context, Value::Tensor(data), name)
    }

    /// Скалярная константа.
    pub fn scalar(context: &Rc<RefCell<GraphContext>>, value: f32, name: &str) -> Self {
        Self::from_value(context, Value::ScalarF32(value), name)
    }

    fn from_value(context: &Rc<RefCell<GraphContext>>, value: Value, name: &str) -> Self {
        let node_id = context
            .borrow_mut()
            .main_graph_mut()
            .add_node(Some(name.to_string()), NodeType::Literal(value));
        Self {
            node_id,
            context: Rc::clone(context),
        }
    }

    /// Добавляет узел в тот же граф и сразу пытается вывести его форму.
    ///
    /// Ошибка вывода здесь не фатальна: узел остается без формы, а
    /// несовместимость обнаружится либо проверкой при объявлении метрики,
    /// либо при выполнении.
    fn push(&self, node_type: NodeType) -> Self {
        let node_id = {
            let mut ctx = self.context.borrow_mut();
            let graph = ctx.main_graph_mut();
            let id = graph.add_node(None, node_type);
            let _ = ShapeInference::infer_in_place(graph, id);
            id
        };
        Self {
            node_id,
            context: Rc::clone(&self.context),
        }
    }

    /// Статическая форма узла, если она известна.
    pub fn shape(&self) -> Option<Shape> {
        let ctx = self.context.borrow();
        ctx.main_graph()
            .get_node(self.node_id)
            .ok()
            .and_then(|node| node.shape.clone())
    }

    /// Ранг (число осей), если форма известна.
    pub fn rank(&self) -> Option<usize> {
        self.shape().map(|s| s.len())
    }

    pub fn dtype(&self) -> Option<DType> {
        let ctx = self.context.borrow();
        ctx.main_graph().get_node(self.node_id).ok().and_then(|node| node.dtype)
    }

    /// Проверяет, что оба дескриптора принадлежат одному графу.
    pub fn same_context(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.context, &other.context)
    }

    // --- Поэлементные операции ---

    /// Поэлементное сравнение, 1.0 там где значения равны.
    pub fn equal(&self, other: &Tensor) -> Self {
        self.push(NodeType::Equal(self.node_id, other.node_id))
    }

    pub fn abs(&self) -> Self {
        self.push(NodeType::Abs(self.node_id))
    }

    pub fn cast(&self, dtype: DType) -> Self {
        self.push(NodeType::Cast(self.node_id, dtype))
    }

    // --- Редукции и трансформации ---

    /// Индекс максимального элемента по последней оси.
    pub fn argmax(&self) -> Self {
        self.push(NodeType::ArgMax(self.node_id))
    }

    /// Расширяет тензор до формы `like`.
    pub fn broadcast_like(&self, like: &Tensor) -> Self {
        self.push(NodeType::Broadcast(self.node_id, like.node_id))
    }
}

// Реализация операторов для удобного синтаксиса `a * b`.

impl Sub<&Tensor> for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: &Tensor) -> Self::Output {
        self.push(NodeType::Subtract(self.node_id, rhs.node_id))
    }
}

impl Mul<&Tensor> for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: &Tensor) -> Self::Output {
        self.push(NodeType::Multiply(self.node_id, rhs.node_id))
    }
}
