//! Модуль, определяющий абстрактный интерфейс (трейт) для исполнительных бэкендов.

use crate::asg::{Asg, AsgId, NodeId, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Ошибки, которые могут возникнуть во время выполнения графа.
/// Этот тип ошибок является общим для всех бэкендов.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Узел с ID {0} не найден в графе {1}. Проверьте, что граф был корректно построен и все узлы существуют.")]
    NodeNotFound(NodeId, AsgId),

    #[error("Несоответствие типов: операция ожидала {expected}, но получила {actual}. Проверьте типы входных данных.")]
    TypeError { expected: String, actual: String },

    #[error("Ошибка формы тензора: {0}. Проверьте размерности входных тензоров.")]
    ShapeError(String),

    #[error("Отсутствует значение для входа '{0}' (узел ID: {1}). Добавьте это значение в данные батча.")]
    MissingInput(String, NodeId),
}

/// Кэш для хранения уже вычисленных значений узлов.
/// Ключ - это (AsgId, NodeId).
pub type Memo<T> = HashMap<(AsgId, NodeId), T>;

/// Трейт, определяющий общий интерфейс для исполнительной среды (бэкенда).
///
/// Любая структура, реализующая этот трейт, может взять ASG и данные
/// и выполнить вычисления, возвращая результат.
pub trait Backend {
    /// Тип, представляющий данные, специфичные для устройства.
    type DeviceData: std::fmt::Debug + Clone;

    /// Подготавливает данные для выполнения.
    fn load_data(
        &self,
        data: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Self::DeviceData>, RuntimeError>;

    /// Выполняет граф, используя и обновляя кэш вычислений.
    ///
    /// # Аргументы
    /// * `main_asg` - Граф для выполнения; вычисляются его `outputs`.
    /// * `initial_memo` - Кэш с начальными данными (входы).
    ///
    /// # Возвращает
    /// Кортеж из выходных данных графа и финального состояния кэша.
    fn run(
        &self,
        main_asg: &Asg,
        initial_memo: Memo<Self::DeviceData>,
    ) -> Result<(Vec<Self::DeviceData>, Memo<Self::DeviceData>), RuntimeError>;

    /// Забирает результат с устройства обратно в виде CPU-значения (`Value`).
    fn retrieve_data(&self, device_data: &[Self::DeviceData]) -> Result<Vec<Value>, RuntimeError>;
}

/// Подает данные батча во входы графа и вычисляет его выходы.
///
/// Входы сопоставляются по имени `NodeType::Input`; входы, для которых
/// данных нет, не заполняются, и бэкенд сообщит о них как о `MissingInput`,
/// если они нужны для выходов.
pub fn run_with_feed<B: Backend>(
    backend: &B,
    asg: &Asg,
    feed: &HashMap<String, Value>,
) -> Result<Vec<Value>, RuntimeError> {
    let device_data = backend.load_data(feed)?;

    let mut initial_memo: Memo<B::DeviceData> = HashMap::new();
    for &id in &asg.inputs {
        let node = asg.nodes.get(&id).ok_or(RuntimeError::NodeNotFound(id, asg.id))?;
        if let crate::asg::NodeType::Input { name } = &node.node_type {
            if let Some(data) = device_data.get(name) {
                initial_memo.insert((asg.id, id), data.clone());
            }
        }
    }

    let (outputs, _) = backend.run(asg, initial_memo)?;
    backend.retrieve_data(&outputs)
}
