// --- Файл: src/streaming/mod.rs ---

//! Потоковые вычисления: значения, которые обновляются батч за батчем
//! без повторной обработки уже виденных данных.
//!
//! Работа идет в две фазы:
//! 1. **Объявление** (`compute`): строит граф и возвращает дескрипторы
//!    `StateRead` и `UpdateOp`. Ничего не вычисляется.
//! 2. **Выполнение**: `UpdateOp::run` один раз на батч, `StateRead::get`
//!    в любой момент, `ResetOp::run` на границах эпох.

pub mod average;
pub mod scope;

pub use average::{AccumulatorState, ReadKind, ResetOp, StateRead, StreamingAverage, UpdateOp};
pub use scope::Scope;

/// Общий интерфейс всех потоковых вычислений.
pub trait StreamingComputation {
    /// Имя, под которым вычисление объявляется по умолчанию.
    fn name(&self) -> &str;

    /// Текущее значение по всем батчам с последнего сброса.
    fn value(&self) -> StateRead;

    /// Последнее объявленное действие обновления, если `compute` уже вызывался.
    fn update_op(&self) -> Option<UpdateOp>;

    /// Действие сброса состояния.
    fn reset_op(&self) -> ResetOp;
}
