//! Именованные коллекции дескрипторов.
//!
//! Вместо глобального реестра вызывающая сторона сама владеет `Collections`
//! и передает его по ссылке туда, где дескрипторы должны быть опубликованы.
//! Добавление только дописывает в конец и никогда не заменяет уже
//! опубликованное.

use crate::asg::Value;
use crate::metrics::MetricResult;
use crate::runtime::backend::Backend;
use crate::streaming::{StateRead, UpdateOp};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Элемент коллекции.
#[derive(Debug, Clone)]
pub enum CollectionEntry {
    Value(StateRead),
    Update(UpdateOp),
}

impl CollectionEntry {
    pub fn name(&self) -> &str {
        match self {
            CollectionEntry::Value(read) => read.name(),
            CollectionEntry::Update(op) => op.name(),
        }
    }
}

impl From<StateRead> for CollectionEntry {
    fn from(read: StateRead) -> Self {
        CollectionEntry::Value(read)
    }
}

impl From<UpdateOp> for CollectionEntry {
    fn from(op: UpdateOp) -> Self {
        CollectionEntry::Update(op)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Collections {
    entries: BTreeMap<String, Vec<CollectionEntry>>,
}

impl Collections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_collection(&mut self, key: &str, entry: impl Into<CollectionEntry>) {
        let entry = entry.into();
        debug!("collection '{}': added {}", key, entry.name());
        self.entries.entry(key.to_string()).or_default().push(entry);
    }

    /// Добавляет один и тот же элемент в каждую из коллекций `keys`.
    pub fn add_to_collections<S: AsRef<str>>(&mut self, keys: &[S], entry: impl Into<CollectionEntry>) {
        let entry = entry.into();
        for key in keys {
            self.add_to_collection(key.as_ref(), entry.clone());
        }
    }

    /// Все элементы коллекции в порядке добавления; пусто, если ключа нет.
    pub fn get(&self, key: &str) -> &[CollectionEntry] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn values<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a StateRead> + 'a {
        self.get(key).iter().filter_map(|entry| match entry {
            CollectionEntry::Value(read) => Some(read),
            CollectionEntry::Update(_) => None,
        })
    }

    pub fn updates<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a UpdateOp> + 'a {
        self.get(key).iter().filter_map(|entry| match entry {
            CollectionEntry::Update(op) => Some(op),
            CollectionEntry::Value(_) => None,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Текущие значения всех дескрипторов чтения коллекции: `(имя, значение)`.
    pub fn reads(&self, key: &str) -> Vec<(String, f64)> {
        self.values(key).map(|read| (read.name().to_string(), read.get())).collect()
    }

    /// Выполняет все действия обновления коллекции на одном батче.
    ///
    /// Останавливается на первой ошибке; действия до нее уже применены.
    pub fn run_updates<B: Backend>(
        &self,
        key: &str,
        backend: &B,
        feed: &HashMap<String, Value>,
    ) -> MetricResult<usize> {
        let mut ran = 0;
        for op in self.updates(key) {
            op.run(backend, feed)?;
            ran += 1;
        }
        Ok(ran)
    }
}
