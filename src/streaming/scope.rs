//! Иерархические имена для потоковых вычислений.
//!
//! `Scope` используется только для имен (логи, диагностика, `Debug`),
//! он никогда не определяет, где лежит состояние.

use std::fmt;

/// Путь вида `eval/accuracy`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    parts: Vec<String>,
}

impl Scope {
    /// Корневой (пустой) scope.
    pub fn root() -> Self {
        Self::default()
    }

    /// Scope из одного имени. Имя может само содержать `/`.
    pub fn new(name: &str) -> Self {
        Self::root().child(name)
    }

    /// Вложенный scope.
    pub fn child(&self, name: &str) -> Self {
        let mut parts = self.parts.clone();
        parts.extend(name.split('/').filter(|p| !p.is_empty()).map(str::to_string));
        Self { parts }
    }

    pub fn is_root(&self) -> bool {
        self.parts.is_empty()
    }

    /// Последний компонент пути.
    pub fn name(&self) -> Option<&str> {
        self.parts.last().map(String::as_str)
    }

    pub fn path(&self) -> String {
        self.parts.join("/")
    }

    /// Полное имя объекта `leaf` внутри этого scope.
    pub fn join(&self, leaf: &str) -> String {
        self.child(leaf).path()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
