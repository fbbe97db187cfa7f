// --- Файл: src/config.rs ---

//! Конфигурация прогона оценки (JSON).

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Ошибки загрузки конфигурации
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Ошибка ввода/вывода: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Ошибка JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Файл конфигурации не найден: {0}")]
    FileNotFound(PathBuf),

    #[error("Недопустимое значение '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

type Result<T> = std::result::Result<T, ConfigError>;

/// Параметры синтетического прогона потоковой метрики.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Число батчей
    pub batches: usize,
    /// Размер батча
    pub batch_size: usize,
    /// Число классов
    pub num_classes: usize,
    pub seed: u64,
    /// Доля примеров, для которых "модель" выдает случайный ответ.
    pub label_noise: f32,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            batches: 10,
            batch_size: 32,
            num_classes: 4,
            seed: 42,
            label_noise: 0.25,
        }
    }
}

impl EvalConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let mut file = File::open(path)?;
        let mut json = String::new();
        file.read_to_string(&mut json)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batches == 0 {
            return Err(invalid("batches", "должно быть больше 0"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "должно быть больше 0"));
        }
        if self.num_classes < 2 {
            return Err(invalid("num_classes", "нужно как минимум 2 класса"));
        }
        if !(0.0..=1.0).contains(&self.label_noise) {
            return Err(invalid("label_noise", "должно лежать в [0, 1]"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = EvalConfig::from_json_str(r#"{ "batches": 3, "seed": 7 }"#).unwrap();
        assert_eq!(config.batches, 3);
        assert_eq!(config.seed, 7);
        assert_eq!(config.batch_size, EvalConfig::default().batch_size);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = EvalConfig::from_json_str(r#"{ "num_classes": 1 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "num_classes", .. }));

        let err = EvalConfig::from_json_str(r#"{ "label_noise": 1.5 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "label_noise", .. }));

        assert!(matches!(EvalConfig::from_json_str("{ batches: }"), Err(ConfigError::JsonError(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = EvalConfig::from_json_file("/nonexistent/eval.json").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
