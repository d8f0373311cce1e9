// config.rs
// 数据集解析配置及训练超参数结构体，包含默认值、JSON配置文件加载和超参数校验。
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ResolveError, Result};

/// 训练超参数，直接对应任务描述中的 options 块
///
/// 只作为元数据传递给下游计算引擎，解析本身并不依赖它。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOptions {
    // 编译模型所必需
    pub loss: String,
    pub optimizer: String,
    pub batch_size: u32,
    pub epochs: u32,
    #[serde(default)]
    pub validation_split: f64,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub initial_epoch: u32,
}

impl TrainingOptions {
    /// 校验超参数取值范围，返回错误描述
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.loss.is_empty() || self.optimizer.is_empty() {
            return Err("loss 和 optimizer 不能为空".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size 必须大于 0".to_string());
        }
        if self.epochs == 0 {
            return Err("epochs 必须大于 0".to_string());
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(format!(
                "validation_split {} 超出范围 [0, 1)",
                self.validation_split
            ));
        }
        if self.initial_epoch > self.epochs {
            return Err(format!(
                "initial_epoch {} 大于 epochs {}",
                self.initial_epoch, self.epochs
            ));
        }
        Ok(())
    }
}

/// 数据集解析配置，以显式值传入解析器和获取器，替代全局单例
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// 下载内容的本地存储目录
    pub storage_dir: PathBuf,
    /// 严格校验：训练块只给出 train_x/train_y 之一时直接判定无效
    pub strict_validation: bool,
    /// ipfs 命令行程序路径
    pub ipfs_binary: String,
}

impl Default for DatasetConfig {
    /// 默认配置：存储到 ./data，关闭严格校验，使用 PATH 中的 ipfs
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./data"),
            strict_validation: false,
            ipfs_binary: "ipfs".to_string(),
        }
    }
}

impl DatasetConfig {
    /// 从 JSON 配置文件加载，缺失字段使用默认值
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ResolveError::Config(format!("读取配置文件 {} 失败: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            ResolveError::Config(format!("解析配置文件 {} 失败: {}", path.display(), e))
        })
    }

    pub fn with_storage_dir(mut self, storage_dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = storage_dir.into();
        self
    }

    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_options() -> TrainingOptions {
        TrainingOptions {
            loss: "mse".to_string(),
            optimizer: "adam".to_string(),
            batch_size: 32,
            epochs: 10,
            validation_split: 0.2,
            shuffle: true,
            initial_epoch: 0,
        }
    }

    #[test]
    fn test_options_defaults() {
        let options: TrainingOptions = serde_json::from_str(
            r#"{"loss":"mse","optimizer":"sgd","batch_size":8,"epochs":2}"#,
        )
        .unwrap();
        assert_eq!(options.validation_split, 0.0);
        assert!(!options.shuffle);
        assert_eq!(options.initial_epoch, 0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_validation() {
        assert!(sample_options().validate().is_ok());

        let mut bad = sample_options();
        bad.validation_split = 1.0;
        assert!(bad.validate().is_err());

        let mut bad = sample_options();
        bad.batch_size = 0;
        assert!(bad.validate().is_err());

        let mut bad = sample_options();
        bad.initial_epoch = 11;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"storage_dir":"/tmp/blobs","strict_validation":true}}"#).unwrap();

        let config = DatasetConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/blobs"));
        assert!(config.strict_validation);
        assert_eq!(config.ipfs_binary, "ipfs");
    }

    #[test]
    fn test_config_missing_file() {
        let err = DatasetConfig::from_json_file("/nonexistent/dataset.json").unwrap_err();
        assert!(matches!(err, ResolveError::Config(_)));
    }
}
