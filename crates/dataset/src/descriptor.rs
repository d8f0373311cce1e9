// descriptor.rs
// 任务描述文件的解析：train / options / batches 三个可选块，各块独立解析，缺失或格式错误只在块级别报告。
use serde_json::Value;
use std::fmt;
use std::io::Read;

use crate::config::TrainingOptions;
use crate::error::{ResolveError, Result};
use crate::types::ArrayRole;

/// 单个块解析失败的原因，只用于日志，不会作为 resolve() 的错误返回
#[derive(Debug, Clone, PartialEq)]
pub struct BlockError {
    pub block: &'static str,
    pub reason: String,
}

impl BlockError {
    fn new(block: &'static str, reason: impl Into<String>) -> Self {
        Self {
            block,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} 块: {}", self.block, self.reason)
    }
}

/// 解析后的任务描述文件
///
/// 文档可以包含任意子集的块，块缺失本身不是错误，直到进行模式推断时才会判断。
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    document: Value,
}

impl JobDescriptor {
    pub fn from_value(document: Value) -> Self {
        Self { document }
    }

    /// 从 JSON 文本解析，只有文本根本不是 JSON 时才失败
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document = serde_json::from_str(text)
            .map_err(|e| ResolveError::DescriptorInvalid(format!("无法解析任务描述: {}", e)))?;
        Ok(Self::from_value(document))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let document = serde_json::from_reader(reader)
            .map_err(|e| ResolveError::DescriptorInvalid(format!("无法解析任务描述: {}", e)))?;
        Ok(Self::from_value(document))
    }

    /// 读取训练块中的 train_x 或 train_y 地址
    pub fn train_address(&self, role: ArrayRole) -> std::result::Result<String, BlockError> {
        let key = match role {
            ArrayRole::TrainInputs | ArrayRole::TrainTargets => role.key(),
            ArrayRole::Batch => {
                return Err(BlockError::new("train", "批次角色不属于训练块"));
            }
        };
        let train = self
            .document
            .get("train")
            .ok_or_else(|| BlockError::new("train", "缺少 train 块"))?;
        if !train.is_object() {
            return Err(BlockError::new("train", "train 块不是对象"));
        }
        let value = train
            .get(key)
            .ok_or_else(|| BlockError::new("train", format!("缺少字段 {}", key)))?;
        content_address(value).ok_or_else(|| {
            BlockError::new("train", format!("字段 {} 不是有效的内容地址", key))
        })
    }

    /// 解析并校验 options 块
    pub fn options(&self) -> std::result::Result<TrainingOptions, BlockError> {
        let block = self
            .document
            .get("options")
            .ok_or_else(|| BlockError::new("options", "缺少 options 块"))?;
        let options: TrainingOptions = serde_json::from_value(block.clone())
            .map_err(|e| BlockError::new("options", e.to_string()))?;
        options
            .validate()
            .map_err(|reason| BlockError::new("options", reason))?;
        Ok(options)
    }

    /// 选取 batches[index] 的地址
    pub fn batch_address(&self, index: usize) -> std::result::Result<String, BlockError> {
        let batches = self
            .document
            .get("batches")
            .ok_or_else(|| BlockError::new("batches", "缺少 batches 块"))?
            .as_array()
            .ok_or_else(|| BlockError::new("batches", "batches 块不是数组"))?;
        let value = batches.get(index).ok_or_else(|| {
            BlockError::new(
                "batches",
                format!("批次编号 {} 超出范围 [0, {})", index, batches.len()),
            )
        })?;
        content_address(value).ok_or_else(|| {
            BlockError::new("batches", format!("批次 {} 不是有效的内容地址", index))
        })
    }
}

/// 非空字符串才是可用的内容地址，原样返回
fn content_address(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
