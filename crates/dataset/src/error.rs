// error.rs
// 定义数据集解析相关的错误类型：描述文件无效、内容获取失败、模式不匹配、容器损坏等，以及Result类型。
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Mode;

/// 数据集解析错误，`resolve()` 与各访问器统一返回此类型
#[derive(Debug, Error)]
pub enum ResolveError {
    /// 既没有可用的训练块，也没有可用的批次块
    #[error("任务描述无效: {0}")]
    DescriptorInvalid(String),
    /// 指定地址的内容获取失败
    #[error("内容获取失败 {address}: {source}")]
    FetchFailed {
        address: String,
        #[source]
        source: FetchError,
    },
    /// 访问器与已解析的模式不符
    #[error("模式不匹配: 需要 {expected}，当前为 {actual}")]
    ModeMismatch { expected: Mode, actual: Mode },
    /// 本地容器不可读或形状不一致
    #[error("数据集损坏 {} [{key}]: {source}", .path.display())]
    DatasetCorrupt {
        path: PathBuf,
        key: String,
        #[source]
        source: ContainerError,
    },
    /// 每个解析器实例只允许调用一次 resolve()
    #[error("resolve() 已经调用过")]
    AlreadyResolved,
    /// 配置文件读取或解析失败
    #[error("配置错误: {0}")]
    Config(String),
}

/// 通用结果类型
pub type Result<T> = std::result::Result<T, ResolveError>;

/// 数组加载错误，只作用于单次读取，不会被缓存
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("数据集损坏 {} [{key}]: {source}", .path.display())]
    DatasetCorrupt {
        path: PathBuf,
        key: String,
        #[source]
        source: ContainerError,
    },
}

impl From<LoadError> for ResolveError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::DatasetCorrupt { path, key, source } => {
                ResolveError::DatasetCorrupt { path, key, source }
            }
        }
    }
}

/// 内容获取错误（由 ContentFetcher 实现返回）
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),
    #[error("下载命令执行失败 (状态 {status}): {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("内容不存在: {0}")]
    NotFound(String),
    #[error("非法的内容地址: {0:?}")]
    InvalidAddress(String),
}

/// 容器格式层面的错误细节
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("无法打开容器: {0}")]
    Open(#[from] io::Error),
    #[error("容器文件过小: {size} 字节，至少需要 {minimum} 字节")]
    TooSmall { size: u64, minimum: u64 },
    #[error("容器魔数错误: {0:?}")]
    InvalidMagic([u8; 4]),
    #[error("不支持的容器版本: {0}")]
    UnsupportedVersion(u32),
    #[error("容器头解析失败: {0}")]
    Header(String),
    #[error("缺少数组: {0}")]
    MissingKey(String),
    #[error("数组 {key} 形状不一致: {reason}")]
    ShapeMismatch { key: String, reason: String },
    #[error("数组尚未下载到本地")]
    NotMaterialized,
    #[error("重复的数组键: {0}")]
    DuplicateKey(String),
}
