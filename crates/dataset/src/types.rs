// types.rs
// 定义通用类型：计算模式、数组角色及其容器键、二维张量。
use std::fmt;

// 容器内的固定顶层键，避免硬编码
pub const TRAIN_X_KEY: &str = "train_x";
pub const TRAIN_Y_KEY: &str = "train_y";
pub const BATCHES_KEY: &str = "batches";

/// 计算模式，每次成功的 resolve() 只会产生一个非 Unresolved 的值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 训练（fit）
    Training,
    /// 预测（predict）
    Prediction,
    /// 尚未解析
    Unresolved,
}

impl Mode {
    /// 计算引擎使用的进程名
    pub fn process_name(&self) -> &'static str {
        match self {
            Mode::Training => "fit",
            Mode::Prediction => "predict",
            Mode::Unresolved => "none",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Training => write!(f, "training"),
            Mode::Prediction => write!(f, "prediction"),
            Mode::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// 数组在任务中的角色，决定容器内读取的键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayRole {
    TrainInputs,
    TrainTargets,
    Batch,
}

impl ArrayRole {
    pub fn key(&self) -> &'static str {
        match self {
            ArrayRole::TrainInputs => TRAIN_X_KEY,
            ArrayRole::TrainTargets => TRAIN_Y_KEY,
            ArrayRole::Batch => BATCHES_KEY,
        }
    }
}

/// 行优先存储的矩形数组
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Tensor {
    /// 创建张量，元素个数必须与形状一致
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Option<Self> {
        if element_count(&shape)? != data.len() {
            return None;
        }
        Some(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 第一维大小（样本数）
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// 除第一维外的元素个数（每个样本的特征数）
    pub fn cols(&self) -> usize {
        match self.shape.len() {
            0 => 0,
            _ => self.shape[1..].iter().product(),
        }
    }

    /// 按 (行, 列) 取值，越界返回 None
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows() || col >= self.cols() {
            return None;
        }
        self.data.get(row * self.cols() + col).copied()
    }
}

/// 计算形状对应的元素个数，溢出时返回 None
pub(crate) fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}
