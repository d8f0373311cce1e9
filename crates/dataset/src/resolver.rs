// resolver.rs
// 数据集解析器：解析任务描述、推断计算模式（训练/预测）、按顺序获取内容，并提供按需加载的数组访问器。
use tracing::{error, info, warn};

use crate::array_loader::{ArrayHandle, ArrayLoader};
use crate::config::{DatasetConfig, TrainingOptions};
use crate::descriptor::JobDescriptor;
use crate::error::{ResolveError, Result};
use crate::fetcher::ContentFetcher;
use crate::types::{ArrayRole, Mode, Tensor};

/// 数据集解析器
///
/// 由原始任务描述、内容获取器和批次编号（预测时使用）构造。`resolve()` 只能调用一次，
/// 成功后通过 `mode()` 得到计算模式，再调用对应的访问器按需加载数组。
pub struct DatasetResolver<F> {
    config: DatasetConfig,
    descriptor: JobDescriptor,
    fetcher: F,
    loader: ArrayLoader,
    batch_index: usize,
    mode: Mode,
    attempted: bool,
    options: Option<TrainingOptions>,
    train_x: Option<ArrayHandle>,
    train_y: Option<ArrayHandle>,
    batch: Option<ArrayHandle>,
}

impl<F: ContentFetcher> DatasetResolver<F> {
    pub fn new(descriptor: JobDescriptor, fetcher: F, batch_index: usize, config: DatasetConfig) -> Self {
        Self::with_loader(descriptor, fetcher, batch_index, config, ArrayLoader::default())
    }

    /// 使用自定义的数组加载器创建解析器
    pub fn with_loader(
        descriptor: JobDescriptor,
        fetcher: F,
        batch_index: usize,
        config: DatasetConfig,
        loader: ArrayLoader,
    ) -> Self {
        Self {
            config,
            descriptor,
            fetcher,
            loader,
            batch_index,
            mode: Mode::Unresolved,
            attempted: false,
            options: None,
            train_x: None,
            train_y: None,
            batch: None,
        }
    }

    /// 从 JSON 文本创建解析器
    pub fn from_json_str(text: &str, fetcher: F, batch_index: usize, config: DatasetConfig) -> Result<Self> {
        Ok(Self::new(JobDescriptor::from_json_str(text)?, fetcher, batch_index, config))
    }

    /// 解析数据集：解析各块、获取内容并确定计算模式
    pub fn resolve(&mut self) -> Result<Mode> {
        if self.attempted {
            return Err(ResolveError::AlreadyResolved);
        }
        self.attempted = true;

        // 1. 训练块，缺失或格式错误只记为缺失
        self.train_x = self.parse_train_handle(ArrayRole::TrainInputs);
        self.train_y = self.parse_train_handle(ArrayRole::TrainTargets);
        let train_block = self.train_x.is_some() && self.train_y.is_some();

        if self.config.strict_validation
            && !train_block
            && (self.train_x.is_some() || self.train_y.is_some())
        {
            error!("训练块只给出 train_x/train_y 之一");
            return Err(ResolveError::DescriptorInvalid(
                "训练块必须同时包含 train_x 和 train_y".to_string(),
            ));
        }

        // 2. 超参数块，只作为元数据
        self.options = match self.descriptor.options() {
            Ok(options) => Some(options),
            Err(e) => {
                warn!(error = %e, "超参数块缺失或格式错误");
                None
            }
        };

        // 3. 没有可用训练块时解析批次块
        if !train_block {
            self.batch = match self.descriptor.batch_address(self.batch_index) {
                Ok(address) => Some(ArrayHandle::new(address, ArrayRole::Batch)),
                Err(e) => {
                    warn!(error = %e, batch_index = self.batch_index, "批次块缺失或格式错误");
                    None
                }
            };
        }

        // 4. 两个块都不可用；只给出 train_x/train_y 之一时仍视为有训练路径
        let partial_train = self.train_x.is_some() || self.train_y.is_some();
        if !partial_train && self.batch.is_none() {
            error!("无法解析 train 块或 batches 块");
            return Err(ResolveError::DescriptorInvalid(
                "既没有可用的 train 块，也没有可用的 batches 块".to_string(),
            ));
        }

        // 5. 依次获取 train_x、train_y、批次，第一次失败立即终止
        let fetcher = &self.fetcher;
        for handle in [&mut self.train_x, &mut self.train_y, &mut self.batch]
            .into_iter()
            .flatten()
        {
            fetch_into(fetcher, handle)?;
        }

        // 6. 所有获取成功后再确定模式
        self.mode = if train_block {
            info!("计算模式设置为训练");
            Mode::Training
        } else {
            // 训练块不完整时同样落入预测
            info!("计算模式设置为预测");
            Mode::Prediction
        };
        Ok(self.mode)
    }

    fn parse_train_handle(&self, role: ArrayRole) -> Option<ArrayHandle> {
        match self.descriptor.train_address(role) {
            Ok(address) => Some(ArrayHandle::new(address, role)),
            Err(e) => {
                warn!(error = %e, key = role.key(), "任务描述文件结构错误");
                None
            }
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// 解析出的训练超参数（如果有）
    pub fn options(&self) -> Option<&TrainingOptions> {
        self.options.as_ref()
    }

    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    /// 训练输入数组（train_x），仅训练模式可用
    pub fn training_inputs(&mut self) -> Result<&Tensor> {
        self.require(Mode::Training)?;
        read_handle(&self.loader, &mut self.train_x)
    }

    /// 训练目标数组（train_y），仅训练模式可用
    pub fn training_targets(&mut self) -> Result<&Tensor> {
        self.require(Mode::Training)?;
        read_handle(&self.loader, &mut self.train_y)
    }

    /// 预测批次数组，仅预测模式可用
    pub fn prediction_batch(&mut self) -> Result<&Tensor> {
        self.require(Mode::Prediction)?;
        read_handle(&self.loader, &mut self.batch)
    }

    fn require(&self, expected: Mode) -> Result<()> {
        if self.mode != expected {
            return Err(ResolveError::ModeMismatch {
                expected,
                actual: self.mode,
            });
        }
        Ok(())
    }
}

/// 获取单个地址，成功后记录本地路径
fn fetch_into<F: ContentFetcher>(fetcher: &F, handle: &mut ArrayHandle) -> Result<()> {
    let address = handle.address().to_string();
    info!(address = %address, key = handle.role().key(), "开始获取数据文件");
    match fetcher.fetch(&address) {
        Ok(()) => {
            handle.set_local_path(fetcher.local_path(&address));
            Ok(())
        }
        Err(source) => {
            error!(address = %address, error = %source, "无法获取数据文件");
            Err(ResolveError::FetchFailed { address, source })
        }
    }
}

fn read_handle<'a>(loader: &ArrayLoader, handle: &'a mut Option<ArrayHandle>) -> Result<&'a Tensor> {
    // 训练块不完整而落入预测时没有批次句柄
    let handle = handle.as_mut().ok_or_else(|| {
        ResolveError::DescriptorInvalid("已解析的模式缺少对应的数组".to_string())
    })?;
    Ok(loader.read(handle)?)
}
