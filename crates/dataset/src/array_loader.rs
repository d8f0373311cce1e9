// array_loader.rs
// 数组加载器：首次读取时从本地容器解码数组，并缓存在句柄中，之后的读取不再访问文件。
use std::path::{Path, PathBuf};
use tracing::info;

use crate::container::Container;
use crate::error::{ContainerError, LoadError};
use crate::types::{ArrayRole, Tensor};

/// 单个内容地址对应的数组句柄
///
/// 缓存约定：`cached` 只在一次成功解码后被设置，设置后不再重新解码或修改。
/// 同一句柄的并发首次读取需要调用方串行化。
#[derive(Debug, Clone)]
pub struct ArrayHandle {
    address: String,
    role: ArrayRole,
    local_path: Option<PathBuf>,
    cached: Option<Tensor>,
}

impl ArrayHandle {
    pub fn new(address: impl Into<String>, role: ArrayRole) -> Self {
        Self {
            address: address.into(),
            role,
            local_path: None,
            cached: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn role(&self) -> ArrayRole {
        self.role
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    /// 获取成功后记录本地路径
    pub fn set_local_path(&mut self, path: impl Into<PathBuf>) {
        self.local_path = Some(path.into());
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }
}

/// 打开容器的接口，默认实现为内存映射
pub trait ContainerSource: Send + Sync {
    fn open(&self, path: &Path) -> Result<Container, ContainerError>;
}

/// 基于内存映射的默认容器来源
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapSource;

impl ContainerSource for MmapSource {
    fn open(&self, path: &Path) -> Result<Container, ContainerError> {
        Container::open(path)
    }
}

/// 数组加载器
pub struct ArrayLoader {
    source: Box<dyn ContainerSource>,
}

impl Default for ArrayLoader {
    fn default() -> Self {
        Self::new(Box::new(MmapSource))
    }
}

impl ArrayLoader {
    pub fn new(source: Box<dyn ContainerSource>) -> Self {
        Self { source }
    }

    /// 读取句柄对应的数组，已缓存时直接返回，不做任何文件IO
    pub fn read<'h>(&self, handle: &'h mut ArrayHandle) -> Result<&'h Tensor, LoadError> {
        let tensor = match handle.cached.take() {
            Some(tensor) => tensor,
            None => self.decode(handle)?,
        };
        Ok(handle.cached.insert(tensor))
    }

    fn decode(&self, handle: &ArrayHandle) -> Result<Tensor, LoadError> {
        let key = handle.role.key();
        let corrupt = |path: PathBuf, source: ContainerError| LoadError::DatasetCorrupt {
            path,
            key: key.to_string(),
            source,
        };

        let path = handle
            .local_path
            .clone()
            .ok_or_else(|| corrupt(PathBuf::from(&handle.address), ContainerError::NotMaterialized))?;

        info!(address = %handle.address, key, path = %path.display(), "加载数据集...");
        let container = self
            .source
            .open(&path)
            .map_err(|e| corrupt(path.clone(), e))?;
        let tensor = container
            .read_tensor(key)
            .map_err(|e| corrupt(path.clone(), e))?;
        info!(key, shape = ?tensor.shape(), "数据集加载完成");
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    /// 统计打开次数的容器来源
    struct CountingSource {
        opens: Arc<AtomicUsize>,
    }

    impl ContainerSource for CountingSource {
        fn open(&self, path: &Path) -> Result<Container, ContainerError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Container::open(path)
        }
    }

    fn counting_loader() -> (ArrayLoader, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let loader = ArrayLoader::new(Box::new(CountingSource {
            opens: Arc::clone(&opens),
        }));
        (loader, opens)
    }

    #[test]
    fn test_read_twice_opens_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Qb");
        ContainerWriter::new()
            .add_array("batches", &[2, 2], &[1.0, 2.0, 3.0, 4.0])
            .unwrap()
            .write_to(&path)
            .unwrap();

        let (loader, opens) = counting_loader();
        let mut handle = ArrayHandle::new("Qb", ArrayRole::Batch);
        handle.set_local_path(&path);

        let first = loader.read(&mut handle).unwrap().clone();
        let second = loader.read(&mut handle).unwrap().clone();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert!(handle.is_cached());
    }

    #[test]
    fn test_cached_read_survives_file_removal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Qx");
        ContainerWriter::new()
            .add_array("train_x", &[1, 3], &[0.1, 0.2, 0.3])
            .unwrap()
            .write_to(&path)
            .unwrap();

        let loader = ArrayLoader::default();
        let mut handle = ArrayHandle::new("Qx", ArrayRole::TrainInputs);
        handle.set_local_path(&path);
        loader.read(&mut handle).unwrap();

        std::fs::remove_file(&path).unwrap();
        assert_eq!(loader.read(&mut handle).unwrap().data(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_failure_is_not_cached() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Qy");
        // 只写入 train_x，读取 train_y 时失败
        ContainerWriter::new()
            .add_array("train_x", &[1, 1], &[9.0])
            .unwrap()
            .write_to(&path)
            .unwrap();

        let (loader, opens) = counting_loader();
        let mut handle = ArrayHandle::new("Qy", ArrayRole::TrainTargets);
        handle.set_local_path(&path);

        match loader.read(&mut handle) {
            Err(LoadError::DatasetCorrupt { key, source, .. }) => {
                assert_eq!(key, "train_y");
                assert!(matches!(source, ContainerError::MissingKey(_)));
            }
            Ok(_) => panic!("缺少 train_y 时应当失败"),
        }
        assert!(!handle.is_cached());

        // 修复文件后可以重新读取
        ContainerWriter::new()
            .add_array("train_y", &[1, 1], &[4.0])
            .unwrap()
            .write_to(&path)
            .unwrap();
        assert_eq!(loader.read(&mut handle).unwrap().data(), &[4.0]);
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unfetched_handle() {
        let loader = ArrayLoader::default();
        let mut handle = ArrayHandle::new("Qz", ArrayRole::Batch);
        let err = loader.read(&mut handle).unwrap_err();
        assert!(matches!(
            err,
            LoadError::DatasetCorrupt {
                source: ContainerError::NotMaterialized,
                ..
            }
        ));
    }
}
