// fetcher.rs
// 内容获取器：按内容地址把数据文件取到本地存储目录。提供本地镜像目录和 ipfs 命令行两种实现。
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DatasetConfig;
use crate::error::FetchError;

/// 内容获取接口
///
/// 必须幂等：同一地址重复获取不能破坏或重复本地状态。重试和超时由实现自己负责，
/// 对调用方而言一次 fetch 要么成功要么失败。
pub trait ContentFetcher {
    /// 把地址对应的内容取到本地
    fn fetch(&self, address: &str) -> Result<(), FetchError>;

    /// 获取成功后内容所在的本地路径
    fn local_path(&self, address: &str) -> PathBuf;
}

impl<F: ContentFetcher + ?Sized> ContentFetcher for &F {
    fn fetch(&self, address: &str) -> Result<(), FetchError> {
        (**self).fetch(address)
    }

    fn local_path(&self, address: &str) -> PathBuf {
        (**self).local_path(address)
    }
}

/// 地址直接作为文件名使用，拒绝路径分隔符和上级目录
fn check_address(address: &str) -> Result<(), FetchError> {
    let invalid = address.is_empty()
        || address == "."
        || address == ".."
        || address.contains('/')
        || address.contains('\\')
        || address.contains('\0');
    if invalid {
        return Err(FetchError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

/// 从本地内容镜像目录复制文件的获取器
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    /// 镜像目录，文件名即内容地址
    source_dir: PathBuf,
    /// 本地存储目录
    storage_dir: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(source_dir: impl Into<PathBuf>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            storage_dir: storage_dir.into(),
        }
    }

    pub fn from_config(source_dir: impl Into<PathBuf>, config: &DatasetConfig) -> Self {
        Self::new(source_dir, config.storage_dir.clone())
    }
}

impl ContentFetcher for DirectoryFetcher {
    fn fetch(&self, address: &str) -> Result<(), FetchError> {
        check_address(address)?;
        let dest = self.local_path(address);

        // 已存在则跳过，保证幂等
        if dest.is_file() {
            debug!(address, path = %dest.display(), "内容已存在，跳过获取");
            return Ok(());
        }

        let src = self.source_dir.join(address);
        if !src.is_file() {
            return Err(FetchError::NotFound(address.to_string()));
        }

        fs::create_dir_all(&self.storage_dir)?;
        // 先写临时文件再改名，中断的复制不会留下不完整的目标文件
        let tmp = self
            .storage_dir
            .join(format!(".{}.{}.part", address, Uuid::new_v4()));
        if let Err(e) = fs::copy(&src, &tmp).and_then(|_| fs::rename(&tmp, &dest)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        info!(address, path = %dest.display(), "内容获取完成");
        Ok(())
    }

    fn local_path(&self, address: &str) -> PathBuf {
        self.storage_dir.join(address)
    }
}

/// 通过 ipfs 命令行下载内容的获取器
#[derive(Debug, Clone)]
pub struct IpfsCliFetcher {
    /// ipfs 可执行文件
    binary: String,
    /// 本地存储目录
    storage_dir: PathBuf,
}

impl IpfsCliFetcher {
    pub fn new(binary: impl Into<String>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            storage_dir: storage_dir.into(),
        }
    }

    pub fn from_config(config: &DatasetConfig) -> Self {
        Self::new(config.ipfs_binary.clone(), config.storage_dir.clone())
    }
}

impl ContentFetcher for IpfsCliFetcher {
    fn fetch(&self, address: &str) -> Result<(), FetchError> {
        check_address(address)?;
        let dest = self.local_path(address);

        if dest.is_file() {
            debug!(address, path = %dest.display(), "内容已存在，跳过下载");
            return Ok(());
        }

        fs::create_dir_all(&self.storage_dir)?;
        let tmp = self
            .storage_dir
            .join(format!(".{}.{}.part", address, Uuid::new_v4()));

        info!(address, binary = %self.binary, "开始从IPFS下载");
        let output = Command::new(&self.binary)
            .arg("get")
            .arg(address)
            .arg("-o")
            .arg(&tmp)
            .output()?;

        if !output.status.success() {
            let _ = fs::remove_file(&tmp);
            return Err(FetchError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if let Err(e) = fs::rename(&tmp, &dest) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!(address, path = %dest.display(), "IPFS下载完成");
        Ok(())
    }

    fn local_path(&self, address: &str) -> PathBuf {
        self.storage_dir.join(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_directory_fetch_copies_blob() {
        let mirror = tempdir().unwrap();
        let storage = tempdir().unwrap();
        fs::write(mirror.path().join("QmData"), b"payload").unwrap();

        let fetcher = DirectoryFetcher::new(mirror.path(), storage.path());
        fetcher.fetch("QmData").unwrap();
        assert_eq!(fs::read(fetcher.local_path("QmData")).unwrap(), b"payload");
    }

    #[test]
    fn test_directory_fetch_is_idempotent() {
        let mirror = tempdir().unwrap();
        let storage = tempdir().unwrap();
        fs::write(mirror.path().join("QmData"), b"payload").unwrap();

        let fetcher = DirectoryFetcher::new(mirror.path(), storage.path());
        fetcher.fetch("QmData").unwrap();
        fetcher.fetch("QmData").unwrap();

        // 存储目录中只有一个文件，没有遗留的临时文件
        let entries: Vec<_> = fs::read_dir(storage.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read(fetcher.local_path("QmData")).unwrap(), b"payload");
    }

    #[test]
    fn test_directory_fetch_missing() {
        let mirror = tempdir().unwrap();
        let storage = tempdir().unwrap();
        let fetcher = DirectoryFetcher::new(mirror.path(), storage.path());
        assert!(matches!(
            fetcher.fetch("QmMissing"),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_rejects_path_like_addresses() {
        let mirror = tempdir().unwrap();
        let storage = tempdir().unwrap();
        let fetcher = DirectoryFetcher::new(mirror.path(), storage.path());
        for address in ["../etc/passwd", "a/b", "..", ""] {
            assert!(matches!(
                fetcher.fetch(address),
                Err(FetchError::InvalidAddress(_))
            ));
        }
    }

    #[test]
    fn test_ipfs_fetch_skips_existing() {
        let storage = tempdir().unwrap();
        fs::write(storage.path().join("QmCached"), b"x").unwrap();

        // 可执行文件不存在，但已有内容时不会调用
        let fetcher = IpfsCliFetcher::new("/nonexistent/ipfs", storage.path());
        fetcher.fetch("QmCached").unwrap();
    }

    #[test]
    fn test_ipfs_fetch_missing_binary() {
        let storage = tempdir().unwrap();
        let fetcher = IpfsCliFetcher::new("/nonexistent/ipfs", storage.path());
        assert!(matches!(fetcher.fetch("QmNew"), Err(FetchError::Io(_))));
    }

    #[test]
    fn test_from_config() {
        let config = DatasetConfig::default().with_storage_dir("/var/lib/blobs");
        let fetcher = IpfsCliFetcher::from_config(&config);
        assert_eq!(fetcher.local_path("Qm1"), PathBuf::from("/var/lib/blobs/Qm1"));
    }
}
