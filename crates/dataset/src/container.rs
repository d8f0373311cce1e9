// container.rs
// 本地二进制容器格式：定长前导区 + JSON 头（各数组的类型、形状、偏移）+ 数据区。
// 读取时内存映射文件，按头中声明的形状一次性整块拷贝数据。
//
// 布局（小端）：
//   0   magic       4 字节 "JDSC"
//   4   version     u32
//   8   header_len  u64
//   16  header      JSON { key: { dtype, shape, offset, length } }
//   16 + header_len 数据区，offset 相对于数据区起点
use bytemuck::cast_slice_mut;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::ContainerError;
use crate::types::{element_count, Tensor};

pub const CONTAINER_MAGIC: [u8; 4] = *b"JDSC";
pub const CONTAINER_VERSION: u32 = 1;
/// magic + version + header_len
pub const PREAMBLE_SIZE: usize = 16;

/// 元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F64,
    F32,
}

impl DType {
    /// 元素字节数
    pub fn element_size(&self) -> usize {
        match self {
            DType::F64 => 8,
            DType::F32 => 4,
        }
    }
}

/// 头中记录的单个数组元信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub offset: u64,
    pub length: u64,
}

/// 已打开（内存映射）的容器
pub struct Container {
    mmap: Mmap,
    data_start: usize,
    entries: BTreeMap<String, EntryMeta>,
}

impl Container {
    /// 打开容器并校验前导区和头
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size < PREAMBLE_SIZE as u64 {
            return Err(ContainerError::TooSmall {
                size,
                minimum: PREAMBLE_SIZE as u64,
            });
        }

        // SAFETY: 文件以只读方式打开，映射期间不修改
        let mmap = unsafe { Mmap::map(&file) }?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&mmap[0..4]);
        if magic != CONTAINER_MAGIC {
            return Err(ContainerError::InvalidMagic(magic));
        }

        let version = u32::from_le_bytes(read_array(&mmap[4..8]));
        if version != CONTAINER_VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }

        let header_len = u64::from_le_bytes(read_array(&mmap[8..16]));
        let data_start = usize::try_from(header_len)
            .ok()
            .and_then(|len| len.checked_add(PREAMBLE_SIZE))
            .filter(|&end| end <= mmap.len())
            .ok_or(ContainerError::TooSmall {
                size: mmap.len() as u64,
                minimum: (PREAMBLE_SIZE as u64).saturating_add(header_len),
            })?;

        let entries: BTreeMap<String, EntryMeta> =
            serde_json::from_slice(&mmap[PREAMBLE_SIZE..data_start])
                .map_err(|e| ContainerError::Header(e.to_string()))?;

        Ok(Self {
            mmap,
            data_start,
            entries,
        })
    }

    /// 容器中所有数组的键
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// 查找数组元信息
    pub fn entry(&self, key: &str) -> Result<&EntryMeta, ContainerError> {
        self.entries
            .get(key)
            .ok_or_else(|| ContainerError::MissingKey(key.to_string()))
    }

    /// 按声明的形状读取整个数组
    pub fn read_tensor(&self, key: &str) -> Result<Tensor, ContainerError> {
        let meta = self.entry(key)?;
        let mismatch = |reason: String| ContainerError::ShapeMismatch {
            key: key.to_string(),
            reason,
        };

        let count = element_count(&meta.shape)
            .ok_or_else(|| mismatch(format!("形状 {:?} 元素个数溢出", meta.shape)))?;
        let expected = count
            .checked_mul(meta.dtype.element_size())
            .ok_or_else(|| mismatch(format!("形状 {:?} 字节数溢出", meta.shape)))?;
        if expected as u64 != meta.length {
            return Err(mismatch(format!(
                "形状 {:?} 需要 {} 字节，头中声明 {} 字节",
                meta.shape, expected, meta.length
            )));
        }

        let start = usize::try_from(meta.offset)
            .ok()
            .and_then(|offset| offset.checked_add(self.data_start));
        let range = start
            .and_then(|start| start.checked_add(expected).map(|end| start..end))
            .filter(|range| range.end <= self.mmap.len())
            .ok_or_else(|| {
                mismatch(format!(
                    "数据区 [{}, +{}) 超出文件范围 {}",
                    meta.offset,
                    meta.length,
                    self.mmap.len()
                ))
            })?;
        let bytes = &self.mmap[range];

        let data = match meta.dtype {
            DType::F64 => {
                let mut buf = vec![0f64; count];
                copy_le(bytes, &mut buf);
                buf
            }
            DType::F32 => {
                let mut buf = vec![0f32; count];
                copy_le(bytes, &mut buf);
                buf.into_iter().map(f64::from).collect()
            }
        };

        Tensor::new(meta.shape.clone(), data)
            .ok_or_else(|| mismatch("元素个数与形状不一致".to_string()))
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// 可按位整块拷贝的小端元素
trait LeElement: bytemuck::Pod {
    #[cfg_attr(target_endian = "little", allow(dead_code))]
    fn to_native(self) -> Self;
}

impl LeElement for f64 {
    fn to_native(self) -> Self {
        f64::from_bits(u64::from_le(self.to_bits()))
    }
}

impl LeElement for f32 {
    fn to_native(self) -> Self {
        f32::from_bits(u32::from_le(self.to_bits()))
    }
}

/// 一次性把原始字节拷贝进目标缓冲区，调用方保证长度一致
fn copy_le<T: LeElement>(src: &[u8], dst: &mut [T]) {
    cast_slice_mut::<T, u8>(dst).copy_from_slice(src);
    #[cfg(target_endian = "big")]
    for v in dst.iter_mut() {
        *v = v.to_native();
    }
}

/// 容器写入器，供数据提供方、测试和示例生成容器文件
#[derive(Debug, Default)]
pub struct ContainerWriter {
    entries: Vec<(String, DType, Vec<usize>, Vec<u8>)>,
}

impl ContainerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个 f64 数组
    pub fn add_array(
        &mut self,
        key: &str,
        shape: &[usize],
        data: &[f64],
    ) -> Result<&mut Self, ContainerError> {
        self.check_entry(key, shape, data.len())?;
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries
            .push((key.to_string(), DType::F64, shape.to_vec(), bytes));
        Ok(self)
    }

    /// 添加一个 f32 数组
    pub fn add_array_f32(
        &mut self,
        key: &str,
        shape: &[usize],
        data: &[f32],
    ) -> Result<&mut Self, ContainerError> {
        self.check_entry(key, shape, data.len())?;
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries
            .push((key.to_string(), DType::F32, shape.to_vec(), bytes));
        Ok(self)
    }

    fn check_entry(&self, key: &str, shape: &[usize], len: usize) -> Result<(), ContainerError> {
        if self.entries.iter().any(|(k, ..)| k == key) {
            return Err(ContainerError::DuplicateKey(key.to_string()));
        }
        if element_count(shape) != Some(len) {
            return Err(ContainerError::ShapeMismatch {
                key: key.to_string(),
                reason: format!("形状 {:?} 与数据长度 {} 不一致", shape, len),
            });
        }
        Ok(())
    }

    /// 写出容器文件
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ContainerError> {
        let mut header = BTreeMap::new();
        let mut offset = 0u64;
        for (key, dtype, shape, bytes) in &self.entries {
            let length = bytes.len() as u64;
            header.insert(
                key.clone(),
                EntryMeta {
                    dtype: *dtype,
                    shape: shape.clone(),
                    offset,
                    length,
                },
            );
            offset += length;
        }
        let header_bytes =
            serde_json::to_vec(&header).map_err(|e| ContainerError::Header(e.to_string()))?;

        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(&CONTAINER_MAGIC)?;
        out.write_all(&CONTAINER_VERSION.to_le_bytes())?;
        out.write_all(&(header_bytes.len() as u64).to_le_bytes())?;
        out.write_all(&header_bytes)?;
        for (.., bytes) in &self.entries {
            out.write_all(bytes)?;
        }
        out.flush()?;
        Ok(())
    }
}
