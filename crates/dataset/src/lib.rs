// lib.rs
// 数据集解析模块入口，声明并导出各子模块。
pub mod array_loader;
pub mod config;
pub mod container;
pub mod descriptor;
pub mod error;
pub mod fetcher;
pub mod observability;
pub mod resolver;
pub mod types;

pub use array_loader::{ArrayHandle, ArrayLoader, ContainerSource, MmapSource};
pub use config::{DatasetConfig, TrainingOptions};
pub use descriptor::JobDescriptor;
pub use error::{ContainerError, FetchError, LoadError, ResolveError, Result};
pub use fetcher::{ContentFetcher, DirectoryFetcher, IpfsCliFetcher};
pub use resolver::DatasetResolver;
pub use types::{ArrayRole, Mode, Tensor};
