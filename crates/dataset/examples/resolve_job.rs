//! resolve_job.rs
//!
//! 完整示例：在临时目录中生成内容镜像，分别解析一个训练任务和一个预测任务，
//! 并以表格形式打印加载出的数组。

use anyhow::Result;
use dataset::{
    container::ContainerWriter, observability, DatasetConfig, DatasetResolver, DirectoryFetcher,
    JobDescriptor, Mode, Tensor,
};
use prettytable::{row, Table};
use std::path::Path;

fn main() -> Result<()> {
    observability::init_tracing();
    println!("=== 任务数据集解析示例 ===");

    // 1. 准备内容镜像和本地存储目录
    let workspace = tempfile::tempdir()?;
    let mirror = workspace.path().join("mirror");
    std::fs::create_dir_all(&mirror)?;
    prepare_mirror(&mirror)?;

    let config = DatasetConfig::default().with_storage_dir(workspace.path().join("storage"));
    let fetcher = DirectoryFetcher::from_config(&mirror, &config);

    // 2. 训练任务
    let training = JobDescriptor::from_json_str(
        r#"{
            "train": {"train_x": "QmTrainX", "train_y": "QmTrainY"},
            "options": {"loss": "mse", "optimizer": "adam", "batch_size": 2,
                        "epochs": 4, "validation_split": 0.25, "shuffle": true,
                        "initial_epoch": 0}
        }"#,
    )?;
    let mut resolver = DatasetResolver::new(training, &fetcher, 0, config.clone());
    let mode = resolver.resolve()?;
    println!("\n训练任务模式: {} ({})", mode, mode.process_name());
    if let Some(options) = resolver.options() {
        println!("超参数: {:?}", options);
    }
    let mut table = new_table();
    add_tensor_row(&mut table, "train_x", resolver.training_inputs()?);
    add_tensor_row(&mut table, "train_y", resolver.training_targets()?);
    table.printstd();

    // 3. 预测任务，取第 1 个批次
    let prediction = JobDescriptor::from_json_str(
        r#"{"batches": ["QmBatch0", "QmBatch1", "QmBatch2"]}"#,
    )?;
    let mut resolver = DatasetResolver::new(prediction, &fetcher, 1, config);
    let mode = resolver.resolve()?;
    assert_eq!(mode, Mode::Prediction);
    println!("\n预测任务模式: {} ({})，批次编号 {}", mode, mode.process_name(), resolver.batch_index());
    let mut table = new_table();
    add_tensor_row(&mut table, "batches", resolver.prediction_batch()?);
    table.printstd();

    Ok(())
}

/// 生成镜像目录中的容器文件，文件名即内容地址
fn prepare_mirror(mirror: &Path) -> Result<()> {
    let x: Vec<f64> = (0..12).map(|i| i as f64 / 4.0).collect();
    ContainerWriter::new()
        .add_array("train_x", &[4, 3], &x)?
        .write_to(mirror.join("QmTrainX"))?;
    ContainerWriter::new()
        .add_array("train_y", &[4, 1], &[0.0, 1.0, 1.0, 0.0])?
        .write_to(mirror.join("QmTrainY"))?;

    for batch_id in 0..3 {
        let data: Vec<f64> = (0..6).map(|i| (batch_id * 10 + i) as f64).collect();
        ContainerWriter::new()
            .add_array("batches", &[2, 3], &data)?
            .write_to(mirror.join(format!("QmBatch{}", batch_id)))?;
    }
    Ok(())
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.add_row(row!["键", "形状", "元素数", "首行"]);
    table
}

fn add_tensor_row(table: &mut Table, key: &str, tensor: &Tensor) {
    let first_row: Vec<String> = (0..tensor.cols())
        .filter_map(|col| tensor.get(0, col))
        .map(|v| format!("{:.2}", v))
        .collect();
    table.add_row(row![
        key,
        format!("{:?}", tensor.shape()),
        tensor.len(),
        first_row.join(", ")
    ]);
}
