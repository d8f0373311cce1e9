// observability.rs
// 日志初始化：安装 tracing 订阅者，日志级别由 RUST_LOG 控制，默认 info。

use tracing_subscriber::EnvFilter;

/// 初始化进程的日志输出
///
/// 可以重复调用，之后的调用不会生效。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
