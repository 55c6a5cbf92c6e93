// src/main.rs
use std::fs;
use std::path::Path;

use tokio::net::TcpListener;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uk_query_server::config::Config;
use uk_query_server::web_server::{self, AppState};

const LOG_DIR: &str = "logs";
const LOG_PREFIX: &str = "server.log";

/// 定期清理滚动产生的旧日志文件
async fn spawn_log_cleanup_task() {
    info!("🧹 日志清理服务已启动，将每小时检查一次旧日志。");
    let mut interval = interval(Duration::from_secs(3600));
    loop {
        interval.tick().await;
        let result = tokio::task::spawn_blocking(|| {
            let now = chrono::Local::now();
            let cutoff = now - chrono::Duration::days(7);
            let mut deleted_count = 0;
            let entries = match fs::read_dir(Path::new(LOG_DIR)) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("读取日志目录失败: {}", e);
                    return 0;
                }
            };
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                let is_rotated_log = path.is_file()
                    && path
                        .file_name()
                        .and_then(|s| s.to_str())
                        .map_or(false, |s| s.starts_with(&format!("{LOG_PREFIX}.")));
                if !is_rotated_log {
                    continue;
                }
                if let Ok(metadata) = entry.metadata() {
                    if let Ok(modified_time) = metadata.modified() {
                        let modified_time: chrono::DateTime<chrono::Local> = modified_time.into();
                        if modified_time < cutoff {
                            match fs::remove_file(&path) {
                                Ok(_) => {
                                    info!("已删除旧日志文件: {:?}", path);
                                    deleted_count += 1;
                                }
                                Err(e) => warn!("删除旧日志文件 {:?} 失败: {}", path, e),
                            }
                        }
                    }
                }
            }
            deleted_count
        })
        .await;
        match result {
            Ok(count) if count > 0 => info!("日志清理完成，共删除了 {} 个旧日志文件。", count),
            Ok(_) => {}
            Err(e) => error!("日志清理任务 panic: {}", e),
        }
    }
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到中断信号，正在安全关闭..."),
        _ = terminate => info!("收到终止信号，正在安全关闭..."),
    }
}

#[tokio::main]
async fn main() {
    // --- 日志初始化 ---
    fs::create_dir_all(LOG_DIR).ok();
    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_PREFIX);
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking_writer).with_ansi(false))
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();
    info!("程序启动，日志系统已初始化。");
    tokio::spawn(spawn_log_cleanup_task());

    // --- 配置与共享状态 ---
    let config = Config::from_env();
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config);
    let pool = state.pool.clone();

    // --- 启动 Web 服务器 ---
    let app = web_server::router(state);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    info!("🚀 数据查询服务已启动");
    info!("📍 访问地址: http://{}", addr);
    info!("   POST /api/query         执行查询");
    info!("   GET  /api/health        健康检查");
    info!("   GET  /api/coefficients  收益系数");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // 退出前关掉浏览器实例，避免遗留 Chrome 进程
    pool.shutdown();
    info!("⛔ 服务已退出。");
}
