// src/web_server.rs
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info};

use crate::browser::BrowserPool;
use crate::config::Config;
use crate::models::{ErrorResponse, QueryRequest, QueryResponse};
use crate::{scrape, utils};

/// 各 handler 共享的应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: Arc<BrowserPool>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let pool = BrowserPool::new(config.max_browser_usage);
        Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
            started_at: Instant::now(),
        }
    }
}

/// Axum Handler: 查询接口。
/// 参数校验全部通过才会触发浏览器；抓取是阻塞操作，丢给 spawn_blocking。
pub async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = utils::generate_request_id();

    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            info!("[{}] 请求体解析失败: {}", request_id, rejection);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("请求体不是合法的JSON: {rejection}"),
                    request_id,
                }),
            )
                .into_response();
        }
    };

    info!(
        "[{}] 收到查询请求: uk_code={}, {} ~ {}, headless={}, app_id={:?}",
        request_id, request.uk_code, request.start_date, request.end_date, request.headless, request.app_id
    );

    let today = chrono::Local::now().date_naive();
    let query = match request.validate(today) {
        Ok(q) => q,
        Err(e) => {
            info!("[{}] 参数校验失败: {}", request_id, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                    request_id,
                }),
            )
                .into_response();
        }
    };

    let pool = state.pool.clone();
    let config = state.config.clone();
    let scrape_result =
        tokio::task::spawn_blocking(move || scrape::run_query(&pool, &config, &query)).await;

    let execution_time = started.elapsed().as_secs_f64();
    match scrape_result {
        Ok(Ok(outcome)) => {
            info!(
                "[{}] 查询成功: {} 行数据，耗时 {:.2} 秒",
                request_id,
                outcome.rows.len(),
                execution_time
            );
            Json(QueryResponse {
                headers: outcome.headers,
                rows: outcome.rows,
                html: outcome.html,
                execution_time,
                request_id,
                success: true,
            })
            .into_response()
        }
        Ok(Err(e)) => {
            error!("[{}] 抓取失败: {}", request_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("抓取失败: {e}"),
                    request_id,
                }),
            )
                .into_response()
        }
        Err(join_error) => {
            error!("[{}] 抓取任务异常退出: {}", request_id, join_error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "处理请求时发生错误".to_string(),
                    request_id,
                }),
            )
                .into_response()
        }
    }
}

/// Axum Handler: 健康检查
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "memory_rss_bytes": utils::rss_bytes(),
        "browser": state.pool.status(),
    }))
}

/// Axum Handler: 收益系数（启动时从配置定死，运行期只读）
pub async fn coefficients_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": state.config.coefficients,
    }))
}

/// 未匹配路由统一返回 404 JSON
pub async fn not_found_handler(uri: axum::http::Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "接口不存在",
            "path": uri.path(),
        })),
    )
}

/// 请求日志中间件
pub async fn log_requests(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    info!("⬅️ 收到请求: {} {}", method, uri);
    next.run(req).await
}

/// 组装路由
pub fn router(state: AppState) -> axum::Router {
    use axum::routing::{get, post};
    use tower_http::cors::{Any, CorsLayer};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    axum::Router::new()
        .route("/api/query", post(query_handler))
        .route("/api/health", get(health_handler))
        .route("/api/coefficients", get(coefficients_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(axum::middleware::from_fn(log_requests))
        .layer(cors)
}
