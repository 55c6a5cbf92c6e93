// src/error.rs
use thiserror::Error;

/// 服务端错误。抓取相关的变体在故障发生处打上类别，
/// 上层不靠解析错误文本来判断错误类型。
#[derive(Error, Debug)]
pub enum AppError {
    /// 参数校验失败，消息为各条错误用 "; " 连接
    #[error("{0}")]
    Validation(String),

    /// 页面导航失败（重试耗尽后）
    #[error("页面导航失败: {0}")]
    Navigation(String),

    /// 等待页面元素或结果超时
    #[error("等待超时: {0}")]
    Timeout(String),

    /// 浏览器实例启动或控制失败
    #[error("浏览器控制失败: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AppError>;

// 为axum提供错误转换
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            // 参数问题返回 400 Bad Request
            AppError::Validation(msg) => (axum::http::StatusCode::BAD_REQUEST, msg),

            // 其他所有错误视为服务器内部错误，返回 500
            _ => (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
            ),
        };
        let body = axum::Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}
