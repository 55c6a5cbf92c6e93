// src/client.rs
//! 查询客户端
//!
//! 封装对服务端 /api/query 的调用：总超时、协作取消、有限重试。
//! 错误在产生处就带上类别，重试与提示语都按类别走，不解析消息文本。
//! 命令行入口（bin/cli）构建在这层之上。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ProfitCoefficients;
use crate::models::{ErrorResponse, QueryRequest, QueryResponse};

/// 单次请求的总超时
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// 自动重试次数上限（只对可重试类别生效）
const MAX_RETRIES: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// 客户端错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Timeout,
    Validation,
    Render,
    Api,
}

impl ErrorCategory {
    /// 网络和超时类错误重试有意义，其余重试只会重复失败
    pub fn retryable(self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Timeout)
    }

    /// 面向用户的提示语
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "请求超时，服务器响应时间过长，请稍后重试",
            ErrorCategory::Network => "网络连接异常，请检查网络后重试",
            ErrorCategory::Render => "结果渲染出错，请重试",
            ErrorCategory::Validation => "参数校验失败，请检查输入",
            ErrorCategory::Api => "操作失败，请稍后重试",
        }
    }
}

/// 带类别的客户端错误
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ClientError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::new(ErrorCategory::Timeout, "请求超时，服务器响应时间过长")
        } else if e.is_connect() || e.is_request() {
            ClientError::new(
                ErrorCategory::Network,
                format!("网络连接异常，无法连接到服务器: {e}"),
            )
        } else {
            ClientError::new(ErrorCategory::Api, e.to_string())
        }
    }
}

/// 输出或写文件失败归为渲染类错误
pub fn render_error(e: std::io::Error) -> ClientError {
    ClientError::new(ErrorCategory::Render, format!("结果渲染出错: {e}"))
}

/// 查询客户端。同一实例同时只允许一个在途查询。
pub struct QueryClient {
    http: reqwest::Client,
    base_url: String,
    in_flight: AtomicBool,
}

impl QueryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                ClientError::new(ErrorCategory::Network, format!("HTTP 客户端初始化失败: {e}"))
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            in_flight: AtomicBool::new(false),
        })
    }

    /// 执行查询。参数先过客户端校验，之后带重试地发送；
    /// cancel 触发时在安全点尽快返回。
    pub async fn execute(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, ClientError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(ClientError::new(
                ErrorCategory::Api,
                "查询正在进行中，请稍候",
            ));
        }
        let result = self.execute_inner(request, cancel).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    /// 获取服务端的收益系数
    pub async fn fetch_coefficients(&self) -> Result<ProfitCoefficients, ClientError> {
        #[derive(serde::Deserialize)]
        struct Envelope {
            data: ProfitCoefficients,
        }
        let url = format!("{}/api/coefficients", self.base_url);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        let body: Envelope = response
            .json()
            .await
            .map_err(|e| ClientError::new(ErrorCategory::Api, format!("系数响应解析失败: {e}")))?;
        Ok(body.data)
    }

    async fn execute_inner(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, ClientError> {
        validate_request(request)?;

        let mut attempt: u32 = 0;
        loop {
            match self.send_once(request, cancel).await {
                Ok(response) => return Ok(response),
                Err(e) if e.category.retryable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    warn!("请求失败，{} 秒后进行第 {} 次重试: {}", RETRY_DELAY.as_secs(), attempt, e);
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                        _ = cancel.cancelled() => {
                            return Err(ClientError::new(ErrorCategory::Api, "查询已取消"));
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, ClientError> {
        let url = format!("{}/api/query", self.base_url);
        let send = self.http.post(&url).json(request).send();
        let response = tokio::select! {
            r = send => r?,
            _ = cancel.cancelled() => {
                return Err(ClientError::new(ErrorCategory::Api, "查询已取消"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body: ErrorResponse = response.json().await.unwrap_or_else(|_| ErrorResponse {
                error: format!("HTTP {status}"),
                request_id: String::new(),
            });
            let category = if status == reqwest::StatusCode::BAD_REQUEST {
                ErrorCategory::Validation
            } else {
                ErrorCategory::Api
            };
            return Err(ClientError::new(category, body.error));
        }

        let data: QueryResponse = response.json().await.map_err(|e| {
            ClientError::new(
                ErrorCategory::Api,
                format!("服务器返回的数据格式无效，无法解析JSON: {e}"),
            )
        })?;
        if data.headers.is_empty() && data.rows.is_empty() {
            return Err(ClientError::new(
                ErrorCategory::Api,
                "服务器返回的数据格式不正确",
            ));
        }
        Ok(data)
    }
}

/// 发送前的本地校验，与服务端同一套规则。失败属 Validation 类别，不重试。
pub fn validate_request(request: &QueryRequest) -> Result<(), ClientError> {
    let today = chrono::Local::now().date_naive();
    request
        .validate(today)
        .map(|_| ())
        .map_err(|e| ClientError::new(ErrorCategory::Validation, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> QueryRequest {
        QueryRequest {
            uk_code: "abc123".to_string(),
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-31".to_string(),
            headless: true,
            app_id: None,
        }
    }

    #[test]
    fn only_network_and_timeout_are_retryable() {
        assert!(ErrorCategory::Network.retryable());
        assert!(ErrorCategory::Timeout.retryable());
        assert!(!ErrorCategory::Validation.retryable());
        assert!(!ErrorCategory::Render.retryable());
        assert!(!ErrorCategory::Api.retryable());
    }

    #[test]
    fn user_messages_match_categories() {
        assert_eq!(
            ErrorCategory::Timeout.user_message(),
            "请求超时，服务器响应时间过长，请稍后重试"
        );
        assert_eq!(
            ErrorCategory::Network.user_message(),
            "网络连接异常，请检查网络后重试"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = QueryClient::new("http://127.0.0.1:5001/").unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:5001");
    }

    #[tokio::test]
    async fn local_validation_fails_fast_without_network() {
        let client = QueryClient::new("http://127.0.0.1:1").unwrap();
        let mut request = valid_request();
        request.uk_code = String::new();
        let cancel = CancellationToken::new();

        let err = client.execute(&request, &cancel).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Validation);
        assert!(err.to_string().contains("请输入UK码"));
        // 校验失败后在途标记必须已复位
        assert!(!client.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn concurrent_query_is_rejected() {
        let client = QueryClient::new("http://127.0.0.1:1").unwrap();
        client.in_flight.store(true, Ordering::SeqCst);

        let err = client
            .execute(&valid_request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Api);
        assert!(err.to_string().contains("查询正在进行中"));
        // 被拒绝的调用不能动别人的在途标记
        assert!(client.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn pre_cancelled_token_aborts_before_retry_sleep() {
        let client = QueryClient::new("http://127.0.0.1:1").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        // 端口 1 连接必然失败（Network 类别），取消令牌让重试立刻放弃
        let err = client.execute(&valid_request(), &cancel).await.unwrap_err();
        assert!(
            err.message.contains("查询已取消") || err.category == ErrorCategory::Network,
            "unexpected: {err}"
        );
    }

    #[test]
    fn validation_category_from_local_check() {
        let mut request = valid_request();
        request.start_date = "bad".to_string();
        let err = validate_request(&request).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Validation);
        assert!(err.message.contains("请输入有效的开始日期"));
    }
}
