// src/config.rs
//! 配置管理模块
//!
//! 从环境变量加载应用配置，所有键都有硬编码的回退值，保证零配置也能启动。

use serde::{Deserialize, Serialize};
use tracing::info;

/// 目标看板地址（与上游约定，固定不变）
pub const BASE_URL: &str = "https://csj.sgj.cn/main/sfsjcx";

/// 查询时间范围上限（天）。服务端与客户端共用同一上限。
pub const MAX_RANGE_DAYS: i64 = 365;

/// 收益计算系数
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfitCoefficients {
    /// 每个拉新折算的收益（元）
    pub new_user: f64,
    /// 每个转存折算的收益（元）
    pub deposit: f64,
}

/// 应用配置
#[derive(Debug, Clone)]
pub struct Config {
    /// 会话密钥（预留，当前仅随配置持有）
    pub secret_key: String,
    /// 看板访问令牌（URL 编码形态，拼接时不再转义）
    pub auth_key: String,
    /// 默认项目ID
    pub default_app_id: String,
    pub host: String,
    pub port: u16,
    /// 浏览器实例回收前的最大使用次数
    pub max_browser_usage: u32,
    pub coefficients: ProfitCoefficients,
}

impl Config {
    /// 从环境变量加载配置，缺失的键回退到默认值
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let config = Self {
            secret_key: env_or("SECRET_KEY", "a-hard-to-guess-string"),
            auth_key: env_or(
                "DEFAULT_AUTH_KEY",
                "329bSNv6H7fSWPELIdKF9R85s5aRT0VHlrizy8BcOSo1nGrXmCRykQupgyHib3p9gM5OxB%2F2",
            ),
            default_app_id: env_or("DEFAULT_APP_ID", "649"),
            host: env_or("HOST", "0.0.0.0"),
            port: env_or("PORT", "5001").parse().unwrap_or(5001),
            max_browser_usage: env_or("MAX_BROWSER_USAGE", "50").parse().unwrap_or(50),
            coefficients: ProfitCoefficients {
                new_user: env_or("COEFF_NEW_USER", "3.0").parse().unwrap_or(3.0),
                deposit: env_or("COEFF_DEPOSIT", "0.1").parse().unwrap_or(0.1),
            },
        };

        info!("✅ 配置加载完成");
        info!("  - 监听地址: {}:{}", config.host, config.port);
        info!("  - 默认项目ID: {}", config.default_app_id);
        info!(
            "  - 收益系数: 拉新 {} / 转存 {}",
            config.coefficients.new_user, config.coefficients.deposit
        );

        config
    }

    /// 构建带鉴权参数的目标URL。app_id 为空或仅空白时使用默认项目ID。
    pub fn target_url(&self, app_id: Option<&str>) -> String {
        let id = match app_id {
            Some(s) if !s.trim().is_empty() => s.trim(),
            _ => self.default_app_id.as_str(),
        };
        format!("{}?app_id={}&auth_key={}", BASE_URL, id, self.auth_key)
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}
