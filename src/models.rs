// src/models.rs
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::MAX_RANGE_DAYS;
use crate::error::AppError;

/// 标准表头，所有查询结果统一成这六列
pub const STANDARD_HEADERS: [&str; 6] = [
    "日期",
    "移动拉新数",
    "移动转存数",
    "会员订单数",
    "会员订单金额",
    "会员佣金（元）",
];

/// 查询请求体，对应 POST /api/query。
/// 所有字段都有默认值：字段缺失走参数校验给出中文提示，而不是反序列化报错。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub uk_code: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub app_id: Option<String>,
}

fn default_headless() -> bool {
    true
}

/// 通过校验后的查询参数（uk_code / app_id 已去除首尾空白）
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub uk_code: String,
    pub start_date: String,
    pub end_date: String,
    pub headless: bool,
    pub app_id: Option<String>,
}

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// 校验日期字符串：先做格式检查，再做日历回转检查（2024-02-31 这类要拒绝）
pub fn is_valid_date(s: &str) -> bool {
    if !DATE_RE.is_match(s) {
        return false;
    }
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(d) => d.format("%Y-%m-%d").to_string() == s,
        Err(_) => false,
    }
}

impl QueryRequest {
    /// 服务端参数校验。收集所有错误后用 "; " 连接一次性返回，
    /// 调用方拿到 Ok 才允许触发浏览器导航。
    pub fn validate(&self, today: NaiveDate) -> Result<ValidatedQuery, AppError> {
        let mut errors: Vec<String> = Vec::new();

        let uk_code = self.uk_code.trim();
        if uk_code.is_empty() {
            errors.push("请输入UK码".to_string());
        } else if uk_code.chars().count() > 50 {
            errors.push("UK码长度不能超过50个字符".to_string());
        } else if !uk_code.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.push("UK码格式不正确，只能包含字母和数字".to_string());
        }

        let start_ok = is_valid_date(&self.start_date);
        let end_ok = is_valid_date(&self.end_date);
        if !start_ok {
            errors.push("请输入有效的开始日期 (YYYY-MM-DD)".to_string());
        }
        if !end_ok {
            errors.push("请输入有效的结束日期 (YYYY-MM-DD)".to_string());
        }

        // 区间检查只在两端日期本身合法时进行
        if start_ok && end_ok {
            if let (Ok(start), Ok(end)) = (
                NaiveDate::parse_from_str(&self.start_date, "%Y-%m-%d"),
                NaiveDate::parse_from_str(&self.end_date, "%Y-%m-%d"),
            ) {
                if start > today || end > today {
                    errors.push("日期不能超过今天".to_string());
                } else if start > end {
                    errors.push("开始日期不能晚于结束日期".to_string());
                } else if (end - start).num_days() > MAX_RANGE_DAYS {
                    errors.push(format!("查询时间范围不能超过{}天", MAX_RANGE_DAYS));
                }
            }
        }

        let app_id = match &self.app_id {
            Some(raw) if !raw.trim().is_empty() => {
                let id = raw.trim();
                if !id.chars().all(|c| c.is_ascii_digit()) {
                    errors.push("项目ID必须为数字".to_string());
                } else if id.len() > 10 {
                    errors.push("项目ID长度不能超过10位".to_string());
                }
                Some(id.to_string())
            }
            _ => None,
        };

        if !errors.is_empty() {
            return Err(AppError::Validation(errors.join("; ")));
        }

        Ok(ValidatedQuery {
            uk_code: uk_code.to_string(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            headless: self.headless,
            app_id,
        })
    }
}

/// 表格数据：表头 + 行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    pub fn empty() -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// 既没有表头也没有数据行
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }
}

/// 抓取流水线的产出：标准化后的表格 + 截断过的原始HTML片段
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub html: String,
}

/// 查询成功响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 结果容器的原始HTML（按字符截断），排查解析问题用
    pub html: String,
    /// 整个请求耗时（秒）
    pub execution_time: f64,
    pub request_id: String,
    pub success: bool,
}

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub request_id: String,
}
