// src/scrape.rs
//! 抓取流水线
//!
//! 一次查询的完整步骤：打开目标看板 → 填入UK码 → 设置日期区间 →
//! 提交查询 → 等待结果容器 → 提取HTML → 解析并标准化。
//! 除解析与标准化外，每一步都有超时上限；导航整体重试，重试耗尽
//! 只报一个聚合错误。

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::browser::{BrowserPool, PageSession};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::extract;
use crate::models::{ScrapeOutcome, ValidatedQuery};
use crate::utils;

// 超时与重试参数，按上游看板的加载特性调的
const NAV_ATTEMPTS: u32 = 3;
const NAV_RETRY_DELAY: Duration = Duration::from_secs(3);
const NAV_TIMEOUT: Duration = Duration::from_secs(45);
const READY_TIMEOUT: Duration = Duration::from_secs(15);
const INPUT_TIMEOUT: Duration = Duration::from_secs(20);
const RESULT_TIMEOUT: Duration = Duration::from_secs(45);
const RESULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(20);
const SETTLE_DELAY: Duration = Duration::from_secs(3);

/// 响应里携带的原始HTML截断长度（字符）
const HTML_SNIPPET_CHARS: usize = 5000;

// 页面选择器，与上游看板的DOM结构绑定
const UK_INPUT_SELECTOR: &str = "#app > div.search > div:nth-child(2) > input[type=text]";
const SUBMIT_SELECTOR: &str = "#app > div.search > div.submit";
const RESULT_SELECTOR: &str = "#app > div.list > div.tab_warp";
const RESULT_FALLBACK_SELECTOR: &str = "table, .table, [class*=\"table\"]";

/// 执行一次完整查询：从池中取会话并运行流水线。
/// 阻塞调用，handler 侧包在 spawn_blocking 里。
pub fn run_query(pool: &BrowserPool, config: &Config, query: &ValidatedQuery) -> Result<ScrapeOutcome> {
    let session = pool.acquire(query.headless)?;
    scrape_with_page(session.page(), config, query)
}

/// 流水线主体，与具体浏览器实现解耦
pub fn scrape_with_page(
    page: &dyn PageSession,
    config: &Config,
    query: &ValidatedQuery,
) -> Result<ScrapeOutcome> {
    let target_url = config.target_url(query.app_id.as_deref());
    info!("🌐 正在访问看板: {}", target_url);

    navigate_with_retry(page, &target_url)?;

    info!("⌨️ 填入UK码: {}", query.uk_code);
    page.fill(UK_INPUT_SELECTOR, &query.uk_code, INPUT_TIMEOUT)?;

    // 日期设置是尽力而为：失败只告警，看板会按默认区间出数
    set_date_range(page, &query.start_date, &query.end_date);

    info!("🖱️ 提交查询");
    page.click(SUBMIT_SELECTOR)?;

    // 先等结果容器；超时再等一次通用表格选择器
    if let Err(e) = page.wait_for_selector(RESULT_SELECTOR, RESULT_TIMEOUT) {
        warn!("⚠️ 结果容器未出现，回退到通用表格选择器: {}", e);
        page.wait_for_selector(RESULT_FALLBACK_SELECTOR, RESULT_FALLBACK_TIMEOUT)?;
    }

    // 容器出现后数据可能还在渲染，固定再等一段
    std::thread::sleep(SETTLE_DELAY);

    let table_html = page.inner_html(RESULT_SELECTOR).unwrap_or_default();
    info!("📦 结果容器HTML长度: {}", table_html.len());

    let mut extracted = extract::parse_table_data(&table_html);

    // 容器里解析不出来时换整页内容再试一次
    if extracted.is_empty() {
        info!("🔄 容器解析为空，改用整页内容重新解析");
        if let Ok(full_html) = page.content() {
            extracted = extract::parse_table_data(&full_html);
        }
    }

    let table = extract::normalize_schema(extracted, &query.start_date, &query.end_date);
    info!("✅ 抓取完成: {} 行数据", table.rows.len());

    Ok(ScrapeOutcome {
        headers: table.headers,
        rows: table.rows,
        html: utils::truncate_chars(&table_html, HTML_SNIPPET_CHARS).to_string(),
    })
}

/// 导航并等待就绪，失败时整体重试。所有尝试都失败后
/// 只返回一个聚合错误，带最后一次失败的细节。
fn navigate_with_retry(page: &dyn PageSession, url: &str) -> Result<()> {
    let mut last_error: Option<AppError> = None;
    for attempt in 1..=NAV_ATTEMPTS {
        let result = page
            .goto(url, NAV_TIMEOUT)
            .and_then(|_| page.wait_ready(READY_TIMEOUT));
        match result {
            Ok(()) => {
                if attempt > 1 {
                    info!("✅ 第 {} 次尝试导航成功", attempt);
                }
                return Ok(());
            }
            Err(e) => {
                warn!("⚠️ 页面加载失败 (第 {}/{} 次): {}", attempt, NAV_ATTEMPTS, e);
                last_error = Some(e);
                if attempt < NAV_ATTEMPTS {
                    std::thread::sleep(NAV_RETRY_DELAY);
                }
            }
        }
    }
    let detail = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "未知错误".to_string());
    Err(AppError::Navigation(format!(
        "重试 {} 次后页面仍无法加载: {}",
        NAV_ATTEMPTS, detail
    )))
}

/// 通过看板自身暴露的 window.vm 状态机设置日期区间。
/// 脚本返回 true 才算设置成功；任何失败都不中断流水线。
fn set_date_range(page: &dyn PageSession, start_date: &str, end_date: &str) {
    let js = build_date_script(start_date, end_date);
    match page.evaluate(&js) {
        Ok(Value::Bool(true)) => info!("📅 日期区间已设置: {} ~ {}", start_date, end_date),
        Ok(_) => warn!("⚠️ 日期设置未生效（页面未暴露 vm 状态）"),
        Err(e) => warn!("⚠️ 日期设置脚本执行失败: {}", e),
    }
}

// 日期参数已通过 YYYY-MM-DD 校验才会走到这里，直接内插是安全的
fn build_date_script(start_date: &str, end_date: &str) -> String {
    format!(
        r#"(function() {{
  try {{
    if (window.vm && window.vm.$data) {{
      var parts = '{start}'.split('-');
      window.vm.$data.showType = 1;
      window.vm.$data.submitTime(new Date(parts[0], parts[1] - 1, parts[2]));
      parts = '{end}'.split('-');
      window.vm.$data.showType = 2;
      window.vm.$data.submitTime(new Date(parts[0], parts[1] - 1, parts[2]));
      return true;
    }}
    return false;
  }} catch (e) {{
    return false;
  }}
}})()"#,
        start = start_date,
        end = end_date
    )
}
