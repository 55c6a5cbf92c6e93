// src/browser.rs
//! 浏览器会话管理
//!
//! 整个服务复用单个无头浏览器实例，抓取按互斥锁串行执行。实例按使用次数
//! 上限回收重启，抑制 Chrome 长期运行的内存增长；headless 模式切换或实例
//! 失联也会触发重启。抓取流水线只依赖 `PageSession` trait，测试用脚本化的
//! 假实现驱动，不碰真实浏览器。

use std::ffi::OsStr;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{AppError, Result};

/// 页面驱动接口：抓取流水线需要的全部操作
pub trait PageSession {
    /// 导航到目标地址并等待导航完成
    fn goto(&self, url: &str, timeout: Duration) -> Result<()>;
    /// 等待页面进入就绪状态（document.readyState == "complete"）
    fn wait_ready(&self, timeout: Duration) -> Result<()>;
    /// 等待输入框出现后聚焦并键入文本
    fn fill(&self, selector: &str, text: &str, timeout: Duration) -> Result<()>;
    fn click(&self, selector: &str) -> Result<()>;
    fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;
    /// 在页面上下文执行一段JS表达式，返回其序列化结果
    fn evaluate(&self, js: &str) -> Result<Value>;
    /// 目标元素的 innerHTML，元素不存在时为空串
    fn inner_html(&self, selector: &str) -> Result<String>;
    /// 整页HTML
    fn content(&self) -> Result<String>;
}

/// Chrome 启动参数，面向低配服务器环境
const CHROME_ARGS: [&str; 10] = [
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-extensions",
    "--disable-plugins",
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
    "--memory-pressure-off",
];

fn launch(headless: bool) -> Result<Browser> {
    let args: Vec<&OsStr> = CHROME_ARGS.iter().map(|s| OsStr::new(*s)).collect();
    let options = LaunchOptions::default_builder()
        .headless(headless)
        .sandbox(false)
        .window_size(Some((1280, 720)))
        .idle_browser_timeout(Duration::from_secs(300))
        .args(args)
        .build()
        .map_err(|e| AppError::Browser(format!("构建浏览器启动参数失败: {e}")))?;
    Browser::new(options).map_err(|e| AppError::Browser(format!("启动浏览器失败: {e}")))
}

fn is_alive(browser: &Browser) -> bool {
    browser.get_version().is_ok()
}

/// 回收判定：达到使用上限、headless 模式变化、实例失联，任一命中即回收
fn needs_recycle(usage_count: u32, max_usage: u32, mode_matches: bool, alive: bool) -> bool {
    usage_count >= max_usage || !mode_matches || !alive
}

struct PoolSlot {
    browser: Option<Browser>,
    headless: bool,
    usage_count: u32,
}

/// 浏览器实例池。实例懒启动，acquire 返回的会话持有池锁直到释放。
pub struct BrowserPool {
    slot: Mutex<PoolSlot>,
    max_usage: u32,
}

/// 健康检查用的池状态快照
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// 当前是否有抓取在占用实例
    pub in_use: bool,
    pub launched: bool,
    pub usage_count: u32,
    pub max_usage: u32,
}

impl BrowserPool {
    pub fn new(max_usage: u32) -> Self {
        Self {
            slot: Mutex::new(PoolSlot {
                browser: None,
                headless: true,
                usage_count: 0,
            }),
            max_usage,
        }
    }

    /// 获取一个新开页面的会话。锁在返回值存活期间一直持有，
    /// 同一时刻只有一个抓取在驱动浏览器。阻塞调用，只能在
    /// spawn_blocking 这类阻塞上下文里使用。
    pub fn acquire(&self, headless: bool) -> Result<PooledPage<'_>> {
        let mut slot = self.lock_slot();

        let recycle = match &slot.browser {
            None => false,
            Some(browser) => needs_recycle(
                slot.usage_count,
                self.max_usage,
                slot.headless == headless,
                is_alive(browser),
            ),
        };
        if recycle {
            info!(
                "♻️ 浏览器实例回收重启 (已使用 {}/{} 次, headless={})",
                slot.usage_count, self.max_usage, headless
            );
            slot.browser = None;
            slot.usage_count = 0;
        }

        if slot.browser.is_none() {
            info!("🚀 启动新浏览器实例 (headless={})", headless);
            slot.browser = Some(launch(headless)?);
            slot.headless = headless;
        }
        slot.usage_count += 1;

        let tab = slot
            .browser
            .as_ref()
            .ok_or_else(|| AppError::Browser("浏览器实例不可用".to_string()))?
            .new_tab()
            .map_err(|e| AppError::Browser(format!("打开新页面失败: {e}")))?;
        tab.set_default_timeout(Duration::from_secs(60));

        Ok(PooledPage {
            page: ChromePage { tab },
            _slot: slot,
        })
    }

    /// 池状态快照。抓取占用实例时不等锁，直接报告 in_use。
    pub fn status(&self) -> PoolStatus {
        match self.slot.try_lock() {
            Ok(slot) => PoolStatus {
                in_use: false,
                launched: slot.browser.is_some(),
                usage_count: slot.usage_count,
                max_usage: self.max_usage,
            },
            Err(TryLockError::Poisoned(poisoned)) => {
                let slot = poisoned.into_inner();
                PoolStatus {
                    in_use: false,
                    launched: slot.browser.is_some(),
                    usage_count: slot.usage_count,
                    max_usage: self.max_usage,
                }
            }
            Err(TryLockError::WouldBlock) => PoolStatus {
                in_use: true,
                launched: true,
                usage_count: 0,
                max_usage: self.max_usage,
            },
        }
    }

    /// 关闭并丢弃当前实例（优雅退出时调用）
    pub fn shutdown(&self) {
        let mut slot = self.lock_slot();
        if slot.browser.take().is_some() {
            info!("🧹 浏览器实例已关闭");
        }
        slot.usage_count = 0;
    }

    fn lock_slot(&self) -> MutexGuard<'_, PoolSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 持有池锁的页面会话。Drop 时关闭页面，池锁随之释放。
pub struct PooledPage<'a> {
    page: ChromePage,
    _slot: MutexGuard<'a, PoolSlot>,
}

impl PooledPage<'_> {
    pub fn page(&self) -> &ChromePage {
        &self.page
    }
}

impl Drop for PooledPage<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.page.tab.close(false) {
            warn!("关闭页面失败: {e}");
        }
    }
}

/// headless_chrome 的 PageSession 实现
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl PageSession for ChromePage {
    fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        self.tab.set_default_timeout(timeout);
        self.tab
            .navigate_to(url)
            .map_err(|e| AppError::Navigation(format!("导航请求失败: {e}")))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| AppError::Navigation(format!("等待导航完成失败: {e}")))?;
        Ok(())
    }

    fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self
                .tab
                .evaluate("document.readyState", false)
                .ok()
                .and_then(|obj| obj.value)
                .and_then(|v| v.as_str().map(str::to_string));
            if state.as_deref() == Some("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AppError::Timeout("页面就绪等待超时".to_string()));
            }
            std::thread::sleep(Duration::from_millis(200));
        }
    }

    fn fill(&self, selector: &str, text: &str, timeout: Duration) -> Result<()> {
        let element = self
            .tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|e| AppError::Timeout(format!("输入框未出现 ({selector}): {e}")))?;
        element
            .click()
            .map_err(|e| AppError::Browser(format!("聚焦输入框失败: {e}")))?;
        self.tab
            .type_str(text)
            .map_err(|e| AppError::Browser(format!("键入文本失败: {e}")))?;
        Ok(())
    }

    fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .tab
            .find_element(selector)
            .map_err(|e| AppError::Browser(format!("找不到元素 ({selector}): {e}")))?;
        element
            .click()
            .map_err(|e| AppError::Browser(format!("点击元素失败 ({selector}): {e}")))?;
        Ok(())
    }

    fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map(|_| ())
            .map_err(|e| AppError::Timeout(format!("等待元素超时 ({selector}): {e}")))
    }

    fn evaluate(&self, js: &str) -> Result<Value> {
        let obj = self
            .tab
            .evaluate(js, false)
            .map_err(|e| AppError::Browser(format!("执行页面脚本失败: {e}")))?;
        Ok(obj.value.unwrap_or(Value::Null))
    }

    fn inner_html(&self, selector: &str) -> Result<String> {
        let js = format!(
            "document.querySelector({}) ? document.querySelector({}).innerHTML : ''",
            js_string_literal(selector),
            js_string_literal(selector)
        );
        match self.evaluate(&js)? {
            Value::String(s) => Ok(s),
            _ => Ok(String::new()),
        }
    }

    fn content(&self) -> Result<String> {
        self.tab
            .get_content()
            .map_err(|e| AppError::Browser(format!("获取页面内容失败: {e}")))
    }
}

/// 把选择器安全转义成JS字符串字面量
fn js_string_literal(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycle_on_usage_cap() {
        assert!(!needs_recycle(49, 50, true, true));
        assert!(needs_recycle(50, 50, true, true));
        assert!(needs_recycle(51, 50, true, true));
    }

    #[test]
    fn recycle_on_mode_change_or_dead_instance() {
        assert!(needs_recycle(1, 50, false, true));
        assert!(needs_recycle(1, 50, true, false));
        assert!(!needs_recycle(1, 50, true, true));
    }

    #[test]
    fn pool_is_lazy_and_reports_status() {
        let pool = BrowserPool::new(50);
        let status = pool.status();
        assert!(!status.launched);
        assert!(!status.in_use);
        assert_eq!(status.usage_count, 0);
        assert_eq!(status.max_usage, 50);
    }

    #[test]
    fn shutdown_on_idle_pool_is_a_noop() {
        let pool = BrowserPool::new(50);
        pool.shutdown();
        assert!(!pool.status().launched);
    }

    #[test]
    fn selector_is_escaped_as_js_literal() {
        assert_eq!(js_string_literal("a\"b"), "\"a\\\"b\"");
        assert_eq!(
            js_string_literal("#app > div.search input[type=text]"),
            "\"#app > div.search input[type=text]\""
        );
    }
}
