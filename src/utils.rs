// src/utils.rs

/// 生成请求ID：毫秒时间戳 + 9位随机字母数字，便于在日志里串起一次查询
pub fn generate_request_id() -> String {
    format!(
        "{}_{}",
        chrono::Utc::now().timestamp_millis(),
        generate_random_string(9)
    )
}

pub fn generate_random_string(len: usize) -> String {
    use rand::distributions::Alphanumeric;
    use rand::{thread_rng, Rng};
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// 按字符数截断字符串。直接按字节切片遇到多字节字符会 panic，必须走字符边界。
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 当前进程的常驻内存（RSS，字节）。仅 Linux 下可用，其他平台返回 None。
pub fn rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}
