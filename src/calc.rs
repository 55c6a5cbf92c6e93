// src/calc.rs
//! 总计与收益计算
//!
//! 对固定的数值列求和，再按系数推导拉新/转存收益。
//! 单元格解析尽量宽容：取不出数字的按 0 处理，缺列静默跳过。

use std::collections::HashMap;

use serde::Serialize;

use crate::config::ProfitCoefficients;

/// 参与求和的数值列。会员订单金额已从展示侧隐藏，不参与求和。
pub const NUMERIC_COLUMNS: [&str; 4] = ["移动拉新数", "移动转存数", "会员订单数", "会员佣金（元）"];

/// 按表头名计算各数值列的总计
pub fn calculate_totals(headers: &[String], rows: &[Vec<String>]) -> HashMap<String, f64> {
    let mut indices: Vec<(usize, &str)> = Vec::new();
    let mut totals: HashMap<String, f64> = HashMap::new();
    for (i, h) in headers.iter().enumerate() {
        if NUMERIC_COLUMNS.contains(&h.as_str()) {
            indices.push((i, h.as_str()));
            totals.insert(h.clone(), 0.0);
        }
    }

    for row in rows {
        for &(idx, name) in &indices {
            let value = row.get(idx).and_then(|cell| parse_number(cell)).unwrap_or(0.0);
            if let Some(total) = totals.get_mut(name) {
                *total += value;
            }
        }
    }

    totals
}

/// 收益汇总
#[derive(Debug, Clone, Serialize)]
pub struct IncomeSummary {
    pub new_user_total: f64,
    pub deposit_total: f64,
    pub new_user_income: f64,
    pub deposit_income: f64,
    pub total_income: f64,
}

/// 按系数推导收益：拉新收益 = 拉新总数 × new_user，转存收益 = 转存总数 × deposit
pub fn calculate_income(totals: &HashMap<String, f64>, coefficients: &ProfitCoefficients) -> IncomeSummary {
    let new_user_total = totals.get("移动拉新数").copied().unwrap_or(0.0);
    let deposit_total = totals.get("移动转存数").copied().unwrap_or(0.0);
    let new_user_income = new_user_total * coefficients.new_user;
    let deposit_income = deposit_total * coefficients.deposit;
    IncomeSummary {
        new_user_total,
        deposit_total,
        new_user_income,
        deposit_income,
        total_income: new_user_income + deposit_income,
    }
}

/// 解析数值单元格。整体解析失败时退回最长数字前缀（"15.00元" → 15.00），
/// 还是取不出就返回 None。NaN/Infinity 视为无效。
pub fn parse_number(cell: &str) -> Option<f64> {
    let t = cell.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(v) = t.parse::<f64>() {
        return if v.is_finite() { Some(v) } else { None };
    }
    let mut end = 0;
    for (i, c) in t.char_indices() {
        let head_sign = i == 0 && (c == '-' || c == '+');
        if c.is_ascii_digit() || c == '.' || head_sign {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    t[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// 货币格式化：固定两位小数。非有限数值一律 "0.00"。
pub fn format_currency(amount: f64) -> String {
    if !amount.is_finite() {
        return "0.00".to_string();
    }
    format!("{amount:.2}")
}

/// 字符串单元格的货币格式化，解析失败得 "0.00"
pub fn format_currency_str(cell: &str) -> String {
    match parse_number(cell) {
        Some(v) => format_currency(v),
        None => "0.00".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        [
            "日期",
            "移动拉新数",
            "移动转存数",
            "会员订单数",
            "会员订单金额",
            "会员佣金（元）",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn coefficients() -> ProfitCoefficients {
        ProfitCoefficients {
            new_user: 3.0,
            deposit: 0.1,
        }
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn totals_and_income_for_two_day_fixture() {
        let rows = vec![
            row(&["2024-01-01", "4", "12", "2", "20.00", "6.00"]),
            row(&["2024-01-02", "6", "8", "3", "30.00", "9.00"]),
        ];
        let totals = calculate_totals(&headers(), &rows);

        assert_eq!(totals["移动拉新数"], 10.0);
        assert_eq!(totals["移动转存数"], 20.0);
        assert_eq!(totals["会员订单数"], 5.0);
        assert_eq!(totals["会员佣金（元）"], 15.0);
        // 金额列被隐藏，不进总计
        assert!(!totals.contains_key("会员订单金额"));
        assert!(!totals.contains_key("日期"));

        let income = calculate_income(&totals, &coefficients());
        assert_eq!(format_currency(income.new_user_income), "30.00");
        assert_eq!(format_currency(income.deposit_income), "2.00");
        assert_eq!(format_currency(income.total_income), "32.00");
    }

    #[test]
    fn non_numeric_cells_count_as_zero() {
        let rows = vec![
            row(&["2024-01-01", "abc", "5", "1", "0.00", "1.00"]),
            row(&["2024-01-02", "3", "", "1", "0.00", "1.00"]),
        ];
        let totals = calculate_totals(&headers(), &rows);
        assert_eq!(totals["移动拉新数"], 3.0);
        assert_eq!(totals["移动转存数"], 5.0);
    }

    #[test]
    fn short_rows_do_not_panic_or_skew_totals() {
        let rows = vec![row(&["2024-01-01", "7"])];
        let totals = calculate_totals(&headers(), &rows);
        assert_eq!(totals["移动拉新数"], 7.0);
        assert_eq!(totals["会员佣金（元）"], 0.0);
    }

    #[test]
    fn missing_totals_give_zero_income() {
        let totals = HashMap::new();
        let income = calculate_income(&totals, &coefficients());
        assert_eq!(income.total_income, 0.0);
        assert_eq!(format_currency(income.total_income), "0.00");
    }

    #[test]
    fn parse_number_accepts_numeric_prefix() {
        assert_eq!(parse_number("15.00元"), Some(15.0));
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("-3.5"), Some(-3.5));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn format_currency_handles_non_finite() {
        assert_eq!(format_currency(f64::NAN), "0.00");
        assert_eq!(format_currency(f64::INFINITY), "0.00");
        assert_eq!(format_currency(2.0), "2.00");
        assert_eq!(format_currency(2.005), "2.00"); // banker 近似由 {:.2} 决定
    }

    #[test]
    fn format_currency_str_degrades_to_zero() {
        assert_eq!(format_currency_str("abc"), "0.00");
        assert_eq!(format_currency_str("15"), "15.00");
    }
}
