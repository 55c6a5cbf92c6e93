// src/export.rs
//! 导出格式化：CSV / Markdown / HTML
//!
//! 三种纯文本转换，只输出可见列白名单中的列。白名单一个都没匹配上时
//! 退回输出全部列，避免导出空文件。

use crate::models::TableData;

/// 展示与导出用的可见列白名单。会员订单金额列刻意隐藏。
pub const VISIBLE_COLUMNS: [&str; 5] = ["日期", "移动拉新数", "移动转存数", "会员订单数", "会员佣金（元）"];

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Markdown,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
        }
    }
}

/// 按格式渲染表格
pub fn render(format: ExportFormat, data: &TableData) -> String {
    match format {
        ExportFormat::Csv => to_csv(data),
        ExportFormat::Markdown => to_markdown(data),
        ExportFormat::Html => to_html(data),
    }
}

/// 可见列投影：(列名, 在原数据中的下标)
pub fn visible_columns(headers: &[String]) -> Vec<(String, usize)> {
    let mut cols: Vec<(String, usize)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| VISIBLE_COLUMNS.contains(&h.as_str()))
        .map(|(i, h)| (h.clone(), i))
        .collect();
    if cols.is_empty() {
        cols = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
    }
    cols
}

/// CSV：每个字段都加引号，字段内引号翻倍
pub fn to_csv(data: &TableData) -> String {
    let cols = visible_columns(&data.headers);
    let header_line = cols
        .iter()
        .map(|(h, _)| csv_quote(h))
        .collect::<Vec<_>>()
        .join(",");

    let row_lines: Vec<String> = data
        .rows
        .iter()
        .map(|row| {
            cols.iter()
                .map(|(_, idx)| csv_quote(cell(row, *idx)))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect();

    let mut out = header_line;
    out.push('\n');
    out.push_str(&row_lines.join("\n"));
    out
}

/// Markdown 表格：按字符数对齐补空格，单元格里的竖线转义
pub fn to_markdown(data: &TableData) -> String {
    let cols = visible_columns(&data.headers);
    if cols.is_empty() {
        return String::new();
    }

    let names: Vec<String> = cols.iter().map(|(h, _)| md_escape(h)).collect();
    let body: Vec<Vec<String>> = data
        .rows
        .iter()
        .map(|row| cols.iter().map(|(_, idx)| md_escape(cell(row, *idx))).collect())
        .collect();

    let widths: Vec<usize> = names
        .iter()
        .enumerate()
        .map(|(ci, name)| {
            let mut w = name.chars().count();
            for row in &body {
                w = w.max(row[ci].chars().count());
            }
            w
        })
        .collect();

    let format_line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut lines = vec![
        format_line(&names),
        format!("| {} |", separator.join(" | ")),
    ];
    for row in &body {
        lines.push(format_line(row));
    }
    lines.join("\n")
}

/// 独立的 HTML 文档，表格可直接在浏览器里打开查看
pub fn to_html(data: &TableData) -> String {
    let cols = visible_columns(&data.headers);

    let mut table = String::from("<table>\n  <thead>\n    <tr>");
    for (h, _) in &cols {
        table.push_str(&format!("<th>{}</th>", html_escape(h)));
    }
    table.push_str("</tr>\n  </thead>\n  <tbody>\n");
    for row in &data.rows {
        table.push_str("    <tr>");
        for (_, idx) in &cols {
            table.push_str(&format!("<td>{}</td>", html_escape(cell(row, *idx))));
        }
        table.push_str("</tr>\n");
    }
    table.push_str("  </tbody>\n</table>");

    format!(
        "<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n<meta charset=\"utf-8\">\n<title>查询结果</title>\n<style>\ntable {{ border-collapse: collapse; }}\nth, td {{ border: 1px solid #ddd; padding: 6px 10px; }}\nth {{ background: #f5f5f5; }}\n</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        table
    )
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

fn csv_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn md_escape(s: &str) -> String {
    s.replace('|', "\\|")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
