// src/extract.rs
//! HTML表格提取与标准化
//!
//! 看板的结果区域有两种形态：语义化 `<table>`，或一组 div 拼出来的表格。
//! 先按语义化表格提取，取不到再按 div 结构提取，最后统一标准化成固定六列。

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::models::{TableData, STANDARD_HEADERS};

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static THEAD_TR: Lazy<Selector> = Lazy::new(|| Selector::parse("thead tr").unwrap());
static TBODY: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody").unwrap());
static TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").unwrap());
static DIV_TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".table").unwrap());
static DIV_HEADER: Lazy<Selector> = Lazy::new(|| Selector::parse(".table_header").unwrap());
static DIV_BODY: Lazy<Selector> = Lazy::new(|| Selector::parse(".table_body").unwrap());
static DIV_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse(".table_body_item").unwrap());
static DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div").unwrap());

/// 双策略提取。两种策略都取不到任何表头和数据时返回空结果。
pub fn parse_table_data(html: &str) -> TableData {
    let doc = Html::parse_document(html);

    let semantic = parse_semantic_table(&doc);
    if !semantic.is_empty() {
        return semantic;
    }

    let div_table = parse_div_table(&doc);
    if !div_table.is_empty() {
        return div_table;
    }

    TableData::empty()
}

/// 策略一：文档中的第一个 `<table>`。
/// 没有 `<thead>` 时把第一行当表头，数据行里跳过它。
fn parse_semantic_table(doc: &Html) -> TableData {
    let Some(table) = doc.select(&TABLE).next() else {
        return TableData::empty();
    };

    let mut headers: Vec<String> = Vec::new();
    let mut header_was_first_tr = false;
    match table.select(&THEAD_TR).next() {
        Some(head_row) => headers.extend(head_row.select(&CELL).map(cell_text)),
        None => {
            if let Some(first_row) = table.select(&TR).next() {
                headers.extend(first_row.select(&CELL).map(cell_text));
                header_was_first_tr = true;
            }
        }
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    if let Some(tbody) = table.select(&TBODY).next() {
        let skip = usize::from(header_was_first_tr && !headers.is_empty());
        for tr in tbody.select(&TR).skip(skip) {
            push_row(&mut rows, tr);
        }
    } else {
        // 没有 tbody 时 tr 选择器会连 thead 里的行一起选出来
        let skip = usize::from(!headers.is_empty());
        for tr in table.select(&TR).skip(skip) {
            push_row(&mut rows, tr);
        }
    }

    TableData { headers, rows }
}

/// 策略二：div 结构表格（.table > .table_header / .table_body > .table_body_item）。
/// 只收非空白的 div 文本，行内 div 数量以实际取到的为准。
fn parse_div_table(doc: &Html) -> TableData {
    let Some(container) = doc.select(&DIV_TABLE).next() else {
        return TableData::empty();
    };

    let mut headers: Vec<String> = Vec::new();
    if let Some(header_row) = container.select(&DIV_HEADER).next() {
        headers.extend(
            header_row
                .select(&DIV)
                .map(cell_text)
                .filter(|t| !t.is_empty()),
        );
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    if let Some(body) = container.select(&DIV_BODY).next() {
        for item in body.select(&DIV_ROW) {
            let cells: Vec<String> = item
                .select(&DIV)
                .map(cell_text)
                .filter(|t| !t.is_empty())
                .collect();
            if !cells.is_empty() {
                rows.push(cells);
            }
        }
    }

    TableData { headers, rows }
}

fn push_row(rows: &mut Vec<Vec<String>>, tr: ElementRef<'_>) {
    let cells: Vec<String> = tr.select(&CELL).map(cell_text).collect();
    if !cells.is_empty() {
        rows.push(cells);
    }
}

/// 元素文本：合并所有文本节点，压掉首尾与连续空白
fn cell_text(el: ElementRef<'_>) -> String {
    let raw: String = el.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 标准化为固定六列结构。
///
/// 完全没取到数据时合成两行占位（起止日期各一行）；取到数据时表头一律
/// 替换为标准表头。提取表头恰好包含全部六个标准列名时按列名重排，
/// 否则按位置截断或用 "0" 补齐到六列。
pub fn normalize_schema(extracted: TableData, start_date: &str, end_date: &str) -> TableData {
    let standard: Vec<String> = STANDARD_HEADERS.iter().map(|s| s.to_string()).collect();

    if extracted.is_empty() {
        return TableData {
            headers: standard,
            rows: vec![placeholder_row(start_date), placeholder_row(end_date)],
        };
    }

    let remap = column_remap(&extracted.headers);
    let rows = extracted
        .rows
        .into_iter()
        .map(|row| match &remap {
            Some(map) => map
                .iter()
                .map(|&idx| row.get(idx).cloned().unwrap_or_else(|| "0".to_string()))
                .collect(),
            None => fit_row(row),
        })
        .collect();

    TableData {
        headers: standard,
        rows,
    }
}

/// 每个标准列名在提取表头中的下标。任何一个找不到就返回 None，走按位对齐。
fn column_remap(extracted: &[String]) -> Option<Vec<usize>> {
    STANDARD_HEADERS
        .iter()
        .map(|name| extracted.iter().position(|h| h == name))
        .collect()
}

fn fit_row(mut row: Vec<String>) -> Vec<String> {
    row.truncate(STANDARD_HEADERS.len());
    while row.len() < STANDARD_HEADERS.len() {
        row.push("0".to_string());
    }
    row
}

fn placeholder_row(date: &str) -> Vec<String> {
    vec![
        date.to_string(),
        "0".to_string(),
        "0".to_string(),
        "0".to_string(),
        "0.00".to_string(),
        "0.00".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEMANTIC_TABLE: &str = r#"
        <div class="tab_warp">
          <table>
            <thead>
              <tr><th>日期</th><th>移动拉新数</th><th>移动转存数</th></tr>
            </thead>
            <tbody>
              <tr><td>2024-01-01</td><td>10</td><td>20</td></tr>
              <tr><td>2024-01-02</td><td>5</td><td>8</td></tr>
            </tbody>
          </table>
        </div>"#;

    const DIV_TABLE_HTML: &str = r#"
        <div class="table">
          <div class="table_header">
            <div>日期</div><div>移动拉新数</div><div>移动转存数</div>
          </div>
          <div class="table_body">
            <div class="table_body_item">
              <div>2024-01-01</div><div>10</div><div>20</div>
            </div>
            <div class="table_body_item">
              <div>2024-01-02</div><div> </div><div>8</div>
            </div>
          </div>
        </div>"#;

    #[test]
    fn semantic_table_with_thead_and_tbody() {
        let data = parse_table_data(SEMANTIC_TABLE);
        assert_eq!(data.headers, vec!["日期", "移动拉新数", "移动转存数"]);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[0], vec!["2024-01-01", "10", "20"]);
    }

    #[test]
    fn semantic_table_without_thead_uses_first_row_once() {
        let html = r#"
            <table>
              <tr><th>日期</th><th>移动拉新数</th></tr>
              <tr><td>2024-01-01</td><td>10</td></tr>
            </table>"#;
        let data = parse_table_data(html);
        assert_eq!(data.headers, vec!["日期", "移动拉新数"]);
        assert_eq!(data.rows, vec![vec!["2024-01-01", "10"]]);
    }

    #[test]
    fn semantic_table_with_thead_but_no_tbody_skips_header_row() {
        let html = r#"
            <table>
              <thead><tr><th>日期</th></tr></thead>
              <tr><td>2024-01-01</td></tr>
            </table>"#;
        let data = parse_table_data(html);
        assert_eq!(data.headers, vec!["日期"]);
        assert_eq!(data.rows, vec![vec!["2024-01-01"]]);
    }

    #[test]
    fn whitespace_in_cells_is_collapsed() {
        let html = "<table><thead><tr><th>  日\n 期 </th></tr></thead><tbody><tr><td>  2024-01-01\n</td></tr></tbody></table>";
        let data = parse_table_data(html);
        assert_eq!(data.headers, vec!["日 期"]);
        assert_eq!(data.rows[0], vec!["2024-01-01"]);
    }

    #[test]
    fn div_table_is_used_when_no_semantic_table() {
        let data = parse_table_data(DIV_TABLE_HTML);
        assert_eq!(data.headers, vec!["日期", "移动拉新数", "移动转存数"]);
        // 空白 div 被过滤，该行只剩两个单元格
        assert_eq!(data.rows[1], vec!["2024-01-02", "8"]);
    }

    #[test]
    fn semantic_table_wins_over_div_table() {
        let html = format!("{}{}", SEMANTIC_TABLE, DIV_TABLE_HTML);
        let data = parse_table_data(&html);
        assert_eq!(data.rows[0][0], "2024-01-01");
        assert_eq!(data.rows.len(), 2);
    }

    #[test]
    fn no_table_at_all_gives_empty_result() {
        let data = parse_table_data("<p>没有数据</p>");
        assert!(data.is_empty());
    }

    #[test]
    fn normalize_synthesizes_placeholder_rows_when_empty() {
        let data = normalize_schema(TableData::empty(), "2024-01-01", "2024-01-31");
        assert_eq!(data.headers, STANDARD_HEADERS.to_vec());
        assert_eq!(
            data.rows,
            vec![
                vec!["2024-01-01", "0", "0", "0", "0.00", "0.00"],
                vec!["2024-01-31", "0", "0", "0", "0.00", "0.00"],
            ]
        );
    }

    #[test]
    fn normalize_pads_short_rows_with_zero() {
        let extracted = TableData {
            headers: vec!["日期".to_string(), "移动拉新数".to_string()],
            rows: vec![vec!["2024-01-01".to_string(), "10".to_string()]],
        };
        let data = normalize_schema(extracted, "2024-01-01", "2024-01-31");
        assert_eq!(data.headers.len(), 6);
        assert_eq!(data.rows[0], vec!["2024-01-01", "10", "0", "0", "0", "0"]);
    }

    #[test]
    fn normalize_truncates_long_rows() {
        let extracted = TableData {
            headers: vec!["a".to_string()],
            rows: vec![(0..8).map(|i| i.to_string()).collect()],
        };
        let data = normalize_schema(extracted, "2024-01-01", "2024-01-31");
        assert_eq!(data.rows[0].len(), 6);
        assert_eq!(data.rows[0][5], "5");
    }

    #[test]
    fn normalize_remaps_by_header_name_when_all_present() {
        // 列顺序打乱但六个标准列齐全，按列名对齐而不是按位置
        let extracted = TableData {
            headers: vec![
                "移动拉新数".to_string(),
                "日期".to_string(),
                "移动转存数".to_string(),
                "会员订单数".to_string(),
                "会员订单金额".to_string(),
                "会员佣金（元）".to_string(),
            ],
            rows: vec![vec![
                "10".to_string(),
                "2024-01-01".to_string(),
                "20".to_string(),
                "5".to_string(),
                "50.00".to_string(),
                "15.00".to_string(),
            ]],
        };
        let data = normalize_schema(extracted, "2024-01-01", "2024-01-31");
        assert_eq!(
            data.rows[0],
            vec!["2024-01-01", "10", "20", "5", "50.00", "15.00"]
        );
    }

    #[test]
    fn normalize_keeps_positional_order_when_headers_incomplete() {
        let extracted = TableData {
            headers: vec!["日期".to_string(), "移动拉新数".to_string()],
            rows: vec![vec![
                "2024-01-01".to_string(),
                "1".to_string(),
                "2".to_string(),
                "3".to_string(),
                "4".to_string(),
                "5".to_string(),
            ]],
        };
        let data = normalize_schema(extracted, "2024-01-01", "2024-01-31");
        assert_eq!(data.rows[0], vec!["2024-01-01", "1", "2", "3", "4", "5"]);
    }

    #[test]
    fn normalize_overwrites_headers_even_when_rows_present() {
        let extracted = TableData {
            headers: vec!["乱七八糟".to_string()],
            rows: vec![vec!["x".to_string()]],
        };
        let data = normalize_schema(extracted, "2024-01-01", "2024-01-31");
        assert_eq!(data.headers, STANDARD_HEADERS.to_vec());
    }
}
