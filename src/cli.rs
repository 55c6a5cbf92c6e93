// src/cli.rs
//! 命令行客户端：提交查询、在终端展示结果与收益汇总、按需导出文件。

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::calc;
use crate::client::{render_error, ClientError, ErrorCategory, QueryClient};
use crate::config::ProfitCoefficients;
use crate::export::{self, ExportFormat};
use crate::models::{QueryRequest, TableData};

const DEFAULT_SERVER: &str = "http://127.0.0.1:5001";

const HELP: &str = "UK码数据查询客户端

用法:
  cli --uk <UK码> [选项]

选项:
  --server <URL>        服务端地址 (默认 http://127.0.0.1:5001)
  --uk <UK码>           要查询的UK码（字母和数字）
  --start <YYYY-MM-DD>  开始日期 (默认今天)
  --end <YYYY-MM-DD>    结束日期 (默认今天)
  --app-id <数字>       项目ID (默认用服务端配置)
  --no-headless         让服务端以有界面模式起浏览器（排查抓取问题用）
  --export <格式>       导出到文件: csv / markdown / html
  -o, --out <路径>      导出文件路径 (默认 query-result-<时间戳>.<扩展名>)
  -h, --help            显示本帮助";

#[derive(Debug)]
struct CliParams {
    server: String,
    request: QueryRequest,
    export: Option<ExportFormat>,
    out: Option<PathBuf>,
}

pub async fn run() -> Result<(), ClientError> {
    let params = parse_args(std::env::args().skip(1).collect())
        .map_err(|msg| ClientError::new(ErrorCategory::Validation, msg))?;

    let client = QueryClient::new(params.server.clone())?;

    // Ctrl+C 触发协作取消
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("收到中断，正在取消查询...");
                cancel.cancel();
            }
        });
    }

    println!("正在查询，请稍候（首次查询需要启动浏览器，可能较慢）...");
    let data = match client.execute(&params.request, &cancel).await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{}", e.category.user_message());
            return Err(e);
        }
    };

    let table = TableData {
        headers: data.headers,
        rows: data.rows,
    };

    println!();
    println!("{}", export::to_markdown(&table));
    println!();

    // 系数以服务端为准，拿不到时退回默认值
    let coefficients = match client.fetch_coefficients().await {
        Ok(c) => c,
        Err(_) => ProfitCoefficients {
            new_user: 3.0,
            deposit: 0.1,
        },
    };
    print_totals(&table, &coefficients);

    println!();
    println!(
        "查询完成，耗时 {:.2} 秒 (request_id: {})",
        data.execution_time, data.request_id
    );

    if let Some(format) = params.export {
        let content = export::render(format, &table);
        let path = params.out.unwrap_or_else(|| default_export_path(format));
        std::fs::write(&path, content).map_err(render_error)?;
        println!("已导出: {}", path.display());
    }

    Ok(())
}

fn print_totals(table: &TableData, coefficients: &ProfitCoefficients) {
    let totals = calc::calculate_totals(&table.headers, &table.rows);
    for name in calc::NUMERIC_COLUMNS {
        if let Some(value) = totals.get(name) {
            if name == "会员佣金（元）" {
                println!("{}合计: {}元", name, calc::format_currency(*value));
            } else {
                println!("{}合计: {}", name, value);
            }
        }
    }
    let income = calc::calculate_income(&totals, coefficients);
    println!(
        "拉新总收益: {}元 (系数 {})",
        calc::format_currency(income.new_user_income),
        coefficients.new_user
    );
    println!(
        "转存总收益: {}元 (系数 {})",
        calc::format_currency(income.deposit_income),
        coefficients.deposit
    );
    println!("合计收益: {}元", calc::format_currency(income.total_income));
}

fn default_export_path(format: ExportFormat) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
    PathBuf::from(format!("query-result-{}.{}", timestamp, format.extension()))
}

fn parse_args(args: Vec<String>) -> Result<CliParams, String> {
    let mut server = DEFAULT_SERVER.to_string();
    let mut uk_code = String::new();
    let mut start_date = String::new();
    let mut end_date = String::new();
    let mut app_id: Option<String> = None;
    let mut headless = true;
    let mut export: Option<ExportFormat> = None;
    let mut out: Option<PathBuf> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--server" => server = next_value(&mut iter, "--server")?,
            "--uk" => uk_code = next_value(&mut iter, "--uk")?,
            "--start" => start_date = next_value(&mut iter, "--start")?,
            "--end" => end_date = next_value(&mut iter, "--end")?,
            "--app-id" => app_id = Some(next_value(&mut iter, "--app-id")?),
            "--no-headless" => headless = false,
            "--export" => {
                let value = next_value(&mut iter, "--export")?;
                export = Some(match value.to_ascii_lowercase().as_str() {
                    "csv" => ExportFormat::Csv,
                    "markdown" | "md" => ExportFormat::Markdown,
                    "html" => ExportFormat::Html,
                    other => return Err(format!("不支持的导出格式: {other}")),
                });
            }
            "-o" | "--out" => out = Some(PathBuf::from(next_value(&mut iter, "--out")?)),
            "-h" | "--help" => {
                println!("{HELP}");
                std::process::exit(0);
            }
            other => return Err(format!("未知参数: {other}，用 --help 查看用法")),
        }
    }

    // 日期缺省为今天
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    if start_date.is_empty() {
        start_date = today.clone();
    }
    if end_date.is_empty() {
        end_date = today;
    }

    Ok(CliParams {
        server,
        request: QueryRequest {
            uk_code,
            start_date,
            end_date,
            headless,
            app_id,
        },
        export,
        out,
    })
}

fn next_value(iter: &mut std::vec::IntoIter<String>, flag: &str) -> Result<String, String> {
    iter.next().ok_or_else(|| format!("{flag} 缺少参数值"))
}
