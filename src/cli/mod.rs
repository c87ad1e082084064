mod formatter;

use std::io::{self, BufRead, Write};

use clap::Parser;

use crate::core::db::{Database, StatementOutput};
use crate::core::error::DbError;

use self::formatter::TableFormatter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// 安静模式: 不输出表头
    #[arg(short, long)]
    quiet: bool,
    /// 数据库目录
    database: String,
}

/// 终结符扫描结果: 终结符之前的文本, 动作, 扫描后的引号状态
struct ScanResult {
    prefix: String,
    action: Option<char>,
    in_quote: Option<char>,
}

/// 不进SQL管线的特殊命令, 单独一行输入, 不需要终结符
#[derive(Debug, PartialEq)]
enum SpecialCommand {
    Help,
    Print(String),
}

impl Cli {
    /// 语句循环: 逐行累积输入, 遇到终结符把整段文本交给引擎
    pub fn run(&self) -> Result<(), DbError> {
        let mut db = Database::open(&self.database, self.quiet)?;

        println!("flatdb - 平面文件上的交互式SQL引擎");
        println!("语句以 /g 提交, /p 重印缓冲区, /q 退出 (也接受 \\g \\p \\q)");
        println!("输入 help 查看语法, print 表名 打印整张表");

        let stdin = io::stdin();
        let mut buffer = String::new();
        let mut in_quote: Option<char> = None;

        loop {
            if buffer.is_empty() {
                print!("> ");
            } else {
                print!("-> ");
            }
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.strip_suffix('\n').unwrap_or(&line);
            let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);

            // 特殊命令在进SQL管线之前识别, 只在新语句开头生效
            if buffer.is_empty() && in_quote.is_none() {
                match special_command(trimmed.trim()) {
                    Some(SpecialCommand::Help) => {
                        print_help();
                        continue;
                    }
                    Some(SpecialCommand::Print(table)) => {
                        print_table(&mut db, &table);
                        continue;
                    }
                    None => {}
                }
            }

            let scan = scan_line(trimmed, in_quote);
            match scan.action {
                None => {
                    buffer.push_str(&scan.prefix);
                    buffer.push('\n');
                    in_quote = scan.in_quote;
                }
                Some('p') => {
                    // 终结符只在引号外被识别, 此刻引号一定已闭合
                    buffer.push_str(&scan.prefix);
                    in_quote = None;
                    print!("{}", buffer);
                    if !buffer.ends_with('\n') {
                        println!();
                    }
                }
                Some('g') => {
                    buffer.push_str(&scan.prefix);
                    execute_and_print(&mut db, &buffer);
                    buffer.clear();
                    in_quote = None;
                }
                Some('q') => {
                    // 退出终结符也先提交累积的语句
                    buffer.push_str(&scan.prefix);
                    execute_and_print(&mut db, &buffer);
                    break;
                }
                Some(_) => unreachable!("scan_line only yields g/p/q"),
            }
        }
        Ok(())
    }
}

/// 识别 help 和 print 表名, 首词不区分大小写, 多余的词忽略
fn special_command(input: &str) -> Option<SpecialCommand> {
    let mut words = input.split_whitespace();
    let first = words.next()?;
    if first.eq_ignore_ascii_case("help") {
        return Some(SpecialCommand::Help);
    }
    if first.eq_ignore_ascii_case("print") {
        if let Some(table) = words.next() {
            return Some(SpecialCommand::Print(table.to_string()));
        }
    }
    None
}

/// 在一行里找引号外的终结符 /g /p /q (或反斜线变体)
///
/// 引号状态从之前累积的缓冲区延续过来, 引号内的终结符不算数。
/// 终结符之后的内容丢弃。
fn scan_line(line: &str, mut in_quote: Option<char>) -> ScanResult {
    let chars: Vec<char> = line.chars().collect();
    let mut prefix = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match in_quote {
            Some(quote) => {
                if c == quote {
                    in_quote = None;
                }
                prefix.push(c);
            }
            None => {
                if (c == '/' || c == '\\') && i + 1 < chars.len() {
                    if let 'g' | 'p' | 'q' = chars[i + 1] {
                        return ScanResult {
                            prefix,
                            action: Some(chars[i + 1]),
                            in_quote: None,
                        };
                    }
                }
                if c == '\'' || c == '"' {
                    in_quote = Some(c);
                }
                prefix.push(c);
            }
        }
        i += 1;
    }
    ScanResult {
        prefix,
        action: None,
        in_quote,
    }
}

fn execute_and_print(db: &mut Database, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    match db.execute(text) {
        Ok(StatementOutput::Rows { columns, rows }) => {
            if db.quiet() {
                print!("{}", TableFormatter::format_rows(&columns, &rows));
            } else {
                print!("{}", TableFormatter::format_table(&columns, &rows));
            }
            println!("({} rows)", rows.len());
        }
        Ok(StatementOutput::Affected(count)) => println!("({} rows)", count),
        Ok(StatementOutput::Done) => {}
        // 语句级错误打印一行后继续会话
        Err(e) => println!("{}", e),
    }
}

/// 整张表按声明宽度排版打印, 纯展示, 引擎只出行和列
fn print_table(db: &mut Database, table: &str) {
    match db.execute(&format!("select * from {}", table)) {
        Ok(StatementOutput::Rows { columns, rows }) => {
            print!("{}", TableFormatter::format_table(&columns, &rows));
        }
        Ok(_) => {}
        Err(e) => println!("{}", e),
    }
}

fn print_help() {
    println!("SQL语句(以 /g 提交, 可跨多行):");
    println!("  SELECT [DISTINCT] 列|聚合(列)|* FROM 表... [WHERE 条件] [ORDER BY 列 [num] [asc|desc]] [UNION ...]");
    println!("  INSERT INTO 表 VALUES ( 值 ... )");
    println!("  UPDATE 表 SET 列 = 值 ... [WHERE 条件]");
    println!("  DELETE FROM 表 [WHERE 条件]");
    println!("  CREATE TABLE 表 ( 列 宽度 ... )");
    println!("  DROP TABLE 表");
    println!("  CREATE VIEW 视图 ( 表1.列 = 表2.列 ... )");
    println!("  DROP VIEW 视图");
    println!("特殊命令(单独一行, 不需要终结符):");
    println!("  help         显示本说明");
    println!("  print 表名   打印整张表");
    println!("WHERE 支持 and/or/not, 比较符 = != <> < > <= >=, in/not in 子查询");
}
