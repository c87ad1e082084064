use serde::{Deserialize, Serialize};

use crate::core::error::DbError;

/// 表的一列: 名字和显示宽度
/// 宽度只影响输出排版, 不限制存储内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub width: usize,
}

/// 一张表(或连接产生的中间关系)的有序列清单
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(table: &str, columns: Vec<Column>) -> Self {
        TableSchema {
            table: table.to_string(),
            columns,
        }
    }

    /// 解析模式文件内容, 每行 `列名<TAB>宽度`
    pub fn parse(table: &str, text: &str) -> Result<Self, DbError> {
        let mut columns = Vec::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, '\t');
            let name = parts
                .next()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| DbError::Parse(format!("bad schema line in table '{}'", table)))?;
            let width = parts
                .next()
                .and_then(|w| w.trim().parse::<usize>().ok())
                .ok_or_else(|| DbError::Parse(format!("bad schema line in table '{}'", table)))?;
            columns.push(Column {
                name: name.to_string(),
                width,
            });
        }
        Ok(TableSchema::new(table, columns))
    }

    pub fn to_file_text(&self) -> String {
        let mut out = String::new();
        for col in &self.columns {
            out.push_str(&col.name);
            out.push('\t');
            out.push_str(&col.width.to_string());
            out.push('\n');
        }
        out
    }

    /// 按名字查列, 返回从0开始的位置序号
    /// 重名时取最左边的一列
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// 两个关系拼接后的模式, 用于连接的中间结果
    pub fn join(&self, other: &TableSchema) -> TableSchema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        TableSchema::new("", columns)
    }
}

/// 保存下来的视图定义: 表清单加等值连接条件
/// 查询引用视图名时展开为底层多表SELECT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub tables: Vec<String>,
    pub joins: Vec<JoinPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPair {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}
