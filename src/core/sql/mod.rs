mod executor;
mod lexer;
mod parser;
mod predicate;

pub use executor::Executor;
pub use lexer::{strip_quotes, Lexer, Token};
pub use parser::Parser;
pub use predicate::{bind, take_join_keys, BoundExpr, CmpOp, Expr, Operand, SubqueryRunner};

use crate::core::schema::{Column, ViewSpec};

// 语句类型, 由分发器按前一两个词归类后交给对应解析器
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Select),
    Insert {
        table: String,
        values: Vec<String>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Operand)>,
        filter: Option<Expr>,
    },
    Delete {
        table: String,
        filter: Option<Expr>,
    },
    CreateTable {
        name: String,
        columns: Vec<Column>,
    },
    DropTable {
        name: String,
    },
    CreateView {
        name: String,
        spec: ViewSpec,
    },
    DropView {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub tables: Vec<String>,
    pub filter: Option<Expr>,
    pub order: Vec<OrderKey>,
    pub union: Option<Box<Select>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    All,
    Column(String),
    /// 聚合项, count允许列名为 `*`
    Aggregate { func: AggFunc, column: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    pub fn from_name(name: &str) -> Option<AggFunc> {
        match name {
            "count" => Some(AggFunc::Count),
            "sum" => Some(AggFunc::Sum),
            "avg" => Some(AggFunc::Avg),
            "min" => Some(AggFunc::Min),
            "max" => Some(AggFunc::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
        }
    }
}

/// ORDER BY的一个排序键
/// `num` 强制按数值排序, 默认按字符串; `desc` 反转方向
#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub column: String,
    pub numeric: bool,
    pub descending: bool,
}
