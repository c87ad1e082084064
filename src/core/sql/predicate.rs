use std::cell::RefCell;
use std::cmp::Ordering;

use crate::core::error::DbError;
use crate::core::schema::TableSchema;

use super::Select;

/// WHERE子句的表达式树, 名字在执行时才绑定到具体模式
///
/// 优先级: NOT 高于 AND 高于 OR, 括号优先
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    InSubquery {
        needle: Operand,
        negated: bool,
        query: Box<Select>,
    },
    /// 被连接步骤消耗掉的等值条件留下的占位
    True,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// 标识符: 绑定时在模式中命中则成为字段引用,
    /// 未命中则当作与其文本相等的字符串字面量(裸词右值的兼容规则)
    Word(String),
    /// 引号字符串, 定界符已剥除
    Literal(String),
    /// 标量子查询, 必须恰好产出一行一列
    Subquery(Box<Select>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

/// 绑定到具体记录布局后的谓词, 对每条记录求值
///
/// 内嵌的子查询保持未执行状态, 第一次对行求值时才跑一次,
/// 结果在语句生命周期内缓存复用。
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Or(Box<BoundExpr>, Box<BoundExpr>),
    And(Box<BoundExpr>, Box<BoundExpr>),
    Not(Box<BoundExpr>),
    Compare {
        left: BoundOperand,
        op: CmpOp,
        right: BoundOperand,
    },
    InList {
        needle: BoundOperand,
        negated: bool,
        query: Box<Select>,
        cache: RefCell<Option<Vec<String>>>,
    },
    True,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundOperand {
    /// 记录里从0开始的字段序号
    Field(usize),
    Literal(String),
    /// 首次取值时执行的标量子查询
    Subquery {
        query: Box<Select>,
        cache: RefCell<Option<String>>,
    },
}

/// 执行嵌套SELECT的回调, 由执行器提供
pub type SubqueryRunner<'a> = dyn FnMut(&Select) -> Result<Vec<Vec<String>>, DbError> + 'a;

/// 名字解析: 命中模式的词变字段引用, 未命中的当字面量
/// 子查询原样搬进绑定结果, 不在这里执行
pub fn bind(expr: &Expr, schema: &TableSchema) -> BoundExpr {
    match expr {
        Expr::Or(a, b) => BoundExpr::Or(Box::new(bind(a, schema)), Box::new(bind(b, schema))),
        Expr::And(a, b) => BoundExpr::And(Box::new(bind(a, schema)), Box::new(bind(b, schema))),
        Expr::Not(e) => BoundExpr::Not(Box::new(bind(e, schema))),
        Expr::Compare { left, op, right } => BoundExpr::Compare {
            left: bind_operand(left, schema),
            op: *op,
            right: bind_operand(right, schema),
        },
        Expr::InSubquery {
            needle,
            negated,
            query,
        } => BoundExpr::InList {
            needle: bind_operand(needle, schema),
            negated: *negated,
            query: query.clone(),
            cache: RefCell::new(None),
        },
        Expr::True => BoundExpr::True,
    }
}

fn bind_operand(operand: &Operand, schema: &TableSchema) -> BoundOperand {
    match operand {
        Operand::Word(w) => match schema.lookup(w) {
            Some(index) => BoundOperand::Field(index),
            None => BoundOperand::Literal(w.clone()),
        },
        Operand::Literal(s) => BoundOperand::Literal(s.clone()),
        Operand::Subquery(query) => BoundOperand::Subquery {
            query: query.clone(),
            cache: RefCell::new(None),
        },
    }
}

impl BoundExpr {
    pub fn eval(&self, record: &[String], run: &mut SubqueryRunner) -> Result<bool, DbError> {
        match self {
            BoundExpr::Or(a, b) => Ok(a.eval(record, run)? || b.eval(record, run)?),
            BoundExpr::And(a, b) => Ok(a.eval(record, run)? && b.eval(record, run)?),
            BoundExpr::Not(e) => Ok(!e.eval(record, run)?),
            BoundExpr::Compare { left, op, right } => {
                let left = left.resolve(record, run)?;
                let right = right.resolve(record, run)?;
                Ok(compare(&left, *op, &right))
            }
            BoundExpr::InList {
                needle,
                negated,
                query,
                cache,
            } => {
                if cache.borrow().is_none() {
                    let result = run(query)?;
                    let mut values = Vec::with_capacity(result.len());
                    for row in result {
                        if row.len() != 1 {
                            return Err(DbError::Subquery(
                                "IN subquery must select exactly one column".to_string(),
                            ));
                        }
                        values.extend(row);
                    }
                    *cache.borrow_mut() = Some(values);
                }
                let needle = needle.resolve(record, run)?;
                let guard = cache.borrow();
                let hit = guard
                    .as_deref()
                    .map_or(false, |values| values.iter().any(|v| *v == needle));
                Ok(hit != *negated)
            }
            BoundExpr::True => Ok(true),
        }
    }
}

impl BoundOperand {
    fn resolve(&self, record: &[String], run: &mut SubqueryRunner) -> Result<String, DbError> {
        match self {
            BoundOperand::Field(index) => Ok(record.get(*index).cloned().unwrap_or_default()),
            BoundOperand::Literal(s) => Ok(s.clone()),
            BoundOperand::Subquery { query, cache } => {
                if cache.borrow().is_none() {
                    let mut rows = run(query)?;
                    if rows.len() != 1 || rows[0].len() != 1 {
                        return Err(DbError::Subquery(format!(
                            "scalar subquery returned {} rows",
                            rows.len()
                        )));
                    }
                    let mut row = rows.remove(0);
                    *cache.borrow_mut() = Some(row.remove(0));
                }
                Ok(cache.borrow().clone().unwrap_or_default())
            }
        }
    }
}

fn compare(left: &str, op: CmpOp, right: &str) -> bool {
    match op {
        // 等值始终比较原始文本
        CmpOp::Eq => left == right,
        CmpOp::Ne => left != right,
        CmpOp::Lt => compare_text(left, right) == Ordering::Less,
        CmpOp::Gt => compare_text(left, right) == Ordering::Greater,
        CmpOp::Le => compare_text(left, right) != Ordering::Greater,
        CmpOp::Ge => compare_text(left, right) != Ordering::Less,
    }
}

/// 排序比较规则: 两边都能按数值解析时按数值比较, 否则按字符串
pub fn compare_text(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// 从谓词里取出可用作本轮连接键的等值条件
///
/// 只考虑顶层AND连接的 `a = b` 子句: 一侧落在已积累关系R的模式里,
/// 另一侧落在下一张表T的模式里。命中的子句从谓词中移除,
/// 避免连接后再次过滤。返回 (R字段序号, T字段序号) 列表。
pub fn take_join_keys(
    expr: &mut Expr,
    left: &TableSchema,
    right: &TableSchema,
) -> Vec<(usize, usize)> {
    let key = match &*expr {
        Expr::Compare {
            left: Operand::Word(a),
            op: CmpOp::Eq,
            right: Operand::Word(b),
        } => {
            if let (Some(l), Some(r)) = (left.lookup(a), right.lookup(b)) {
                Some((l, r))
            } else if let (Some(l), Some(r)) = (left.lookup(b), right.lookup(a)) {
                Some((l, r))
            } else {
                None
            }
        }
        _ => None,
    };
    if let Some(pair) = key {
        *expr = Expr::True;
        return vec![pair];
    }
    if let Expr::And(a, b) = expr {
        let mut keys = take_join_keys(a, left, right);
        keys.extend(take_join_keys(b, left, right));
        return keys;
    }
    Vec::new()
}
