use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use crate::core::error::DbError;
use crate::core::schema::{Column, TableSchema, ViewSpec};
use crate::core::storage::{ScratchSpace, Storage};

use super::predicate::{bind, compare_text, take_join_keys, CmpOp, Expr, Operand};
use super::{AggFunc, OrderKey, Select, SelectItem};

/// 语句执行器, 生命周期与一条语句相同
///
/// 连接/排序产生的中间关系都写进语句私有的临时工作区,
/// 执行结束后随工作区一起删除。
pub struct Executor<'a> {
    storage: &'a Storage,
    scratch: &'a ScratchSpace,
}

impl<'a> Executor<'a> {
    pub fn new(storage: &'a Storage, scratch: &'a ScratchSpace) -> Self {
        Executor { storage, scratch }
    }

    /// SELECT全流程: 视图展开, FROM合并, 过滤, 排序, 投影, 去重, UNION
    pub fn select(&self, stmt: &Select) -> Result<(Vec<Column>, Vec<Vec<String>>), DbError> {
        let stmt = self.expand_views(stmt)?;
        let (schema, mut rows, residual) = self.gather_from(&stmt)?;

        // 连接消耗剩下的谓词在这里绑定
        // 内嵌子查询直到谓词第一次对行求值才执行, 之后复用缓存
        if let Some(expr) = residual {
            let bound = bind(&expr, &schema);
            let mut run = |query: &Select| self.select(query).map(|(_, rows)| rows);
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                if bound.eval(&row, &mut run)? {
                    kept.push(row);
                }
            }
            rows = kept;
        }

        // 排序在投影之前, 排序键不要求出现在选择列表里
        self.sort_rows(&schema, &mut rows, &stmt.order)?;

        let (columns, mut out) = self.project(&stmt.items, &schema, &rows)?;
        if stmt.distinct {
            out = dedup_rows(out);
        }

        if let Some(union) = &stmt.union {
            let (right_columns, right_rows) = self.select(union)?;
            if right_columns.len() != columns.len() {
                return Err(DbError::Arity(
                    "UNION branches select different column counts".to_string(),
                ));
            }
            out.extend(right_rows);
            out = dedup_rows(out);
        }

        Ok((columns, out))
    }

    /// FROM清单严格从左到右合并
    ///
    /// 第一张表作为初始关系R, 其后每张表T从谓词里取等值连接键,
    /// 没有可用的键就报连接顺序错误(表顺序是语言层面的约定)。
    fn gather_from(
        &self,
        stmt: &Select,
    ) -> Result<(TableSchema, Vec<Vec<String>>, Option<Expr>), DbError> {
        let first = stmt
            .tables
            .first()
            .ok_or_else(|| DbError::Parse("expected table name after FROM".to_string()))?;
        let mut schema = self.storage.load_schema(first)?;
        let mut rows = self.storage.read_rows(first)?;
        let mut filter = stmt.filter.clone();

        for table in &stmt.tables[1..] {
            let t_schema = self.storage.load_schema(table)?;
            let t_rows = self.storage.read_rows(table)?;
            let keys = match filter.as_mut() {
                Some(expr) => take_join_keys(expr, &schema, &t_schema),
                None => Vec::new(),
            };
            if keys.is_empty() {
                return Err(DbError::JoinOrder(
                    "Join not found, try reordering tables".to_string(),
                ));
            }
            debug!(table = table.as_str(), keys = keys.len(), "merge join step");
            rows = self.merge_join(rows, &keys, t_rows)?;
            schema = schema.join(&t_schema);
        }
        Ok((schema, rows, filter))
    }

    /// 两路归并连接: 两边按键排序后按键相等归并, 重复键做组内叉积
    fn merge_join(
        &self,
        mut left: Vec<Vec<String>>,
        keys: &[(usize, usize)],
        mut right: Vec<Vec<String>>,
    ) -> Result<Vec<Vec<String>>, DbError> {
        let left_keys: Vec<usize> = keys.iter().map(|k| k.0).collect();
        let right_keys: Vec<usize> = keys.iter().map(|k| k.1).collect();
        left.sort_by(|a, b| key_cmp(a, &left_keys, b, &left_keys));
        right.sort_by(|a, b| key_cmp(a, &right_keys, b, &right_keys));

        let mut merged = Vec::new();
        let mut i = 0;
        let mut j = 0;
        while i < left.len() && j < right.len() {
            match key_cmp(&left[i], &left_keys, &right[j], &right_keys) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    let mut i_end = i + 1;
                    while i_end < left.len()
                        && key_cmp(&left[i_end], &left_keys, &left[i], &left_keys)
                            == Ordering::Equal
                    {
                        i_end += 1;
                    }
                    let mut j_end = j + 1;
                    while j_end < right.len()
                        && key_cmp(&right[j_end], &right_keys, &right[j], &right_keys)
                            == Ordering::Equal
                    {
                        j_end += 1;
                    }
                    for l in i..i_end {
                        for r in j..j_end {
                            let mut row = left[l].clone();
                            row.extend(right[r].iter().cloned());
                            merged.push(row);
                        }
                    }
                    i = i_end;
                    j = j_end;
                }
            }
        }

        // 中间关系落盘, 下一步从临时文件读回
        let path = self.scratch.write_relation(&merged)?;
        self.scratch.read_relation(&path)
    }

    /// FROM里出现视图名时替换成其底层表, 并把保存的等值条件并进WHERE
    fn expand_views(&self, stmt: &Select) -> Result<Select, DbError> {
        let mut stmt = stmt.clone();
        let mut tables = Vec::new();
        let mut extra: Option<Expr> = None;
        let mut expanded = false;

        for name in &stmt.tables {
            if !self.storage.table_exists(name) && self.storage.view_exists(name) {
                let view = self.storage.load_view(name)?;
                debug!(view = name.as_str(), "expanding view reference");
                tables.extend(view.tables.iter().cloned());
                for pair in &view.joins {
                    let eq = Expr::Compare {
                        left: Operand::Word(pair.left_column.clone()),
                        op: CmpOp::Eq,
                        right: Operand::Word(pair.right_column.clone()),
                    };
                    extra = Some(match extra {
                        Some(prev) => Expr::And(Box::new(prev), Box::new(eq)),
                        None => eq,
                    });
                }
                expanded = true;
            } else {
                tables.push(name.clone());
            }
        }

        if expanded {
            stmt.tables = tables;
            stmt.filter = match (extra, stmt.filter.take()) {
                (Some(joins), Some(user)) => Some(Expr::And(Box::new(joins), Box::new(user))),
                (Some(joins), None) => Some(joins),
                (None, user) => user,
            };
        }
        Ok(stmt)
    }

    /// 稳定排序; `num` 按数值, 否则严格按字符串
    fn sort_rows(
        &self,
        schema: &TableSchema,
        rows: &mut [Vec<String>],
        order: &[OrderKey],
    ) -> Result<(), DbError> {
        if order.is_empty() {
            return Ok(());
        }
        let mut keys = Vec::new();
        for key in order {
            let index = schema
                .lookup(&key.column)
                .ok_or_else(|| DbError::NotFound(format!("column '{}'", key.column)))?;
            keys.push((index, key.numeric, key.descending));
        }
        rows.sort_by(|a, b| {
            for (index, numeric, descending) in &keys {
                let x = a.get(*index).map(String::as_str).unwrap_or("");
                let y = b.get(*index).map(String::as_str).unwrap_or("");
                let ord = if *numeric {
                    let fx = x.trim().parse::<f64>().unwrap_or(0.0);
                    let fy = y.trim().parse::<f64>().unwrap_or(0.0);
                    fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
                } else {
                    x.cmp(y)
                };
                let ord = if *descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(())
    }

    fn project(
        &self,
        items: &[SelectItem],
        schema: &TableSchema,
        rows: &[Vec<String>],
    ) -> Result<(Vec<Column>, Vec<Vec<String>>), DbError> {
        let has_aggregate = items
            .iter()
            .any(|item| matches!(item, SelectItem::Aggregate { .. }));
        if has_aggregate {
            // 聚合是全有或全无的: 不和普通列混出
            if !items
                .iter()
                .all(|item| matches!(item, SelectItem::Aggregate { .. }))
            {
                return Err(DbError::Parse(
                    "cannot mix aggregates with plain columns".to_string(),
                ));
            }
            return self.aggregate(items, schema, rows);
        }

        let mut indices = Vec::new();
        let mut columns = Vec::new();
        for item in items {
            match item {
                SelectItem::All => {
                    for (index, column) in schema.columns.iter().enumerate() {
                        indices.push(index);
                        columns.push(column.clone());
                    }
                }
                SelectItem::Column(name) => {
                    let index = schema
                        .lookup(name)
                        .ok_or_else(|| DbError::NotFound(format!("column '{}'", name)))?;
                    indices.push(index);
                    columns.push(schema.columns[index].clone());
                }
                SelectItem::Aggregate { .. } => unreachable!("checked above"),
            }
        }

        let out = rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|index| row.get(*index).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Ok((columns, out))
    }

    /// 聚合输出恰好一行
    fn aggregate(
        &self,
        items: &[SelectItem],
        schema: &TableSchema,
        rows: &[Vec<String>],
    ) -> Result<(Vec<Column>, Vec<Vec<String>>), DbError> {
        let mut columns = Vec::new();
        let mut row = Vec::new();
        for item in items {
            let (func, column) = match item {
                SelectItem::Aggregate { func, column } => (*func, column),
                _ => unreachable!("checked by caller"),
            };

            let value = match func {
                AggFunc::Count if column == "*" => rows.len().to_string(),
                AggFunc::Count => {
                    let index = self.resolve_column(schema, column)?;
                    rows.iter()
                        .filter(|r| !field(r, index).is_empty())
                        .count()
                        .to_string()
                }
                AggFunc::Sum => {
                    let index = self.resolve_column(schema, column)?;
                    format_number(rows.iter().map(|r| numeric_field(r, index)).sum())
                }
                AggFunc::Avg => {
                    let index = self.resolve_column(schema, column)?;
                    let sum: f64 = rows.iter().map(|r| numeric_field(r, index)).sum();
                    if rows.is_empty() {
                        format_number(0.0)
                    } else {
                        format_number(sum / rows.len() as f64)
                    }
                }
                AggFunc::Min => {
                    let index = self.resolve_column(schema, column)?;
                    fold_extreme(rows, index, Ordering::Less)
                }
                AggFunc::Max => {
                    let index = self.resolve_column(schema, column)?;
                    fold_extreme(rows, index, Ordering::Greater)
                }
            };
            columns.push(Column {
                name: format!("{}({})", func.name(), column),
                width: 0,
            });
            row.push(value);
        }
        Ok((columns, vec![row]))
    }

    fn resolve_column(&self, schema: &TableSchema, name: &str) -> Result<usize, DbError> {
        schema
            .lookup(name)
            .ok_or_else(|| DbError::NotFound(format!("column '{}'", name)))
    }

    /// INSERT: 值的总数必须是列数的整数倍, 按列数切组逐行追加
    pub fn insert(&self, table: &str, values: &[String]) -> Result<usize, DbError> {
        let schema = self.storage.load_schema(table)?;
        let width = schema.columns.len();
        if width == 0 || values.is_empty() || values.len() % width != 0 {
            return Err(DbError::Arity("Incorrect number of values".to_string()));
        }
        let rows: Vec<Vec<String>> = values.chunks(width).map(|chunk| chunk.to_vec()).collect();
        self.storage.append_rows(table, &rows)?;
        Ok(rows.len())
    }

    /// UPDATE: 匹配行的目标字段换成字面量或其他字段的值, 整文件重写
    pub fn update(
        &self,
        table: &str,
        assignments: &[(String, Operand)],
        filter: &Option<Expr>,
    ) -> Result<usize, DbError> {
        let schema = self.storage.load_schema(table)?;
        let mut targets = Vec::new();
        for (column, value) in assignments {
            let index = schema
                .lookup(column)
                .ok_or_else(|| DbError::Arity(format!("Unknown column '{}'", column)))?;
            targets.push((index, value));
        }
        let bound = filter.as_ref().map(|expr| bind(expr, &schema));
        let mut run = |query: &Select| self.select(query).map(|(_, rows)| rows);

        let mut rows = self.storage.read_rows(table)?;
        let mut touched = 0;
        for row in rows.iter_mut() {
            let hit = match &bound {
                Some(b) => b.eval(row, &mut run)?,
                None => true,
            };
            if !hit {
                continue;
            }
            touched += 1;
            for (index, value) in &targets {
                let new_value = match value {
                    // 右值命中列名时取该字段的值, 否则按字面量
                    Operand::Word(word) => match schema.lookup(word) {
                        Some(source) => field(row, source).to_string(),
                        None => word.clone(),
                    },
                    Operand::Literal(text) => text.clone(),
                    Operand::Subquery(_) => {
                        return Err(DbError::Parse(
                            "subquery is not allowed in SET".to_string(),
                        ))
                    }
                };
                if let Some(slot) = row.get_mut(*index) {
                    *slot = new_value;
                }
            }
        }
        self.storage.rewrite_rows(table, &rows)?;
        Ok(touched)
    }

    /// DELETE: 保留不匹配的行重写整个数据文件, 返回删掉的行数
    pub fn delete(&self, table: &str, filter: &Option<Expr>) -> Result<usize, DbError> {
        let schema = self.storage.load_schema(table)?;
        let bound = filter.as_ref().map(|expr| bind(expr, &schema));
        let mut run = |query: &Select| self.select(query).map(|(_, rows)| rows);

        let rows = self.storage.read_rows(table)?;
        let mut kept = Vec::with_capacity(rows.len());
        let mut removed = 0;
        for row in rows {
            let hit = match &bound {
                Some(b) => b.eval(&row, &mut run)?,
                None => true,
            };
            if hit {
                removed += 1;
            } else {
                kept.push(row);
            }
        }
        self.storage.rewrite_rows(table, &kept)?;
        Ok(removed)
    }

    /// CREATE VIEW前确认引用的表都在
    pub fn create_view(&self, name: &str, spec: &ViewSpec) -> Result<(), DbError> {
        for table in &spec.tables {
            if !self.storage.table_exists(table) {
                return Err(DbError::NotFound(format!("table '{}'", table)));
            }
        }
        self.storage.save_view(name, spec)
    }
}

fn field<'r>(row: &'r [String], index: usize) -> &'r str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// 解析失败(包括空值)按零计
fn numeric_field(row: &[String], index: usize) -> f64 {
    field(row, index).trim().parse::<f64>().unwrap_or(0.0)
}

fn fold_extreme(rows: &[Vec<String>], index: usize, wanted: Ordering) -> String {
    let mut best: Option<&str> = None;
    for row in rows {
        let value = field(row, index);
        best = Some(match best {
            Some(current) if compare_text(value, current) == wanted => value,
            Some(current) => current,
            None => value,
        });
    }
    best.unwrap_or("").to_string()
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn key_cmp(a: &[String], a_keys: &[usize], b: &[String], b_keys: &[usize]) -> Ordering {
    for (x, y) in a_keys.iter().zip(b_keys) {
        let ord = field(a, *x).cmp(field(b, *y));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// 按整行元组去重, 保留首次出现
fn dedup_rows(rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    rows.into_iter().filter(|row| seen.insert(row.clone())).collect()
}
