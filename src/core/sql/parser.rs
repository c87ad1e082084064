use crate::core::error::DbError;
use crate::core::schema::{Column, JoinPair, ViewSpec};

use super::lexer::{strip_quotes, Token};
use super::predicate::{CmpOp, Expr, Operand};
use super::{AggFunc, OrderKey, Select, SelectItem, Statement};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            tokens: Vec::new(),
            position: 0,
        }
    }

    pub fn parse(&mut self, tokens: Vec<Token>) -> Result<Statement, DbError> {
        self.tokens = tokens;
        self.position = 0;
        let statement = self.parse_statement()?;
        if let Some(token) = self.peek() {
            return Err(DbError::Parse(format!(
                "unexpected input after statement: {:?}",
                token
            )));
        }
        Ok(statement)
    }

    /// 分发器: 看前一两个词(不区分大小写)归类语句
    fn parse_statement(&mut self) -> Result<Statement, DbError> {
        let first = match self.peek().and_then(Token::keyword) {
            Some(word) => word,
            None => return Err(DbError::Parse("empty statement".to_string())),
        };
        match first.as_str() {
            "select" => Ok(Statement::Select(self.parse_select()?)),
            "insert" => self.parse_insert(),
            "update" => self.parse_update(),
            "delete" => self.parse_delete(),
            "create" if self.kw_at_is(1, "table") => self.parse_create_table(),
            "create" if self.kw_at_is(1, "view") => self.parse_create_view(),
            "create" => Err(DbError::Parse(
                "expected TABLE or VIEW after CREATE".to_string(),
            )),
            "drop" if self.kw_at_is(1, "table") => {
                self.position += 2;
                let name = self.expect_name("table name")?;
                Ok(Statement::DropTable { name })
            }
            "drop" if self.kw_at_is(1, "view") => {
                self.position += 2;
                let name = self.expect_name("view name")?;
                Ok(Statement::DropView { name })
            }
            "drop" => Err(DbError::Parse(
                "expected TABLE or VIEW after DROP".to_string(),
            )),
            _ => Err(DbError::Parse("unknown command".to_string())),
        }
    }

    fn parse_select(&mut self) -> Result<Select, DbError> {
        self.expect_kw("select")?;
        let distinct = self.eat_kw("distinct");

        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    items.push(SelectItem::All);
                }
                Some(Token::Word(_)) if self.kw_is("from") => break,
                Some(Token::Word(word)) => {
                    let word = word.clone();
                    // 聚合名只在后面紧跟左括号时按聚合识别
                    if let Some(func) = AggFunc::from_name(&word.to_lowercase()) {
                        if matches!(self.peek_at(1), Some(Token::LParen)) {
                            self.position += 2;
                            let column = match self.next() {
                                Some(Token::Star) => "*".to_string(),
                                Some(Token::Word(column)) => column,
                                _ => {
                                    return Err(DbError::Parse(
                                        "expected column name in aggregate".to_string(),
                                    ))
                                }
                            };
                            self.expect_token(Token::RParen)?;
                            items.push(SelectItem::Aggregate { func, column });
                            continue;
                        }
                    }
                    self.next();
                    items.push(SelectItem::Column(word));
                }
                _ => return Err(DbError::Parse("expected select list".to_string())),
            }
        }
        if items.is_empty() {
            return Err(DbError::Parse("expected select list".to_string()));
        }

        self.expect_kw("from")?;
        let mut tables = Vec::new();
        while let Some(Token::Word(word)) = self.peek() {
            if self.kw_is("where") || self.kw_is("order") || self.kw_is("union") {
                break;
            }
            tables.push(word.clone());
            self.next();
        }
        if tables.is_empty() {
            return Err(DbError::Parse("expected table name after FROM".to_string()));
        }

        let filter = if self.eat_kw("where") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut order = Vec::new();
        if self.eat_kw("order") {
            self.expect_kw("by")?;
            loop {
                let column = match self.peek() {
                    Some(Token::Word(word)) if !self.kw_is("union") => word.clone(),
                    _ => break,
                };
                self.next();
                let mut key = OrderKey {
                    column,
                    numeric: false,
                    descending: false,
                };
                loop {
                    if self.eat_kw("num") {
                        key.numeric = true;
                    } else if self.eat_kw("asc") {
                        key.descending = false;
                    } else if self.eat_kw("desc") {
                        key.descending = true;
                    } else {
                        break;
                    }
                }
                order.push(key);
            }
            if order.is_empty() {
                return Err(DbError::Parse("expected column after ORDER BY".to_string()));
            }
        }

        let union = if self.eat_kw("union") {
            Some(Box::new(self.parse_select()?))
        } else {
            None
        };

        Ok(Select {
            distinct,
            items,
            tables,
            filter,
            order,
            union,
        })
    }

    fn parse_insert(&mut self) -> Result<Statement, DbError> {
        self.expect_kw("insert")?;
        self.expect_kw("into")?;
        let table = self.expect_name("table name")?;
        self.expect_kw("values")?;
        self.expect_token(Token::LParen)?;

        // 一个括号块里可以放多行的值, 由执行器按列数切组
        let mut values = Vec::new();
        loop {
            match self.next() {
                Some(Token::RParen) => break,
                Some(Token::Word(word)) => values.push(word),
                Some(Token::Quoted(quoted)) => values.push(strip_quotes(&quoted)),
                Some(token) => {
                    return Err(DbError::Parse(format!(
                        "unexpected token in VALUES: {:?}",
                        token
                    )))
                }
                None => return Err(DbError::Parse("unterminated VALUES list".to_string())),
            }
        }
        Ok(Statement::Insert { table, values })
    }

    fn parse_update(&mut self) -> Result<Statement, DbError> {
        self.expect_kw("update")?;
        let table = self.expect_name("table name")?;
        self.expect_kw("set")?;

        let mut assignments = Vec::new();
        while let Some(Token::Word(column)) = self.peek() {
            if self.kw_is("where") {
                break;
            }
            let column = column.clone();
            self.next();
            self.expect_token(Token::Eq)?;
            let value = match self.next() {
                Some(Token::Word(word)) => Operand::Word(word),
                Some(Token::Quoted(quoted)) => Operand::Literal(strip_quotes(&quoted)),
                _ => return Err(DbError::Parse("expected value after =".to_string())),
            };
            assignments.push((column, value));
        }
        if assignments.is_empty() {
            return Err(DbError::Parse("expected assignment after SET".to_string()));
        }

        let filter = if self.eat_kw("where") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Update {
            table,
            assignments,
            filter,
        })
    }

    fn parse_delete(&mut self) -> Result<Statement, DbError> {
        self.expect_kw("delete")?;
        self.expect_kw("from")?;
        let table = self.expect_name("table name")?;
        let filter = if self.eat_kw("where") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete { table, filter })
    }

    fn parse_create_table(&mut self) -> Result<Statement, DbError> {
        self.position += 2;
        let name = self.expect_name("table name")?;
        self.expect_token(Token::LParen)?;

        let mut columns = Vec::new();
        loop {
            match self.next() {
                Some(Token::RParen) => break,
                Some(Token::Word(column)) => {
                    if !is_bare_name(&column) {
                        return Err(DbError::Parse(format!("bad column name '{}'", column)));
                    }
                    let width = match self.next() {
                        Some(Token::Word(word)) => word.parse::<usize>().map_err(|_| {
                            DbError::Parse(format!("expected column width, got '{}'", word))
                        })?,
                        _ => return Err(DbError::Parse("expected column width".to_string())),
                    };
                    columns.push(Column {
                        name: column,
                        width,
                    });
                }
                _ => return Err(DbError::Parse("expected column definition".to_string())),
            }
        }
        if columns.is_empty() {
            return Err(DbError::Parse("expected at least one column".to_string()));
        }
        Ok(Statement::CreateTable { name, columns })
    }

    /// CREATE VIEW 名 ( t1.k = t2.k ... )
    fn parse_create_view(&mut self) -> Result<Statement, DbError> {
        self.position += 2;
        let name = self.expect_name("view name")?;
        self.expect_token(Token::LParen)?;

        let mut tables: Vec<String> = Vec::new();
        let mut joins = Vec::new();
        loop {
            if matches!(self.peek(), Some(Token::RParen)) {
                self.next();
                break;
            }
            let left_table = self.expect_name("table name")?;
            self.expect_token(Token::Dot)?;
            let left_column = self.expect_name("column name")?;
            self.expect_token(Token::Eq)?;
            let right_table = self.expect_name("table name")?;
            self.expect_token(Token::Dot)?;
            let right_column = self.expect_name("column name")?;

            if !tables.contains(&left_table) {
                tables.push(left_table.clone());
            }
            if !tables.contains(&right_table) {
                tables.push(right_table.clone());
            }
            joins.push(JoinPair {
                left_table,
                left_column,
                right_table,
                right_column,
            });
        }
        if joins.is_empty() {
            return Err(DbError::Parse(
                "expected at least one join condition".to_string(),
            ));
        }
        Ok(Statement::CreateView {
            name,
            spec: ViewSpec { tables, joins },
        })
    }

    // WHERE表达式, 优先级 NOT > AND > OR
    fn parse_expr(&mut self) -> Result<Expr, DbError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, DbError> {
        let mut left = self.parse_and()?;
        while self.eat_kw("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, DbError> {
        let mut left = self.parse_not()?;
        while self.eat_kw("and") {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, DbError> {
        if self.eat_kw("not") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, DbError> {
        // 括号分组; 括号里是SELECT时留给操作数解析
        if matches!(self.peek(), Some(Token::LParen)) && !self.kw_at_is(1, "select") {
            self.next();
            let expr = self.parse_or()?;
            self.expect_token(Token::RParen)?;
            return Ok(expr);
        }

        let left = self.parse_operand()?;

        if self.eat_kw("in") {
            let query = self.parse_subquery()?;
            return Ok(Expr::InSubquery {
                needle: left,
                negated: false,
                query,
            });
        }
        if self.kw_is("not") && self.kw_at_is(1, "in") {
            self.position += 2;
            let query = self.parse_subquery()?;
            return Ok(Expr::InSubquery {
                needle: left,
                negated: true,
                query,
            });
        }

        let op = match self.next() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Ge) => CmpOp::Ge,
            other => {
                return Err(DbError::Parse(format!(
                    "expected comparison operator, got {:?}",
                    other
                )))
            }
        };
        let right = self.parse_operand()?;
        Ok(Expr::Compare { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand, DbError> {
        // 标量子查询可以直接跟在操作符后面, 也可以带括号
        if self.kw_is("select") {
            let query = self.parse_select()?;
            return Ok(Operand::Subquery(Box::new(query)));
        }
        if matches!(self.peek(), Some(Token::LParen)) && self.kw_at_is(1, "select") {
            self.next();
            let query = self.parse_select()?;
            self.expect_token(Token::RParen)?;
            return Ok(Operand::Subquery(Box::new(query)));
        }
        match self.next() {
            Some(Token::Word(word)) => Ok(Operand::Word(word)),
            Some(Token::Quoted(quoted)) => Ok(Operand::Literal(strip_quotes(&quoted))),
            other => Err(DbError::Parse(format!(
                "expected value in expression, got {:?}",
                other
            ))),
        }
    }

    fn parse_subquery(&mut self) -> Result<Box<Select>, DbError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.next();
            let query = self.parse_select()?;
            self.expect_token(Token::RParen)?;
            Ok(Box::new(query))
        } else {
            Ok(Box::new(self.parse_select()?))
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn kw_is(&self, kw: &str) -> bool {
        self.peek().map_or(false, |t| t.is_kw(kw))
    }

    fn kw_at_is(&self, offset: usize, kw: &str) -> bool {
        self.peek_at(offset).map_or(false, |t| t.is_kw(kw))
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.kw_is(kw) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<(), DbError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(DbError::Parse(format!(
                "expected {}, got {:?}",
                kw.to_uppercase(),
                self.peek()
            )))
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<(), DbError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(DbError::Parse(format!(
                "expected {:?}, got {:?}",
                expected, other
            ))),
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<String, DbError> {
        match self.next() {
            Some(Token::Word(word)) if is_bare_name(&word) => Ok(word),
            other => Err(DbError::Parse(format!("expected {}, got {:?}", what, other))),
        }
    }
}

/// 表名/列名只允许字母数字和下划线
fn is_bare_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
