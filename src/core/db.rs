use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::DbError;
use crate::core::schema::Column;
use crate::core::session::Session;
use crate::core::sql::{Executor, Lexer, Parser, Statement};
use crate::core::storage::{ScratchSpace, Storage};

/// 数据库根目录环境变量: 目录参数是相对路径且当前目录下不存在时,
/// 在该根目录下再找一次
pub const ROOT_ENV: &str = "FLATDB_ROOT";

/// 一条语句的执行结果, 呈现方式由外层界面决定
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutput {
    /// 查询产出的列和行
    Rows {
        columns: Vec<Column>,
        rows: Vec<Vec<String>>,
    },
    /// 变更语句涉及的行数
    Affected(usize),
    /// 没有输出的语句
    Done,
}

/// 数据库门面: 持有会话状态和目录存储, 逐条执行语句
pub struct Database {
    session: Session,
    storage: Storage,
}

impl Database {
    /// 打开数据库目录, 目录必须已存在
    pub fn open(dir: &str, quiet: bool) -> Result<Self, DbError> {
        let path = resolve_dir(dir);
        if !path.is_dir() {
            return Err(DbError::Config(format!(
                "database directory '{}' does not exist",
                dir
            )));
        }
        Ok(Database {
            session: Session::new(path.clone(), quiet),
            storage: Storage::new(path),
        })
    }

    pub fn quiet(&self) -> bool {
        self.session.quiet
    }

    /// 执行一条完整的语句文本
    ///
    /// 出错只丢弃这条语句, 会话继续; 临时工作区在所有退出路径上随Drop清除
    pub fn execute(&mut self, text: &str) -> Result<StatementOutput, DbError> {
        let tokens = Lexer::new().tokenize(text)?;
        if tokens.is_empty() {
            return Ok(StatementOutput::Done);
        }
        let statement = Parser::new().parse(tokens)?;
        debug!(?statement, "dispatching statement");

        let scratch = ScratchSpace::create()?;
        let executor = Executor::new(&self.storage, &scratch);
        match statement {
            Statement::Select(select) => {
                let (columns, rows) = executor.select(&select)?;
                Ok(StatementOutput::Rows { columns, rows })
            }
            Statement::Insert { table, values } => {
                Ok(StatementOutput::Affected(executor.insert(&table, &values)?))
            }
            Statement::Update {
                table,
                assignments,
                filter,
            } => Ok(StatementOutput::Affected(executor.update(
                &table,
                &assignments,
                &filter,
            )?)),
            Statement::Delete { table, filter } => {
                Ok(StatementOutput::Affected(executor.delete(&table, &filter)?))
            }
            Statement::CreateTable { name, columns } => {
                self.storage.create_table(&name, &columns)?;
                Ok(StatementOutput::Done)
            }
            Statement::DropTable { name } => {
                self.storage.drop_table(&name)?;
                Ok(StatementOutput::Done)
            }
            Statement::CreateView { name, spec } => {
                executor.create_view(&name, &spec)?;
                Ok(StatementOutput::Done)
            }
            Statement::DropView { name } => {
                self.storage.drop_view(&name)?;
                Ok(StatementOutput::Done)
            }
        }
    }
}

fn resolve_dir(arg: &str) -> PathBuf {
    let path = PathBuf::from(arg);
    if path.is_relative() && !path.is_dir() {
        if let Ok(root) = env::var(ROOT_ENV) {
            let alt = Path::new(&root).join(&path);
            if alt.is_dir() {
                return alt;
            }
        }
    }
    path
}
