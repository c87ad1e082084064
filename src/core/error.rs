use std::io;
use thiserror::Error;

/// 引擎的错误类型, 每种错误以单行信息报告给用户并丢弃当前语句
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Syntax error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Arity(String),

    #[error("{0}")]
    JoinOrder(String),

    #[error("Subquery error: {0}")]
    Subquery(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),
}
