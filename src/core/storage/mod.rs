use std::cell::Cell;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

use crate::core::error::DbError;
use crate::core::schema::{Column, TableSchema, ViewSpec};

/// 数据库目录上的文件存储
///
/// 一张表对应两个文件: 模式文件 `<表名>@` 和数据文件 `<表名>~`,
/// 视图定义保存在 `<视图名>!`。所有文件都直接放在数据库目录下。
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: PathBuf) -> Self {
        Storage { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn schema_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}@", table))
    }

    fn data_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}~", table))
    }

    fn view_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}!", name))
    }

    /// 两个文件都在表才算存在
    pub fn table_exists(&self, table: &str) -> bool {
        self.schema_path(table).exists() && self.data_path(table).exists()
    }

    /// 读写数据前确认表的两个文件都在, 只剩一个视为损坏状态并拒绝操作
    fn check_table(&self, table: &str) -> Result<(), DbError> {
        let has_schema = self.schema_path(table).exists();
        let has_data = self.data_path(table).exists();
        if has_schema && has_data {
            Ok(())
        } else if has_schema || has_data {
            Err(DbError::NotFound(format!(
                "table '{}' (incomplete table files)",
                table
            )))
        } else {
            Err(DbError::NotFound(format!("table '{}'", table)))
        }
    }

    /// 建表: 先写模式文件, 再建空数据文件
    pub fn create_table(&self, table: &str, columns: &[Column]) -> Result<(), DbError> {
        if self.schema_path(table).exists() || self.data_path(table).exists() {
            return Err(DbError::AlreadyExists(format!("table '{}'", table)));
        }
        let schema = TableSchema::new(table, columns.to_vec());
        fs::write(self.schema_path(table), schema.to_file_text())?;
        File::create(self.data_path(table))?;
        debug!(table, "created table files");
        Ok(())
    }

    /// 删表: 两个文件一起移除
    pub fn drop_table(&self, table: &str) -> Result<(), DbError> {
        self.check_table(table)?;
        fs::remove_file(self.schema_path(table))?;
        fs::remove_file(self.data_path(table))?;
        debug!(table, "dropped table files");
        Ok(())
    }

    pub fn load_schema(&self, table: &str) -> Result<TableSchema, DbError> {
        self.check_table(table)?;
        let text = fs::read_to_string(self.schema_path(table))?;
        TableSchema::parse(table, &text)
    }

    /// 按磁盘顺序读出全部记录, 每行按TAB切分
    pub fn read_rows(&self, table: &str) -> Result<Vec<Vec<String>>, DbError> {
        self.check_table(table)?;
        let text = fs::read_to_string(self.data_path(table))?;
        Ok(split_records(&text))
    }

    pub fn append_rows(&self, table: &str, rows: &[Vec<String>]) -> Result<(), DbError> {
        self.check_table(table)?;
        let mut file = OpenOptions::new().append(true).open(self.data_path(table))?;
        for row in rows {
            writeln!(file, "{}", row.join("\t"))?;
        }
        Ok(())
    }

    /// 整文件重写: 先写到同目录的临时文件, 再原子地改名覆盖数据文件
    /// 写入中途出错时原数据文件保持原样
    pub fn rewrite_rows(&self, table: &str, rows: &[Vec<String>]) -> Result<(), DbError> {
        self.check_table(table)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        for row in rows {
            writeln!(tmp, "{}", row.join("\t"))?;
        }
        tmp.persist(self.data_path(table))
            .map_err(|e| DbError::Io(e.error))?;
        debug!(table, rows = rows.len(), "rewrote data file");
        Ok(())
    }

    pub fn view_exists(&self, name: &str) -> bool {
        self.view_path(name).exists()
    }

    pub fn save_view(&self, name: &str, spec: &ViewSpec) -> Result<(), DbError> {
        if self.view_exists(name) {
            return Err(DbError::AlreadyExists(format!("view '{}'", name)));
        }
        let json = serde_json::to_string_pretty(spec)
            .map_err(|e| DbError::Parse(format!("view definition: {}", e)))?;
        fs::write(self.view_path(name), json)?;
        Ok(())
    }

    pub fn load_view(&self, name: &str) -> Result<ViewSpec, DbError> {
        let text = fs::read_to_string(self.view_path(name))
            .map_err(|_| DbError::NotFound(format!("view '{}'", name)))?;
        serde_json::from_str(&text).map_err(|e| DbError::Parse(format!("view definition: {}", e)))
    }

    pub fn drop_view(&self, name: &str) -> Result<(), DbError> {
        if !self.view_exists(name) {
            return Err(DbError::NotFound(format!("view '{}'", name)));
        }
        fs::remove_file(self.view_path(name))?;
        Ok(())
    }
}

fn split_records(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

/// 单条语句的临时工作区
///
/// 排序/归并/连接的中间关系都写在独立的临时目录下,
/// 语句结束(含出错路径)时随Drop整体删除。
pub struct ScratchSpace {
    dir: TempDir,
    counter: Cell<usize>,
}

impl ScratchSpace {
    pub fn create() -> Result<Self, DbError> {
        let dir = tempfile::tempdir()?;
        debug!(path = %dir.path().display(), "opened scratch space");
        Ok(ScratchSpace {
            dir,
            counter: Cell::new(0),
        })
    }

    /// 把一个中间关系写成临时文件, 返回其路径
    pub fn write_relation(&self, rows: &[Vec<String>]) -> Result<PathBuf, DbError> {
        let n = self.counter.get();
        self.counter.set(n + 1);
        let path = self.dir.path().join(format!("r{}", n));
        let mut file = File::create(&path)?;
        for row in rows {
            writeln!(file, "{}", row.join("\t"))?;
        }
        Ok(path)
    }

    pub fn read_relation(&self, path: &Path) -> Result<Vec<Vec<String>>, DbError> {
        let text = fs::read_to_string(path)?;
        Ok(split_records(&text))
    }
}
