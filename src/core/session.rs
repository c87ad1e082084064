use std::path::PathBuf;

/// 会话状态, 进程生命周期内有效
#[derive(Debug)]
pub struct Session {
    /// 数据库目录, 启动时选定后不再切换
    pub dir: PathBuf,
    /// 安静模式: 输出时不打印表头
    pub quiet: bool,
}

impl Session {
    pub fn new(dir: PathBuf, quiet: bool) -> Self {
        Session { dir, quiet }
    }
}
