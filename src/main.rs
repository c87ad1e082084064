use clap::Parser;
use flatdb::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    // 启动失败(目录缺失等)返回非零退出码, 语句级错误在循环内处理
    if let Err(e) = cli.run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
