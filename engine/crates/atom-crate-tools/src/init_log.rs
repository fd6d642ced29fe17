use std::io::Write;

/// 构造带颜色与时间戳的 logger
///
/// `RUST_LOG` 存在时，会覆盖 `level` 指定的默认过滤级别
fn build_logger(level: log::LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let level_style = match record.level() {
                log::Level::Info => buf
                    .default_level_style(log::Level::Info)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
                log::Level::Warn => buf
                    .default_level_style(log::Level::Warn)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
                log::Level::Error => buf
                    .default_level_style(log::Level::Error)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
                other => buf.default_level_style(other),
            };
            let grey_style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            let line = record.line().unwrap_or(!0);
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let time = chrono::Local::now().format("%Y/%m/%d %H:%M:%S%.3f");
            let level = record.level();
            let module = record.module_path().unwrap_or("");
            let thread = std::thread::current();
            let thread_name = thread.name().unwrap_or("worker");

            writeln!(
                buf,
                "{level_style}[{time}] {level} [{thread_name}]: {}{level_style:#}\n\t {grey_style}In {module} At {file}:{line}{grey_style:#}",
                record.args()
            )
        })
        .filter(None, level);

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder
}

/// 初始化全局 logger，默认 Info 级别
///
/// 只能调用一次，重复调用会 panic
pub fn init_log() {
    build_logger(log::LevelFilter::Info).init();
}

/// 以指定级别初始化 logger，已经初始化过时静默返回
///
/// 主要给测试使用：多个测试共享同一个进程
pub fn try_init_log(level: log::LevelFilter) {
    let _ = build_logger(level).is_test(true).try_init();
}
