use std::io::Write;

/// 覆盖默认日志级别的环境变量，语法与 `RUST_LOG` 相同
pub const LOG_ENV: &str = "EMBER_LOG";

fn build_logger(filter: log::LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let level_style = match record.level() {
                log::Level::Error => anstyle::Style::new().fg_color(Some(anstyle::AnsiColor::Red.into())).bold(),
                log::Level::Warn => anstyle::Style::new().fg_color(Some(anstyle::AnsiColor::Yellow.into())),
                log::Level::Info => anstyle::Style::new().fg_color(Some(anstyle::AnsiColor::Green.into())),
                _ => buf.default_level_style(record.level()),
            };
            let grey_style =
                anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let target = record.target();
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "{level_style}[{time}] {:<5}{level_style:#} {} {grey_style}({target}:{line}){grey_style:#}",
                record.level(),
                record.args()
            )
        })
        .filter(None, filter);

    if let Ok(filters) = std::env::var(LOG_ENV) {
        builder.parse_filters(&filters);
    }
    builder
}

/// 初始化全局 logger，默认 Info 级别
///
/// 只能调用一次，重复调用会 panic
pub fn init_log() {
    init_log_with_filter(log::LevelFilter::Info);
}

/// 以指定的默认级别初始化全局 logger
pub fn init_log_with_filter(filter: log::LevelFilter) {
    build_logger(filter).init();
}

/// 测试使用的 logger
///
/// 输出交给 libtest 捕获，可以在每个测试中重复调用
pub fn init_test_log() {
    let _ = build_logger(log::LevelFilter::Debug).is_test(true).try_init();
}
