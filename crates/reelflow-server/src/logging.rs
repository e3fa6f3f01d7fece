//! Logging (A3): structured logging via `log` + `logforth`, initialized
//! once at boot from [`LogSetting`](crate::settings::LogSetting).

use std::str::FromStr;

use log::{LevelFilter, info};

use crate::settings::{LogSetting, LogWriterKind};

pub fn init(setting: &LogSetting) {
    if !setting.enable {
        return;
    }

    let level = LevelFilter::from_str(&setting.level).unwrap_or(LevelFilter::Info);
    let mut builder = logforth::starter_log::builder();

    for writer in &setting.writers {
        builder = match writer {
            LogWriterKind::Stdout => dispatch_stdout(builder, level),
            LogWriterKind::File => dispatch_file(builder, level, &setting.dir),
        };
    }

    builder.apply();
    info!("logging initialized at level {level}");
}

fn dispatch_stdout(builder: logforth::starter_log::LogStarterBuilder, level: LevelFilter) -> logforth::starter_log::LogStarterBuilder {
    builder.dispatch(|d| d.filter(level).append(logforth::append::Stdout::default()))
}

fn dispatch_file(builder: logforth::starter_log::LogStarterBuilder, level: LevelFilter, dir: &str) -> logforth::starter_log::LogStarterBuilder {
    let _ = std::fs::create_dir_all(dir);
    match logforth::append::file::FileBuilder::new(dir, "reelflow-server.log").rollover_daily().build() {
        Ok(appender) => builder.dispatch(|d| d.filter(level).append(appender)),
        Err(_) => builder,
    }
}
