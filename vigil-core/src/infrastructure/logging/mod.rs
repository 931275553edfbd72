//! Logging infrastructure using `log` + `log4rs`.
//!
//! Whitelist filtering: the root level defaults to OFF so external crates
//! stay quiet, the vigil crates log at the requested app level, and
//! individual crates (or `root=<level>`) can be opted in via the filter
//! expression, e.g. `"info"`, `"vigil_core=debug"`, `"root=warn"`.

use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            policy::compound::{roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy},
            RollingFileAppender,
        },
    },
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
    Config,
};
use std::path::PathBuf;

const CONSOLE_APPENDER: &str = "stderr";
const LOG_FILE_APPENDER: &str = "log_file";
const LOG_FILE_NAME: &str = "vigil.log";
const LOG_FILE_MAX_SIZE: u64 = 64 * 1024 * 1024;
const LOG_FILE_MAX_ROLLS: u32 = 8;
const LOG_LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t}: {m}{n}";

const WHITELISTED_CRATES: &[&str] = &["vigil_core", "vigil_service"];

/// Initialize the global logger. Repeated calls are ignored. Console output
/// goes to stderr; a rolling file is added when `log_dir` is set.
pub fn init_logger(log_dir: Option<&str>, filters: &str) {
    let app_level = parse_app_level(filters);
    let root_level = parse_root_override(filters).unwrap_or(LevelFilter::Off);
    let module_levels = parse_module_levels(filters);

    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN)))
        .build();

    let mut config_builder = Config::builder().appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(console)));
    let mut root_appenders: Vec<String> = vec![CONSOLE_APPENDER.to_string()];

    if let Some(dir) = log_dir.filter(|s| !s.trim().is_empty()) {
        let dir = dir.trim();
        let log_path = PathBuf::from(dir).join(LOG_FILE_NAME);
        let archive_pattern = PathBuf::from(dir).join(format!("{LOG_FILE_NAME}.{{}}.gz"));

        let roller = FixedWindowRoller::builder()
            .base(1)
            .build(archive_pattern.to_str().unwrap_or("vigil.log.{}.gz"), LOG_FILE_MAX_ROLLS);
        if let Ok(roller) = roller {
            let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(LOG_FILE_MAX_SIZE)), Box::new(roller));
            if let Ok(file_appender) =
                RollingFileAppender::builder().encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN))).build(log_path, Box::new(policy))
            {
                config_builder = config_builder.appender(Appender::builder().build(LOG_FILE_APPENDER, Box::new(file_appender)));
                root_appenders.push(LOG_FILE_APPENDER.to_string());
            }
        }
    }

    for crate_name in WHITELISTED_CRATES {
        if !module_levels.iter().any(|(module, _)| module == crate_name) {
            config_builder = config_builder
                .logger(Logger::builder().appenders(root_appenders.clone()).additive(false).build(*crate_name, app_level));
        }
    }

    for (module, level) in module_levels {
        config_builder =
            config_builder.logger(Logger::builder().appenders(root_appenders.clone()).additive(false).build(module, level));
    }

    let config = config_builder.build(Root::builder().appenders(root_appenders).build(root_level));
    if let Ok(config) = config {
        let _ = log4rs::init_config(config);
    }
}

fn parse_level(raw: &str) -> Option<LevelFilter> {
    match raw.trim().to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

fn parse_app_level(filters: &str) -> LevelFilter {
    filters
        .split(',')
        .filter(|part| !part.contains('='))
        .find_map(parse_level)
        .unwrap_or(LevelFilter::Info)
}

fn parse_root_override(filters: &str) -> Option<LevelFilter> {
    parse_module_pairs(filters).into_iter().find(|(module, _)| module == "root").map(|(_, level)| level)
}

fn parse_module_levels(filters: &str) -> Vec<(String, LevelFilter)> {
    parse_module_pairs(filters).into_iter().filter(|(module, _)| module != "root").collect()
}

fn parse_module_pairs(filters: &str) -> Vec<(String, LevelFilter)> {
    filters
        .split(',')
        .filter_map(|part| {
            let (module, level) = part.split_once('=')?;
            Some((module.trim().to_string(), parse_level(level)?))
        })
        .collect()
}
