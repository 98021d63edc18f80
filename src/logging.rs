use std::io;
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const STDOUT_FILTER: &str = "warn,enricher=info,pipeline=info,llm_request=warn,web_request=warn,result_cache=warn";
const FILE_FILTER: &str = "info,pipeline=debug,llm_request=debug,web_request=debug,result_cache=debug";

pub fn configure_logging() {
    // RUST_LOG wins over the built-in stdout filter when present.
    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(STDOUT_FILTER));

    // Stdout log configuration; the progress bar draws on stderr.
    let stdout_log = fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_filter(stdout_filter);

    // File log configuration
    let file_appender = rolling::daily("logs", "enricher.log");
    let file_log = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_filter(EnvFilter::new(FILE_FILTER));

    tracing_subscriber::Registry::default()
        .with(stdout_log)
        .with(file_log)
        .init();
}
