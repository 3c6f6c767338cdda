use tracing_subscriber::{fmt, EnvFilter};

/// Default filter: pipeline at info, sqlx statement logging only on warnings
const DEFAULT_FILTER: &str = "info,sqlx=warn";

pub fn init_logger() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(env_filter)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_ansi(true)
        .init();
}
