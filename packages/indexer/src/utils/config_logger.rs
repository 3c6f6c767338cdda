use tracing::info;

pub fn log_config(config: &crate::config::Config) {
    info!(
        "Config settings: rpc_url={}, rpc_timeout={}ms, batch_size={}, sync_interval={}ms",
        config.rpc_url, config.rpc_timeout, config.batch_size, config.sync_interval
    );
    info!("Database: {}", redact_url(&config.database_url));

    match config.start_height {
        Some(height) => info!("Configured start height: {}", height),
        None => info!("No start height configured, falling back to genesis height"),
    }
}

/// Strip the credentials from a connection URL
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
