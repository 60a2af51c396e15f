use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `BSCTL_LOG=debug`.
const LOG_ENV: &str = "BSCTL_LOG";

/// Installs a stderr subscriber filtered by `BSCTL_LOG`, warn by default. Records
/// from the `log` facade are forwarded to it.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(filter_from(std::env::var(LOG_ENV).ok().as_deref()))
        .with_writer(std::io::stderr)
        .try_init()
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}
