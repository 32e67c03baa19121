//! Process-level setup shared by the CLI and embedders.

/// Initialize logging with tracing_subscriber.
///
/// Honours `RUST_LOG`; otherwise logs engine internals at debug and keeps the
/// HTTP stack quiet. Safe to call more than once.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,crawlscope=debug,hyper=warn,reqwest=warn")
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_target(false)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .try_init();
}
