use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for host applications that do not
/// bring their own.
///
/// `level` accepts any `EnvFilter` directive plus a few host-app aliases:
/// `"disabled"` installs nothing, `"warning"` and `"critical"` map to
/// `warn` and `error`. An unusable directive falls back to `RUST_LOG`,
/// then to `info`.
///
/// Returns whether a subscriber was installed. Safe to call repeatedly and
/// safe in hosts that already installed one; later calls are no-ops.
pub fn init_tracing(level: &str) -> bool {
    let level = level.trim().to_ascii_lowercase();
    if level == "disabled" {
        return false;
    }

    let directive = match level.as_str() {
        "warning" => "warn",
        "critical" => "error",
        other => other,
    };
    let filter = EnvFilter::try_new(directive)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
