use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Returns false if a global subscriber was already set, in which case
/// nothing changes.
pub fn init(level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .try_init()
        .is_ok()
}

// ============= Python Bindings =============

#[cfg(feature = "python")]
#[pyo3::pyfunction]
#[pyo3(name = "init_logging", signature = (level="info"))]
pub fn py_init_logging(level: &str) -> bool {
    init(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        init("debug");
        assert!(!init("info"));
    }
}
