//! Global `tracing` subscriber setup.

use parley_settings::LoggingSettings;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Initialize the global tracing subscriber writing to stderr.
///
/// `RUST_LOG` wins over the configured level. Subsequent calls are no-ops.
pub fn init_subscriber(settings: &LoggingSettings) {
    let filter = build_filter(&settings.level);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a subscriber is already set
    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

/// Run `f` with a temporary stderr subscriber at `warn`.
///
/// Covers settings loading, which happens before the configured level is
/// known and must not swallow rejected `PARLEY_*` values.
pub fn with_startup_logging<T>(f: impl FnOnce() -> T) -> T {
    let subscriber = startup_subscriber(build_filter("warn"), std::io::stderr);
    tracing::subscriber::with_default(subscriber, f)
}

fn startup_subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer)
        .compact()
        .finish()
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn invalid_level_falls_back() {
        let filter = build_filter("not[a=filter");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn init_twice_is_harmless() {
        let settings = LoggingSettings::default();
        init_subscriber(&settings);
        init_subscriber(&LoggingSettings {
            json: true,
            ..settings
        });
    }

    #[test]
    fn rejected_env_value_is_logged_during_startup() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = startup_subscriber(EnvFilter::new("warn"), move || writer.clone());

        let mut settings = parley_settings::ParleySettings::default();
        tracing::subscriber::with_default(subscriber, || {
            parley_settings::loader::apply_overrides(&mut settings, |name| {
                (name == "PARLEY_PORT").then(|| "99999".to_string())
            });
        });

        assert_eq!(settings.server.port, 3000);
        let out = captured.text();
        assert!(out.contains("PARLEY_PORT"), "missing key in: {out}");
        assert!(out.contains("99999"));
    }

    #[test]
    fn startup_logging_returns_closure_value() {
        assert_eq!(with_startup_logging(|| 7), 7);
    }
}
