use time::{format_description::well_known::Iso8601, UtcOffset};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{self, time::OffsetTime},
    layer::SubscriberExt,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

struct Guard {}

impl Drop for Guard {
    fn drop(&mut self) {}
}

fn env_filter(default_directives: Option<&str>) -> Result<EnvFilter, BoxError> {
    match (std::env::var("RUST_LOG"), default_directives) {
        (Ok(var), _) => Ok(EnvFilter::try_new(var)?),
        (Err(_), Some(directives)) => Ok(EnvFilter::try_new(directives)?),
        (Err(_), None) => Ok(EnvFilter::from_default_env()),
    }
}

/// Start logging to file and console, both optional.
///
/// Filtered by `RUST_LOG` or, if that is unset, by `default_directives`
/// (e.g. `"frame_timeline=info,warn"`).
///
/// Console output goes to stderr so that it does not interleave with
/// program output written to stdout.
pub fn initiate_logging<P: AsRef<std::path::Path>>(
    path: Option<P>,
    default_directives: Option<&str>,
    disable_console: bool,
) -> Result<impl Drop, BoxError> {
    // Create a fixed offset time formatter based on the timezone at the
    // time this line of code runs.
    let timer = OffsetTime::new(
        UtcOffset::from_whole_seconds(chrono::Local::now().offset().local_minus_utc())?,
        Iso8601::DEFAULT,
    );

    let file_layer = if let Some(path) = &path {
        let file = std::fs::File::create(path)?;
        let file_writer = std::sync::Mutex::new(file);
        Some(
            fmt::layer()
                .with_timer(timer.clone())
                .with_writer(file_writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
    } else {
        None
    };

    let console_layer = if disable_console {
        None
    } else {
        let with_ansi = !cfg!(windows);
        Some(
            fmt::layer()
                .with_timer(timer)
                .with_writer(std::io::stderr)
                .with_ansi(with_ansi)
                .with_file(true)
                .with_line_number(true),
        )
    };

    let collector = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(env_filter(default_directives)?);
    tracing::subscriber::set_global_default(collector)?;

    let log_var = match (std::env::var("RUST_LOG"), default_directives) {
        (Ok(var), _) => format!(" with RUST_LOG=\"{var}\"."),
        (Err(_), Some(directives)) => format!(" with default filter \"{directives}\"."),
        (Err(_), None) => ".".to_string(),
    };

    if let Some(path) = &path {
        tracing::debug!(
            "Logging initiated to file \"{}\"{log_var}",
            path.as_ref().display(),
        );
    }

    if !disable_console {
        tracing::debug!("Logging initiated to console{log_var}",);
    }

    Ok(Guard {})
}
