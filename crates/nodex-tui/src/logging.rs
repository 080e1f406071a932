use anyhow::{anyhow, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE: &str = "nodex.log";

/// Filter used when `RUST_LOG` is unset. The shell's events are targeted at
/// the binary's crate name (`nodex`), not the package name.
fn default_filter() -> String {
    format!("nodex_core=info,{}=info", env!("CARGO_CRATE_NAME"))
}

/// Send tracing output to `<dir>/nodex.log`. stderr is the terminal UI, so
/// nothing may be written there while the app runs.
///
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_covers_shell_targets() {
        let crate_target = module_path!().split("::").next().unwrap();
        let directives: Vec<String> = default_filter().split(',').map(String::from).collect();
        assert!(directives.contains(&format!("{}=info", crate_target)));
        assert!(directives.contains(&"nodex_core=info".to_string()));
    }

    #[test]
    fn test_init_writes_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let guard = init(dir.path()).unwrap();
        tracing::info!("log file check");
        drop(guard);

        let contents = fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert!(contents.contains("log file check"));
    }
}
