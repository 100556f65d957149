/// Telemetry Module - Structured Logging with Tracing
///
/// - Structured logging with tracing
/// - JSON vs pretty format support
/// - Optional file logging with rotation
/// - RUST_LOG env var support
/// - Truncation helpers for txids and scripts

use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Truncation length for txids and block hashes in log fields
pub const HASH_LOG_LEN: usize = 16;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub log_level: String,
    /// Log format: "json" or "pretty"
    pub log_format: String,
    /// Optional log file path (None = stderr only)
    pub log_file: Option<String>,
    /// Rotation interval: "daily", "hourly", "never"
    pub rotation: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: std::env::var("RUSTYLEDGER_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            log_file: std::env::var("RUSTYLEDGER_LOG_FILE").ok(),
            rotation: "daily".to_string(),
        }
    }
}

/// Initialize tracing subscriber
///
/// Console output goes to stderr so query results on stdout stay clean JSON.
pub fn init_tracing(config: TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (writer, ansi) = log_writer(&config)?;
    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.log_format == "json" {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

/// Log destination: stderr, or a rolling file without ANSI colors
fn log_writer(config: &TelemetryConfig) -> Result<(BoxMakeWriter, bool), Box<dyn std::error::Error>> {
    let Some(log_file_path) = &config.log_file else {
        return Ok((BoxMakeWriter::new(std::io::stderr), true));
    };

    let path = std::path::Path::new(log_file_path);
    let directory = path.parent()
        .ok_or("Invalid log file path: no parent directory")?;
    let file_name = path.file_name()
        .ok_or("Invalid log file path: no filename")?;
    let filename_prefix = path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or("Invalid log file path: no filename")?;

    let file_appender = match config.rotation.as_str() {
        "hourly" => rolling::hourly(directory, filename_prefix),
        "never" => rolling::never(directory, file_name),
        _ => rolling::daily(directory, filename_prefix),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Keep guard alive for the process lifetime so buffered logs flush
    std::mem::forget(guard);
    Ok((BoxMakeWriter::new(non_blocking), false))
}

/// Truncate hex string for logging
///
/// Example: "0a1b2c3d4e5f67890a1b2c3d4e5f6789" → "0a1b2c3d4e5f6789..."
pub fn truncate_hex(hex: &str, len: usize) -> String {
    if hex.len() <= len {
        hex.to_string()
    } else {
        format!("{}...", &hex[..len])
    }
}

/// Truncate list for logging
///
/// Example: ["a", "b", "c", "d", "e", "f"] (max 3) → "[3 of 6]: [a, b, c]"
pub fn truncate_list<T: std::fmt::Display>(items: &[T], max: usize) -> String {
    let preview: Vec<String> = items.iter().take(max).map(|i| i.to_string()).collect();
    if items.len() <= max {
        format!("[{}]", preview.join(", "))
    } else {
        format!("[{} of {}]: [{}]", max, items.len(), preview.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_hex() {
        assert_eq!(truncate_hex("abcd", 16), "abcd");
        assert_eq!(truncate_hex(&"f".repeat(64), HASH_LOG_LEN), format!("{}...", "f".repeat(16)));
    }

    #[test]
    fn test_log_writer_destinations() {
        let stderr = TelemetryConfig { log_file: None, ..TelemetryConfig::default() };
        assert!(log_writer(&stderr).unwrap().1);

        let dir = tempfile::tempdir().unwrap();
        let file = TelemetryConfig {
            log_file: Some(dir.path().join("engine.log").to_string_lossy().into_owned()),
            rotation: "never".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(!log_writer(&file).unwrap().1);

        let bad = TelemetryConfig { log_file: Some("/".to_string()), ..TelemetryConfig::default() };
        assert!(log_writer(&bad).is_err());
    }

    #[test]
    fn test_truncate_list() {
        assert_eq!(truncate_list(&["a", "b"], 3), "[a, b]");
        assert_eq!(truncate_list(&["a", "b", "c", "d", "e", "f"], 3), "[3 of 6]: [a, b, c]");
    }
}
