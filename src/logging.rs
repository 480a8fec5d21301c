// src/logging.rs
//
// Timestamped stderr logging with an optional mirror file. The mirror is
// named after a session label (a port or tool name) so logs from different
// boards on one host stay apart.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::io::GateError;

const LATEST_LINK: &str = "gatelink.log";

struct LogMirror {
    file: std::fs::File,
    label: String,
}

/// When `Some`, `tlog!` writes to both stderr and this file.
static LOG_MIRROR: Mutex<Option<LogMirror>> = Mutex::new(None);

/// Reduce a label such as `/dev/ttyUSB0` or `COM3` to a file-name-safe tag.
fn file_tag(label: &str) -> String {
    let tag: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect();
    let tag = tag.trim_matches('-');
    if tag.is_empty() {
        "gatelink".to_string()
    } else {
        tag.to_string()
    }
}

/// Start mirroring `tlog!` output into `<log_dir>/<timestamp>-<label>.log`.
/// On Unix `gatelink.log` is pointed at the newest file. Returns the path.
pub fn init_file_logging(log_dir: &Path, label: &str) -> Result<PathBuf, GateError> {
    std::fs::create_dir_all(log_dir)?;

    let tag = file_tag(label);
    let filename = format!("{}-{}.log", chrono::Local::now().format("%Y%m%d-%H%M%S"), tag);
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    #[cfg(unix)]
    {
        let symlink_path = log_dir.join(LATEST_LINK);
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!(
                "{} [logging] Failed to point {} at {}: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                LATEST_LINK,
                filename,
                e
            );
        }
    }

    if let Ok(mut guard) = LOG_MIRROR.lock() {
        *guard = Some(LogMirror { file, label: tag });
    }

    // tlog! would lock LOG_MIRROR again, print directly
    eprintln!(
        "{} [logging] Mirroring to {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        log_path.display()
    );

    Ok(log_path)
}

/// Stop file logging and close the log file.
pub fn stop_file_logging() {
    if let Ok(mut guard) = LOG_MIRROR.lock() {
        if let Some(mirror) = guard.take() {
            eprintln!(
                "{} [logging] Stopped mirroring {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                mirror.label
            );
        }
    }
}

/// Append one formatted `tlog!` line to the mirror file, if any.
pub(crate) fn mirror(line: &str) {
    if let Ok(mut guard) = LOG_MIRROR.lock() {
        if let Some(mirror) = guard.as_mut() {
            let _ = writeln!(mirror.file, "{}", line);
        }
    }
}

/// Timestamped logging macro.
/// Prepends `HH:MM:SS.mmm` local time to every message written to stderr.
/// Also writes to the log file when file logging is enabled.
macro_rules! tlog {
    ($($arg:tt)*) => {{
        let msg = format!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), format_args!($($arg)*));
        eprintln!("{}", msg);
        $crate::logging::mirror(&msg);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_tag() {
        assert_eq!(file_tag("/dev/ttyUSB0"), "dev-ttyUSB0");
        assert_eq!(file_tag("COM3"), "COM3");
        assert_eq!(file_tag("/dev/cu.usbserial-0001"), "dev-cu-usbserial-0001");
        assert_eq!(file_tag("//"), "gatelink");
    }

    #[test]
    fn test_file_logging_is_named_after_label() {
        let dir = std::env::temp_dir().join(format!("gatelink-log-{}", std::process::id()));
        let path = init_file_logging(&dir, "/dev/ttyUSB0").expect("init logging");
        tlog!("[test] hello {}", 42);
        stop_file_logging();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("-dev-ttyUSB0.log"), "{}", name);
        let contents = std::fs::read_to_string(&path).expect("read log");
        assert!(contents.contains("[test] hello 42"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
