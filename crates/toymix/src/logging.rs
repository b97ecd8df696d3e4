//! Console and run-log output
//!
//! Every log record goes to stderr and to a run log inside the destination
//! folder. The run log is recreated on every run.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Writer duplicating output to stderr and a file
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Start a fresh run log at `path`, replacing any previous one
pub fn renew_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to remove old log {:?}", path)),
    }
    File::create(path).with_context(|| format!("Failed to create log file {:?}", path))
}

/// Install the global logger. `RUST_LOG` overrides the default `info` level.
pub fn init(log_path: &Path) -> Result<()> {
    let file = renew_log_file(log_path)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(buf, "{} {} {}", buf.timestamp_seconds(), record.level(), record.args())
        })
        .target(env_logger::Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .context("Logger already initialised")?;

    log::info!("Logging to {:?}", log_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renew_replaces_previous_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("log.txt");
        {
            let mut file = renew_log_file(&path).unwrap();
            writeln!(file, "first run").unwrap();
        }
        assert!(std::fs::read_to_string(&path).unwrap().contains("first run"));

        renew_log_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_tee_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let mut tee = Tee {
            file: renew_log_file(&path).unwrap(),
        };
        tee.write_all(b"Processed 3 files.\n").unwrap();
        tee.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Processed 3 files.\n");
    }
}
