use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

pub const LOG_FILE: &str = "linkerx.log";

/// Writes every log line to stdout and, when one could be opened, to the
/// run log file.
#[derive(Clone)]
pub(crate) struct TeeMakeWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl TeeMakeWriter {
    pub fn open(run_dir: &Path) -> Self {
        let file = std::fs::create_dir_all(run_dir)
            .and_then(|_| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(run_dir.join(LOG_FILE))
            })
            .map_err(|e| eprintln!("Log file unavailable, logging to stdout only: {}", e))
            .ok();
        Self {
            file: file.map(|f| Arc::new(Mutex::new(f))),
        }
    }
}

impl<'a> MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            file: self.file.clone(),
        }
    }
}

pub(crate) struct TeeWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(file) = &self.file
            && let Ok(mut f) = file.lock()
        {
            let _ = f.write_all(buf);
        }
        std::io::stdout().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(file) = &self.file
            && let Ok(mut f) = file.lock()
        {
            let _ = f.flush();
        }
        std::io::stdout().flush()
    }
}

/// Install the global subscriber. `level` is a tracing level name; unknown
/// names fall back to `info`.
pub(crate) fn init(run_dir: &Path, level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(TeeMakeWriter::open(run_dir))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
