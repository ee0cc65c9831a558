//! Logging init: file under the XDG state dir, or stderr.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,muxd_core=debug,muxd_server=debug";

/// Log sink: the opened file, or stderr when the file handle cannot be
/// duplicated.
enum LogSink {
    File(fs::File),
    Stderr,
}

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::File(f) => f.write(buf),
            LogSink::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::File(f) => f.flush(),
            LogSink::Stderr => io::stderr().lock().flush(),
        }
    }
}

struct FileWriter(fs::File);

impl<'a> MakeWriter<'a> for FileWriter {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.0.try_clone().map(LogSink::File).unwrap_or(LogSink::Stderr)
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize logging to `$XDG_STATE_HOME/muxd/muxd.log`, returning the log
/// path. On failure nothing is installed; fall back to
/// [`init_stderr_logging`].
pub fn init_file_logging() -> Result<PathBuf> {
    let state_dir = xdg::BaseDirectories::with_prefix("muxd")?.get_state_home();
    fs::create_dir_all(&state_dir)?;
    let path = state_dir.join("muxd.log");
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(BoxMakeWriter::new(FileWriter(file)))
        .with_ansi(false)
        .init();

    tracing::info!("logging to {}", path.display());
    Ok(path)
}

/// Initialize logging to stderr only.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}
