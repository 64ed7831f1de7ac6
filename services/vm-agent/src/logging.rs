//! Logging initialization for the host agent.
//!
//! Logs go to stderr. When a serial console is configured, a compact copy
//! of every line is also written there so early boot problems are visible
//! from outside the guest.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{Config, LogFormat};

/// Upper bound on bytes written to the serial console per process.
const SERIAL_MAX_BYTES: usize = 8 * 1024 * 1024;

/// Serial console writer with a size cap.
///
/// Write errors are swallowed: a wedged console must never stall logging.
/// Output past `max_bytes` is dropped.
struct SerialWriter {
    port: File,
    bytes_written: usize,
    max_bytes: usize,
}

impl SerialWriter {
    fn open(path: &Path, max_bytes: usize) -> io::Result<Self> {
        let port = OpenOptions::new().write(true).append(true).open(path)?;
        Ok(Self {
            port,
            bytes_written: 0,
            max_bytes,
        })
    }
}

impl Write for SerialWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.bytes_written >= self.max_bytes {
            return Ok(buf.len());
        }

        let remaining = self.max_bytes - self.bytes_written;
        let to_write = buf.len().min(remaining);
        if self.port.write_all(&buf[..to_write]).is_ok() {
            self.bytes_written += to_write;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.port.flush();
        Ok(())
    }
}

/// Thread-safe writer wrapper.
struct SharedWriter(Mutex<SerialWriter>);

impl Write for &SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for &'static SharedWriter {
    type Writer = &'static SharedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        *self
    }
}

fn filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Initialize logging. Fails if the configured serial console cannot be opened.
pub fn init(config: &Config) -> anyhow::Result<()> {
    let serial_layer = match &config.serial_port {
        Some(path) => {
            let writer = SerialWriter::open(path, SERIAL_MAX_BYTES)
                .with_context(|| format!("failed to open serial console {}", path.display()))?;

            // Leak to get 'static lifetime (the agent logs for the lifetime of the process)
            let shared: &'static SharedWriter =
                Box::leak(Box::new(SharedWriter(Mutex::new(writer))));

            Some(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(false)
                    .with_writer(shared)
                    .with_filter(filter(config)),
            )
        }
        None => None,
    };

    let stderr_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_filter(filter(config))
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_filter(filter(config))
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(serial_layer)
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(())
}
