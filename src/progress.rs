//! Progress bars that share stderr with log output
//!
//! Log lines are printed through the same [`MultiProgress`] that owns the
//! bars, so a running crawl bar stays pinned below the log.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

/// Bar counting scraped pages against the requested limit
pub fn crawl_progress_bar(page_limit: u32) -> ProgressBar {
    let bar = multi_progress().add(ProgressBar::new(u64::from(page_limit)));
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}")
    {
        bar.set_style(style);
    }
    bar
}

/// [`MakeWriter`] for the stderr log layer
#[derive(Debug, Default, Clone)]
pub struct LogWriterFactory;

/// Buffers one formatted event and prints it line by line
pub struct LogWriter {
    pending: Vec<u8>,
}

impl LogWriter {
    fn emit_complete_lines(&mut self) {
        while let Some(idx) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=idx).collect();
            print_line(&line[..line.len() - 1]);
        }
    }
}

fn print_line(bytes: &[u8]) {
    let line = String::from_utf8_lossy(bytes);
    let _ = multi_progress().println(line.trim_end_matches('\r'));
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.emit_complete_lines();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit_complete_lines();
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            print_line(&rest);
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            pending: Vec::new(),
        }
    }
}
