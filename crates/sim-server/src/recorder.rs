//! File-backed match artifacts: the audit log and the score board.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::error;

use sim_core::{AuditEvent, EventRecorder, SimNanos, TraderScore};
use sim_protocol::csv_codec;

/// Audit log writer. One CSV line per event, sequence assigned here so the
/// file is gap-free even if an event fails to serialize upstream.
pub struct FileEventRecorder {
    writer: BufWriter<File>,
    next_seq: u64,
}

impl FileEventRecorder {
    pub fn create(path: &str) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(FileEventRecorder {
            writer: BufWriter::new(file),
            next_seq: 1,
        })
    }
}

impl EventRecorder for FileEventRecorder {
    fn record(&mut self, timestamp: SimNanos, event: &AuditEvent) {
        let line = csv_codec::format_audit_line(self.next_seq, timestamp, event);
        self.next_seq += 1;
        if let Err(err) = writeln!(self.writer, "{line}") {
            error!(%err, "audit log write failed");
        }
    }
}

impl Drop for FileEventRecorder {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            error!(%err, "audit log flush failed");
        }
    }
}

/// Write the final score board, best rank first.
pub fn write_score_board(path: &Path, rows: &[TraderScore]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{}", csv_codec::score_board_header())?;
    for row in rows {
        writeln!(writer, "{}", csv_codec::format_score_line(row))?;
    }
    writer.flush()
}
