//! JSON Lines history writer.
//!
//! One file per UTC day (`history_YYYY-MM-DD.jsonl`), opened in append mode.
//! Each line is a complete `HistoryEvent`, so an interrupted write only loses
//! the last line.

use crate::error::LedgerResult;
use crate::event::HistoryEvent;
use chrono::{TimeZone, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "history_";
const FILE_SUFFIX: &str = ".jsonl";

/// Active writer state for one daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Appends history events to daily JSON Lines files.
pub struct HistoryWriter {
    base_dir: PathBuf,
    buffer: Vec<HistoryEvent>,
    max_buffer_size: usize,
    active_writer: Option<ActiveWriter>,
}

impl HistoryWriter {
    /// Create a writer under `base_dir`, creating the directory if needed.
    /// `max_buffer_size` of 1 writes every event through immediately.
    pub fn new(base_dir: impl AsRef<Path>, max_buffer_size: usize) -> LedgerResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;

        let max_buffer_size = max_buffer_size.max(1);
        Ok(Self {
            base_dir,
            buffer: Vec::with_capacity(max_buffer_size),
            max_buffer_size,
            active_writer: None,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Buffer an event, flushing when the buffer is full.
    pub fn add_record(&mut self, event: HistoryEvent) -> LedgerResult<()> {
        self.buffer.push(event);

        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }

        Ok(())
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush history writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed history writer"
            );
        }
    }

    fn open_writer(&mut self, date: &str) -> LedgerResult<()> {
        let path = self
            .base_dir
            .join(format!("{FILE_PREFIX}{date}{FILE_SUFFIX}"));
        debug!(path = %path.display(), "Opening history file (append mode)");

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.active_writer = Some(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        });
        Ok(())
    }

    /// Write buffered events, rotating the file when the UTC date changes.
    pub fn flush(&mut self) -> LedgerResult<()> {
        let pending = std::mem::take(&mut self.buffer);
        for event in &pending {
            let date = event_date(event.timestamp_ms);
            let rotate = self
                .active_writer
                .as_ref()
                .is_some_and(|w| w.date != date);
            if rotate {
                self.close_active_writer();
            }

            if self.active_writer.is_none() {
                self.open_writer(&date)?;
            }
            let Some(active) = self.active_writer.as_mut() else {
                continue;
            };

            let json = serde_json::to_string(event)?;
            writeln!(active.writer, "{json}")?;
            active.records_written += 1;
        }

        if let Some(active) = self.active_writer.as_mut() {
            active.writer.flush()?;
        }
        Ok(())
    }

    /// Flush and close the current file.
    pub fn close(&mut self) -> LedgerResult<()> {
        self.flush()?;
        self.close_active_writer();
        Ok(())
    }
}

impl Drop for HistoryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush history buffer on drop");
        }
        self.close_active_writer();
    }
}

fn event_date(timestamp_ms: u64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms as i64)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d")
        .to_string()
}

/// Load every event from the history files in `base_dir`, oldest first.
/// Unparseable lines are skipped.
pub fn load_history(base_dir: impl AsRef<Path>) -> LedgerResult<Vec<HistoryEvent>> {
    let base_dir = base_dir.as_ref();
    if !base_dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(base_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
        })
        .collect();
    files.sort();

    let mut events = Vec::new();
    let mut skipped = 0usize;
    for path in files {
        let reader = BufReader::new(File::open(&path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEvent>(&line) {
                Ok(event) => events.push(event),
                Err(_) => skipped += 1,
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, dir = %base_dir.display(), "Skipped unparseable history lines");
    }

    events.sort_by_key(|e| e.timestamp_ms);
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{HistoryAction, HistoryStatus};
    use hedge_core::ConditionId;
    use tempfile::TempDir;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    fn event(ts: u64) -> HistoryEvent {
        HistoryEvent::new(
            ts,
            HistoryAction::Entry,
            HistoryStatus::Filled,
            "BTC",
            ConditionId::from("0xabc"),
            false,
        )
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().filter_map(|e| e.ok()).count()
    }

    #[test]
    fn test_write_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = HistoryWriter::new(temp_dir.path(), 1).unwrap();

        for i in 0..5 {
            writer.add_record(event(1_700_000_000_000 + i)).unwrap();
        }
        writer.close().unwrap();

        assert_eq!(file_count(temp_dir.path()), 1);
        let loaded = load_history(temp_dir.path()).unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded[0].timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_append_mode() {
        let temp_dir = TempDir::new().unwrap();

        for batch in 0..2u64 {
            let mut writer = HistoryWriter::new(temp_dir.path(), 100).unwrap();
            for i in 0..3 {
                writer.add_record(event(1_700_000_000_000 + batch * 10 + i)).unwrap();
            }
            writer.close().unwrap();
        }

        let loaded = load_history(temp_dir.path()).unwrap();
        assert_eq!(loaded.len(), 6, "Should have 6 records total from 2 writers");
    }

    #[test]
    fn test_rotates_by_event_date() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = HistoryWriter::new(temp_dir.path(), 1).unwrap();

        writer.add_record(event(1_700_000_000_000)).unwrap();
        writer.add_record(event(1_700_000_000_000 + DAY_MS)).unwrap();
        writer.close().unwrap();

        assert_eq!(file_count(temp_dir.path()), 2);
    }

    #[test]
    fn test_empty_flush_noop() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = HistoryWriter::new(temp_dir.path(), 100).unwrap();

        writer.flush().unwrap();
        assert_eq!(file_count(temp_dir.path()), 0);
    }

    #[test]
    fn test_load_skips_garbage_lines() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = HistoryWriter::new(temp_dir.path(), 1).unwrap();
        writer.add_record(event(1_700_000_000_000)).unwrap();
        writer.close().unwrap();

        let path = temp_dir.path().join("history_2023-11-14.jsonl");
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        writeln!(file, "{{not json").unwrap();

        assert_eq!(load_history(temp_dir.path()).unwrap().len(), 1);
        assert!(load_history(temp_dir.path().join("missing")).unwrap().is_empty());
    }
}
