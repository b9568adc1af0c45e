use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Larger length prefixes are treated as damage rather than allocated.
const MAX_ENTRY_BYTES: usize = 64 * 1024 * 1024;

/// Append-only log of store events.
///
/// Entry layout: `[u32 LE: len][bincode Event][u32 LE: crc32 of payload]`.
/// Replay stops at the first short or corrupt entry, so a crash mid-write
/// loses at most the batch that was being written.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

fn write_entry(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "WAL entry too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())
}

/// Fill `buf` completely. `Ok(false)` means the file ended first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact entry and its size on disk, or `None` at end of log or at the
/// first damaged entry.
fn read_entry(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut word = [0u8; 4];
    if !read_full(reader, &mut word)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_ENTRY_BYTES {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut word)? {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    let entry_len = 8 + payload.len() as u64;
    Ok(bincode::deserialize(&payload)
        .ok()
        .map(|event| (event, entry_len)))
}

/// Log position before a batch; `Wal::rollback` returns to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalMark {
    len: u64,
    appends: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append and fsync a single event.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        write_entry(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Current end of the log. Only meaningful with nothing buffered, i.e.
    /// right after a successful `flush_sync` or `rollback`.
    pub fn mark(&self) -> io::Result<WalMark> {
        Ok(WalMark {
            len: self.writer.get_ref().metadata()?.len(),
            appends: self.appends_since_compact,
        })
    }

    /// Undo everything since `mark`: buffered bytes are discarded unwritten
    /// and anything already on disk is cut off.
    pub fn rollback(&mut self, mark: WalMark) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts skips the flush a plain drop would do.
        let (stale_file, _discarded) = stale.into_parts();
        drop(stale_file);
        let file = self.writer.get_ref();
        file.set_len(mark.len)?;
        file.sync_all()?;
        self.appends_since_compact = mark.appends;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write a snapshot to `<path>.tmp` and fsync it. Slow; run outside any lock.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path.with_extension("wal.tmp"))?);
        for event in events {
            write_entry(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the live log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(self.path.with_extension("wal.tmp"), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Every intact event in the log. A missing file is an empty log.
    ///
    /// A damaged tail is cut off so later appends stay readable.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut valid_len = 0u64;
        while let Some((event, entry_len)) = read_entry(&mut reader)? {
            events.push(event);
            valid_len += entry_len;
        }
        if valid_len < file_len {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = file_len - valid_len,
                "truncating damaged WAL tail"
            );
            OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookedRecord, Intent, SlotKey};
    use chrono::{NaiveDate, NaiveTime};
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotgrid_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 17).unwrap()
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    fn applied(available: bool) -> Event {
        Event::IntentsApplied {
            batch_id: Ulid::new(),
            intents: vec![Intent::Upsert {
                provider_id: Ulid::new(),
                service_id: Ulid::new(),
                date: monday(),
                time24: nine(),
                available,
            }],
        }
    }

    fn booked() -> Event {
        Event::BookingRecorded {
            booking: BookedRecord {
                provider_id: Ulid::new(),
                service_id: Ulid::new(),
                date: monday(),
                time24: nine(),
                client_name: Some("Avery".into()),
                service_title: None,
            },
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![applied(true), booked(), applied(false)];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = tmp_path("torn_tail.wal");
        let event = applied(true);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[7u8, 0, 0, 0, 1, 2]).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
    }

    #[test]
    fn replay_stops_at_bad_checksum() {
        let path = tmp_path("bad_crc.wal");
        let good = applied(false);
        let bad = Event::BookingCancelled {
            key: SlotKey {
                provider_id: Ulid::new(),
                service_id: Ulid::new(),
                date: monday(),
                time24: nine(),
            },
        };
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let payload = bincode::serialize(&bad).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }
        // Entries after the damaged one are not trusted either.
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&applied(true)).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
    }

    #[test]
    fn rollback_discards_buffered_and_flushed_entries() {
        let path = tmp_path("rollback.wal");
        let kept = applied(true);
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&kept).unwrap();

        let mark = wal.mark().unwrap();
        // One entry reaches disk, the next only the buffer.
        wal.append_buffered(&booked()).unwrap();
        wal.flush_sync().unwrap();
        wal.append_buffered(&applied(false)).unwrap();
        wal.rollback(mark).unwrap();

        assert_eq!(wal.appends_since_compact(), 1);
        assert_eq!(Wal::replay(&path).unwrap(), vec![kept.clone()]);

        let later = booked();
        wal.append(&later).unwrap();
        drop(wal);
        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, later]);
    }

    #[test]
    fn appends_after_repaired_tail_are_readable() {
        let path = tmp_path("repaired.wal");
        let first = applied(true);
        let second = booked();
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0xFF, 0xFF, 0xFF, 0xFF, 9]).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![first.clone()]);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&second).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![first, second]);
    }

    #[test]
    fn compact_shrinks_and_keeps_snapshot() {
        let path = tmp_path("compact.wal");
        {
            let mut wal = Wal::open(&path).unwrap();
            for i in 0..20 {
                wal.append(&applied(i % 2 == 0)).unwrap();
            }
        }
        let before = fs::metadata(&path).unwrap().len();

        let snapshot = vec![applied(true)];
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.compact(&snapshot).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
        }
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");
        assert_eq!(Wal::replay(&path).unwrap(), snapshot);
    }

    #[test]
    fn append_after_compact() {
        let path = tmp_path("compact_append.wal");
        let snapshot = vec![booked()];
        let later = applied(false);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&applied(true)).unwrap();
            wal.compact(&snapshot).unwrap();
            wal.append(&later).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![snapshot[0].clone(), later]);
    }

    #[test]
    fn buffered_appends_count_and_flush() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = (0..5).map(|_| applied(true)).collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }
}
