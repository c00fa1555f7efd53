//! One file per pledge: `<prefix>_<sequence><extension>` holding a single
//! `identity,amount` line.
//!
//! Every other regular file in the directory is read as a record too, without a
//! sequence, so stray or legacy files count towards the total and a corrupt one
//! fails the read. Only the store's own staging files are passed over.
//!
//! New records are written to a hidden temp file and published with a hard
//! link, which refuses to replace an existing name. Two writers that pick the
//! same sequence therefore cannot clobber each other; the loser rescans and
//! takes the next number.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Serialize, Deserialize};
use ulid::Ulid;

use crate::backend::interface::{LedgerStore, Records};
use crate::core::{pledge, Amount, LedgerError, PledgeRecord, Result, Sequence};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordNaming {
    pub prefix: String,
    pub extension: String
}

impl Default for RecordNaming {
    fn default() -> Self {
        RecordNaming { prefix: "pledge".to_owned(), extension: ".txt".to_owned() }
    }
}

impl RecordNaming {
    pub fn file_name(&self, sequence: Sequence) -> String {
        format!("{}_{}{}", self.prefix, sequence, self.extension)
    }

    /// Returns the sequence encoded in `name`, or `None` if it is not a record name.
    pub fn sequence_of(&self, name: &str) -> Option<Sequence> {
        let digits = name.strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .strip_suffix(self.extension.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    fn temp_name(&self) -> String {
        format!(".{}_{}.tmp", self.prefix, Ulid::new())
    }

    /// Whether `name` is a record staged by `append` and not yet published.
    pub fn is_staging(&self, name: &str) -> bool {
        name.strip_prefix('.')
            .and_then(|rest| rest.strip_prefix(self.prefix.as_str()))
            .map_or(false, |rest| rest.starts_with('_') && rest.ends_with(".tmp"))
    }
}

pub struct FileStore {
    dir: PathBuf,
    naming: RecordNaming
}

impl FileStore {
    const MAX_PUBLISH_ATTEMPTS: usize = 64;

    pub fn new(dir: impl Into<PathBuf>) -> FileStore {
        FileStore::with_naming(dir, RecordNaming::default())
    }

    pub fn with_naming(dir: impl Into<PathBuf>, naming: RecordNaming) -> FileStore {
        FileStore { dir: dir.into(), naming }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn naming(&self) -> &RecordNaming {
        &self.naming
    }

    /// Highest sequence among the record files currently present.
    fn max_sequence(&self) -> Result<Option<Sequence>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(LedgerError::storage(&self.dir, err))
        };

        let mut max = None;
        for entry in entries {
            let entry = entry.map_err(|err| LedgerError::storage(&self.dir, err))?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(sequence) = name.to_str().and_then(|name| self.naming.sequence_of(name)) {
                max = max.max(Some(sequence));
            }
        }
        return Ok(max);
    }

    fn write_temp(&self, line: &str) -> Result<TempRecord> {
        let path = self.dir.join(self.naming.temp_name());
        let mut file = File::create(&path)
            .map_err(|err| LedgerError::storage(&path, err))?;
        let temp = TempRecord { path };
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|err| LedgerError::storage(&temp.path, err))?;
        return Ok(temp);
    }

    /// Flushes the new directory entry. The record is already visible at this
    /// point, so a failure is reported but does not undo the append.
    #[cfg(unix)]
    fn sync_dir(&self) {
        if let Err(err) = File::open(&self.dir).and_then(|dir| dir.sync_all()) {
            warn!("failed to sync {}: {}", self.dir.display(), err);
        }
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) {}
}

/// Removes the staged file however `append` exits.
struct TempRecord {
    path: PathBuf
}

impl Drop for TempRecord {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() == io::ErrorKind::NotFound {
                return;
            }
            warn!("failed to remove staged record {}: {}", self.path.display(), err);
        }
    }
}

impl LedgerStore for FileStore {
    fn append(&self, identity: &str, amount: Amount) -> Result<Sequence> {
        pledge::validate(identity, amount)?;

        fs::create_dir_all(&self.dir)
            .map_err(|err| LedgerError::storage(&self.dir, err))?;
        let temp = self.write_temp(&pledge::format_line(identity, amount))?;

        for _ in 0..Self::MAX_PUBLISH_ATTEMPTS {
            let sequence = pledge::next_sequence(self.max_sequence()?)?;
            let target = self.dir.join(self.naming.file_name(sequence));

            match fs::hard_link(&temp.path, &target) {
                Ok(()) => {
                    self.sync_dir();
                    debug!("recorded pledge {} in {}", sequence, target.display());
                    return Ok(sequence);
                },
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    warn!("sequence {} taken by a concurrent writer, rescanning", sequence);
                },
                Err(err) => return Err(LedgerError::storage(&target, err))
            }
        }

        Err(LedgerError::Contention { attempts: Self::MAX_PUBLISH_ATTEMPTS })
    }

    fn list(&self) -> Result<Records<'_>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => Some(entries),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(LedgerError::storage(&self.dir, err))
        };
        return Ok(Box::new(FileRecords { store: self, entries }));
    }
}

struct FileRecords<'a> {
    store: &'a FileStore,
    entries: Option<fs::ReadDir>
}

impl<'a> FileRecords<'a> {
    fn read_entry(&self, entry: io::Result<fs::DirEntry>) -> Option<Result<PledgeRecord>> {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => return Some(Err(LedgerError::storage(&self.store.dir, err)))
        };

        let path = entry.path();
        if !path.is_file() {
            return None;
        }
        let file_name = entry.file_name();
        let name = match file_name.to_str() {
            Some(name) => name,
            None => return Some(Err(LedgerError::Format {
                name: file_name.to_string_lossy().into_owned(),
                content: String::new()
            }))
        };
        if self.store.naming.is_staging(name) {
            return None;
        }
        self.read_record(&path, name)
    }

    fn read_record(&self, path: &Path, name: &str) -> Option<Result<PledgeRecord>> {
        let line = match fs::read(path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(err) => return Some(Err(LedgerError::Format {
                    name: name.to_owned(),
                    content: String::from_utf8_lossy(err.as_bytes()).into_owned()
                }))
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} vanished before it could be read", name);
                return None;
            },
            Err(err) => return Some(Err(LedgerError::storage(path, err)))
        };
        if line.trim().is_empty() {
            debug!("skipping blank record {}", name);
            return None;
        }

        Some(PledgeRecord::parse(self.store.naming.sequence_of(name), name, &line))
    }
}

impl<'a> Iterator for FileRecords<'a> {
    type Item = Result<PledgeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = self.entries.as_mut()?.next()?;
            if let Some(item) = self.read_entry(entry) {
                return Some(item);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use crate::backend::{FileStore, LedgerStore, RecordNaming};
    use super::FileRecords;
    use crate::core::{Aggregator, Amount, LedgerError};

    use rstest::{fixture, rstest};
    use std::collections::HashSet;
    use std::fs;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn amount(text: &str) -> Amount {
        Amount::from_str(text).unwrap()
    }

    fn total(store: &FileStore) -> Amount {
        store.records().unwrap().iter().map(|record| record.amount).sum()
    }

    #[fixture]
    fn workdir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    #[case("pledge_0.txt", Some(0))]
    #[case("pledge_42.txt", Some(42))]
    #[case("pledge_.txt", None)]
    #[case("pledge_+4.txt", None)]
    #[case("pledge_4.txt.bak", None)]
    #[case("pledges_4.txt", None)]
    #[case(".pledge_01J0000000000000000000000.tmp", None)]
    fn recognises_record_names(#[case] name: &str, #[case] expected: Option<u64>) {
        assert_eq!(RecordNaming::default().sequence_of(name), expected);
    }

    #[rstest]
    fn missing_directory_reads_empty(workdir: TempDir) {
        let store = FileStore::new(workdir.path().join("nowhere"));
        assert!(store.records().unwrap().is_empty());
        assert_eq!(total(&store), Amount::ZERO);
    }

    #[rstest]
    fn append_creates_directory_and_file(workdir: TempDir) {
        let dir = workdir.path().join("output");
        let store = FileStore::new(&dir);

        let sequence = store.append("alice@example.com", amount("20")).unwrap();

        assert_eq!(sequence, 0);
        let content = fs::read_to_string(dir.join("pledge_0.txt")).unwrap();
        assert_eq!(content, "alice@example.com,20");
        // no staged files left behind
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[rstest]
    fn two_pledges_scenario(workdir: TempDir) {
        let store = FileStore::new(workdir.path());

        store.append("alice@example.com", amount("20")).unwrap();
        store.append("bob@example.com", amount("30.5")).unwrap();

        let records = store.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, Some(0));
        assert_eq!(records[0].identity, "alice@example.com");
        assert_eq!(records[1].sequence, Some(1));
        assert_eq!(records[1].amount, amount("30.5"));
        assert_eq!(total(&store), amount("50.5"));
    }

    #[rstest]
    fn sequence_is_never_reused_after_deletion(workdir: TempDir) {
        let store = FileStore::new(workdir.path());
        for value in ["1", "2", "3"] {
            store.append("carol", amount(value)).unwrap();
        }

        fs::remove_file(workdir.path().join("pledge_1.txt")).unwrap();
        let sequence = store.append("carol", amount("4")).unwrap();

        assert_eq!(sequence, 3);
        let sequences: Vec<_> = store.records().unwrap().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![Some(0), Some(2), Some(3)]);
    }

    #[rstest]
    fn continues_after_existing_records(workdir: TempDir) {
        fs::write(workdir.path().join("pledge_9.txt"), "heikki@hakkeri.leet, 25").unwrap();
        let store = FileStore::new(workdir.path());

        let sequence = store.append("dave", amount("15")).unwrap();

        assert_eq!(sequence, 10);
        assert_eq!(total(&store), amount("40"));
    }

    #[rstest]
    #[case("noseparatorhere")]
    #[case("alice,notanumber")]
    fn malformed_record_poisons_listing(workdir: TempDir, #[case] content: &str) {
        let store = FileStore::new(workdir.path());
        for _ in 0..5 {
            store.append("erin", amount("10")).unwrap();
        }
        fs::write(workdir.path().join("pledge_17.txt"), content).unwrap();

        let err = store.records().unwrap_err();

        match err {
            LedgerError::Format { name, .. } => assert_eq!(name, "pledge_17.txt"),
            other => panic!("unexpected error {:?}", other)
        }
    }

    #[rstest]
    #[case(".pledge_01J0000000000000000000000.tmp", true)]
    #[case(".pledge_x.tmp", true)]
    #[case("pledge_0.txt", false)]
    #[case(".pledges_x.tmp", false)]
    #[case(".pledge_x.txt", false)]
    fn recognises_staging_names(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(RecordNaming::default().is_staging(name), expected);
    }

    #[rstest]
    fn skips_directories_blanks_and_staging(workdir: TempDir) {
        let store = FileStore::new(workdir.path());
        store.append("frank", amount("5")).unwrap();
        fs::create_dir(workdir.path().join("pledge_50.txt")).unwrap();
        fs::write(workdir.path().join("pledge_3.txt"), "  \n").unwrap();
        fs::write(workdir.path().join(".pledge_01J0000000000000000000000.tmp"), "half written").unwrap();

        assert_eq!(store.records().unwrap().len(), 1);
        assert_eq!(store.append("grace", amount("5")).unwrap(), 4);
    }

    #[rstest]
    fn other_files_count_without_sequence(workdir: TempDir) {
        let store = FileStore::new(workdir.path());
        store.append("frank", amount("5")).unwrap();
        fs::write(workdir.path().join("pledge-legacy.txt"), "bob,5").unwrap();

        let records = store.records().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, None);
        assert_eq!(records[0].identity, "bob");
        assert_eq!(Aggregator::new(&store).total().unwrap(), amount("10"));
        // only record names take part in numbering
        assert_eq!(store.append("grace", amount("1")).unwrap(), 1);
    }

    #[rstest]
    fn stray_malformed_file_fails_total(workdir: TempDir) {
        let store = FileStore::new(workdir.path());
        store.append("frank", amount("5")).unwrap();
        fs::write(workdir.path().join("junk.txt"), "noseparatorhere").unwrap();

        let res = Aggregator::new(&store).total();

        assert!(matches!(res, Err(LedgerError::Format { ref name, .. }) if name == "junk.txt"));
    }

    #[cfg(target_os = "linux")]
    #[rstest]
    fn non_utf8_content_and_names_are_format_errors(workdir: TempDir) {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        fs::write(workdir.path().join("pledge_0.txt"), b"alice,\xff").unwrap();
        let store = FileStore::new(workdir.path());
        assert!(matches!(store.records(), Err(LedgerError::Format { ref name, .. }) if name == "pledge_0.txt"));

        fs::remove_file(workdir.path().join("pledge_0.txt")).unwrap();
        fs::write(workdir.path().join(OsStr::from_bytes(b"bad\xffname")), "alice,1").unwrap();
        assert!(matches!(store.records(), Err(LedgerError::Format { .. })));
    }

    #[rstest]
    fn record_removed_after_scan_is_skipped(workdir: TempDir) {
        let store = FileStore::new(workdir.path());
        store.append("kim", amount("5")).unwrap();
        store.append("lee", amount("6")).unwrap();

        let mut records = FileRecords { store: &store, entries: Some(fs::read_dir(workdir.path()).unwrap()) };
        fs::remove_file(workdir.path().join("pledge_0.txt")).unwrap();
        let remaining: Vec<_> = records.by_ref().collect::<Result<_, _>>().unwrap();
        assert!(remaining.iter().all(|record| record.sequence == Some(1)));

        let vanished = records.read_record(&workdir.path().join("pledge_0.txt"), "pledge_0.txt");
        assert!(vanished.is_none());
    }

    #[rstest]
    fn failed_directory_sync_does_not_panic(workdir: TempDir) {
        let store = FileStore::new(workdir.path().join("gone"));
        store.sync_dir();
    }

    #[rstest]
    fn refuses_append_past_last_sequence(workdir: TempDir) {
        fs::write(workdir.path().join(format!("pledge_{}.txt", u64::MAX)), "x,1").unwrap();
        let store = FileStore::new(workdir.path());

        let res = store.append("y", Amount::ONE);

        assert!(matches!(res, Err(LedgerError::SequenceExhausted { last: u64::MAX })));
        assert_eq!(fs::read_dir(workdir.path()).unwrap().count(), 1);
    }

    #[rstest]
    fn custom_naming(workdir: TempDir) {
        let naming = RecordNaming { prefix: "vote".to_owned(), extension: ".csv".to_owned() };
        let store = FileStore::with_naming(workdir.path(), naming);

        store.append("heidi", amount("7")).unwrap();

        assert!(workdir.path().join("vote_0.csv").is_file());
        assert_eq!(total(&store), amount("7"));
    }

    #[rstest]
    fn unusable_directory_is_storage_error(workdir: TempDir) {
        let blocker = workdir.path().join("output");
        fs::write(&blocker, "a file, not a directory").unwrap();
        let store = FileStore::new(&blocker);

        let res = store.append("ivan", amount("20"));

        assert!(matches!(res, Err(LedgerError::Storage { .. })));
    }

    #[rstest]
    fn refuses_unreadable_pledges(workdir: TempDir) {
        let store = FileStore::new(workdir.path());

        assert!(matches!(store.append("a,b", amount("1")), Err(LedgerError::InvalidIdentity(..))));
        assert!(matches!(store.append("judy", amount("-1")), Err(LedgerError::InvalidAmount(..))));
        assert!(store.records().unwrap().is_empty());
    }

    #[rstest]
    fn concurrent_appends_get_distinct_sequences(workdir: TempDir) {
        const WRITERS: usize = 8;
        const PER_WRITER: usize = 10;
        let store = FileStore::new(workdir.path());

        let assigned: Vec<u64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..WRITERS)
                .map(|writer| {
                    let store = &store;
                    scope.spawn(move || {
                        (0..PER_WRITER)
                            .map(|_| store.append(&format!("writer{}", writer), amount("1.5")).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect()
        });

        let unique: HashSet<_> = assigned.iter().collect();
        assert_eq!(unique.len(), WRITERS * PER_WRITER);
        assert_eq!(store.records().unwrap().len(), WRITERS * PER_WRITER);
        assert_eq!(total(&store), amount("120"));
    }
}
