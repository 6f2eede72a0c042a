//! NDJSON record sink: one file per domain under the output directory.
//!
//! This is the hand-off point to the external load step; files are
//! truncated at the start of each run so the loader always sees exactly one
//! run's records per file.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use pipestats::collect::RecordSink;

pub struct NdjsonSink {
    dir: PathBuf,
    files: HashMap<&'static str, BufWriter<File>>,
}

impl NdjsonSink {
    pub fn create(dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: HashMap::new(),
        })
    }

    /// Path of one domain's output file.
    pub fn path_for(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("{domain}.ndjson"))
    }

    /// Flush all open files.
    pub fn finish(&mut self) -> io::Result<()> {
        for writer in self.files.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl RecordSink for NdjsonSink {
    fn write(&mut self, domain: &'static str, record: serde_json::Value) -> io::Result<()> {
        let writer = match self.files.entry(domain) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let path = self.dir.join(format!("{domain}.ndjson"));
                entry.insert(BufWriter::new(File::create(path)?))
            }
        };
        serde_json::to_writer(&mut *writer, &record)?;
        writer.write_all(b"\n")
    }
}
