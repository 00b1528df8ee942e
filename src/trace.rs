/*!
 * Run Trace
 * Line-oriented trace file; every record is tagged with the virtual clock
 */

use crate::clock::VirtualTime;
use log::warn;
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub struct Trace {
    out: Mutex<BufWriter<File>>,
}

impl Trace {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one `[sec:ns]`-tagged record. Trace writes never fail the run.
    pub fn record(&self, at: VirtualTime, entry: fmt::Arguments<'_>) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "[{at}] {entry}") {
            warn!("trace write failed: {e}");
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        self.out.lock().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_tagged_with_virtual_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let trace = Trace::create(&path).unwrap();

        trace.record(VirtualTime::new(0, 100), format_args!("first"));
        trace.record(VirtualTime::new(1, 50), format_args!("second {}", 7));
        trace.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "[0:100] first\n[1:50] second 7\n");
    }
}
