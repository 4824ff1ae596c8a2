//! Environmental data recorder: BME688 readings appended to a text log.

use core::fmt::Write;

use heapless::String;

use crate::bme688::Measurement;
use crate::sdcard::FileStore;

pub const LOG_DIR: &str = "logs";
pub const LOG_PATH: &str = "logs/log.txt";
pub const FALLBACK_LOG_PATH: &str = "log.txt";

pub const RECORD_COUNT: usize = 10;
pub const RECORD_INTERVAL_MS: u64 = 1000;

pub const LINE_CAPACITY: usize = 128;

/// One log line, newline terminated.
pub fn format_record(timestamp_ms: u64, m: &Measurement) -> String<LINE_CAPACITY> {
    let mut line = String::new();
    // Worst case is well under the capacity; a failed write only truncates.
    let _ = writeln!(
        line,
        "Timestamp: {} ms, Temp: {:.2} C, Press: {:.2} hPa, Hum: {:.2} %, Gas: {:.2} KOhms",
        timestamp_ms,
        m.temperature,
        m.pressure_hpa(),
        m.humidity,
        m.gas_resistance_kohm()
    );
    line
}

/// Appends formatted records to the log file chosen at construction.
pub struct Recorder {
    path: &'static str,
    written: usize,
}

impl Recorder {
    /// Makes sure `logs/` exists. When it cannot be created the log goes to
    /// the volume root instead.
    pub fn prepare<S: FileStore>(store: &mut S) -> Self {
        let in_dir = match store.directory_exists(LOG_DIR) {
            Ok(true) => true,
            _ => store.create_directory(LOG_DIR).is_ok(),
        };
        Self {
            path: if in_dir { LOG_PATH } else { FALLBACK_LOG_PATH },
            written: 0,
        }
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    /// Records appended successfully so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn record<S: FileStore>(
        &mut self,
        store: &mut S,
        timestamp_ms: u64,
        m: &Measurement,
    ) -> Result<(), S::Error> {
        let line = format_record(timestamp_ms, m);
        store.write_file(self.path, line.as_bytes())?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::string::String as StdString;
    use std::vec::Vec;

    #[derive(Default)]
    struct MemStore {
        dirs: Vec<StdString>,
        files: BTreeMap<StdString, Vec<u8>>,
        read_only: bool,
    }

    impl FileStore for MemStore {
        type Error = ();

        fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), ()> {
            if self.read_only {
                return Err(());
            }
            self.files
                .entry(path.into())
                .or_default()
                .extend_from_slice(data);
            Ok(())
        }

        fn create_directory(&mut self, path: &str) -> Result<(), ()> {
            if self.read_only {
                return Err(());
            }
            self.dirs.push(path.into());
            Ok(())
        }

        fn directory_exists(&mut self, path: &str) -> Result<bool, ()> {
            Ok(self.dirs.iter().any(|d| d == path))
        }
    }

    fn sample() -> Measurement {
        Measurement {
            temperature: 23.456,
            pressure: 101_325.0,
            humidity: 41.2,
            gas_resistance: 12_345.0,
            gas_valid: true,
            heater_stable: true,
        }
    }

    #[test]
    fn formats_two_decimals_and_units() {
        let line = format_record(1234, &sample());
        assert_eq!(
            line.as_str(),
            "Timestamp: 1234 ms, Temp: 23.46 C, Press: 1013.25 hPa, Hum: 41.20 %, Gas: 12.35 KOhms\n"
        );
    }

    #[test]
    fn creates_log_directory() {
        let mut store = MemStore::default();
        let recorder = Recorder::prepare(&mut store);
        assert_eq!(recorder.path(), LOG_PATH);
        assert_eq!(store.dirs, vec![LOG_DIR]);
    }

    #[test]
    fn existing_directory_is_reused() {
        let mut store = MemStore {
            dirs: vec![LOG_DIR.into()],
            ..MemStore::default()
        };
        let recorder = Recorder::prepare(&mut store);
        assert_eq!(recorder.path(), LOG_PATH);
        assert_eq!(store.dirs.len(), 1);
    }

    #[test]
    fn falls_back_to_root_when_mkdir_fails() {
        let mut store = MemStore {
            read_only: true,
            ..MemStore::default()
        };
        let recorder = Recorder::prepare(&mut store);
        assert_eq!(recorder.path(), FALLBACK_LOG_PATH);
    }

    #[test]
    fn appends_and_counts_successful_records() {
        let mut store = MemStore::default();
        let mut recorder = Recorder::prepare(&mut store);
        recorder.record(&mut store, 0, &sample()).unwrap();
        recorder.record(&mut store, 1000, &sample()).unwrap();
        assert_eq!(recorder.written(), 2);

        let text = StdString::from_utf8(store.files[LOG_PATH].clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("Timestamp: 1000 ms"));

        store.read_only = true;
        assert!(recorder.record(&mut store, 2000, &sample()).is_err());
        assert_eq!(recorder.written(), 2);
    }
}
