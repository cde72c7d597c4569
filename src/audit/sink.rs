use std::fs::{self, File};
use std::path::{Path, PathBuf};

use super::AuditEntry;
use crate::error::{AuditError, Result};

/// Column header of the audit table.
pub const AUDIT_HEADER: [&str; 6] = [
    "path",
    "was_encrypted",
    "mode",
    "preview_path",
    "mime_guess",
    "error",
];

/// Destination for audit rows.
pub trait AuditSink {
    /// Persist one row before returning.
    fn record(&mut self, entry: &AuditEntry) -> Result<()>;
}

impl AuditSink for Vec<AuditEntry> {
    fn record(&mut self, entry: &AuditEntry) -> Result<()> {
        self.push(entry.clone());
        Ok(())
    }
}

/// CSV audit table, one synced row per file.
pub struct CsvAuditSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl CsvAuditSink {
    /// Create (or truncate) the table and write its header, creating parent
    /// dirs if needed.
    pub fn create(path: &Path) -> Result<Self> {
        let sink_error = |reason: String| AuditError::Sink {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| sink_error(e.to_string()))?;
        }
        let file = File::create(path).map_err(|e| sink_error(e.to_string()))?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        let mut sink = Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        };
        sink.writer
            .write_record(AUDIT_HEADER)
            .map_err(|e| sink_error(e.to_string()))?;
        sink.sync()?;
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far, excluding the header.
    pub fn rows(&self) -> usize {
        self.rows
    }

    fn sync(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| AuditError::Sink {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| AuditError::Sink {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}

impl AuditSink for CsvAuditSink {
    fn record(&mut self, entry: &AuditEntry) -> Result<()> {
        self.writer.serialize(entry).map_err(|e| AuditError::Sink {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        self.sync()?;
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditMode;
    use tempfile::TempDir;

    #[test]
    fn test_header_written_on_create() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("audit.csv");
        let sink = CsvAuditSink::create(&path).unwrap();

        assert_eq!(sink.rows(), 0);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "path,was_encrypted,mode,preview_path,mime_guess,error\n"
        );
    }

    #[test]
    fn test_rows_visible_immediately() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("audit.csv");
        let mut sink = CsvAuditSink::create(&path).unwrap();

        sink.record(&AuditEntry::failed("c.bin", true, "authenticated: authentication-failed"))
            .unwrap();

        // Read while the sink is still open.
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with("c.bin,true,failed,,,authenticated: authentication-failed\n"));
        assert_eq!(sink.rows(), 1);
    }

    #[test]
    fn test_fields_with_delimiters_are_quoted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("audit.csv");
        let mut sink = CsvAuditSink::create(&path).unwrap();

        let entry = AuditEntry {
            path: "odd, \"name\".bin".into(),
            ..AuditEntry::unexamined("", "a; b, c")
        };
        sink.record(&entry).unwrap();
        drop(sink);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"odd, \"\"name\"\".bin\",false,none,,,\"a; b, c\""));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<AuditEntry> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows, vec![entry]);
        assert_eq!(rows[0].mode, AuditMode::None);
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("audit.csv");
        fs::write(&path, "stale contents\nfrom before\n").unwrap();

        CsvAuditSink::create(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
