use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::error;

use crate::models::ClassType;

/// One booked slot, written as a single JSON line.
#[derive(Debug, Serialize)]
pub struct BookingRecord<'a> {
    pub user: &'a str,
    pub class_type: ClassType,
    pub date: NaiveDate,
    pub time: &'a str,
    pub class_id: &'a str,
    pub booked_at: String,
}

/// Appends booking records to the configured summary file. Write failures
/// are logged and never interrupt the booking flow.
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    path: PathBuf,
}

impl SummaryWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, record: &BookingRecord<'_>) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize booking record: {}", e);
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = result {
            error!(
                "Failed to write booking summary to {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
