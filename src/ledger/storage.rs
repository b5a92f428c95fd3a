//! Append-only storage behind the ledger.

use super::LedgerError;
use crate::models::Action;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Append-only action storage
pub trait ActionLog: Send {
    /// Persist one action after everything appended before it
    ///
    /// # Errors
    ///
    /// Returns an error if the action could not be written
    fn append(&mut self, action: &Action) -> Result<(), LedgerError>;

    /// Every action appended so far, in append order
    ///
    /// # Errors
    ///
    /// Returns an error if the stored actions cannot be read back
    fn load(&mut self) -> Result<Vec<Action>, LedgerError>;
}

/// Keeps actions for the lifetime of the process only
#[derive(Debug, Default)]
pub struct MemoryLog {
    actions: Vec<Action>,
}

impl ActionLog for MemoryLog {
    fn append(&mut self, action: &Action) -> Result<(), LedgerError> {
        self.actions.push(action.clone());
        Ok(())
    }

    fn load(&mut self) -> Result<Vec<Action>, LedgerError> {
        Ok(self.actions.clone())
    }
}

/// One JSON document per line, only ever appended to
#[derive(Debug)]
pub struct JsonLinesLog {
    path: PathBuf,
    file: File,
}

impl JsonLinesLog {
    /// Open (or create) the log at `path`
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the file cannot be opened for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ActionLog for JsonLinesLog {
    fn append(&mut self, action: &Action) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(action)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    fn load(&mut self) -> Result<Vec<Action>, LedgerError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut actions = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let action = serde_json::from_str(&line).map_err(|e| LedgerError::CorruptLog {
                line: i + 1,
                message: e.to_string(),
            })?;
            actions.push(action);
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::at;
    use uuid::Uuid;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rail_dispatch_{name}_{}.jsonl", Uuid::new_v4()))
    }

    #[test]
    fn test_json_lines_round_trip() {
        let path = temp_path("round_trip");
        let first = Action::accepted(Uuid::new_v4(), "controller-1", at(9, 0));
        let second = Action::overridden(Uuid::new_v4(), "controller-2", "Track inspection", at(9, 5));

        {
            let mut log = JsonLinesLog::open(&path).expect("log opens");
            log.append(&first).expect("append");
            log.append(&second).expect("append");
        }

        let mut reopened = JsonLinesLog::open(&path).expect("log reopens");
        assert_eq!(reopened.load().expect("load"), vec![first, second]);
        std::fs::remove_file(&path).expect("cleanup");
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "{\"not\": \"an action\"}\n").expect("write fixture");

        let mut log = JsonLinesLog::open(&path).expect("log opens");
        assert!(matches!(log.load(), Err(LedgerError::CorruptLog { line: 1, .. })));
        std::fs::remove_file(&path).expect("cleanup");
    }
}
