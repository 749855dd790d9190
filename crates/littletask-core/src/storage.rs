//! Recording storage - one JSON array file per recording

use crate::action::ActionSequence;
use crate::error::Result;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const EXTENSION: &str = "json";

pub struct RecordingStorage {
    dir: PathBuf,
}

impl RecordingStorage {
    /// Storage under the user's data directory (`~/Library/Application Support/littletask` on macOS)
    pub fn new() -> Result<Self> {
        let base = dirs_next::data_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no data directory for this user")
        })?;
        Self::with_dir(base.join("littletask"))
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write the sequence under a timestamped name and return its path
    pub fn save(&self, name: &str, sequence: &ActionSequence) -> Result<PathBuf> {
        let bytes = sequence.to_json()?;
        let stem = format!("{}_{}", sanitize(name), chrono::Utc::now().format("%Y%m%d_%H%M%S"));

        // Same name within the same second gets a numeric suffix instead of overwriting
        let mut attempt = 1;
        loop {
            let filename = if attempt == 1 {
                format!("{}.{}", stem, EXTENSION)
            } else {
                format!("{}_{}.{}", stem, attempt, EXTENSION)
            };
            let path = self.dir.join(filename);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&bytes)?;
                    debug!(path = %path.display(), actions = sequence.len(), "recording saved");
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Raw bytes of a stored recording, for handing to `Session::load_recording`
    pub fn read(&self, file: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(file))?)
    }

    pub fn load(&self, file: &str) -> Result<ActionSequence> {
        ActionSequence::from_json(&self.read(file)?)
    }

    /// Stored recording file names, oldest first
    pub fn list(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(s) = entry.file_name().to_str() {
                files.push(s.to_string());
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn delete(&self, file: &str) -> Result<()> {
        fs::remove_file(self.resolve(file))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Bare names live in the storage dir; anything with a separator is taken as given
    pub fn resolve(&self, file: &str) -> PathBuf {
        let p = Path::new(file);
        if p.components().count() > 1 || p.is_absolute() {
            p.to_path_buf()
        } else {
            self.dir.join(p)
        }
    }
}

fn sanitize(s: &str) -> String {
    let cleaned: String = s
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "recording".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Input, MouseButton};
    use crate::error::Error;
    use assert_matches::assert_matches;

    fn sample() -> ActionSequence {
        ActionSequence::from_actions(vec![
            Action::new(0.0, Input::MouseMove { x: 10.0, y: 20.0 }),
            Action::new(
                0.25,
                Input::MouseClick { x: 10.0, y: 20.0, button: MouseButton::Left, is_down: true },
            ),
            Action::new(0.5, Input::KeyPress { key_code: 36, is_down: true }),
        ])
        .unwrap()
    }

    #[test]
    fn test_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = RecordingStorage::with_dir(tmp.path()).unwrap();

        let path = storage.save("login flow", &sample()).unwrap();
        let file = path.file_name().unwrap().to_str().unwrap();
        assert!(file.starts_with("login_flow_"));
        assert!(file.ends_with(".json"));

        let loaded = storage.load(file).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_list_only_recordings() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = RecordingStorage::with_dir(tmp.path()).unwrap();
        fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(tmp.path().join("nested.json")).unwrap();

        assert!(storage.list().unwrap().is_empty());
        storage.save("a", &sample()).unwrap();
        storage.save("b", &sample()).unwrap();

        let files = storage.list().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].starts_with("a_"));
        assert!(files[1].starts_with("b_"));
    }

    #[test]
    fn test_same_name_in_one_second_keeps_both() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = RecordingStorage::with_dir(tmp.path()).unwrap();
        let mut short = ActionSequence::new();
        short
            .push(Action::new(0.0, Input::KeyPress { key_code: 1, is_down: true }))
            .unwrap();

        // Occupy the unsuffixed name for this second
        let ts = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
        fs::write(tmp.path().join(format!("dup_{}.json", ts)), b"[]").unwrap();

        let first = storage.save("dup", &sample()).unwrap();
        let second = storage.save("dup", &short).unwrap();
        assert_ne!(first, second);

        let first_name = first.file_name().unwrap().to_str().unwrap();
        let second_name = second.file_name().unwrap().to_str().unwrap();
        assert_eq!(storage.load(first_name).unwrap(), sample());
        assert_eq!(storage.load(second_name).unwrap(), short);
        assert!(storage.list().unwrap().len() >= 3);
    }

    #[test]
    fn test_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = RecordingStorage::with_dir(tmp.path()).unwrap();
        let path = storage.save("gone", &sample()).unwrap();
        let file = path.file_name().unwrap().to_str().unwrap().to_string();

        storage.delete(&file).unwrap();
        assert!(!path.exists());
        assert_matches!(storage.delete(&file), Err(Error::Io(_)));
    }

    #[test]
    fn test_load_rejects_bad_file() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = RecordingStorage::with_dir(tmp.path()).unwrap();
        fs::write(tmp.path().join("broken.json"), b"{not json").unwrap();
        fs::write(
            tmp.path().join("mixed.json"),
            br#"[{"type":"keyPress","timestamp":0.1,"keyCode":1,"isDown":true,"x":3}]"#,
        )
        .unwrap();

        assert_matches!(storage.load("broken.json"), Err(Error::Decode(_)));
        assert_matches!(storage.load("mixed.json"), Err(Error::MalformedAction { index: 0, .. }));
    }

    #[test]
    fn test_resolve_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = RecordingStorage::with_dir(tmp.path()).unwrap();
        assert_eq!(storage.resolve("x.json"), tmp.path().join("x.json"));
        assert_eq!(storage.resolve("/tmp/x.json"), PathBuf::from("/tmp/x.json"));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("my task/1"), "my_task_1");
        assert_eq!(sanitize("  "), "recording");
        assert_eq!(sanitize("ok-name_2"), "ok-name_2");
    }
}
