//! String-valued key-value stores backing local saves.

use crate::error::PersistError;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Minimal key-value contract: whole values are read and replaced, never
/// merged.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn put(&mut self, key: &str, value: &str) -> Result<(), PersistError>;
    /// Returns whether a value was removed.
    fn delete(&mut self, key: &str) -> Result<bool, PersistError>;
    fn keys(&self) -> Result<Vec<String>, PersistError>;
}

/// Volatile store, used for tests and guest sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, PersistError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, PersistError> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// One JSON file per key inside a directory.
///
/// Writes go to a sibling `.tmp` file that is then renamed over the target,
/// so readers never observe a half-written save.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, PersistError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

fn is_plain(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'@')
}

/// Map a storage key onto a portable file name.
///
/// Bytes outside the plain set (including `%`) become `%XX`, so distinct keys
/// never share a file and [`key_from_stem`] recovers the key.
fn file_stem(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if is_plain(b) {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Inverse of [`file_stem`]; `None` for names this store did not write.
fn key_from_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = stem.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b if is_plain(b) => {
                out.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    String::from_utf8(out).ok()
}

fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        let path = self.path_for(key);
        write_text_atomic(&path, value)?;
        debug!(path = %path.display(), bytes = value.len(), "wrote save file");
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, PersistError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Storage keys of the saves in the directory.
    fn keys(&self) -> Result<Vec<String>, PersistError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(key) = path.file_stem().and_then(|s| s.to_str()).and_then(key_from_stem) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_basic_ops() {
        let mut s = MemoryStore::new();
        assert_eq!(s.get("k").unwrap(), None);
        s.put("k", "v1").unwrap();
        s.put("k", "v2").unwrap();
        assert_eq!(s.get("k").unwrap().as_deref(), Some("v2"));
        assert!(s.delete("k").unwrap());
        assert!(!s.delete("k").unwrap());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut s = FileStore::new(dir.path()).unwrap();
            s.put("lifequest_slot1", "{\"a\":1}").unwrap();
        }
        let s = FileStore::new(dir.path()).unwrap();
        assert_eq!(s.get("lifequest_slot1").unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(s.keys().unwrap(), vec!["lifequest_slot1".to_string()]);
        // No temp files are left behind.
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn account_keys_map_to_safe_file_names() {
        assert_eq!(file_stem("lifequest_slot2"), "lifequest_slot2");
        assert_eq!(file_stem("lifequest_account:ava@example.com"), "lifequest_account%3Aava@example.com");
        assert_eq!(file_stem("a+b%"), "a%2Bb%25");
        for key in ["lifequest_account:a+b@example.com", "x%2By", "caf\u{e9}"] {
            assert_eq!(key_from_stem(&file_stem(key)).as_deref(), Some(key));
        }
        assert_eq!(key_from_stem("bad%zz"), None);
    }

    #[test]
    fn similar_emails_do_not_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = FileStore::new(dir.path()).unwrap();
        s.put("lifequest_account:a+b@example.com", "alice").unwrap();
        s.put("lifequest_account:a_b@example.com", "bob").unwrap();
        assert_eq!(s.get("lifequest_account:a+b@example.com").unwrap().as_deref(), Some("alice"));
        assert_eq!(s.get("lifequest_account:a_b@example.com").unwrap().as_deref(), Some("bob"));
        assert_eq!(
            s.keys().unwrap(),
            vec![
                "lifequest_account:a+b@example.com".to_string(),
                "lifequest_account:a_b@example.com".to_string(),
            ]
        );
    }
}
