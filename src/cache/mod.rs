//! Content-keyed, read-through cache for detector output.
//!
//! Three namespaces live under one root: `chords/<fp>.json`, `keys/<fp>.txt`
//! and `tempo/<fp>.txt`. Entries are never invalidated. Every I/O failure is
//! logged and treated as a miss (reads) or a no-op (writes).

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::detector::RawChord;

const EDGE_BYTES: u64 = 1024 * 1024;

/// Fast content fingerprint: file size plus the first and last MiB.
pub fn fingerprint(path: &Path) -> String {
    match hash_edges(path) {
        Ok(hex) => hex,
        Err(err) => {
            log::warn!("Fingerprinting {} failed ({}); keying by name", path.display(), err);
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            format!("{:x}", Sha256::digest(name.as_bytes()))
        }
    }
}

fn hash_edges(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut hasher = Sha256::new();
    hasher.update(size.to_string().as_bytes());

    let mut head = Vec::new();
    (&mut file).take(EDGE_BYTES).read_to_end(&mut head)?;
    hasher.update(&head);

    if size > 2 * EDGE_BYTES {
        file.seek(SeekFrom::End(-(EDGE_BYTES as i64)))?;
        let mut tail = Vec::new();
        file.take(EDGE_BYTES).read_to_end(&mut tail)?;
        hasher.update(&tail);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
    Chords,
    Keys,
    Tempo,
}

impl Namespace {
    fn dir(self) -> &'static str {
        match self {
            Namespace::Chords => "chords",
            Namespace::Keys => "keys",
            Namespace::Tempo => "tempo",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Namespace::Chords => "json",
            Namespace::Keys | Namespace::Tempo => "txt",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DetectionCache {
    root: PathBuf,
}

impl DetectionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        for ns in [Namespace::Chords, Namespace::Keys, Namespace::Tempo] {
            let dir = root.join(ns.dir());
            if let Err(err) = std::fs::create_dir_all(&dir) {
                log::warn!("Cannot create cache dir {}: {}", dir.display(), err);
            }
        }
        Self { root }
    }

    pub fn entry_path(&self, ns: Namespace, fingerprint: &str) -> PathBuf {
        self.root
            .join(ns.dir())
            .join(format!("{}.{}", fingerprint, ns.extension()))
    }

    fn read(&self, ns: Namespace, fingerprint: &str) -> Option<String> {
        let path = self.entry_path(ns, fingerprint);
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("Cache read {} failed: {}", path.display(), err);
                None
            }
        }
    }

    /// Write through a temp file in the same directory, then rename into place.
    fn write(&self, ns: Namespace, fingerprint: &str, content: &str) {
        let path = self.entry_path(ns, fingerprint);
        let result = (|| -> std::io::Result<()> {
            let dir = path.parent().unwrap_or(&self.root);
            std::fs::create_dir_all(dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(content.as_bytes())?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })();
        if let Err(err) = result {
            log::warn!("Cache write {} failed: {}", path.display(), err);
        }
    }

    pub fn read_chords(&self, fingerprint: &str) -> Option<Vec<RawChord>> {
        let content = self.read(Namespace::Chords, fingerprint)?;
        match serde_json::from_str(&content) {
            Ok(chords) => Some(chords),
            Err(err) => {
                log::warn!("Ignoring corrupt chord cache entry {}: {}", fingerprint, err);
                None
            }
        }
    }

    pub fn write_chords(&self, fingerprint: &str, chords: &[RawChord]) {
        match serde_json::to_string(chords) {
            Ok(json) => self.write(Namespace::Chords, fingerprint, &json),
            Err(err) => log::warn!("Cannot serialize chords for cache: {}", err),
        }
    }

    pub fn read_key(&self, fingerprint: &str) -> Option<String> {
        let key = self.read(Namespace::Keys, fingerprint)?.trim().to_string();
        (!key.is_empty()).then_some(key)
    }

    pub fn write_key(&self, fingerprint: &str, key: &str) {
        self.write(Namespace::Keys, fingerprint, key);
    }

    pub fn read_tempo(&self, fingerprint: &str) -> Option<f32> {
        let content = self.read(Namespace::Tempo, fingerprint)?;
        content.trim().parse::<f32>().ok().filter(|t| t.is_finite())
    }

    pub fn write_tempo(&self, fingerprint: &str, tempo: f32) {
        self.write(Namespace::Tempo, fingerprint, &tempo.to_string());
    }
}
