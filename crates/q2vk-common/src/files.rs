// files.rs — virtual file loading
//
// The render core never touches the disk layout directly; everything goes
// through this loader so the embedding shell can route paths into pak
// archives, mod directories, or downloaded content.

use std::collections::HashMap;
use std::path::PathBuf;

/// Loader returning raw bytes for a virtual path ("maps/base1.bsp").
pub trait FileLoader: Send + Sync {
    /// Load the full contents of `path`, or `None` if it does not exist.
    fn load(&self, path: &str) -> Option<Vec<u8>>;

    /// The writable game directory, used for screenshots.
    fn gamedir(&self) -> &str;
}

/// Loader rooted at a single directory tree.
pub struct DirLoader {
    root: PathBuf,
    gamedir: String,
}

impl DirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let gamedir = root.to_string_lossy().into_owned();
        Self { root, gamedir }
    }
}

impl FileLoader for DirLoader {
    fn load(&self, path: &str) -> Option<Vec<u8>> {
        std::fs::read(self.root.join(path)).ok()
    }

    fn gamedir(&self) -> &str {
        &self.gamedir
    }
}

/// In-memory loader for tests and embedded assets.
#[derive(Default)]
pub struct MemLoader {
    files: HashMap<String, Vec<u8>>,
    gamedir: String,
}

impl MemLoader {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            gamedir: ".".to_string(),
        }
    }

    pub fn insert(&mut self, path: &str, data: Vec<u8>) {
        self.files.insert(path.to_string(), data);
    }
}

impl FileLoader for MemLoader {
    fn load(&self, path: &str) -> Option<Vec<u8>> {
        self.files.get(path).cloned()
    }

    fn gamedir(&self) -> &str {
        &self.gamedir
    }
}
