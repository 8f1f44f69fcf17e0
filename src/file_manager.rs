use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{MirrorError, Result};
use crate::paths::LocalPath;

/// Writes mirrored resources below a fixed output root.
#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    pub fn new(base_dir: &Path) -> Result<Self> {
        let base_dir = base_dir.to_path_buf();
        fs::create_dir_all(&base_dir).map_err(|source| MirrorError::CreateDirectory {
            path: base_dir.clone(),
            source,
        })?;

        Ok(Self { base_dir })
    }

    fn directory_for(&self, location: &LocalPath) -> PathBuf {
        let mut path = self.base_dir.clone();
        for segment in location.segments().filter(|s| !s.is_empty() && *s != ".") {
            path.push(segment);
        }
        path
    }

    /// Creates the directories for `location` and writes `content` there,
    /// replacing any previous file.
    pub fn save(&self, location: &LocalPath, content: &[u8]) -> Result<PathBuf> {
        let directory = self.directory_for(location);
        fs::create_dir_all(&directory).map_err(|source| MirrorError::CreateDirectory {
            path: directory.clone(),
            source,
        })?;

        let file_path = directory.join(&location.filename);
        fs::File::create(&file_path)
            .and_then(|mut file| file.write_all(content))
            .map_err(|source| MirrorError::WriteFile {
                path: file_path.clone(),
                source,
            })?;

        Ok(file_path)
    }
}
