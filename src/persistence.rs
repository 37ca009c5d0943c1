//! On-disk storage of the vector collection.
//!
//! A collection is a single bincode file. Writes go to a sibling temporary
//! file that is renamed over the old one, so an interrupted write never
//! leaves a truncated collection behind.

use crate::error::{RagError, Result};
use crate::vector_store::Collection;
use std::fs;
use std::path::{Path, PathBuf};

/// Collection file name inside the collection directory.
pub const DEFAULT_COLLECTION_FILENAME: &str = "collection.bin";

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `collection` to `path`, creating parent directories as needed.
pub fn save_collection(collection: &Collection, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| RagError::persistence(parent, e))?;
        }
    }

    let data = bincode::encode_to_vec(collection, bincode::config::standard())
        .map_err(|e| RagError::Serialization(e.to_string()))?;

    let tmp = temp_path(path);
    fs::write(&tmp, &data).map_err(|e| RagError::persistence(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        RagError::persistence(path, e)
    })
}

/// Read a collection written by [`save_collection`].
pub fn load_collection(path: &Path) -> Result<Collection> {
    if !path.exists() {
        return Err(RagError::NotFound(path.to_path_buf()));
    }

    let data = fs::read(path).map_err(|e| RagError::persistence(path, e))?;
    let (collection, _): (Collection, usize) =
        bincode::decode_from_slice(&data, bincode::config::standard())
            .map_err(|e| RagError::Serialization(e.to_string()))?;
    Ok(collection)
}

/// Whether a collection file exists at `path`.
pub fn collection_exists(path: &Path) -> bool {
    path.is_file()
}

/// Size of the collection file in bytes.
pub fn collection_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| RagError::persistence(path, e))?;
    Ok(metadata.len())
}
