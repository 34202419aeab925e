use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use color_eyre::{eyre::eyre, Result};
use tempfile::{Builder, NamedTempFile};
use tracing::debug;

const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Photo copied into the faces directory under a unique name. Removed again
/// on drop unless [`StagedPhoto::keep`] is called.
pub struct StagedPhoto {
    file: NamedTempFile,
    reference: String,
}

impl StagedPhoto {
    /// File name recorded as the voter's photo reference.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Keep the photo once the voter it belongs to is registered.
    pub fn keep(self) -> Result<PathBuf> {
        let (_, path) = self.file.keep().map_err(|e| e.error)?;
        debug!(?path, "stored voter photo");
        Ok(path)
    }
}

/// Copy a voter photo into `faces_dir` as `<voter id>-<random>.<ext>`.
/// Distinct voters never collide, whatever their source files are called.
pub fn stage_photo(faces_dir: &Path, voter_id: &str, source: &Path) -> Result<StagedPhoto> {
    let extension = source
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(eyre!("photo must be a jpg or png file: {}", source.display()));
    }

    fs::create_dir_all(faces_dir)?;
    let mut file = Builder::new()
        .prefix(&format!("{}-", file_stem_for(voter_id)))
        .suffix(&format!(".{extension}"))
        .tempfile_in(faces_dir)?;
    io::copy(&mut File::open(source)?, file.as_file_mut())?;

    let reference = file
        .path()
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| eyre!("staged photo has no usable file name"))?
        .to_string();
    Ok(StagedPhoto { file, reference })
}

/// Voter id reduced to characters safe in a file name.
fn file_stem_for(voter_id: &str) -> String {
    let stem: String = voter_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "voter".to_string()
    } else {
        stem
    }
}
