use std::{
    fs,
    path::{Path, PathBuf},
};

use image::{DynamicImage, GrayImage};

use crate::{
    error::{Result, ScanError},
    image_utils::to_gray,
};

/// Source of user folders and decoded images.
pub trait ImageLoader: Send + Sync {
    /// Every entry of a user folder, in the order it should be processed.
    fn list(&self, folder: &Path) -> Result<Vec<PathBuf>>;

    fn load(&self, path: &Path) -> Result<DynamicImage>;
}

/// Reads folders from disk and decodes with the `image` crate.
#[derive(Debug, Default, Clone)]
pub struct FsImageLoader;

impl ImageLoader for FsImageLoader {
    fn list(&self, folder: &Path) -> Result<Vec<PathBuf>> {
        let listing_error = |source| ScanError::FolderListing {
            path: folder.to_path_buf(),
            source,
        };

        // Every entry counts toward the user's total; entries that are not
        // decodable images (directories included) fail later in `load`.
        let mut entries = Vec::new();
        for entry in fs::read_dir(folder).map_err(listing_error)? {
            entries.push(entry.map_err(listing_error)?.path());
        }

        entries.sort();
        Ok(entries)
    }

    fn load(&self, path: &Path) -> Result<DynamicImage> {
        Ok(image::open(path)?)
    }
}

/// Immediate subdirectories of `root`, sorted, each treated as one user.
pub fn user_folders<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let listing_error = |source| ScanError::FolderListing {
        path: root.to_path_buf(),
        source,
    };

    let mut folders = Vec::new();
    for entry in fs::read_dir(root).map_err(listing_error)? {
        let path = entry.map_err(listing_error)?.path();
        if path.is_dir() {
            folders.push(path);
        }
    }

    folders.sort();
    Ok(folders)
}

/// Grayscale overlay template searched for in every image.
#[derive(Debug, Clone)]
pub struct ReferenceIcon {
    image: GrayImage,
}

impl ReferenceIcon {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|source| ScanError::ReferenceIcon {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_image(&decoded)
    }

    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let gray = to_gray(image);
        if gray.width() == 0 || gray.height() == 0 {
            return Err(ScanError::InvalidParameter(
                "Reference icon must not be empty".into(),
            ));
        }
        Ok(Self { image: gray })
    }

    pub fn from_gray(image: GrayImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// `(width, height)` of the template.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
