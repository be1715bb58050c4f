use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    detection::{orchestrator::ScanOrchestrator, user::UserAggregator},
    error::{Result, ScanError},
    loader::{FsImageLoader, ImageLoader, ReferenceIcon},
};

pub mod analysis;
pub mod detection;
pub mod error;
pub mod image_utils;
pub mod loader;
pub mod report;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Minimum correlation for the reference icon to count as present.
    pub icon_threshold: f64,
    /// Laplacian variance below which an image is blurry.
    pub blur_threshold: f64,
    /// Histogram correlation at which two images are too similar.
    pub variation_threshold: f64,
    /// Side of the square raster fingerprints are computed over.
    pub canonical_size: u32,
    pub flagged_ratio_threshold: f64,
    pub duplicate_threshold: usize,
    pub variation_pair_threshold: usize,
    pub parallel: bool,
    /// Worker pool size; `None` lets rayon decide.
    pub threads: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            icon_threshold: 0.33,
            blur_threshold: 100.0,
            variation_threshold: 0.9,
            canonical_size: 100,
            flagged_ratio_threshold: 0.5,
            duplicate_threshold: 0,
            variation_pair_threshold: 2,
            parallel: true,
            threads: None,
        }
    }
}

impl ScanConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: ScanConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let correlation = -1.0..=1.0;

        if !correlation.contains(&self.icon_threshold) {
            return Err(ScanError::InvalidParameter(
                "icon_threshold must be between -1 and 1".into(),
            ));
        }
        if !correlation.contains(&self.variation_threshold) {
            return Err(ScanError::InvalidParameter(
                "variation_threshold must be between -1 and 1".into(),
            ));
        }
        if self.blur_threshold.is_nan() || self.blur_threshold < 0.0 {
            return Err(ScanError::InvalidParameter(
                "blur_threshold must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.flagged_ratio_threshold) {
            return Err(ScanError::InvalidParameter(
                "flagged_ratio_threshold must be between 0 and 1".into(),
            ));
        }
        if self.canonical_size == 0 {
            return Err(ScanError::InvalidParameter(
                "canonical_size must be positive".into(),
            ));
        }
        if self.threads == Some(0) {
            return Err(ScanError::InvalidParameter(
                "threads must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

/// Loads the reference icon once and scans user folders against it.
pub struct FraudScanner {
    icon: Arc<ReferenceIcon>,
    config: ScanConfig,
    loader: Arc<dyn ImageLoader>,
}

impl FraudScanner {
    pub fn new<P: AsRef<Path>>(icon_path: P) -> Result<Self> {
        Ok(Self::from_icon(ReferenceIcon::load(icon_path)?))
    }

    pub fn from_icon(icon: ReferenceIcon) -> Self {
        Self {
            icon: Arc::new(icon),
            config: ScanConfig::default(),
            loader: Arc::new(FsImageLoader),
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn aggregator(&self) -> Result<UserAggregator> {
        self.config.validate()?;
        Ok(UserAggregator::new(
            self.loader.clone(),
            self.icon.clone(),
            &self.config,
        ))
    }

    pub fn scan_folder<P: AsRef<Path>>(&self, folder: P) -> Result<UserScanResult> {
        self.aggregator()?.scan_user(folder.as_ref())
    }

    pub fn scan<P: AsRef<Path> + Sync>(&self, folders: &[P]) -> Result<GlobalScanResult> {
        let orchestrator = ScanOrchestrator::new(self.aggregator()?, &self.config)?;
        orchestrator.scan_all(folders)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagReason {
    IconPresent,
    Blurry,
}

impl fmt::Display for FlagReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagReason::IconPresent => f.write_str("icon-present"),
            FlagReason::Blurry => f.write_str("blurry"),
        }
    }
}

/// Reasons attached to image names. Adding a reason twice has no effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionFlags {
    flags: BTreeMap<String, BTreeSet<FlagReason>>,
}

impl DetectionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the image already carried this reason.
    pub fn flag(&mut self, name: &str, reason: FlagReason) -> bool {
        self.flags.entry(name.to_string()).or_default().insert(reason)
    }

    pub fn reasons(&self, name: &str) -> Option<&BTreeSet<FlagReason>> {
        self.flags.get(name)
    }

    /// Number of distinct flagged images.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<FlagReason>)> {
        self.flags.iter().map(|(name, reasons)| (name.as_str(), reasons))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuspicionReason {
    FlaggedRatio { flagged: usize, total: usize },
    DuplicateImages { count: usize },
    SimilarVariations { pairs: usize },
}

impl fmt::Display for SuspicionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspicionReason::FlaggedRatio { flagged, total } => write!(
                f,
                "High proportion of flagged images ({flagged} of {total})"
            ),
            SuspicionReason::DuplicateImages { count } => {
                write!(f, "Repeated images in the collection ({count} duplicate(s))")
            }
            SuspicionReason::SimilarVariations { pairs } => write!(
                f,
                "Near-identical tonal variations ({pairs} similar pair(s))"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserScanResult {
    pub user: String,
    pub folder: PathBuf,
    /// Raw listing size, undecodable files included.
    pub total_images: usize,
    pub undecodable: usize,
    pub flags: DetectionFlags,
    pub icon_matches: Vec<PathBuf>,
    pub duplicate_count: usize,
    pub variation_pairs: usize,
    pub suspected: bool,
    pub reasons: Vec<SuspicionReason>,
}

impl UserScanResult {
    pub fn flagged_images(&self) -> Vec<&str> {
        self.flags.names().collect()
    }

    pub fn flagged_count(&self) -> usize {
        self.flags.len()
    }

    pub fn flagged_ratio(&self) -> f64 {
        if self.total_images == 0 {
            0.0
        } else {
            self.flags.len() as f64 / self.total_images as f64
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GlobalScanResult {
    pub images_with_icon: Vec<PathBuf>,
    pub suspected_users: Vec<UserScanResult>,
    pub users_scanned: usize,
}

impl GlobalScanResult {
    /// Merges per-user results in the order given.
    pub fn from_user_results(results: Vec<UserScanResult>) -> Self {
        let users_scanned = results.len();
        let mut images_with_icon = Vec::new();
        let mut suspected_users = Vec::new();

        for result in results {
            images_with_icon.extend(result.icon_matches.iter().cloned());
            if result.suspected {
                suspected_users.push(result);
            }
        }

        Self {
            images_with_icon,
            suspected_users,
            users_scanned,
        }
    }
}
