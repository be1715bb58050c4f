use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use image::GrayImage;
use log::{debug, info, warn};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    DetectionFlags, FlagReason, ScanConfig, UserScanResult,
    analysis::{
        blur::BlurDetector,
        fingerprint::{DuplicateHasher, DuplicateTracker, Fingerprint},
        icon_match::IconMatcher,
        variation::{HistogramSignature, VariationComparator},
    },
    detection::SuspicionRule,
    error::Result,
    image_utils::{fits_within, to_gray},
    loader::{ImageLoader, ReferenceIcon},
};

/// Outcome of the per-image phase for one listing entry.
enum Inspection {
    Undecodable,
    Undersized {
        fingerprint: Fingerprint,
    },
    Analyzed {
        fingerprint: Fingerprint,
        icon_present: bool,
        blurry: bool,
        gray: GrayImage,
    },
}

struct InspectedImage {
    name: String,
    path: PathBuf,
    inspection: Inspection,
}

/// Runs every detector over one user's folder and applies the suspicion rule.
pub struct UserAggregator {
    loader: Arc<dyn ImageLoader>,
    icon: Arc<ReferenceIcon>,
    matcher: IconMatcher,
    blur: BlurDetector,
    hasher: DuplicateHasher,
    variation: VariationComparator,
    rule: SuspicionRule,
    parallel: bool,
}

impl UserAggregator {
    pub fn new(loader: Arc<dyn ImageLoader>, icon: Arc<ReferenceIcon>, config: &ScanConfig) -> Self {
        Self {
            loader,
            matcher: IconMatcher::new(icon.clone(), config.icon_threshold),
            icon,
            blur: BlurDetector::new(config.blur_threshold),
            hasher: DuplicateHasher::new(config.canonical_size),
            variation: VariationComparator::new(config.variation_threshold),
            rule: SuspicionRule::from_config(config),
            parallel: config.parallel,
        }
    }

    pub fn scan_user(&self, folder: &Path) -> Result<UserScanResult> {
        let paths = self.loader.list(folder)?;

        let inspected = if self.parallel {
            paths.par_iter().map(|path| self.inspect(path)).collect::<Vec<_>>()
        } else {
            paths.iter().map(|path| self.inspect(path)).collect::<Vec<_>>()
        };

        let mut tally = UserTally::new(folder, paths.len());
        let mut retained = Vec::new();

        for image in inspected {
            match image.inspection {
                Inspection::Undecodable => tally.undecodable += 1,
                Inspection::Undersized { fingerprint } => {
                    tally.duplicates.observe(fingerprint);
                }
                Inspection::Analyzed {
                    fingerprint,
                    icon_present,
                    blurry,
                    gray,
                } => {
                    if icon_present {
                        tally.flags.flag(&image.name, FlagReason::IconPresent);
                        tally.icon_matches.push(image.path);
                    }
                    if tally.duplicates.observe(fingerprint) {
                        debug!("{}: {} repeats an earlier image", tally.user, image.name);
                    }
                    if blurry {
                        tally.flags.flag(&image.name, FlagReason::Blurry);
                    }
                    retained.push((image.name, gray));
                }
            }
        }

        tally.variation_pairs = self.count_variation_pairs(retained);

        let result = tally.finalize(&self.rule);
        info!(
            "{}: {} images, {} flagged, {} duplicate(s), {} similar pair(s), suspected={}",
            result.user,
            result.total_images,
            result.flagged_count(),
            result.duplicate_count,
            result.variation_pairs,
            result.suspected
        );

        Ok(result)
    }

    fn inspect(&self, path: &Path) -> InspectedImage {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let inspection = match self.loader.load(path) {
            Ok(image) => {
                let gray = to_gray(&image);
                let fingerprint = self.hasher.fingerprint(&image);
                let (icon_w, icon_h) = self.icon.dimensions();

                if fits_within(&gray, icon_w, icon_h) {
                    let found = self.matcher.best_match(&gray);
                    let icon_present = found.is_some_and(|m| self.matcher.accepts(&m));
                    let blurry = self.blur.is_blurry_gray(&gray);
                    if let Some(m) = found {
                        debug!(
                            "{}: icon score {:.3} at ({}, {}), present={} blurry={}",
                            path.display(),
                            m.score,
                            m.x,
                            m.y,
                            icon_present,
                            blurry
                        );
                    }

                    Inspection::Analyzed {
                        fingerprint,
                        icon_present,
                        blurry,
                        gray,
                    }
                } else {
                    debug!(
                        "{}: {}x{} is smaller than the icon, only fingerprinted",
                        path.display(),
                        gray.width(),
                        gray.height()
                    );
                    Inspection::Undersized { fingerprint }
                }
            }
            Err(err) => {
                warn!("Skipping {}: {}", path.display(), err);
                Inspection::Undecodable
            }
        };

        InspectedImage {
            name,
            path: path.to_path_buf(),
            inspection,
        }
    }

    /// All-pairs pass. Runs only once every image of the user is loaded.
    fn count_variation_pairs(&self, mut retained: Vec<(String, GrayImage)>) -> usize {
        retained.sort_by(|a, b| a.0.cmp(&b.0));

        let signatures = if self.parallel {
            retained
                .par_iter()
                .map(|(_, gray)| HistogramSignature::from_gray(gray))
                .collect::<Vec<_>>()
        } else {
            retained
                .iter()
                .map(|(_, gray)| HistogramSignature::from_gray(gray))
                .collect::<Vec<_>>()
        };

        self.variation.count_similar_pairs(&signatures)
    }
}

/// Mutable per-user accumulator, owned by the task scanning that user.
struct UserTally {
    user: String,
    folder: PathBuf,
    total_images: usize,
    undecodable: usize,
    flags: DetectionFlags,
    icon_matches: Vec<PathBuf>,
    duplicates: DuplicateTracker,
    variation_pairs: usize,
}

impl UserTally {
    fn new(folder: &Path, total_images: usize) -> Self {
        let user = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.display().to_string());

        Self {
            user,
            folder: folder.to_path_buf(),
            total_images,
            undecodable: 0,
            flags: DetectionFlags::new(),
            icon_matches: Vec::new(),
            duplicates: DuplicateTracker::new(),
            variation_pairs: 0,
        }
    }

    fn finalize(self, rule: &SuspicionRule) -> UserScanResult {
        let duplicate_count = self.duplicates.duplicates();
        let reasons = rule.evaluate(
            self.total_images,
            self.flags.len(),
            duplicate_count,
            self.variation_pairs,
        );

        UserScanResult {
            user: self.user,
            folder: self.folder,
            total_images: self.total_images,
            undecodable: self.undecodable,
            flags: self.flags,
            icon_matches: self.icon_matches,
            duplicate_count,
            variation_pairs: self.variation_pairs,
            suspected: !reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use image::{DynamicImage, Luma};

    use super::*;
    use crate::error::ScanError;

    /// In-memory folders; paths that are not registered fail to decode.
    #[derive(Default)]
    struct MemoryLoader {
        folders: HashMap<PathBuf, Vec<PathBuf>>,
        images: HashMap<PathBuf, GrayImage>,
        loads: Mutex<Vec<PathBuf>>,
    }

    impl MemoryLoader {
        fn add(&mut self, folder: &str, name: &str, image: Option<GrayImage>) {
            let path = Path::new(folder).join(name);
            self.folders.entry(PathBuf::from(folder)).or_default().push(path.clone());
            if let Some(image) = image {
                self.images.insert(path, image);
            }
        }
    }

    impl ImageLoader for MemoryLoader {
        fn list(&self, folder: &Path) -> Result<Vec<PathBuf>> {
            Ok(self.folders.get(folder).cloned().unwrap_or_default())
        }

        fn load(&self, path: &Path) -> Result<DynamicImage> {
            self.loads.lock().unwrap().push(path.to_path_buf());
            self.images
                .get(path)
                .cloned()
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ScanError::InvalidParameter(format!("corrupt {}", path.display())))
        }
    }

    fn icon() -> Arc<ReferenceIcon> {
        Arc::new(ReferenceIcon::from_gray(GrayImage::from_fn(8, 8, |x, _| {
            Luma([if x < 4 { 0 } else { 255 }])
        })))
    }

    fn checker(size: u32, low: u8, high: u8) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| Luma([if (x + y) % 2 == 0 { low } else { high }]))
    }

    fn aggregator(loader: MemoryLoader, parallel: bool) -> UserAggregator {
        let config = ScanConfig {
            parallel,
            ..ScanConfig::default()
        };
        UserAggregator::new(Arc::new(loader), icon(), &config)
    }

    #[test]
    fn test_empty_folder() {
        let result = aggregator(MemoryLoader::default(), true)
            .scan_user(Path::new("nobody"))
            .unwrap();

        assert_eq!(result.total_images, 0);
        assert!(result.flags.is_empty());
        assert_eq!(result.duplicate_count, 0);
        assert_eq!(result.variation_pairs, 0);
        assert!(!result.suspected);
    }

    #[test]
    fn test_undersized_images_are_only_fingerprinted() {
        let mut loader = MemoryLoader::default();
        let tiny = GrayImage::from_pixel(4, 4, Luma([10]));
        loader.add("u", "a.png", Some(tiny.clone()));
        loader.add("u", "b.png", Some(tiny));

        let result = aggregator(loader, false).scan_user(Path::new("u")).unwrap();

        // Uniform images would be blurry if the blur check ran.
        assert!(result.flags.is_empty());
        assert_eq!(result.duplicate_count, 1);
        assert_eq!(result.variation_pairs, 0);
        assert!(result.suspected);
    }

    #[test]
    fn test_blurry_and_icon_flags_share_one_entry() {
        let mut loader = MemoryLoader::default();
        let mut soft = GrayImage::from_pixel(256, 256, Luma([120]));
        image::imageops::replace(&mut soft, icon().image(), 4, 4);
        loader.add("u", "soft.png", Some(soft));
        loader.add("u", "sharp.png", Some(checker(32, 0, 255)));

        let result = aggregator(loader, true).scan_user(Path::new("u")).unwrap();

        assert_eq!(result.flagged_images(), vec!["soft.png"]);
        assert_eq!(result.flags.reasons("soft.png").map(|r| r.len()), Some(2));
        assert_eq!(result.icon_matches, vec![PathBuf::from("u/soft.png")]);
        assert_eq!(result.flagged_ratio(), 0.5);
    }

    #[test]
    fn test_icon_verdict_uses_single_best_match() {
        let mut stamped = checker(32, 0, 255);
        image::imageops::replace(&mut stamped, icon().image(), 10, 10);
        let mut loader = MemoryLoader::default();
        loader.add("u", "stamped.png", Some(stamped));
        loader.add("u", "plain.png", Some(checker(32, 0, 255)));
        let aggregator = aggregator(loader, false);

        let present = |name: &str| match aggregator.inspect(&Path::new("u").join(name)).inspection {
            Inspection::Analyzed { icon_present, .. } => icon_present,
            _ => panic!("{name} should be analyzed"),
        };

        assert!(present("stamped.png"));
        assert!(!present("plain.png"));
    }

    #[test]
    fn test_undecodable_files_stay_in_total() {
        let mut loader = MemoryLoader::default();
        let mut stamped = checker(32, 0, 255);
        image::imageops::replace(&mut stamped, icon().image(), 10, 10);
        loader.add("u", "stamped.png", Some(stamped));
        loader.add("u", "broken.png", None);

        let result = aggregator(loader, true).scan_user(Path::new("u")).unwrap();

        assert_eq!(result.total_images, 2);
        assert_eq!(result.undecodable, 1);
        assert_eq!(result.flagged_count(), 1);
        assert!(!result.suspected);
    }

    #[test]
    fn test_every_listed_image_is_loaded_once() {
        let mut loader = MemoryLoader::default();
        for name in ["a.png", "b.png", "c.png"] {
            loader.add("u", name, Some(checker(16, 0, 255)));
        }
        let loader = Arc::new(loader);

        let aggregator = UserAggregator::new(loader.clone(), icon(), &ScanConfig::default());
        let result = aggregator.scan_user(Path::new("u")).unwrap();

        assert_eq!(loader.loads.lock().unwrap().len(), 3);
        assert_eq!(result.duplicate_count, 2);
        assert_eq!(result.variation_pairs, 3);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let build = || {
            let mut loader = MemoryLoader::default();
            loader.add("u", "a.png", Some(checker(24, 0, 255)));
            loader.add("u", "b.png", Some(checker(24, 30, 220)));
            loader.add("u", "c.png", Some(GrayImage::from_pixel(24, 24, Luma([50]))));
            loader.add("u", "d.png", None);
            loader
        };

        let parallel = aggregator(build(), true).scan_user(Path::new("u")).unwrap();
        let sequential = aggregator(build(), false).scan_user(Path::new("u")).unwrap();

        assert_eq!(parallel.flags, sequential.flags);
        assert_eq!(parallel.duplicate_count, sequential.duplicate_count);
        assert_eq!(parallel.variation_pairs, sequential.variation_pairs);
        assert_eq!(parallel.reasons, sequential.reasons);
    }
}
