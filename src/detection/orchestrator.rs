use std::path::Path;

use log::info;
use rayon::{
    ThreadPool, ThreadPoolBuilder,
    iter::{IntoParallelRefIterator, ParallelIterator},
};

use crate::{
    GlobalScanResult, ScanConfig, UserScanResult, detection::user::UserAggregator, error::Result,
};

/// Runs the aggregator over every user folder on a bounded pool and merges
/// the per-user results in input order.
pub struct ScanOrchestrator {
    aggregator: UserAggregator,
    pool: Option<ThreadPool>,
}

impl ScanOrchestrator {
    pub fn new(aggregator: UserAggregator, config: &ScanConfig) -> Result<Self> {
        let pool = if config.parallel {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.threads.unwrap_or(0))
                .thread_name(|i| format!("scan-worker-{i}"))
                .build()?;
            Some(pool)
        } else {
            None
        };

        Ok(Self { aggregator, pool })
    }

    pub fn scan_all<P: AsRef<Path> + Sync>(&self, folders: &[P]) -> Result<GlobalScanResult> {
        let results = match &self.pool {
            Some(pool) => {
                info!(
                    "Scanning {} user folder(s) on {} worker(s)",
                    folders.len(),
                    pool.current_num_threads()
                );
                pool.install(|| {
                    folders
                        .par_iter()
                        .map(|folder| self.aggregator.scan_user(folder.as_ref()))
                        .collect::<Result<Vec<UserScanResult>>>()
                })?
            }
            None => folders
                .iter()
                .map(|folder| self.aggregator.scan_user(folder.as_ref()))
                .collect::<Result<Vec<UserScanResult>>>()?,
        };

        let merged = GlobalScanResult::from_user_results(results);
        info!(
            "{} of {} user(s) suspected, {} image(s) carry the icon",
            merged.suspected_users.len(),
            merged.users_scanned,
            merged.images_with_icon.len()
        );

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc};

    use image::{GrayImage, Luma};

    use super::*;
    use crate::loader::{FsImageLoader, ReferenceIcon};

    fn icon() -> Arc<ReferenceIcon> {
        Arc::new(ReferenceIcon::from_gray(GrayImage::from_fn(6, 6, |_, y| {
            Luma([if y < 3 { 0 } else { 255 }])
        })))
    }

    fn orchestrator(config: &ScanConfig) -> ScanOrchestrator {
        let aggregator = UserAggregator::new(Arc::new(FsImageLoader), icon(), config);
        ScanOrchestrator::new(aggregator, config).unwrap()
    }

    #[test]
    fn test_missing_folder_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let folders = vec![dir.path().to_path_buf(), dir.path().join("missing")];

        let result = orchestrator(&ScanConfig::default()).scan_all(&folders);
        assert!(result.is_err());
    }

    #[test]
    fn test_no_folders() {
        let folders: Vec<PathBuf> = Vec::new();
        let result = orchestrator(&ScanConfig::default()).scan_all(&folders).unwrap();

        assert_eq!(result.users_scanned, 0);
        assert!(result.images_with_icon.is_empty());
        assert!(result.suspected_users.is_empty());
    }

    #[test]
    fn test_sequential_mode_has_no_pool() {
        let config = ScanConfig {
            parallel: false,
            ..ScanConfig::default()
        };
        assert!(orchestrator(&config).pool.is_none());
    }

    #[test]
    fn test_pool_respects_thread_count() {
        let config = ScanConfig {
            threads: Some(2),
            ..ScanConfig::default()
        };
        let orchestrator = orchestrator(&config);
        assert_eq!(orchestrator.pool.as_ref().map(|p| p.current_num_threads()), Some(2));
    }
}
