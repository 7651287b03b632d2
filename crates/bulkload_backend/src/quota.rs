//! Disk-quota admission policy.

use crate::backend::EngineFileSize;
use crate::identity::EngineUuid;

/// Outcome of a disk quota check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskQuotaReport {
    /// Idle engines that should be force-imported, smallest first.
    pub large_engines: Vec<EngineUuid>,
    /// Engines over the quota that are already being imported.
    pub in_progress_large_engines: usize,
    /// Total local size of all engines.
    pub total_size: i64,
}

impl DiskQuotaReport {
    /// Returns true if no engine needs to be acted upon.
    pub fn is_within_quota(&self) -> bool {
        self.large_engines.is_empty() && self.in_progress_large_engines == 0
    }
}

/// Ranks engines against `quota`.
///
/// Engines that are not importing come first, ascending by size; engines
/// already importing come last. Sizes are accumulated in that order and every
/// engine whose inclusion pushes the running total above the quota is over
/// the line: importing ones are only counted so that concurrent checks do not
/// request the same import twice, the others are returned for a forced import.
pub fn check_disk_quota(mut sizes: Vec<EngineFileSize>, quota: i64) -> DiskQuotaReport {
    sizes.sort_by(|a, b| {
        a.is_importing
            .cmp(&b.is_importing)
            .then_with(|| a.size.cmp(&b.size))
    });

    let mut report = DiskQuotaReport::default();
    for size in &sizes {
        report.total_size += size.size;
        if report.total_size > quota {
            if size.is_importing {
                report.in_progress_large_engines += 1;
            } else {
                report.large_engines.push(size.uuid);
            }
        }
    }
    report
}
