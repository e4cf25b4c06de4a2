//! Update strategy selection
//!
//! Pure and deterministic: the same changed set and cache state always yield
//! the same [`UpdateType`]. Rules are checked in order, first match wins:
//!
//! 1. more unique changed files than `max_incremental_files` -> full
//! 2. changed/cached ratio above `full_update_threshold` -> full
//! 3. any template/markup file changed -> template refresh
//! 4. between one and `max_section_updates - 1` known sections affected -> section
//! 5. otherwise -> incremental

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;

/// How a batch is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UpdateType {
    /// Drop every cached artifact and regenerate everything
    #[serde(rename = "full")]
    FullRegeneration,
    /// Invalidate exactly the changed files; re-analysis is lazy
    #[serde(rename = "incremental")]
    IncrementalUpdate,
    /// Regenerate the affected sections only
    #[serde(rename = "section")]
    SectionUpdate,
    /// Invalidate compiled templates for the changed template files
    #[serde(rename = "template")]
    TemplateRefresh,
}

impl UpdateType {
    /// Short wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullRegeneration => "full",
            Self::IncrementalUpdate => "incremental",
            Self::SectionUpdate => "section",
            Self::TemplateRefresh => "template",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Choose the strategy for one batch
///
/// `total_cached` is the number of analyses currently cached; the ratio rule
/// is skipped when it is zero. `matched_sections` is the number of registered
/// sections the changed files map to.
#[must_use]
pub fn select_strategy(
    changed: &BTreeSet<String>,
    total_cached: usize,
    matched_sections: usize,
    config: &SchedulerConfig,
) -> UpdateType {
    if changed.len() > config.max_incremental_files {
        return UpdateType::FullRegeneration;
    }

    if total_cached > 0 {
        #[allow(clippy::cast_precision_loss)]
        let ratio = changed.len() as f64 / total_cached as f64;
        if ratio > config.full_update_threshold {
            return UpdateType::FullRegeneration;
        }
    }

    if changed.iter().any(|path| config.is_template(path)) {
        return UpdateType::TemplateRefresh;
    }

    if matched_sections > 0 && matched_sections < config.max_section_updates {
        return UpdateType::SectionUpdate;
    }

    UpdateType::IncrementalUpdate
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn changed(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn too_many_files_is_full() {
        let config = SchedulerConfig::default();
        let files: BTreeSet<String> = (0..11).map(|i| format!("src/{i}.ts")).collect();
        assert_eq!(
            select_strategy(&files, 1000, 0, &config),
            UpdateType::FullRegeneration
        );
    }

    #[test]
    fn high_ratio_is_full() {
        let config = SchedulerConfig::default();
        assert_eq!(
            select_strategy(&changed(&["a.ts", "b.ts"]), 3, 0, &config),
            UpdateType::FullRegeneration
        );
        // exactly at the threshold is not above it
        assert_eq!(
            select_strategy(&changed(&["a.ts", "b.ts"]), 4, 0, &config),
            UpdateType::IncrementalUpdate
        );
    }

    #[test]
    fn empty_cache_skips_ratio_rule() {
        let config = SchedulerConfig::default();
        assert_eq!(
            select_strategy(&changed(&["a.ts"]), 0, 0, &config),
            UpdateType::IncrementalUpdate
        );
    }

    #[test]
    fn template_beats_sections() {
        let config = SchedulerConfig::default();
        assert_eq!(
            select_strategy(&changed(&["templates/base.hbs"]), 50, 2, &config),
            UpdateType::TemplateRefresh
        );
    }

    #[test]
    fn few_sections_is_section_update() {
        let config = SchedulerConfig::default();
        let files = changed(&["a.ts"]);
        assert_eq!(select_strategy(&files, 50, 1, &config), UpdateType::SectionUpdate);
        assert_eq!(select_strategy(&files, 50, 4, &config), UpdateType::SectionUpdate);
        assert_eq!(select_strategy(&files, 50, 5, &config), UpdateType::IncrementalUpdate);
    }

    #[test]
    fn scenario_single_change_among_fifty_is_incremental() {
        let config = SchedulerConfig::default();
        assert_eq!(
            select_strategy(&changed(&["a.ts"]), 50, 0, &config),
            UpdateType::IncrementalUpdate
        );
    }

    #[test]
    fn wire_names() {
        assert_eq!(UpdateType::TemplateRefresh.to_string(), "template");
        assert_eq!(
            serde_json::to_value(UpdateType::FullRegeneration).unwrap(),
            "full"
        );
    }

    proptest! {
        #[test]
        fn selection_is_deterministic(
            paths in prop::collection::btree_set("[a-d]{1,3}\\.(ts|hbs|md)", 0..15),
            total in 0usize..100,
            sections in 0usize..8,
        ) {
            let config = SchedulerConfig::default();
            let first = select_strategy(&paths, total, sections, &config);
            let second = select_strategy(&paths.clone(), total, sections, &config);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn oversized_batches_are_always_full(
            paths in prop::collection::btree_set("[a-z]{4}\\.ts", 11..30),
            total in 0usize..1000,
            sections in 0usize..8,
        ) {
            let config = SchedulerConfig::default();
            prop_assert_eq!(
                select_strategy(&paths, total, sections, &config),
                UpdateType::FullRegeneration
            );
        }
    }
}
