//! Model package layout.

use std::path::{Path, PathBuf};

pub const PRIMARY_INDEX_FILE: &str = "m1.index";
pub const SECONDARY_INDEX_FILE: &str = "m2.index";
pub const DETECTORS_FILE: &str = "Detectors.json";
pub const SAMPLE_UTTERANCES_FILE: &str = "SampleUtterances.json";
pub const MAPPINGS_FILE: &str = "Mappings.json";
pub const MODEL_INFO_FILE: &str = "ModelInfo.json";

/// Artifact paths resolved against a package directory.
#[derive(Clone, Debug)]
pub struct PackageFiles {
    pub primary_index: PathBuf,
    pub secondary_index: PathBuf,
    pub detectors: PathBuf,
    pub sample_utterances: PathBuf,
    /// Only read when the model declares split detector content
    pub mappings: PathBuf,
    pub model_info: PathBuf,
}

impl PackageFiles {
    /// Resolve artifact paths. Relative package paths are made absolute
    /// against the current directory.
    pub fn resolve(package_dir: &Path) -> Self {
        let base = std::path::absolute(package_dir).unwrap_or_else(|_| package_dir.to_path_buf());

        Self {
            primary_index: base.join(PRIMARY_INDEX_FILE),
            secondary_index: base.join(SECONDARY_INDEX_FILE),
            detectors: base.join(DETECTORS_FILE),
            sample_utterances: base.join(SAMPLE_UTTERANCES_FILE),
            mappings: base.join(MAPPINGS_FILE),
            model_info: base.join(MODEL_INFO_FILE),
        }
    }

    fn mandatory(&self) -> [&Path; 5] {
        [
            &self.primary_index,
            &self.secondary_index,
            &self.detectors,
            &self.sample_utterances,
            &self.model_info,
        ]
    }

    /// Mandatory artifacts that are missing or not regular files.
    pub fn missing(&self) -> Vec<PathBuf> {
        self.mandatory()
            .into_iter()
            .filter(|path| {
                let present = path.is_file();
                if !present {
                    log::error!("package file missing path={}", path.display());
                }
                !present
            })
            .map(Path::to_path_buf)
            .collect()
    }
}
