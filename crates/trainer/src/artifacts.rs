//! Files written into a run folder.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use smmpredict_models::Model;
use std::fs;
use std::path::Path;
use tracing::info;

pub const MODEL_FILE: &str = "feature_tree.json";
pub const CV_RESULTS_FILE: &str = "cv_results.json";
pub const RFECV_FILE: &str = "rfecv.json";
pub const EVALUATION_FILE: &str = "evaluation.json";

/// A fitted model together with what is needed to evaluate it again: the
/// feature columns it was trained on and the held-out rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub features: Vec<String>,
    pub model: Model,
    pub test_indices: Vec<usize>,
}

impl ModelArtifact {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        read_json(path)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let blob = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&blob).with_context(|| format!("parsing {}", path.display()))
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let blob = serde_json::to_vec_pretty(value)?;
    fs::write(path, blob).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "wrote artifact");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use smmpredict_models::{Hyperparameters, ModelKind, ModelSpec, Regressor};

    #[test]
    fn test_artifact_round_trip() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut model = ModelSpec::new(ModelKind::DecisionTree, Hyperparameters::default(), 5)
            .build()
            .unwrap();
        model.fit(x.view(), y.view()).unwrap();

        let artifact = ModelArtifact {
            features: vec!["a".into(), "b".into()],
            model,
            test_indices: vec![7, 9],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(MODEL_FILE);
        artifact.save_to_file(&path).unwrap();

        let loaded = ModelArtifact::load_from_file(&path).unwrap();
        assert_eq!(loaded.features, artifact.features);
        assert_eq!(loaded.test_indices, vec![7, 9]);
        assert_eq!(loaded.model.kind(), ModelKind::DecisionTree);
        let expected: Array1<f64> = artifact.model.predict(x.view()).unwrap();
        let got = loaded.model.predict(x.view()).unwrap();
        for (a, b) in expected.iter().zip(got.iter()) {
            approx::assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModelArtifact::load_from_file(&dir.path().join(MODEL_FILE)).is_err());
    }
}
