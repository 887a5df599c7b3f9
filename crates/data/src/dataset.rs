//! Training data assembled from raw and derived measurement files.

use crate::mnk::{AlgorithmClass, Mnk, PerfType};
use crate::table::Table;
use anyhow::{bail, ensure, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Measured performance column of the raw data files.
pub const RAW_PERF_COLUMN: &str = "perf (Gflop/s)";

/// Target columns of the derived data files; never used as predictors.
pub const DERIVED_TARGET_COLUMNS: [&str; 3] = ["perf_squared", "perf_scaled", "perf_scaled_by_algo"];

pub fn raw_data_file(in_folder: &Path, algo: AlgorithmClass) -> std::path::PathBuf {
    in_folder.join(format!("raw_training_data_{algo}.csv"))
}

pub fn derived_data_file(in_folder: &Path, algo: AlgorithmClass) -> std::path::PathBuf {
    in_folder.join(format!("training_data_{algo}.csv"))
}

/// Feature matrix, regression target and mnk group of every observation,
/// index-aligned.
#[derive(Debug, Clone)]
pub struct Dataset {
    feature_names: Vec<String>,
    features: Array2<f64>,
    targets: Array1<f64>,
    groups: Vec<Mnk>,
}

impl Dataset {
    pub fn new(
        feature_names: Vec<String>,
        features: Array2<f64>,
        targets: Array1<f64>,
        groups: Vec<Mnk>,
    ) -> Result<Self> {
        ensure!(
            feature_names.len() == features.ncols(),
            "{} feature names for {} feature columns",
            feature_names.len(),
            features.ncols()
        );
        ensure!(
            features.nrows() == targets.len() && targets.len() == groups.len(),
            "row count mismatch: features={}, targets={}, groups={}",
            features.nrows(),
            targets.len(),
            groups.len()
        );
        Ok(Self {
            feature_names,
            features,
            targets,
            groups,
        })
    }

    /// Load `raw_training_data_<algo>.csv` and `training_data_<algo>.csv` from
    /// `in_folder`.
    pub fn load(
        in_folder: &Path,
        algo: AlgorithmClass,
        nrows: Option<usize>,
        perf_type: PerfType,
    ) -> Result<Self> {
        let raw_path = raw_data_file(in_folder, algo);
        info!(path = %raw_path.display(), "reading raw data");
        let raw = Table::read_csv(&raw_path, nrows)?;
        info!(rows = raw.nrows(), cols = raw.columns().len(), "raw data loaded");

        let derived_path = derived_data_file(in_folder, algo);
        info!(path = %derived_path.display(), "reading derived data");
        let derived = Table::read_csv(&derived_path, nrows)?;
        info!(
            rows = derived.nrows(),
            cols = derived.columns().len(),
            "derived data loaded"
        );

        Self::from_tables(&raw, &derived, algo, perf_type)
    }

    pub fn from_tables(
        raw: &Table,
        derived: &Table,
        algo: AlgorithmClass,
        perf_type: PerfType,
    ) -> Result<Self> {
        let mut raw_drop: Vec<&str> = algo.unused_raw_columns().to_vec();
        raw_drop.push(RAW_PERF_COLUMN);
        let predictors = raw
            .without_columns(&raw_drop)
            .concat(&derived.without_columns(&DERIVED_TARGET_COLUMNS))?;

        let target = match perf_type {
            PerfType::Perf => raw.column(RAW_PERF_COLUMN)?,
            other => derived.column(other.as_str())?,
        };

        let groups = mnk_keys(&predictors)?;
        let keep: Vec<usize> = (0..target.len()).filter(|&i| !target[i].is_nan()).collect();
        if keep.len() < target.len() {
            warn!(
                dropped = target.len() - keep.len(),
                "dropping rows without a {perf_type} target"
            );
        }

        let targets = target.select(Axis(0), &keep);
        let groups = keep.iter().map(|&i| groups[i]).collect();
        let (feature_names, values) = predictors.into_parts();
        let features = values.select(Axis(0), &keep);
        Self::new(feature_names, features, targets, groups)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn targets(&self) -> ArrayView1<'_, f64> {
        self.targets.view()
    }

    pub fn groups(&self) -> &[Mnk] {
        &self.groups
    }

    /// Row indices of every group, keyed in ascending mnk order.
    pub fn group_indices(&self) -> BTreeMap<Mnk, Vec<usize>> {
        let mut indices: BTreeMap<Mnk, Vec<usize>> = BTreeMap::new();
        for (row, mnk) in self.groups.iter().enumerate() {
            indices.entry(*mnk).or_default().push(row);
        }
        indices
    }

    pub fn distinct_groups(&self) -> Vec<Mnk> {
        self.group_indices().into_keys().collect()
    }

    pub fn select_rows(&self, rows: &[usize]) -> Result<Dataset> {
        if let Some(&bad) = rows.iter().find(|&&row| row >= self.len()) {
            bail!("row index {bad} out of bounds for {} rows", self.len());
        }
        Ok(Dataset {
            feature_names: self.feature_names.clone(),
            features: self.features.select(Axis(0), rows),
            targets: self.targets.select(Axis(0), rows),
            groups: rows.iter().map(|&row| self.groups[row]).collect(),
        })
    }

    pub fn select_feature_indices(&self, columns: &[usize]) -> Result<Dataset> {
        if let Some(&bad) = columns.iter().find(|&&col| col >= self.n_features()) {
            bail!("feature index {bad} out of bounds for {} features", self.n_features());
        }
        Ok(Dataset {
            feature_names: columns.iter().map(|&c| self.feature_names[c].clone()).collect(),
            features: self.features.select(Axis(1), columns),
            targets: self.targets.clone(),
            groups: self.groups.clone(),
        })
    }

    /// Keep the named features, in dataset column order. Names that do not
    /// occur in the dataset are reported and ignored.
    pub fn retain_features<S: AsRef<str>>(&self, names: &[S]) -> Result<Dataset> {
        for name in names {
            if !self.feature_names.iter().any(|f| f == name.as_ref()) {
                warn!(feature = name.as_ref(), "selected feature not present in data");
            }
        }
        let keep: Vec<usize> = self
            .feature_names
            .iter()
            .enumerate()
            .filter(|(_, f)| names.iter().any(|name| name.as_ref() == f.as_str()))
            .map(|(idx, _)| idx)
            .collect();
        ensure!(!keep.is_empty(), "no selected feature is present in the data");
        self.select_feature_indices(&keep)
    }
}

fn mnk_keys(predictors: &Table) -> Result<Vec<Mnk>> {
    let m = predictors.column("m")?;
    let n = predictors.column("n")?;
    let k = predictors.column("k")?;
    (0..predictors.nrows())
        .map(|row| Ok(Mnk::new(dim(m[row], row)?, dim(n[row], row)?, dim(k[row], row)?)))
        .collect()
}

fn dim(value: f64, row: usize) -> Result<usize> {
    if !(value.is_finite() && value >= 1.0 && value.fract() == 0.0) {
        bail!("row {row}: invalid matrix dimension {value}");
    }
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_table() -> Table {
        Table::parse_csv(
            "\
,m,n,k,threads,w,v,tile_m,tile_n,perf (Gflop/s)
0,2,2,2,32,1,1,1,1,10
1,2,2,2,64,1,1,1,1,20
2,4,4,4,32,1,1,1,1,
3,4,4,4,64,1,1,1,1,80
",
            None,
        )
        .unwrap()
    }

    fn derived_table() -> Table {
        Table::parse_csv(
            "\
,size_a,perf_squared,perf_scaled,perf_scaled_by_algo
0,4,100,0.5,0.5
1,4,400,1.0,1.0
2,16,,,
3,16,6400,1.0,1.0
",
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_from_tables_drops_targets_and_unused_columns() {
        let data = Dataset::from_tables(
            &raw_table(),
            &derived_table(),
            AlgorithmClass::Tiny,
            PerfType::PerfScaled,
        )
        .unwrap();
        assert_eq!(data.feature_names(), &["m", "n", "k", "threads", "size_a"]);
        assert_eq!(data.len(), 3, "row with a missing target is dropped");
        assert_eq!(data.targets().to_vec(), vec![0.5, 1.0, 1.0]);
        assert_eq!(data.groups()[2], Mnk::new(4, 4, 4));
    }

    #[test]
    fn test_large_classes_keep_tiling_columns() {
        let data = Dataset::from_tables(
            &raw_table(),
            &derived_table(),
            AlgorithmClass::LargeDb2,
            PerfType::Perf,
        )
        .unwrap();
        assert!(data.feature_names().iter().any(|f| f == "w"));
        assert!(data.feature_names().iter().any(|f| f == "tile_m"));
        assert_eq!(data.targets().to_vec(), vec![10.0, 20.0, 80.0]);
    }

    #[test]
    fn test_group_indices_and_row_selection() {
        let data = Dataset::from_tables(
            &raw_table(),
            &derived_table(),
            AlgorithmClass::Medium,
            PerfType::Perf,
        )
        .unwrap();
        let groups = data.group_indices();
        assert_eq!(groups[&Mnk::new(2, 2, 2)], vec![0, 1]);
        assert_eq!(groups[&Mnk::new(4, 4, 4)], vec![2]);

        let subset = data.select_rows(&[2]).unwrap();
        assert_eq!(subset.len(), 1);
        assert_eq!(subset.targets()[0], 80.0);
        assert!(data.select_rows(&[7]).is_err());
    }

    #[test]
    fn test_retain_features_keeps_dataset_order() {
        let data = Dataset::from_tables(
            &raw_table(),
            &derived_table(),
            AlgorithmClass::Tiny,
            PerfType::Perf,
        )
        .unwrap();
        let subset = data.retain_features(&["size_a", "m", "not_there"]).unwrap();
        assert_eq!(subset.feature_names(), &["m", "size_a"]);
        assert_eq!(subset.features().ncols(), 2);
        assert!(data.retain_features(&["nothing"]).is_err());
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let err = Dataset::new(
            vec!["a".into()],
            Array2::zeros((2, 1)),
            Array1::zeros(3),
            vec![Mnk::new(1, 1, 1); 2],
        );
        assert!(err.is_err());
    }
}
