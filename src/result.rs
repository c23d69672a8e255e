use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::nonfinite;
use crate::parameters::Parameters;
use crate::prior_dict::PriorDict;
use crate::summary::{self, ParameterSummary};

/// Column name of the per-sample log-likelihood.
pub const LOG_LIKELIHOOD: &str = "log_likelihood";
/// Column name of the per-sample log prior.
pub const LOG_PRIOR: &str = "log_prior";

/// A table of samples with one named column per parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Posterior {
    columns: BTreeMap<String, Column>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
struct Column(#[serde(with = "nonfinite::vec")] Vec<f64>);

impl Posterior {
    /// Build a table from columns, which must all have the same length.
    pub fn from_columns<K: Into<String>>(
        columns: impl IntoIterator<Item = (K, Vec<f64>)>,
    ) -> Result<Self> {
        let columns: BTreeMap<String, Column> = columns
            .into_iter()
            .map(|(k, v)| (k.into(), Column(v)))
            .collect();
        let mut lengths = columns.iter().map(|(k, c)| (k, c.0.len()));
        if let Some((first_key, len)) = lengths.next() {
            if let Some((key, other)) = lengths.find(|(_, l)| *l != len) {
                bail!("Column '{key}' has {other} rows but '{first_key}' has {len}");
            }
        }
        Ok(Self { columns })
    }

    /// Build a table from rows that share the same keys.
    pub fn from_rows(rows: &[Parameters]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Ok(Self::default());
        };
        let mut columns: BTreeMap<String, Vec<f64>> = first
            .keys()
            .map(|k| (k.to_string(), Vec::with_capacity(rows.len())))
            .collect();
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                bail!("Row {idx} has {} values, expected {}", row.len(), columns.len());
            }
            for (key, value) in row.iter() {
                columns
                    .get_mut(key)
                    .with_context(|| format!("Row {idx} has unexpected key '{key}'"))?
                    .push(value);
            }
        }
        Self::from_columns(columns)
    }

    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, |c| c.0.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, key: &str) -> Option<&[f64]> {
        self.columns.get(key).map(|c| c.0.as_slice())
    }

    pub fn row(&self, idx: usize) -> Option<Parameters> {
        if idx >= self.len() {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|(k, c)| (k.clone(), c.0[idx]))
                .collect(),
        )
    }

    /// The table as an Arrow record batch with one `Float64` column per key.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let fields = self
            .columns
            .keys()
            .map(|k| Field::new(k, DataType::Float64, false))
            .collect::<Vec<_>>();
        let arrays = self
            .columns
            .values()
            .map(|c| Arc::new(Float64Array::from(c.0.clone())) as ArrayRef)
            .collect::<Vec<_>>();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .context("Failed to build posterior record batch")
    }
}

/// Weighted samples produced by nested sampling, before resampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedSamples {
    pub samples: Posterior,
    #[serde(with = "nonfinite::vec")]
    pub log_weights: Vec<f64>,
}

/// Everything a sampler run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerResult {
    pub label: String,
    pub outdir: PathBuf,
    pub sampler: String,
    pub search_parameter_keys: Vec<String>,
    pub fixed_parameter_keys: Vec<String>,
    pub priors: PriorDict,
    pub posterior: Posterior,
    pub nested_samples: Option<NestedSamples>,
    #[serde(default, with = "nonfinite::option")]
    pub log_evidence: Option<f64>,
    #[serde(default, with = "nonfinite::option")]
    pub log_evidence_err: Option<f64>,
    #[serde(default, with = "nonfinite::option")]
    pub log_noise_evidence: Option<f64>,
    #[serde(default, with = "nonfinite::option")]
    pub log_bayes_factor: Option<f64>,
    pub num_likelihood_evaluations: u64,
    pub sampling_time: Duration,
    pub injection_parameters: Option<Parameters>,
}

impl SamplerResult {
    pub fn result_path(&self) -> PathBuf {
        result_path(&self.outdir, &self.label)
    }

    /// Write the result as JSON to `{outdir}/{label}_result.json`.
    pub fn save_to_file(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.outdir)
            .with_context(|| format!("Failed to create output directory: {:?}", self.outdir))?;
        let path = self.result_path();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create result file: {:?}", path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write result file: {:?}", path))?;
        Ok(path)
    }

    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open result file: {:?}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse result file: {:?}", path))
    }

    pub fn posterior_record_batch(&self) -> Result<RecordBatch> {
        self.posterior.to_record_batch()
    }

    /// Summaries of the sampled parameters, in sampling order.
    pub fn summary(&self) -> Vec<ParameterSummary> {
        self.search_parameter_keys
            .iter()
            .filter_map(|key| {
                let column = self.posterior.column(key)?;
                ParameterSummary::from_samples(key.as_str(), column)
            })
            .collect()
    }

    /// Posterior median and distances to the 16% and 84% quantiles.
    pub fn median_and_error_bar(&self, key: &str) -> Option<(f64, f64, f64)> {
        summary::median_and_error_bar(self.posterior.column(key)?)
    }
}

pub(crate) fn result_path(outdir: &Path, label: &str) -> PathBuf {
    outdir.join(format!("{label}_result.json"))
}

impl fmt::Display for SamplerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.label, self.sampler)?;
        writeln!(f, "Sampling time: {:.2}s", self.sampling_time.as_secs_f64())?;
        if let Some(log_evidence) = self.log_evidence {
            match self.log_evidence_err {
                Some(err) => writeln!(f, "ln evidence: {log_evidence:.3} +/- {err:.3}")?,
                None => writeln!(f, "ln evidence: {log_evidence:.3}")?,
            }
        }
        if let Some(log_bayes_factor) = self.log_bayes_factor {
            writeln!(f, "ln Bayes factor: {log_bayes_factor:.3}")?;
        }
        writeln!(f, "Likelihood evaluations: {}", self.num_likelihood_evaluations)?;
        writeln!(f, "{} posterior samples", self.posterior.len())?;
        for summary in self.summary() {
            writeln!(f, "    {summary}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::{Constraint, Prior};
    use pretty_assertions::assert_eq;

    fn example_result(outdir: &Path) -> SamplerResult {
        let mut priors = PriorDict::new();
        priors.insert("mu", Prior::uniform(0., 5.).unwrap());
        priors.fix("sigma", 1.).unwrap();
        let posterior = Posterior::from_columns([
            ("mu", vec![1., 2., 3.]),
            ("sigma", vec![1., 1., 1.]),
            (LOG_LIKELIHOOD, vec![-3., -2., -4.]),
            (LOG_PRIOR, vec![-(5f64.ln()); 3]),
        ])
        .unwrap();
        SamplerResult {
            label: "example".to_string(),
            outdir: outdir.to_path_buf(),
            sampler: "nested".to_string(),
            search_parameter_keys: vec!["mu".to_string()],
            fixed_parameter_keys: vec!["sigma".to_string()],
            priors,
            posterior: posterior.clone(),
            nested_samples: Some(NestedSamples {
                samples: posterior,
                log_weights: vec![f64::NEG_INFINITY, -1., -0.5],
            }),
            log_evidence: Some(-2.5),
            log_evidence_err: Some(0.1),
            log_noise_evidence: None,
            log_bayes_factor: None,
            num_likelihood_evaluations: 42,
            sampling_time: Duration::from_millis(1500),
            injection_parameters: Some(Parameters::from([("mu", 2.), ("sigma", 1.)])),
        }
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        assert!(Posterior::from_columns([("a", vec![1., 2.]), ("b", vec![1.])]).is_err());
    }

    #[test]
    fn rows_and_columns_agree() {
        let rows = vec![
            Parameters::from([("a", 1.), ("b", 10.)]),
            Parameters::from([("a", 2.), ("b", 20.)]),
        ];
        let posterior = Posterior::from_rows(&rows).unwrap();
        assert_eq!(posterior.len(), 2);
        assert_eq!(posterior.column("b"), Some(&[10., 20.][..]));
        assert_eq!(posterior.row(1), Some(rows[1].clone()));
        assert_eq!(posterior.row(2), None);

        let bad = vec![rows[0].clone(), Parameters::from([("a", 1.), ("c", 2.)])];
        assert!(Posterior::from_rows(&bad).is_err());
    }

    #[test]
    fn save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let result = example_result(&dir.path().join("outdir"));
        let path = result.save_to_file().unwrap();
        assert_eq!(path, dir.path().join("outdir").join("example_result.json"));
        let loaded = SamplerResult::read_from_file(&path).unwrap();
        assert_eq!(loaded, result);
    }

    #[test]
    fn non_finite_values_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut result = example_result(dir.path());
        result
            .priors
            .insert_constraint("sigma", Constraint::new(0., f64::INFINITY).unwrap());
        result.posterior = Posterior::from_columns([
            ("mu", vec![f64::INFINITY, f64::NAN, 1.]),
            (LOG_LIKELIHOOD, vec![f64::NEG_INFINITY, -1., -2.]),
        ])
        .unwrap();
        result.log_evidence = Some(f64::NEG_INFINITY);
        result.log_noise_evidence = Some(f64::NAN);
        result.injection_parameters = Some(Parameters::from([("mu", f64::INFINITY)]));

        let path = result.save_to_file().unwrap();
        let loaded = SamplerResult::read_from_file(&path).unwrap();

        assert_eq!(loaded.priors, result.priors);
        let mu = loaded.posterior.column("mu").unwrap();
        assert_eq!(mu[0], f64::INFINITY);
        assert!(mu[1].is_nan());
        assert_eq!(mu[2], 1.);
        assert_eq!(
            loaded.posterior.column(LOG_LIKELIHOOD).unwrap()[0],
            f64::NEG_INFINITY
        );
        assert_eq!(loaded.log_evidence, Some(f64::NEG_INFINITY));
        assert!(loaded.log_noise_evidence.is_some_and(f64::is_nan));
        assert_eq!(loaded.log_bayes_factor, None);
        assert_eq!(loaded.injection_parameters, result.injection_parameters);
        assert_eq!(loaded.nested_samples, result.nested_samples);
    }

    #[test]
    fn record_batch_has_every_column() {
        let dir = tempfile::tempdir().unwrap();
        let result = example_result(dir.path());
        let batch = result.posterior_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 4);
        let schema = batch.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec![LOG_LIKELIHOOD, LOG_PRIOR, "mu", "sigma"]);
    }

    #[test]
    fn display_lists_sampled_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let result = example_result(dir.path());
        let text = result.to_string();
        assert!(text.contains("ln evidence: -2.500 +/- 0.100"));
        assert!(text.contains("3 posterior samples"));
        assert!(text.contains("mu"));
        let (median, minus, plus) = result.median_and_error_bar("mu").unwrap();
        assert_eq!(median, 2.);
        assert!(minus > 0. && plus > 0.);
    }
}
