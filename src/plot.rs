//! Marginal posterior plots.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use itertools::Itertools;
use plotters::prelude::*;

use crate::result::SamplerResult;
use crate::summary::Histogram;

const PLOT_SIZE: (u32, u32) = (960, 720);

impl SamplerResult {
    /// Draw one histogram per sampled parameter to `{outdir}/{label}_{key}.png`.
    ///
    /// The injected value, when known, is drawn as a red vertical line.
    /// Returns the written paths.
    pub fn plot_marginals(&self, bins: usize) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.outdir)
            .with_context(|| format!("Failed to create output directory: {:?}", self.outdir))?;

        let mut paths = Vec::with_capacity(self.search_parameter_keys.len());
        for key in &self.search_parameter_keys {
            let Some(histogram) = self
                .posterior
                .column(key)
                .and_then(|column| Histogram::new(column, bins))
            else {
                continue;
            };
            let truth = self
                .injection_parameters
                .as_ref()
                .and_then(|p| p.get(key))
                .filter(|x| x.is_finite());
            let path = self.outdir.join(format!("{}_{}.png", self.label, key));
            plot_histogram(&histogram, key, truth, &path)
                .with_context(|| format!("Failed to plot '{key}' to {:?}", path))?;
            paths.push(path);
        }
        Ok(paths)
    }
}

fn plot_histogram(histogram: &Histogram, key: &str, truth: Option<f64>, path: &Path) -> Result<()> {
    let density = histogram.density();
    let (mut low, mut high) = match (histogram.edges.first(), histogram.edges.last()) {
        (Some(&low), Some(&high)) => (low, high),
        _ => return Ok(()),
    };
    if let Some(truth) = truth {
        let pad = 0.05 * (high - low);
        low = low.min(truth - pad);
        high = high.max(truth + pad);
    }
    let top = density.iter().copied().fold(0f64, f64::max) * 1.1;

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(key, ("sans-serif", 30).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(low..high, 0f64..top)?;

    chart
        .configure_mesh()
        .x_desc(key)
        .y_desc("Probability density")
        .draw()?;

    chart.draw_series(
        density
            .iter()
            .zip(histogram.edges.iter().tuple_windows())
            .map(|(&height, (&left, &right))| {
                Rectangle::new([(left, 0.), (right, height)], BLUE.mix(0.5).filled())
            }),
    )?;

    if let Some(truth) = truth {
        chart.draw_series(LineSeries::new(
            [(truth, 0.), (truth, top)],
            RED.stroke_width(2),
        ))?;
    }

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::Parameters;
    use crate::prior::Prior;
    use crate::prior_dict::PriorDict;
    use crate::result::{Posterior, LOG_LIKELIHOOD};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn one_png_per_sampled_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let mut priors = PriorDict::new();
        priors.insert("mu", Prior::uniform(0., 5.).unwrap());
        priors.insert("sigma", Prior::uniform(0., 10.).unwrap());
        let mu = (0..200).map(|i| 2. + (i % 17) as f64 / 10.).collect::<Vec<_>>();
        let sigma = (0..200).map(|i| 3. + (i % 11) as f64 / 5.).collect::<Vec<_>>();
        let result = SamplerResult {
            label: "plots".to_string(),
            outdir: dir.path().join("outdir"),
            sampler: "nested".to_string(),
            search_parameter_keys: vec!["mu".to_string(), "sigma".to_string()],
            fixed_parameter_keys: vec![],
            priors,
            posterior: Posterior::from_columns([
                ("mu", mu),
                ("sigma", sigma),
                (LOG_LIKELIHOOD, vec![-1.; 200]),
            ])
            .unwrap(),
            nested_samples: None,
            log_evidence: None,
            log_evidence_err: None,
            log_noise_evidence: None,
            log_bayes_factor: None,
            num_likelihood_evaluations: 0,
            sampling_time: Duration::ZERO,
            injection_parameters: Some(Parameters::from([("mu", 3.), ("sigma", 4.)])),
        };

        let paths = result.plot_marginals(20).unwrap();
        assert_eq!(
            paths,
            vec![
                dir.path().join("outdir").join("plots_mu.png"),
                dir.path().join("outdir").join("plots_sigma.png"),
            ]
        );
        for path in paths {
            let bytes = std::fs::read(&path).unwrap();
            assert_eq!(&bytes[1..4], b"PNG");
        }
    }
}
