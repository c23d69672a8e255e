use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PeError, Result};
use crate::parameters::Parameters;
use crate::prior::{Constraint, Prior};

/// Adds derived parameters before constraints are checked.
pub type ConversionFunction = fn(&Parameters) -> Parameters;

/// How many times [`PriorDict::sample`] redraws before giving up on the constraints.
const MAX_CONSTRAINED_DRAWS: usize = 10_000;

/// A set of named priors, with optional constraints on derived parameters.
///
/// Keys are kept sorted, so the order of the search dimensions is stable
/// across runs and matches the column order of the posterior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorDict {
    priors: BTreeMap<String, Prior>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    constraints: BTreeMap<String, Constraint>,
    #[serde(skip)]
    conversion: Option<ConversionFunction>,
}

impl PartialEq for PriorDict {
    fn eq(&self, other: &Self) -> bool {
        self.priors == other.priors && self.constraints == other.constraints
    }
}

impl PriorDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the function that derives constrained parameters from sampled ones.
    pub fn with_conversion(mut self, conversion: ConversionFunction) -> Self {
        self.conversion = Some(conversion);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, prior: Prior) -> Option<Prior> {
        self.priors.insert(key.into(), prior)
    }

    pub fn insert_constraint(&mut self, key: impl Into<String>, constraint: Constraint) {
        self.constraints.insert(key.into(), constraint);
    }

    pub fn remove(&mut self, key: &str) -> Option<Prior> {
        self.priors.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Prior> {
        self.priors.get(key)
    }

    pub fn constraint(&self, key: &str) -> Option<&Constraint> {
        self.constraints.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.priors.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Prior)> {
        self.priors.iter().map(|(k, p)| (k.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.priors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priors.is_empty()
    }

    /// Pin `key` to `value`.
    pub fn fix(&mut self, key: impl Into<String>, value: f64) -> Result<()> {
        self.priors.insert(key.into(), Prior::delta(value)?);
        Ok(())
    }

    /// Pin each of `keys` to its value in `values`.
    pub fn fix_from(&mut self, values: &Parameters, keys: &[&str]) -> Result<()> {
        for &key in keys {
            let value = values.require_value(key)?;
            self.fix(key, value)?;
        }
        Ok(())
    }

    /// Names of the sampled (non-fixed) parameters, in sampling order.
    pub fn search_keys(&self) -> Vec<String> {
        self.priors
            .iter()
            .filter(|(_, prior)| !prior.is_fixed())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn fixed_keys(&self) -> Vec<String> {
        self.priors
            .iter()
            .filter(|(_, prior)| prior.is_fixed())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn fixed_parameters(&self) -> Parameters {
        self.priors
            .iter()
            .filter(|(_, prior)| prior.is_fixed())
            .map(|(key, prior)| (key.clone(), prior.rescale(0.)))
            .collect()
    }

    /// Fail with the first key that has no prior.
    pub fn validate_keys<S: AsRef<str>>(&self, required: &[S]) -> Result<()> {
        match required.iter().find(|key| !self.contains_key(key.as_ref())) {
            Some(key) => Err(PeError::MissingPrior(key.as_ref().to_string())),
            None => Ok(()),
        }
    }

    /// Map a point of the unit cube onto parameter space.
    ///
    /// `unit` holds one coordinate per search key; fixed values are added.
    pub fn rescale(&self, unit: &[f64]) -> Parameters {
        let mut params = self.fixed_parameters();
        let search = self.priors.iter().filter(|(_, prior)| !prior.is_fixed());
        for ((key, prior), &u) in search.zip(unit) {
            params.insert(key.clone(), prior.rescale(u));
        }
        params
    }

    /// Apply the conversion function, if any.
    pub fn convert(&self, params: &Parameters) -> Parameters {
        match self.conversion {
            Some(conversion) => conversion(params),
            None => params.clone(),
        }
    }

    /// True if every constraint holds for the converted parameters.
    ///
    /// A constrained key that the conversion cannot produce counts as a violation.
    pub fn evaluate_constraints(&self, params: &Parameters) -> bool {
        if self.constraints.is_empty() {
            return true;
        }
        let converted = self.convert(params);
        self.constraints.iter().all(|(key, constraint)| {
            converted
                .get(key)
                .is_some_and(|value| constraint.is_satisfied(value))
        })
    }

    /// Joint log prior over the search keys, `-inf` if a constraint fails.
    pub fn ln_prob(&self, params: &Parameters) -> f64 {
        let ln_prob = self
            .priors
            .iter()
            .filter(|(_, prior)| !prior.is_fixed())
            .map(|(key, prior)| match params.get(key) {
                Some(value) => prior.ln_prob(value),
                None => f64::NEG_INFINITY,
            })
            .sum::<f64>();
        if ln_prob == f64::NEG_INFINITY || !self.evaluate_constraints(params) {
            return f64::NEG_INFINITY;
        }
        ln_prob
    }

    /// Draw one point that satisfies the constraints.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Parameters> {
        for _ in 0..MAX_CONSTRAINED_DRAWS {
            let params: Parameters = self
                .priors
                .iter()
                .map(|(key, prior)| (key.clone(), prior.sample(rng)))
                .collect();
            if self.evaluate_constraints(&params) {
                return Ok(params);
            }
        }
        Err(PeError::InitializationFailed(MAX_CONSTRAINED_DRAWS))
    }
}

impl fmt::Display for PriorDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, prior) in &self.priors {
            writeln!(f, "{key} = {prior}")?;
        }
        for (key, constraint) in &self.constraints {
            writeln!(f, "{key} = {constraint}")?;
        }
        Ok(())
    }
}

impl FromIterator<(String, Prior)> for PriorDict {
    fn from_iter<T: IntoIterator<Item = (String, Prior)>>(iter: T) -> Self {
        Self {
            priors: iter.into_iter().collect(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn gaussian_model_priors() -> PriorDict {
        let mut priors = PriorDict::new();
        priors.insert("mu", Prior::uniform(0., 5.).unwrap());
        priors.insert("sigma", Prior::uniform(0., 10.).unwrap());
        priors
    }

    #[test]
    fn fixed_keys_are_not_searched() {
        let mut priors = gaussian_model_priors();
        priors.fix("offset", 1.5).unwrap();
        assert_eq!(priors.search_keys(), vec!["mu", "sigma"]);
        assert_eq!(priors.fixed_keys(), vec!["offset"]);

        let params = priors.rescale(&[0.5, 0.1]);
        assert_eq!(params.get("mu"), Some(2.5));
        assert_eq!(params.get("sigma"), Some(1.0));
        assert_eq!(params.get("offset"), Some(1.5));
    }

    #[test]
    fn missing_prior_is_reported() {
        let priors = gaussian_model_priors();
        assert!(priors.validate_keys(&["mu", "sigma"]).is_ok());
        assert_eq!(
            priors.validate_keys(&["mu", "tau"]),
            Err(PeError::MissingPrior("tau".to_string()))
        );
    }

    #[test]
    fn ln_prob_sums_components() {
        let priors = gaussian_model_priors();
        let inside = Parameters::from([("mu", 1.), ("sigma", 2.)]);
        let expected = -(5f64.ln()) - 10f64.ln();
        assert!((priors.ln_prob(&inside) - expected).abs() < 1e-12);

        let outside = Parameters::from([("mu", 6.), ("sigma", 2.)]);
        assert_eq!(priors.ln_prob(&outside), f64::NEG_INFINITY);
    }

    fn add_sum(params: &Parameters) -> Parameters {
        let mut out = params.clone();
        if let (Some(a), Some(b)) = (params.get("a"), params.get("b")) {
            out.insert("sum", a + b);
        }
        out
    }

    #[test]
    fn constraints_apply_to_converted_values() {
        let mut priors = PriorDict::new().with_conversion(add_sum);
        priors.insert("a", Prior::uniform(0., 1.).unwrap());
        priors.insert("b", Prior::uniform(0., 1.).unwrap());
        priors.insert_constraint("sum", Constraint::new(0., 1.).unwrap());

        assert!(priors.evaluate_constraints(&Parameters::from([("a", 0.2), ("b", 0.3)])));
        assert!(!priors.evaluate_constraints(&Parameters::from([("a", 0.7), ("b", 0.6)])));
        assert_eq!(
            priors.ln_prob(&Parameters::from([("a", 0.7), ("b", 0.6)])),
            f64::NEG_INFINITY
        );

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..100 {
            let draw = priors.sample(&mut rng).unwrap();
            assert!(draw.get("a").unwrap() + draw.get("b").unwrap() < 1.);
        }
    }
}
