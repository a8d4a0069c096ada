//! Tree-structured Parzen estimator for sequential parameter proposals.
//!
//! Each axis is modelled independently. Past trials are split into a "good"
//! set (top `gamma` fraction by score) and a "bad" set; candidates are drawn
//! from the good density and the one with the highest `l(x) / g(x)` ratio wins.

use crate::domain::optimization::{ParamSpec, ParamValue, ParameterSet, SearchSpace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpeSettings {
    /// Trials sampled uniformly before the model kicks in
    pub n_startup_trials: usize,
    pub n_ei_candidates: usize,
    pub gamma: f64,
    pub prior_weight: f64,
    pub seed: u64,
}

impl Default for TpeSettings {
    fn default() -> Self {
        Self {
            n_startup_trials: 10,
            n_ei_candidates: 24,
            gamma: 0.25,
            prior_weight: 1.0,
            seed: 42,
        }
    }
}

/// A finished trial as seen by the sampler. Higher is better.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub params: &'a ParameterSet,
    pub value: f64,
}

pub struct TpeSampler {
    space: SearchSpace,
    settings: TpeSettings,
    rng: StdRng,
}

impl TpeSampler {
    pub fn new(space: SearchSpace, settings: TpeSettings) -> Self {
        let rng = StdRng::seed_from_u64(settings.seed);
        Self {
            space,
            settings,
            rng,
        }
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Proposes the next parameter set given every finished observation.
    pub fn sample(&mut self, history: &[Observation<'_>]) -> ParameterSet {
        if history.len() < self.settings.n_startup_trials.max(1) {
            return self.sample_uniform();
        }

        let (good, bad) = split_observations(history, self.settings.gamma);
        let parameters = self.space.parameters.clone();
        let mut params = ParameterSet::new();

        for def in &parameters {
            let value = match &def.spec {
                ParamSpec::Float { low, high } => {
                    let below = axis_values(&good, &def.name);
                    let above = axis_values(&bad, &def.name);
                    ParamValue::Float(self.sample_numeric(*low, *high, &below, &above))
                }
                ParamSpec::Int { low, high } => {
                    let below = axis_values(&good, &def.name);
                    let above = axis_values(&bad, &def.name);
                    let raw = self.sample_numeric(
                        *low as f64 - 0.5,
                        *high as f64 + 0.5,
                        &below,
                        &above,
                    );
                    ParamValue::Int((raw.round() as i64).clamp(*low, *high))
                }
                ParamSpec::Categorical { choices } => {
                    let below = choice_indices(&good, &def.name, choices);
                    let above = choice_indices(&bad, &def.name, choices);
                    let index = self.sample_categorical(choices.len(), &below, &above);
                    choices[index].clone()
                }
            };
            params.insert(def.name.clone(), value);
        }

        params
    }

    fn sample_uniform(&mut self) -> ParameterSet {
        let mut params = ParameterSet::new();
        for def in &self.space.parameters {
            let value = match &def.spec {
                ParamSpec::Float { low, high } => {
                    ParamValue::Float(self.rng.random_range(*low..=*high))
                }
                ParamSpec::Int { low, high } => ParamValue::Int(self.rng.random_range(*low..=*high)),
                ParamSpec::Categorical { choices } => {
                    choices[self.rng.random_range(0..choices.len())].clone()
                }
            };
            params.insert(def.name.clone(), value);
        }
        params
    }

    fn sample_numeric(&mut self, low: f64, high: f64, below: &[f64], above: &[f64]) -> f64 {
        if high <= low {
            return low;
        }

        let good = ParzenEstimator::new(below, low, high, self.settings.prior_weight);
        let bad = ParzenEstimator::new(above, low, high, self.settings.prior_weight);

        let mut best = good.sample(&mut self.rng);
        let mut best_ratio = good.log_pdf(best) - bad.log_pdf(best);

        for _ in 1..self.settings.n_ei_candidates.max(1) {
            let candidate = good.sample(&mut self.rng);
            let ratio = good.log_pdf(candidate) - bad.log_pdf(candidate);
            if ratio > best_ratio {
                best = candidate;
                best_ratio = ratio;
            }
        }

        best
    }

    fn sample_categorical(&mut self, n_choices: usize, below: &[usize], above: &[usize]) -> usize {
        let good = smoothed_weights(n_choices, below, self.settings.prior_weight);
        let bad = smoothed_weights(n_choices, above, self.settings.prior_weight);

        let mut best = pick_weighted(&good, &mut self.rng);
        for _ in 1..self.settings.n_ei_candidates.max(1) {
            let candidate = pick_weighted(&good, &mut self.rng);
            if good[candidate] / bad[candidate] > good[best] / bad[best] {
                best = candidate;
            }
        }
        best
    }
}

fn split_observations<'a>(
    history: &[Observation<'a>],
    gamma: f64,
) -> (Vec<Observation<'a>>, Vec<Observation<'a>>) {
    let mut sorted = history.to_vec();
    sorted.sort_by(|a, b| b.value.total_cmp(&a.value));

    let n_good = ((gamma * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    let bad = sorted.split_off(n_good);
    (sorted, bad)
}

fn axis_values(observations: &[Observation<'_>], name: &str) -> Vec<f64> {
    observations
        .iter()
        .filter_map(|obs| obs.params.get_f64(name))
        .filter(|value| value.is_finite())
        .collect()
}

fn choice_indices(observations: &[Observation<'_>], name: &str, choices: &[ParamValue]) -> Vec<usize> {
    observations
        .iter()
        .filter_map(|obs| obs.params.get(name))
        .filter_map(|value| choices.iter().position(|choice| choice == value))
        .collect()
}

fn smoothed_weights(n_choices: usize, indices: &[usize], prior_weight: f64) -> Vec<f64> {
    let mut weights = vec![prior_weight.max(f64::EPSILON); n_choices];
    for &index in indices {
        weights[index] += 1.0;
    }
    let total: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= total);
    weights
}

fn pick_weighted(weights: &[f64], rng: &mut impl Rng) -> usize {
    let mut target = rng.random::<f64>();
    for (index, weight) in weights.iter().enumerate() {
        if target < *weight {
            return index;
        }
        target -= weight;
    }
    weights.len().saturating_sub(1)
}

/// Truncated Gaussian mixture over `[low, high]` with one component per
/// observation plus a wide prior centred on the range.
struct ParzenEstimator {
    components: Vec<Component>,
    low: f64,
    high: f64,
}

struct Component {
    weight: f64,
    /// Density side, for `l(x) / g(x)`
    normal: Normal,
    /// Sampling side
    gaussian: rand_distr::Normal<f64>,
}

impl ParzenEstimator {
    fn new(observations: &[f64], low: f64, high: f64, prior_weight: f64) -> Self {
        let span = high - low;

        // (mu, weight, is_prior)
        let mut points: Vec<(f64, f64, bool)> =
            observations.iter().map(|&mu| (mu, 1.0, false)).collect();
        points.push((0.5 * (low + high), prior_weight.max(f64::EPSILON), true));
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let min_sigma = span / (1.0 + observations.len() as f64).min(100.0);
        let total: f64 = points.iter().map(|p| p.1).sum();

        let components = points
            .iter()
            .enumerate()
            .filter_map(|(i, &(mu, weight, is_prior))| {
                let sigma = if is_prior {
                    span
                } else {
                    let left = if i == 0 { mu - low } else { mu - points[i - 1].0 };
                    let right = match points.get(i + 1) {
                        Some(next) => next.0 - mu,
                        None => high - mu,
                    };
                    left.max(right).clamp(min_sigma, span)
                };
                let sigma = sigma.max(f64::EPSILON);
                let normal = Normal::new(mu, sigma).ok()?;
                let gaussian = rand_distr::Normal::new(mu, sigma).ok()?;
                Some(Component {
                    weight: weight / total,
                    normal,
                    gaussian,
                })
            })
            .collect();

        Self {
            components,
            low,
            high,
        }
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        let weights: Vec<f64> = self.components.iter().map(|c| c.weight).collect();
        let Some(component) = self.components.get(pick_weighted(&weights, rng)) else {
            return rng.random_range(self.low..=self.high);
        };

        for _ in 0..64 {
            let x = component.gaussian.sample(rng);
            if (self.low..=self.high).contains(&x) {
                return x;
            }
        }
        rng.random_range(self.low..=self.high)
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let density: f64 = self
            .components
            .iter()
            .map(|c| {
                let mass = c.normal.cdf(self.high) - c.normal.cdf(self.low);
                if mass > 0.0 {
                    c.weight * c.normal.pdf(x) / mass
                } else {
                    0.0
                }
            })
            .sum();
        density.max(1e-300).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::ParameterDef;

    fn space() -> SearchSpace {
        SearchSpace::new(vec![
            ParameterDef::float("prediction_threshold", 0.55, 0.85),
            ParameterDef::int("leverage", 5, 25),
            ParameterDef::categorical(
                "ema_period",
                vec![ParamValue::Int(50), ParamValue::Int(100), ParamValue::Int(200)],
            ),
        ])
    }

    fn in_bounds(params: &ParameterSet) -> bool {
        let threshold = params.get_f64("prediction_threshold").unwrap();
        let leverage = params.get("leverage").and_then(ParamValue::as_i64).unwrap();
        let ema = params.get("ema_period").and_then(ParamValue::as_i64).unwrap();
        (0.55..=0.85).contains(&threshold)
            && (5..=25).contains(&leverage)
            && [50, 100, 200].contains(&ema)
    }

    #[test]
    fn test_startup_samples_stay_in_bounds() {
        let mut sampler = TpeSampler::new(space(), TpeSettings::default());
        for _ in 0..50 {
            assert!(in_bounds(&sampler.sample(&[])));
        }
    }

    #[test]
    fn test_model_samples_stay_in_bounds() {
        let mut startup = TpeSampler::new(space(), TpeSettings::default());
        let params: Vec<ParameterSet> = (0..30).map(|_| startup.sample(&[])).collect();
        let history: Vec<Observation<'_>> = params
            .iter()
            .map(|p| Observation {
                params: p,
                value: p.get_f64("prediction_threshold").unwrap(),
            })
            .collect();

        let mut sampler = TpeSampler::new(space(), TpeSettings::default());
        for _ in 0..50 {
            assert!(in_bounds(&sampler.sample(&history)));
        }
    }

    #[test]
    fn test_same_seed_same_proposals() {
        let mut a = TpeSampler::new(space(), TpeSettings::default());
        let mut b = TpeSampler::new(space(), TpeSettings::default());
        for _ in 0..20 {
            assert_eq!(a.sample(&[]), b.sample(&[]));
        }
    }

    #[test]
    fn test_model_concentrates_on_good_region() {
        let single = SearchSpace::new(vec![ParameterDef::float("risk_reward_ratio", 0.0, 10.0)]);
        let params: Vec<ParameterSet> = (0..40)
            .map(|i| {
                let mut p = ParameterSet::new();
                p.insert("risk_reward_ratio", ParamValue::Float(i as f64 * 0.25));
                p
            })
            .collect();
        // Best near 8.0
        let history: Vec<Observation<'_>> = params
            .iter()
            .map(|p| Observation {
                params: p,
                value: -(p.get_f64("risk_reward_ratio").unwrap() - 8.0).abs(),
            })
            .collect();

        let mut sampler = TpeSampler::new(single, TpeSettings::default());
        let proposals: Vec<f64> = (0..40)
            .map(|_| sampler.sample(&history).get_f64("risk_reward_ratio").unwrap())
            .collect();
        let mean = proposals.iter().sum::<f64>() / proposals.len() as f64;
        assert!(mean > 5.5, "mean proposal {mean} did not move toward the optimum");
    }

    #[test]
    fn test_split_keeps_at_least_one_good() {
        let params = ParameterSet::new();
        let history = vec![
            Observation { params: &params, value: 1.0 },
            Observation { params: &params, value: 3.0 },
            Observation { params: &params, value: 2.0 },
        ];
        let (good, bad) = split_observations(&history, 0.1);
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].value, 3.0);
        assert_eq!(bad.len(), 2);
    }
}
