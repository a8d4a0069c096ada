use crate::domain::errors::PredictorError;
use crate::domain::market::FeatureWindow;
use crate::domain::ml::{Prediction, Predictor};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use statrs::statistics::Statistics;

/// Derives an uncertainty estimate from a deterministic model by repeated
/// inference on noise-perturbed copies of the (scaled) window.
///
/// The noise stream is seeded from the window contents, so the same window
/// always yields the same `(mean, std)`.
pub struct MonteCarloPredictor<P> {
    inner: P,
    noise_std: f64,
    seed: u64,
}

impl<P: Predictor> MonteCarloPredictor<P> {
    pub fn new(inner: P, noise_std: f64, seed: u64) -> Self {
        Self {
            inner,
            noise_std,
            seed,
        }
    }

    fn window_seed(&self, window: &FeatureWindow<'_>) -> u64 {
        // FNV-1a over the raw bits
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for value in window.values() {
            for byte in value.to_bits().to_le_bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
        }
        hash ^ self.seed
    }
}

impl<P: Predictor> Predictor for MonteCarloPredictor<P> {
    fn predict(&self, window: &FeatureWindow<'_>) -> Result<f64, PredictorError> {
        self.inner.predict(window)
    }

    fn predict_with_uncertainty(
        &self,
        window: &FeatureWindow<'_>,
        n_samples: usize,
    ) -> Result<Prediction, PredictorError> {
        if n_samples < 2 || self.noise_std <= 0.0 {
            return self.inner.predict(window).map(Prediction::certain);
        }

        let mut rng = StdRng::seed_from_u64(self.window_seed(window));
        let mut samples = Vec::with_capacity(n_samples);

        for _ in 0..n_samples {
            let noisy: Vec<f64> = window
                .values()
                .iter()
                .map(|value| {
                    let noise: f64 = StandardNormal.sample(&mut rng);
                    value + self.noise_std * noise
                })
                .collect();
            samples.push(self.inner.predict(&FeatureWindow::owned(noisy, window.width()))?);
        }

        Ok(Prediction {
            mean: samples.iter().mean(),
            std: samples.iter().population_std_dev(),
        })
    }

    fn name(&self) -> &str {
        "Monte Carlo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{ConstantPredictor, FnPredictor};

    fn mean_of_window() -> FnPredictor<impl Fn(&FeatureWindow<'_>) -> f64 + Send + Sync> {
        FnPredictor::new(|window: &FeatureWindow<'_>| {
            window.values().iter().sum::<f64>() / window.values().len() as f64
        })
    }

    #[test]
    fn test_constant_model_has_no_spread() {
        let predictor = MonteCarloPredictor::new(ConstantPredictor::new(0.7), 0.1, 42);
        let window = FeatureWindow::borrowed(&[1.0, 2.0, 3.0, 4.0], 2);
        let prediction = predictor.predict_with_uncertainty(&window, 30).unwrap();
        assert!((prediction.mean - 0.7).abs() < 1e-12);
        assert!(prediction.std.abs() < 1e-12);
    }

    #[test]
    fn test_noise_produces_spread() {
        let predictor = MonteCarloPredictor::new(mean_of_window(), 0.5, 42);
        let window = FeatureWindow::borrowed(&[1.0, 2.0, 3.0, 4.0], 2);
        let prediction = predictor.predict_with_uncertainty(&window, 30).unwrap();
        assert!(prediction.std > 0.0);
        assert!((prediction.mean - 2.5).abs() < 0.5);
    }

    #[test]
    fn test_same_window_same_result() {
        let predictor = MonteCarloPredictor::new(mean_of_window(), 0.5, 7);
        let window = FeatureWindow::borrowed(&[0.3, -1.2, 4.4, 0.0], 2);
        let first = predictor.predict_with_uncertainty(&window, 20).unwrap();
        let second = predictor.predict_with_uncertainty(&window, 20).unwrap();
        assert_eq!(first, second);
    }
}
