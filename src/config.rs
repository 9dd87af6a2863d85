/**
 * fmembed
 * Copyright (C) 2018 The fmembed authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use crate::error::{Error, Result};
use crate::loss::LossFunction;
use crate::metrics::Bins;

/// Hyper-parameters of a training run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactorizationConfig {
    /// Number of latent dimensions per dense id.
    pub dimensions: usize,
    /// Initial SGD step size, scaled per parameter by AdaGrad.
    pub learn_rate: f32,
    /// L2 regularization of the biases.
    pub lambda1: f32,
    /// L2 regularization of the latent vectors.
    pub lambda2: f32,
    pub iterations: usize,
    /// Negative samples per positive example.
    pub negatives: usize,
    pub loss: LossFunction,
    /// Fit `ln(1 + rating)` instead of classifying positives against sampled negatives.
    pub regression: bool,
    pub table_size: usize,
    /// Co-occurrence count from which on examples get full weight in regression mode.
    pub min_count: u32,
    /// Smoothing exponent of the negative sampling distribution and of the regression weights.
    pub alpha: f64,
    pub bins: Bins,
    pub threads: usize,
    pub seed: u64,
}

impl Default for FactorizationConfig {
    fn default() -> Self {
        FactorizationConfig {
            dimensions: 20,
            learn_rate: 0.05,
            lambda1: 0.0,
            lambda2: 0.0,
            iterations: 10,
            negatives: 5,
            loss: LossFunction::default(),
            regression: false,
            table_size: 100_000_000,
            min_count: 100,
            alpha: 0.75,
            bins: Bins::default(),
            threads: num_cpus::get(),
            seed: 0xF00D,
        }
    }
}

impl FactorizationConfig {

    /// Rejects settings that cannot produce a model.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(invalid("dimensions must be positive"));
        }
        if !(self.learn_rate.is_finite() && self.learn_rate > 0.0) {
            return Err(invalid(format!("learn rate must be positive, got {}", self.learn_rate)));
        }
        if self.lambda1 < 0.0 || self.lambda2 < 0.0 {
            return Err(invalid("regularization factors must not be negative"));
        }
        if self.table_size == 0 {
            return Err(invalid("the sampling table size must be positive"));
        }
        if self.min_count == 0 {
            return Err(invalid("min count must be positive"));
        }
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(invalid(format!("alpha must not be negative, got {}", self.alpha)));
        }
        if self.threads == 0 {
            return Err(invalid("at least one thread is required"));
        }
        // re-checks bins that were deserialized
        Bins::new(self.bins.boundaries().to_vec())?;

        Ok(())
    }
}

fn invalid<S: Into<String>>(message: S) -> Error {
    Error::Config(message.into())
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FactorizationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.alpha, 0.75);
        assert_eq!(config.min_count, 100);
        assert_eq!(config.table_size, 100_000_000);
        assert_eq!(config.loss, LossFunction::Logistic);
        assert_eq!(config.bins.boundaries(), &[10, 20, 50, 100, 1_000, 5_000, 100_000]);
    }

    #[test]
    fn invalid_settings() {
        let broken = vec![
            FactorizationConfig { dimensions: 0, ..Default::default() },
            FactorizationConfig { learn_rate: 0.0, ..Default::default() },
            FactorizationConfig { lambda2: -1.0, ..Default::default() },
            FactorizationConfig { table_size: 0, ..Default::default() },
            FactorizationConfig { min_count: 0, ..Default::default() },
            FactorizationConfig { threads: 0, ..Default::default() },
        ];

        for config in broken {
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn serializes_to_json() {
        let config = FactorizationConfig { loss: LossFunction::Hinge, ..Default::default() };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"loss\":\"hinge\""));

        let restored: FactorizationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
