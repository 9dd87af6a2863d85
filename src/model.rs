/*
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

//! Factorization machine over dense ids, trained with asynchronous SGD and AdaGrad learn rates.
//!
//! An engine is driven through its phases in order: [`Factorization::init_parameters`],
//! [`Factorization::count`], [`Factorization::init_sampling_table`], then one or more training
//! passes. [`Factorization::train`] runs all of them. Calling the phases out of order is a
//! programming error and may panic on out of bounds access.

use std::time::Instant;

use fnv::FnvHashMap;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_xorshift::XorShiftRng;

use crate::config::FactorizationConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::hogwild::SharedBuffer;
use crate::metrics::{Accuracy, LossAverager};
use crate::parallel::WorkerPool;
use crate::sampling::NegativeSampler;
use crate::types::{DataPoint, RawFeatures, SparseVector};
use crate::utils;

/// The learned state: one bias, one latent vector and one accumulated squared gradient length
/// per dense id. All workers update it concurrently without locks, see [`crate::hogwild`].
#[derive(Default)]
pub struct Parameters {
    dimensions: usize,
    biases: SharedBuffer,
    latent_vectors: SharedBuffer,
    gradient_lengths: SharedBuffer,
}

impl Parameters {

    /// Zero biases and latent vectors drawn from a standard normal distribution, scaled by
    /// `1 / dimensions`.
    pub fn init<R: Rng>(num_features: usize, dimensions: usize, rng: &mut R) -> Self {
        let scale = 1.0 / dimensions as f32;
        let latent_vectors: Vec<f32> = (0..num_features * dimensions)
            .map(|_| rng.sample::<f32, _>(StandardNormal) * scale)
            .collect();

        Parameters::from_parts(dimensions, vec![0.0; num_features], latent_vectors)
    }

    /// Parameters with the given biases and row-major latent vectors.
    pub fn from_parts(dimensions: usize, biases: Vec<f32>, latent_vectors: Vec<f32>) -> Self {
        debug_assert_eq!(biases.len() * dimensions, latent_vectors.len());
        let num_features = biases.len();

        Parameters {
            dimensions,
            biases: SharedBuffer::from_vec(biases),
            latent_vectors: SharedBuffer::from_vec(latent_vectors),
            gradient_lengths: SharedBuffer::zeros(num_features),
        }
    }

    pub fn num_features(&self) -> usize {
        self.biases.len()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[inline]
    pub fn bias(&self, id: u32) -> f32 {
        self.biases.get(id as usize)
    }

    pub fn biases(&self) -> Vec<f32> {
        self.biases.to_vec()
    }

    pub fn vector(&self, id: u32) -> Vec<f32> {
        self.latent_vectors.slice_to_vec(id as usize * self.dimensions, self.dimensions)
    }

    #[inline]
    fn read_vector(&self, id: u32, out: &mut [f32]) {
        self.latent_vectors.read_into(id as usize * self.dimensions, out);
    }
}

/// What a training pass optimizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    /// Every observed pair against sampled contexts. In regression mode the model fits
    /// `ln(1 + rating)` with count based weights instead of separating classes.
    Pointwise { regression: bool },
    /// Observed item ranked above a sampled item for the same context (BPR).
    Pairwise,
}

/// Train loss of one pass over the data.
#[derive(Clone, Debug, Serialize)]
pub struct IterationStats {
    pub iteration: usize,
    pub millis: u64,
    pub loss: LossAverager,
}

pub struct Factorization {
    config: FactorizationConfig,
    objective: Objective,
    parameters: Parameters,
    item_count: Vec<u32>,
    context_count: Vec<u32>,
    sampler: Option<NegativeSampler>,
}

impl Factorization {

    /// A pointwise engine, regression or classification as configured.
    pub fn new(config: FactorizationConfig) -> Result<Self> {
        let objective = Objective::Pointwise { regression: config.regression };
        Factorization::with_objective(config, objective)
    }

    pub fn with_objective(config: FactorizationConfig, objective: Objective) -> Result<Self> {
        config.validate()?;

        Ok(Factorization {
            config,
            objective,
            parameters: Parameters::default(),
            item_count: Vec::new(),
            context_count: Vec::new(),
            sampler: None,
        })
    }

    pub fn config(&self) -> &FactorizationConfig {
        &self.config
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn item_count(&self) -> &[u32] {
        &self.item_count
    }

    pub fn context_count(&self) -> &[u32] {
        &self.context_count
    }

    pub fn biases(&self) -> Vec<f32> {
        self.parameters.biases()
    }

    pub fn init_parameters(&mut self, num_features: usize) {
        tracing::info!(num_features, dimensions = self.config.dimensions, "initializing parameters");
        let mut rng = XorShiftRng::seed_from_u64(self.config.seed);
        self.parameters = Parameters::init(num_features, self.config.dimensions, &mut rng);
    }

    /// Counts how often every dense id occurs as item and as context in `dataset`.
    pub fn count(&mut self, num_features: usize, dataset: &dyn Dataset) -> Result<()> {
        tracing::info!("counting item occurrences");

        let mut item_count = vec![0_u32; num_features];
        let mut context_count = vec![0_u32; num_features];

        for data_point in dataset.iter()? {
            let data_point = data_point?;
            let (context, item) = (data_point.context_id as usize, data_point.item_id as usize);
            if context >= num_features || item >= num_features {
                return Err(Error::Config(format!(
                    "data point {} refers to an id beyond the {} dense ids", data_point, num_features)));
            }
            context_count[context] += 1;
            item_count[item] += 1;
        }

        self.item_count = item_count;
        self.context_count = context_count;

        Ok(())
    }

    /// Pointwise training samples contexts, pairwise training samples items. Pointwise training
    /// without negatives needs no table.
    pub fn init_sampling_table(&mut self) -> Result<()> {
        let counts = match self.objective {
            Objective::Pointwise { .. } if self.config.negatives == 0 => {
                self.sampler = None;
                return Ok(());
            },
            Objective::Pointwise { .. } => &self.context_count,
            Objective::Pairwise => &self.item_count,
        };

        tracing::info!(table_size = self.config.table_size, "initializing sampling table");
        self.sampler = Some(NegativeSampler::new(counts, self.config.alpha, self.config.table_size)?);

        Ok(())
    }

    /// Factorization machine score: linear terms plus the dot products of all pairs of active
    /// latent vectors.
    pub fn predict(&self, sparse_vector: &SparseVector) -> f32 {
        let dimensions = self.parameters.dimensions;
        let mut vector_a = vec![0.0; dimensions];
        let mut vector_b = vec![0.0; dimensions];

        let mut predicted = 0.0;
        for i in 0..sparse_vector.len() {
            let entry_a = sparse_vector.get(i);
            predicted += entry_a.value * self.parameters.bias(entry_a.key);

            self.parameters.read_vector(entry_a.key, &mut vector_a);
            for j in (i + 1)..sparse_vector.len() {
                let entry_b = sparse_vector.get(j);
                self.parameters.read_vector(entry_b.key, &mut vector_b);
                predicted += entry_a.value * entry_b.value * dot(&vector_a, &vector_b);
            }
        }

        predicted
    }

    /// Initializes the engine for `dataset` and runs all configured passes over it. `features`
    /// holds the side features per dense item id and may be empty. Returns the merged train loss
    /// of every pass.
    pub fn train(
        &mut self,
        dataset: &dyn Dataset,
        features: &[Option<SparseVector>],
        num_features: usize,
    ) -> Result<Vec<IterationStats>> {

        self.init_parameters(num_features);
        self.count(num_features, dataset)?;
        self.init_sampling_table()?;

        let pool = WorkerPool::new(self.config.threads);
        let mut stats = Vec::with_capacity(self.config.iterations);

        for iteration in 1..=self.config.iterations {
            tracing::info!(iteration, "iteration start");
            let iteration_start = Instant::now();

            let loss = self.train_pass(&pool, dataset, features, iteration)?;

            let millis = utils::to_millis(iteration_start.elapsed());
            tracing::info!(iteration, millis, train_loss = %loss, "iteration finished");

            stats.push(IterationStats { iteration, millis, loss });
        }

        Ok(stats)
    }

    fn train_pass(
        &self,
        pool: &WorkerPool,
        dataset: &dyn Dataset,
        features: &[Option<SparseVector>],
        iteration: usize,
    ) -> Result<LossAverager> {

        let partial_losses = pool.map_ranges(dataset.size(), |worker, start, len| {
            let mut rng = self.worker_rng(iteration as u64, worker);
            let mut losses = LossAverager::new(&self.config.bins);
            let mut negatives = Vec::with_capacity(self.config.negatives);

            for data_point in dataset.iter_range(start, len)? {
                let data_point = data_point?;
                match self.objective {
                    Objective::Pointwise { regression } => self.pointwise_example(
                        &data_point, features, regression, true, &mut rng, &mut negatives, &mut losses)?,
                    Objective::Pairwise =>
                        self.pairwise_example(&data_point, features, true, &mut rng, &mut losses)?,
                }
            }

            Ok(losses)
        })?;

        Ok(merge_losses(&self.config, partial_losses))
    }

    /// One positive step plus up to `negatives` steps against sampled contexts. Samples equal
    /// to the true context are discarded, the survivors share the rating as weight.
    #[allow(clippy::too_many_arguments)]
    fn pointwise_example(
        &self,
        data_point: &DataPoint,
        features: &[Option<SparseVector>],
        regression: bool,
        update: bool,
        rng: &mut XorShiftRng,
        negatives: &mut Vec<u32>,
        losses: &mut LossAverager,
    ) -> Result<()> {

        let item_occurrence = self.item_count[data_point.item_id as usize];
        let item_features = side_features(features, data_point.item_id);

        let (measured, weight) = if regression {
            ((1.0 + data_point.rating).ln(), self.weight(data_point.rating))
        } else {
            (1.0, data_point.rating)
        };

        let sparse_vector = data_point.to_sparse_vector(item_features);
        let loss = self.step(&sparse_vector, measured, weight, update);
        losses.add(f64::from(loss), item_occurrence)?;

        self.draw_negatives(data_point.context_id, rng, negatives);
        if negatives.is_empty() {
            return Ok(());
        }

        let (measured, weight) = if regression {
            (0.0, self.weight(1.0))
        } else {
            (-1.0, data_point.rating / negatives.len() as f32)
        };

        for &negative_context in negatives.iter() {
            let negative = DataPoint::new(negative_context, data_point.item_id, data_point.rating);
            let sparse_vector = negative.to_sparse_vector(item_features);
            let loss = self.step(&sparse_vector, measured, weight, update);
            losses.add(f64::from(loss), item_occurrence)?;
        }

        Ok(())
    }

    fn draw_negatives(&self, context_id: u32, rng: &mut XorShiftRng, negatives: &mut Vec<u32>) {
        negatives.clear();
        if let Some(sampler) = self.sampler.as_ref() {
            for _ in 0..self.config.negatives {
                let sampled = sampler.sample(rng);
                if sampled != context_id {
                    negatives.push(sampled);
                }
            }
        }
    }

    fn step(&self, sparse_vector: &SparseVector, measured: f32, weight: f32, update: bool) -> f32 {
        if update {
            self.train_step(sparse_vector, measured, weight)
        } else {
            weight * self.config.loss.loss(self.predict(sparse_vector), measured)
        }
    }

    /// Ranks the observed item above one sampled item. A sample equal to the observed item
    /// carries no signal and is skipped.
    fn pairwise_example(
        &self,
        data_point: &DataPoint,
        features: &[Option<SparseVector>],
        update: bool,
        rng: &mut XorShiftRng,
        losses: &mut LossAverager,
    ) -> Result<()> {

        let sampler = self.sampler.as_ref()
            .ok_or_else(|| Error::Config("pairwise training needs a sampling table".to_string()))?;

        let negative_item = sampler.sample(rng);
        if negative_item == data_point.item_id {
            return Ok(());
        }

        let positive = data_point.to_sparse_vector(side_features(features, data_point.item_id));
        let negative = DataPoint::new(data_point.context_id, negative_item, data_point.rating)
            .to_sparse_vector(side_features(features, negative_item));

        let predicted = self.predict(&positive) - self.predict(&negative);
        let loss = self.config.loss.loss(predicted, 1.0);

        if update {
            let error = data_point.rating * self.config.loss.derivative(predicted, 1.0);
            self.apply_gradient(&positive, error, 1.0);
            self.apply_gradient(&negative, error, -1.0);
        }

        losses.add(f64::from(loss), self.item_count[data_point.item_id as usize])
    }

    /// One SGD step on a single example. Returns the weighted loss before the update, without
    /// the regularization terms.
    pub fn train_step(&self, sparse_vector: &SparseVector, measured: f32, weight: f32) -> f32 {
        let predicted = self.predict(sparse_vector);
        let error = weight * self.config.loss.derivative(predicted, measured);

        self.apply_gradient(sparse_vector, error, 1.0);

        weight * self.config.loss.loss(predicted, measured)
    }

    /// Moves the parameters of all active features against `sign * error` times their
    /// gradient. The gradient of a latent vector uses the sum of all active vectors, computed
    /// once up front: `value * (sum - value * vector)`.
    pub fn apply_gradient(&self, sparse_vector: &SparseVector, error: f32, sign: f32) {
        let dimensions = self.parameters.dimensions;
        let learn_rate = self.config.learn_rate;
        let (lambda1, lambda2) = (self.config.lambda1, self.config.lambda2);
        let signed_error = error * sign;

        let mut vector = vec![0.0; dimensions];
        let mut vector_sum = vec![0.0; dimensions];
        let mut gradient = vec![0.0; dimensions];

        for entry in sparse_vector.iter() {
            self.parameters.read_vector(entry.key, &mut vector);
            for (sum, component) in vector_sum.iter_mut().zip(vector.iter()) {
                *sum += entry.value * component;
            }
        }

        for entry in sparse_vector.iter() {
            let (key, value) = (entry.key, entry.value);
            self.parameters.read_vector(key, &mut vector);

            // quadratic term
            for ((gradient, sum), component) in gradient.iter_mut().zip(vector_sum.iter()).zip(vector.iter()) {
                *gradient = (sum * value - component * value * value) * signed_error + lambda2 * component;
            }
            let individual_rate = self.update_learn_rate(key, &gradient);

            let offset = key as usize * dimensions;
            for (position, (component, gradient)) in vector.iter().zip(gradient.iter()).enumerate() {
                self.parameters.latent_vectors
                    .set(offset + position, component - learn_rate * individual_rate * gradient);
            }

            // linear term
            let bias = self.parameters.bias(key);
            let linear_gradient = value * signed_error + lambda1 * bias;
            self.parameters.biases.set(key as usize, bias - learn_rate * individual_rate * linear_gradient);
        }
    }

    /// Adds the squared length of `gradient` (per dimension) to the history of `id` and returns
    /// the AdaGrad rate. While the history is zero no step has moved the parameter, the rate
    /// is zero then.
    fn update_learn_rate(&self, id: u32, gradient: &[f32]) -> f32 {
        let gradient_length = self.parameters.gradient_lengths.get(id as usize)
            + dot(gradient, gradient) / gradient.len() as f32;
        self.parameters.gradient_lengths.set(id as usize, gradient_length);

        if gradient_length > 0.0 {
            1.0 / gradient_length.sqrt()
        } else {
            0.0
        }
    }

    /// Down-weights rare pairs in regression mode: `(rating / min_count)^alpha` up to
    /// `min_count`, full weight beyond.
    pub fn weight(&self, rating: f32) -> f32 {
        let min_count = self.config.min_count as f32;
        if rating <= min_count {
            (rating / min_count).powf(self.config.alpha as f32)
        } else {
            1.0
        }
    }

    /// Binned loss on `dataset` with the same examples and sampling as training, but without
    /// touching the parameters.
    pub fn predict_dataset(&self, dataset: &dyn Dataset, features: &[Option<SparseVector>]) -> Result<LossAverager> {
        let pool = WorkerPool::new(self.config.threads);

        let partial_losses = pool.map_ranges(dataset.size(), |worker, start, len| {
            let mut rng = self.worker_rng(EVALUATION_ROUND, worker);
            let mut losses = LossAverager::new(&self.config.bins);
            let mut negatives = Vec::with_capacity(self.config.negatives);

            for data_point in dataset.iter_range(start, len)? {
                let data_point = self.known(data_point?)?;
                match self.objective {
                    Objective::Pointwise { regression } => self.pointwise_example(
                        &data_point, features, regression, false, &mut rng, &mut negatives, &mut losses)?,
                    Objective::Pairwise =>
                        self.pairwise_example(&data_point, features, false, &mut rng, &mut losses)?,
                }
            }

            Ok(losses)
        })?;

        Ok(merge_losses(&self.config, partial_losses))
    }

    /// Binned share of examples on the right side of `threshold`: observed pairs should score
    /// above it, sampled contexts (or items, for the pairwise objective) below.
    pub fn accuracy(
        &self,
        dataset: &dyn Dataset,
        features: &[Option<SparseVector>],
        threshold: f64,
    ) -> Result<Accuracy> {

        let pool = WorkerPool::new(self.config.threads);

        let partial_accuracies = pool.map_ranges(dataset.size(), |worker, start, len| {
            let mut rng = self.worker_rng(EVALUATION_ROUND, worker);
            let mut accuracy = Accuracy::new(&self.config.bins);
            let mut negatives = Vec::with_capacity(self.config.negatives);

            for data_point in dataset.iter_range(start, len)? {
                let data_point = self.known(data_point?)?;
                let item_occurrence = self.item_count[data_point.item_id as usize];
                let item_features = side_features(features, data_point.item_id);

                let score = self.predict(&data_point.to_sparse_vector(item_features));
                accuracy.add_positive(score, threshold, item_occurrence)?;

                match self.objective {
                    Objective::Pointwise { .. } => {
                        self.draw_negatives(data_point.context_id, &mut rng, &mut negatives);
                        for &negative_context in negatives.iter() {
                            let negative = DataPoint::new(negative_context, data_point.item_id, data_point.rating);
                            let score = self.predict(&negative.to_sparse_vector(item_features));
                            accuracy.add_negative(score, threshold, item_occurrence)?;
                        }
                    },
                    Objective::Pairwise => {
                        if let Some(sampler) = self.sampler.as_ref() {
                            let negative_item = sampler.sample(&mut rng);
                            if negative_item != data_point.item_id {
                                let negative = DataPoint::new(data_point.context_id, negative_item, data_point.rating);
                                let score = self.predict(&negative.to_sparse_vector(side_features(features, negative_item)));
                                accuracy.add_negative(score, threshold, item_occurrence)?;
                            }
                        }
                    },
                }
            }

            Ok(accuracy)
        })?;

        Ok(partial_accuracies.into_iter()
            .fold(Accuracy::new(&self.config.bins), |merged, partial| merged.merged(&partial)))
    }

    /// Rejects data points that were not mapped with the dictionary of the train set.
    fn known(&self, data_point: DataPoint) -> Result<DataPoint> {
        let num_features = self.parameters.num_features();
        if data_point.context_id as usize >= num_features || data_point.item_id as usize >= num_features {
            return Err(Error::Config(format!("data point {} is not part of the model", data_point)));
        }
        Ok(data_point)
    }

    fn worker_rng(&self, round: u64, worker: usize) -> XorShiftRng {
        XorShiftRng::seed_from_u64(self.config.seed ^ (round << 32) ^ worker as u64)
    }

    /// Latent vectors keyed by original id, for a map from original to dense ids.
    pub fn vectors(&self, map: &FnvHashMap<u32, u32>) -> FnvHashMap<u32, Vec<f32>> {
        map.iter()
            .map(|(&id, &dense_id)| (id, self.parameters.vector(dense_id)))
            .collect()
    }

    /// Latent vectors keyed by original id, each summed up with the vectors of its side features
    /// weighted by their values.
    pub fn feature_vectors(
        &self,
        map: &FnvHashMap<u32, u32>,
        feature_map: &FnvHashMap<u32, u32>,
        raw_features: &RawFeatures,
    ) -> FnvHashMap<u32, Vec<f32>> {

        map.iter()
            .map(|(&id, &dense_id)| {
                let mut summed = self.parameters.vector(dense_id);
                if let Some(sparse_vector) = raw_features.get(&id) {
                    self.add_side_features(&mut summed, sparse_vector, feature_map);
                }
                (id, summed)
            })
            .collect()
    }

    /// Weighted sums of side feature vectors only, keyed by original item id.
    pub fn side_feature_vectors(
        &self,
        feature_map: &FnvHashMap<u32, u32>,
        raw_features: &RawFeatures,
    ) -> FnvHashMap<u32, Vec<f32>> {

        raw_features.iter()
            .map(|(&id, sparse_vector)| {
                let mut summed = vec![0.0; self.parameters.dimensions];
                self.add_side_features(&mut summed, sparse_vector, feature_map);
                (id, summed)
            })
            .collect()
    }

    fn add_side_features(
        &self,
        summed: &mut [f32],
        sparse_vector: &SparseVector,
        feature_map: &FnvHashMap<u32, u32>,
    ) {
        let mut feature_vector = vec![0.0; self.parameters.dimensions];
        for entry in sparse_vector.iter() {
            if let Some(&dense_id) = feature_map.get(&entry.key) {
                self.parameters.read_vector(dense_id, &mut feature_vector);
                for (sum, component) in summed.iter_mut().zip(feature_vector.iter()) {
                    *sum += entry.value * component;
                }
            }
        }
    }
}

const EVALUATION_ROUND: u64 = 0xFFFF;

fn merge_losses(config: &FactorizationConfig, partial_losses: Vec<LossAverager>) -> LossAverager {
    partial_losses.into_iter()
        .fold(LossAverager::new(&config.bins), |merged, partial| merged.merged(&partial))
}

#[inline]
fn side_features(features: &[Option<SparseVector>], item_id: u32) -> Option<&SparseVector> {
    features.get(item_id as usize).and_then(Option::as_ref)
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::dataset::InMemoryDataset;
    use crate::loss::LossFunction;

    fn close_enough_to(value: f32, expected: f32) -> bool {
        (value - expected).abs() < 0.0001
    }

    fn config() -> FactorizationConfig {
        FactorizationConfig {
            dimensions: 1,
            learn_rate: 0.1,
            table_size: 1_000,
            threads: 1,
            ..Default::default()
        }
    }

    #[test]
    fn count() {
        let dataset = InMemoryDataset::from(vec![
            DataPoint::new(1, 0, 1.0),
            DataPoint::new(2, 1, 1.0),
            DataPoint::new(2, 1, 1.0),
            DataPoint::new(0, 4, 1.0),
        ]);

        let mut engine = Factorization::new(config()).unwrap();
        engine.count(5, &dataset).unwrap();

        assert_eq!(engine.context_count(), &[1, 1, 2, 0, 0]);
        assert_eq!(engine.item_count(), &[1, 2, 0, 0, 1]);

        assert!(engine.count(3, &dataset).is_err());
    }

    #[test]
    fn init_parameters() {
        let mut engine = Factorization::new(FactorizationConfig { dimensions: 4, ..config() }).unwrap();
        engine.init_parameters(6);

        let parameters = engine.parameters();
        assert_eq!(parameters.num_features(), 6);
        assert_eq!(parameters.dimensions(), 4);
        assert!(parameters.biases().iter().all(|&bias| bias == 0.0));
        assert!(parameters.vector(5).iter().any(|&component| component != 0.0));

        // the same seed yields the same parameters
        let mut other = Factorization::new(FactorizationConfig { dimensions: 4, ..config() }).unwrap();
        other.init_parameters(6);
        assert_eq!(other.parameters().vector(3), parameters.vector(3));
    }

    #[test]
    fn predict() {
        let mut engine = Factorization::new(FactorizationConfig { dimensions: 2, ..config() }).unwrap();
        engine.parameters = Parameters::from_parts(2, vec![0.5, -0.25, 1.0], vec![1.0, 2.0, 3.0, 4.0, 0.0, 1.0]);

        let sparse_vector = SparseVector::from_entries(&[(0, 1.0), (1, 2.0)]);
        // 0.5 - 0.5 + 1 * 2 * (3 + 8)
        assert!(close_enough_to(engine.predict(&sparse_vector), 22.0));

        let three = SparseVector::from_entries(&[(0, 1.0), (1, 1.0), (2, 1.0)]);
        // biases 1.25, pairs 11 + 2 + 4
        assert!(close_enough_to(engine.predict(&three), 18.25));
    }

    #[test]
    fn train_step() {
        let mut engine = Factorization::new(FactorizationConfig { loss: LossFunction::Mse, ..config() }).unwrap();
        engine.parameters = Parameters::from_parts(1, vec![0.0, 0.0], vec![1.0, 2.0]);

        let sparse_vector = SparseVector::from_entries(&[(0, 1.0), (1, 1.0)]);
        let loss = engine.train_step(&sparse_vector, 1.0, 1.0);

        // predicted 2, error 2, gradients 4 and 2, AdaGrad rates 1/4 and 1/2
        assert!(close_enough_to(loss, 1.0));
        assert!(close_enough_to(engine.parameters().vector(0)[0], 0.9));
        assert!(close_enough_to(engine.parameters().vector(1)[0], 1.9));
        assert!(close_enough_to(engine.parameters().bias(0), -0.05));
        assert!(close_enough_to(engine.parameters().bias(1), -0.1));
    }

    #[test]
    fn gradient_sign() {
        let mut engine = Factorization::new(config()).unwrap();
        engine.parameters = Parameters::from_parts(1, vec![0.0, 0.0], vec![1.0, 2.0]);

        let sparse_vector = SparseVector::from_entries(&[(0, 1.0), (1, 1.0)]);
        engine.apply_gradient(&sparse_vector, 2.0, -1.0);

        assert!(close_enough_to(engine.parameters().vector(0)[0], 1.1));
        assert!(close_enough_to(engine.parameters().bias(1), 0.1));
    }

    #[test]
    fn zero_gradient_leaves_parameters_untouched() {
        let mut engine = Factorization::new(FactorizationConfig { loss: LossFunction::Hinge, ..config() }).unwrap();
        engine.parameters = Parameters::from_parts(1, vec![0.0, 0.0], vec![1.0, 2.0]);

        // margin above one, the hinge loss is flat
        let sparse_vector = SparseVector::from_entries(&[(0, 1.0), (1, 1.0)]);
        let loss = engine.train_step(&sparse_vector, 1.0, 1.0);

        assert_eq!(loss, 0.0);
        assert_eq!(engine.parameters().vector(0), vec![1.0]);
        assert_eq!(engine.parameters().biases(), vec![0.0, 0.0]);
    }

    #[test]
    fn weight() {
        let engine = Factorization::new(FactorizationConfig { min_count: 100, alpha: 0.5, ..config() }).unwrap();
        assert!(close_enough_to(engine.weight(25.0), 0.5));
        assert!(close_enough_to(engine.weight(100.0), 1.0));
        assert!(close_enough_to(engine.weight(1_000.0), 1.0));
    }

    fn cooccurrences() -> (InMemoryDataset, usize) {
        // two clusters of entities, {0, 1, 2} and {3, 4, 5}, co-occurring only within a cluster
        let mut data_points = Vec::new();
        for _ in 0..20 {
            for cluster in 0..2_u32 {
                for a in 0..3_u32 {
                    for b in 0..3_u32 {
                        if a != b {
                            let (context, item) = (3 * cluster + a, 3 * cluster + b);
                            data_points.push(DataPoint::new(2 * context + 1, 2 * item, 1.0));
                        }
                    }
                }
            }
        }
        (InMemoryDataset::from(data_points), 12)
    }

    #[test]
    fn training_lowers_the_loss() {
        let (dataset, num_features) = cooccurrences();
        let config = FactorizationConfig {
            dimensions: 8,
            learn_rate: 0.05,
            iterations: 10,
            negatives: 3,
            table_size: 10_000,
            threads: 1,
            ..Default::default()
        };

        let mut engine = Factorization::new(config).unwrap();
        let stats = engine.train(&dataset, &[], num_features).unwrap();

        assert_eq!(stats.len(), 10);
        let first = stats[0].loss.average();
        let last = stats[9].loss.average();
        assert!(last.is_finite());
        assert!(last < first, "loss went from {} to {}", first, last);

        let accuracy = engine.accuracy(&dataset, &[], 0.0).unwrap();
        assert!(accuracy.average() > 50.0);
    }

    #[test]
    fn parallel_training_covers_every_example() {
        let (dataset, num_features) = cooccurrences();
        let config = FactorizationConfig {
            dimensions: 4,
            iterations: 2,
            negatives: 0,
            table_size: 100,
            threads: 4,
            ..Default::default()
        };

        let mut engine = Factorization::new(config).unwrap();
        let stats = engine.train(&dataset, &[], num_features).unwrap();

        assert_eq!(stats[0].loss.count(), dataset.size());
        assert_eq!(stats[1].loss.count(), dataset.size());
    }

    #[test]
    fn colliding_negatives_are_discarded() {
        // a single context, every negative sample collides with it
        let dataset = InMemoryDataset::from(vec![DataPoint::new(1, 0, 1.0), DataPoint::new(1, 2, 2.0)]);
        let config = FactorizationConfig {
            dimensions: 2,
            iterations: 1,
            negatives: 4,
            table_size: 10,
            threads: 1,
            ..Default::default()
        };

        let mut engine = Factorization::new(config).unwrap();
        let stats = engine.train(&dataset, &[], 4).unwrap();

        assert_eq!(stats[0].loss.count(), 2);
        assert!(stats[0].loss.average().is_finite());
    }

    #[test]
    fn regression_and_evaluation() {
        let (dataset, num_features) = cooccurrences();
        let config = FactorizationConfig {
            dimensions: 4,
            iterations: 3,
            negatives: 2,
            regression: true,
            loss: LossFunction::Mse,
            table_size: 1_000,
            threads: 2,
            ..Default::default()
        };

        let mut engine = Factorization::new(config).unwrap();
        assert_eq!(engine.objective(), Objective::Pointwise { regression: true });
        engine.train(&dataset, &[], num_features).unwrap();

        let before = engine.parameters().biases();
        let evaluation = engine.predict_dataset(&dataset, &[]).unwrap();
        assert!(evaluation.average().is_finite());
        assert!(evaluation.count() >= dataset.size());
        // evaluation does not train
        assert_eq!(engine.parameters().biases(), before);
    }

    #[test]
    fn pairwise_training() {
        let (dataset, num_features) = cooccurrences();
        let config = FactorizationConfig {
            dimensions: 4,
            iterations: 3,
            table_size: 1_000,
            threads: 2,
            ..Default::default()
        };

        let mut engine = Factorization::with_objective(config, Objective::Pairwise).unwrap();
        let stats = engine.train(&dataset, &[], num_features).unwrap();

        assert_eq!(stats.len(), 3);
        assert!(stats.iter().all(|stats| stats.loss.average().is_finite()));
        // the table covers items, which all sit at even dense ids
        assert!(engine.sampler.as_ref().unwrap().table().iter().all(|id| id % 2 == 0));
    }

    #[test]
    fn side_features_take_part() {
        let dataset = InMemoryDataset::from(vec![DataPoint::new(1, 0, 1.0), DataPoint::new(3, 2, 1.0)]);
        let features = vec![Some(SparseVector::from_entries(&[(4, 1.0)])), None, None, None, None];

        let config = FactorizationConfig {
            dimensions: 2,
            iterations: 1,
            negatives: 0,
            table_size: 10,
            threads: 1,
            ..Default::default()
        };

        let mut engine = Factorization::new(config).unwrap();
        engine.init_parameters(5);
        let untouched = engine.parameters().vector(4);

        engine.train(&dataset, &features, 5).unwrap();
        assert_ne!(engine.parameters().vector(4), untouched);
    }

    #[test]
    fn exported_vectors() {
        let mut engine = Factorization::new(FactorizationConfig { dimensions: 2, ..config() }).unwrap();
        engine.parameters = Parameters::from_parts(
            2,
            vec![0.0; 4],
            vec![1.0, 0.0, 0.0, 1.0, 2.0, 2.0, -1.0, 3.0],
        );

        let item_map: FnvHashMap<u32, u32> = vec![(10, 0), (20, 2)].into_iter().collect();
        let feature_map: FnvHashMap<u32, u32> = vec![(7, 3)].into_iter().collect();
        let mut raw_features = RawFeatures::default();
        raw_features.insert(10, SparseVector::from_entries(&[(7, 2.0)]));

        let vectors = engine.vectors(&item_map);
        assert_eq!(vectors[&10], vec![1.0, 0.0]);
        assert_eq!(vectors[&20], vec![2.0, 2.0]);

        let with_features = engine.feature_vectors(&item_map, &feature_map, &raw_features);
        assert_eq!(with_features[&10], vec![-1.0, 6.0]);
        assert_eq!(with_features[&20], vec![2.0, 2.0]);

        let side_only = engine.side_feature_vectors(&feature_map, &raw_features);
        assert_eq!(side_only.len(), 1);
        assert_eq!(side_only[&10], vec![-2.0, 6.0]);
    }
}
