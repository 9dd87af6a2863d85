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

//! Learns embeddings for items, contexts and side features from co-occurrence data with a
//! factorization machine, trained by lock-free parallel SGD with negative sampling.

#[macro_use]
extern crate serde_derive;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

pub mod config;
pub mod dataset;
pub mod error;
pub mod hogwild;
pub mod io;
pub mod lcg;
pub mod loss;
pub mod mapper;
pub mod metrics;
pub mod model;
pub mod parallel;
pub mod sampling;
pub mod similar;
pub mod types;
pub mod utils;


pub use crate::config::FactorizationConfig;
pub use crate::dataset::{CompactDataset, Dataset, DiskDataset, InMemoryDataset, WindowDataset};
pub use crate::error::{Error, Result};
pub use crate::loss::LossFunction;
pub use crate::mapper::{DenseMapper, Renaming};
pub use crate::metrics::{Accuracy, Bins, LossAverager};
pub use crate::model::{Factorization, IterationStats, Objective};
pub use crate::types::{DataPoint, FeatureTable, RawFeatures, SparseVector};

/// A trained model together with the dense mapping it was trained on.
pub struct Embeddings {
    pub mapper: DenseMapper,
    pub model: Factorization,
    pub iterations: Vec<IterationStats>,
}

impl Embeddings {

    /// Item vectors keyed by original id.
    pub fn item_vectors(&self) -> fnv::FnvHashMap<u32, Vec<f32>> {
        self.model.vectors(self.mapper.item_map())
    }

    /// Context vectors keyed by original id.
    pub fn context_vectors(&self) -> fnv::FnvHashMap<u32, Vec<f32>> {
        self.model.vectors(self.mapper.context_map())
    }
}

/// Trains embeddings on interactions between arbitrary context and item ids. The interactions
/// are mapped to dense ids and held in memory during training.
pub fn train_embeddings(
    interactions: &dyn Dataset,
    raw_features: &RawFeatures,
    config: FactorizationConfig,
    objective: Objective,
) -> Result<Embeddings> {

    let mut model = Factorization::with_objective(config, objective)?;

    let mut mapper = DenseMapper::new();
    mapper.learn(interactions, raw_features)?;

    let dataset = mapper.map_dataset(interactions)?;
    let features = mapper.map_features(raw_features);

    let iterations = train(&mut model, &dataset, &features, mapper.num_features())?;

    Ok(Embeddings { mapper, model, iterations })
}

/// Like [`train_embeddings`], but the mapped interactions are written to `mapped_path` and
/// streamed from there in every pass instead of being held in memory.
pub fn train_embeddings_on_disk<P: AsRef<Path>>(
    interactions: &dyn Dataset,
    raw_features: &RawFeatures,
    mapped_path: P,
    config: FactorizationConfig,
    objective: Objective,
) -> Result<Embeddings> {

    let mut model = Factorization::with_objective(config, objective)?;

    let mut mapper = DenseMapper::new();
    mapper.learn(interactions, raw_features)?;

    let mut out = BufWriter::new(File::create(mapped_path.as_ref())?);
    mapper.write(interactions, &mut out)?;
    drop(out);

    let dataset = DiskDataset::open(mapped_path)?;
    let features = mapper.map_features(raw_features);

    let iterations = train(&mut model, &dataset, &features, mapper.num_features())?;

    Ok(Embeddings { mapper, model, iterations })
}

/// Trains embeddings on rows of item ids, such as sessions. Pairs are generated from all items
/// within a randomly sized window of at most `window` positions around each item.
pub fn train_embeddings_from_rows(
    mut rows: Vec<Vec<u32>>,
    window: u32,
    raw_features: &RawFeatures,
    config: FactorizationConfig,
    objective: Objective,
) -> Result<Embeddings> {

    let seed = config.seed;
    let mut model = Factorization::with_objective(config, objective)?;

    let mut mapper = DenseMapper::new();
    mapper.learn_rows(&rows, raw_features);
    mapper.map_rows(&mut rows);

    let dataset = WindowDataset::new(rows, window, seed)?;
    let features = mapper.map_features(raw_features);

    let iterations = train(&mut model, &dataset, &features, mapper.num_features())?;

    Ok(Embeddings { mapper, model, iterations })
}

fn train(
    model: &mut Factorization,
    dataset: &dyn Dataset,
    features: &[Option<SparseVector>],
    num_features: u32,
) -> Result<Vec<IterationStats>> {

    let training_start = Instant::now();

    let iterations = model.train(dataset, features, num_features as usize)?;

    tracing::info!(
        examples = dataset.size(),
        millis = utils::to_millis(training_start.elapsed()),
        "training finished"
    );

    Ok(iterations)
}
