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

//! Text formats at the boundary of the library: tab separated interactions, side features and
//! rows of item ids go in, latent vectors, biases and a JSON training report come out.

use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use fnv::FnvHashMap;

use crate::config::FactorizationConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::metrics::{Accuracy, LossAverager};
use crate::model::{IterationStats, Objective};
use crate::types::{DataPoint, RawFeatures, SparseVector};

/// Reads tab separated input. We expect NO headers, and a varying number of columns per line.
pub fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(b'\t')
        .from_reader(reader)
}

/// Appends all `context item rating` lines of a file to `dataset`, returns their number.
pub fn read_interactions<P: AsRef<Path>>(path: P, dataset: &mut dyn Dataset) -> Result<u64> {
    let mut reader = csv_reader(File::open(path)?);
    let mut num_interactions = 0;

    for record in reader.deserialize::<DataPoint>() {
        dataset.add_datapoint(record?)?;
        num_interactions += 1;
    }

    Ok(num_interactions)
}

/// Side features in lines of `item feature:value feature:value ...`.
pub fn read_features<P: AsRef<Path>>(path: P) -> Result<RawFeatures> {
    let mut reader = csv_reader(File::open(path)?);
    let mut features = RawFeatures::default();

    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |position| position.line());
        let parse_error = |reason: String| Error::Parse { line, reason };

        let mut columns = record.iter();
        let item_id: u32 = match columns.next() {
            Some(column) => column.trim().parse()
                .map_err(|_| parse_error(format!("bad item id '{}'", column)))?,
            None => continue,
        };

        let mut entries = Vec::with_capacity(record.len().saturating_sub(1));
        for column in columns.filter(|column| !column.trim().is_empty()) {
            entries.push(parse_feature(column).map_err(parse_error)?);
        }

        features.insert(item_id, SparseVector::from_entries(&entries));
    }

    Ok(features)
}

fn parse_feature(column: &str) -> std::result::Result<(u32, f32), String> {
    let mut parts = column.trim().splitn(2, ':');
    let key = parts.next().and_then(|key| key.parse().ok());
    let value = parts.next().and_then(|value| value.parse().ok());

    match (key, value) {
        (Some(key), Some(value)) => Ok((key, value)),
        _ => Err(format!("bad feature '{}', expected feature:value", column)),
    }
}

/// One row of whitespace separated ids per line, such as the items of a session.
pub fn read_rows<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<u32>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let row = line.split_whitespace()
            .map(|id| id.parse::<u32>())
            .collect::<std::result::Result<Vec<u32>, _>>()
            .map_err(|err| Error::Parse { line: index as u64 + 1, reason: err.to_string() })?;
        rows.push(row);
    }

    Ok(rows)
}

/// Reads vectors written by [`write_vectors`].
pub fn read_vectors<P: AsRef<Path>>(path: P) -> Result<FnvHashMap<u32, Vec<f32>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut vectors = FnvHashMap::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let parse_error = |reason: String| Error::Parse { line: index as u64 + 1, reason };

        let mut columns = line.split_whitespace();
        let id = match columns.next() {
            Some(id) => id.parse::<u32>().map_err(|err| parse_error(err.to_string()))?,
            None => continue,
        };
        let vector = columns
            .map(|component| component.parse::<f32>())
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|err| parse_error(err.to_string()))?;

        vectors.insert(id, vector);
    }

    Ok(vectors)
}

/// Writes one `id v1 v2 ...` line per vector with four decimals, ordered by id.
pub fn write_vectors<W: Write>(vectors: &FnvHashMap<u32, Vec<f32>>, out: &mut W) -> io::Result<()> {
    let mut ids: Vec<&u32> = vectors.keys().collect();
    ids.sort_unstable();

    for id in ids {
        write!(out, "{}", id)?;
        for component in &vectors[id] {
            write!(out, " {:.4}", component)?;
        }
        writeln!(out)?;
    }

    out.flush()
}

/// Writes one bias per line, the line number is the dense id.
pub fn write_biases<W: Write>(biases: &[f32], out: &mut W) -> io::Result<()> {
    for bias in biases {
        writeln!(out, "{:.4}", bias)?;
    }
    out.flush()
}

/// Buffered writer for a new file `name` in `directory`.
pub fn output_file<P: AsRef<Path>>(directory: P, name: &str) -> io::Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(directory.as_ref().join(name))?))
}

/// Evaluation on a held out test set.
#[derive(Debug, Serialize)]
pub struct TestReport {
    pub size: u64,
    /// Share of test examples whose ids were seen during training, in percent.
    pub predictable: f64,
    pub loss: LossAverager,
    /// Classification and ranking only, regression has no decision threshold.
    pub accuracy: Option<Accuracy>,
}

/// Summary of a training run, written as JSON next to the embeddings.
#[derive(Debug, Serialize)]
pub struct TrainingReport<'a> {
    pub config: &'a FactorizationConfig,
    pub objective: Objective,
    pub num_features: u32,
    pub train_size: u64,
    pub iterations: &'a [IterationStats],
    pub test: Option<TestReport>,
}

pub fn write_report<W: Write>(report: &TrainingReport, out: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {

    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::dataset::InMemoryDataset;
    use crate::metrics::Bins;

    #[test]
    fn interactions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("interactions.tsv");
        fs::write(&path, "1\t2\t3.5\n4\t5\t1\n").unwrap();

        let mut dataset = InMemoryDataset::default();
        assert_eq!(read_interactions(&path, &mut dataset).unwrap(), 2);
        assert_eq!(dataset.data_points(), &[DataPoint::new(1, 2, 3.5), DataPoint::new(4, 5, 1.0)]);

        fs::write(&path, "1\tx\t3.5\n").unwrap();
        assert!(read_interactions(&path, &mut InMemoryDataset::default()).is_err());
    }

    #[test]
    fn features() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("features.tsv");
        fs::write(&path, "7\t100:0.5\t200:1\n8\n9\t100:2\n").unwrap();

        let features = read_features(&path).unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[&7], SparseVector::from_entries(&[(100, 0.5), (200, 1.0)]));
        assert!(features[&8].is_empty());
        assert_eq!(features[&9], SparseVector::from_entries(&[(100, 2.0)]));

        fs::write(&path, "7\t100:0.5\n8\t100-2\n").unwrap();
        match read_features(&path) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.txt");
        fs::write(&path, "1 2 3\n4\t5\n\n6\n").unwrap();

        assert_eq!(read_rows(&path).unwrap(), vec![vec![1, 2, 3], vec![4, 5], vec![], vec![6]]);
    }

    #[test]
    fn vectors_and_biases() {
        let vectors: FnvHashMap<u32, Vec<f32>> =
            vec![(20, vec![1.0, -0.5]), (3, vec![0.12345, 2.0])].into_iter().collect();

        let mut out = Vec::new();
        write_vectors(&vectors, &mut out).unwrap();
        let written = String::from_utf8(out).unwrap();
        assert_eq!(written, "3 0.1235 2.0000\n20 1.0000 -0.5000\n");

        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.tsv");
        fs::write(&path, &written).unwrap();
        let restored = read_vectors(&path).unwrap();
        assert_eq!(restored[&20], vec![1.0, -0.5]);
        assert_eq!(restored[&3], vec![0.1235, 2.0]);

        let mut out = Vec::new();
        write_biases(&[0.5, -1.0], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0.5000\n-1.0000\n");
    }

    #[test]
    fn report() {
        let config = FactorizationConfig { threads: 1, ..Default::default() };
        let bins = Bins::default();
        let mut loss = LossAverager::new(&bins);
        loss.add(0.5, 3).unwrap();
        let iterations = vec![IterationStats { iteration: 1, millis: 12, loss }];

        let report = TrainingReport {
            config: &config,
            objective: Objective::Pairwise,
            num_features: 10,
            train_size: 1,
            iterations: &iterations,
            test: None,
        };

        let mut out = Vec::new();
        write_report(&report, &mut out).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["num_features"], 10);
        assert_eq!(json["objective"], "pairwise");
        assert_eq!(json["iterations"][0]["millis"], 12);
        assert_eq!(json["config"]["loss"], "logistic");
        assert!(json["test"].is_null());
    }
}
