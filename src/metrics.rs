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

//! Statistics binned by how often an item occurred in the train set. Long tail items are expected
//! to be predicted worse than items with lots of signal, the bins make that visible.
//!
//! Every worker fills its own accumulator, the accumulators are merged once a pass is done.
//! Merging is bucket-wise addition, so the merge order does not matter.

use std::fmt;

use crate::error::{Error, Result};

/// Ascending occurrence count boundaries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bins {
    boundaries: Vec<u32>,
}

impl Bins {

    pub fn new(boundaries: Vec<u32>) -> Result<Self> {
        if boundaries.is_empty() {
            return Err(Error::Config("at least one bin boundary is required".to_string()));
        }
        if boundaries.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::Config(format!("bin boundaries must be ascending: {:?}", boundaries)));
        }
        Ok(Bins { boundaries })
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn boundaries(&self) -> &[u32] {
        &self.boundaries
    }

    /// Index of the first boundary strictly greater than `count`.
    pub fn bin(&self, count: u32) -> Result<usize> {
        self.boundaries.iter()
            .position(|&boundary| count < boundary)
            .ok_or_else(|| Error::OutOfRange { count, max: self.boundaries[self.boundaries.len() - 1] })
    }
}

impl Default for Bins {
    fn default() -> Self {
        Bins { boundaries: vec![10, 20, 50, 100, 1_000, 5_000, 100_000] }
    }
}

/// Binned average of per-example losses.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LossAverager {
    bins: Bins,
    bin_counts: Vec<u64>,
    binned_loss: Vec<f64>,
}

impl LossAverager {

    pub fn new(bins: &Bins) -> Self {
        LossAverager {
            bins: bins.clone(),
            bin_counts: vec![0; bins.len()],
            binned_loss: vec![0.0; bins.len()],
        }
    }

    /// Records the loss of an example whose item occurred `count` times in the train set.
    pub fn add(&mut self, loss: f64, count: u32) -> Result<()> {
        let bin = self.bins.bin(count)?;
        self.binned_loss[bin] += loss;
        self.bin_counts[bin] += 1;
        Ok(())
    }

    /// Adds up another averager over the same bins.
    pub fn merge(&mut self, other: &LossAverager) {
        debug_assert_eq!(self.bins, other.bins);
        for (count, other_count) in self.bin_counts.iter_mut().zip(other.bin_counts.iter()) {
            *count += *other_count;
        }
        for (loss, other_loss) in self.binned_loss.iter_mut().zip(other.binned_loss.iter()) {
            *loss += *other_loss;
        }
    }

    pub fn merged(mut self, other: &LossAverager) -> Self {
        self.merge(other);
        self
    }

    pub fn count(&self) -> u64 {
        self.bin_counts.iter().sum()
    }

    pub fn bin_counts(&self) -> &[u64] {
        &self.bin_counts
    }

    /// Average loss over all bins, NaN when nothing was recorded.
    pub fn average(&self) -> f64 {
        let sum_loss: f64 = self.binned_loss.iter().sum();
        sum_loss / self.count() as f64
    }

    /// Average loss per bin. Bins without any recorded example come out as NaN.
    pub fn per_bin_average(&self) -> Vec<f64> {
        self.binned_loss.iter()
            .zip(self.bin_counts.iter())
            .map(|(loss, count)| loss / *count as f64)
            .collect()
    }
}

impl fmt::Display for LossAverager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.4} --> ", self.average())?;
        for ((boundary, loss), count) in self.bins.boundaries().iter()
            .zip(self.per_bin_average())
            .zip(self.bin_counts.iter()) {
            write!(f, "bin-{}:{:.4} ({}) | ", boundary, loss, count)?;
        }
        Ok(())
    }
}

/// Binned share of correctly classified positive and negative examples.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Accuracy {
    bins: Bins,
    positives: Vec<u64>,
    positives_correct: Vec<u64>,
    negatives: Vec<u64>,
    negatives_correct: Vec<u64>,
}

impl Accuracy {

    pub fn new(bins: &Bins) -> Self {
        Accuracy {
            bins: bins.clone(),
            positives: vec![0; bins.len()],
            positives_correct: vec![0; bins.len()],
            negatives: vec![0; bins.len()],
            negatives_correct: vec![0; bins.len()],
        }
    }

    /// A positive example counts as correct if its score is above the threshold.
    pub fn add_positive(&mut self, score: f32, threshold: f64, count: u32) -> Result<()> {
        let bin = self.bins.bin(count)?;
        self.positives[bin] += 1;
        if f64::from(score) > threshold {
            self.positives_correct[bin] += 1;
        }
        Ok(())
    }

    /// A negative example counts as correct if its score is below the threshold.
    pub fn add_negative(&mut self, score: f32, threshold: f64, count: u32) -> Result<()> {
        let bin = self.bins.bin(count)?;
        self.negatives[bin] += 1;
        if f64::from(score) < threshold {
            self.negatives_correct[bin] += 1;
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &Accuracy) {
        debug_assert_eq!(self.bins, other.bins);
        add_into(&mut self.positives, &other.positives);
        add_into(&mut self.positives_correct, &other.positives_correct);
        add_into(&mut self.negatives, &other.negatives);
        add_into(&mut self.negatives_correct, &other.negatives_correct);
    }

    pub fn merged(mut self, other: &Accuracy) -> Self {
        self.merge(other);
        self
    }

    /// Percentage of correct predictions over all bins.
    pub fn average(&self) -> f64 {
        let total: u64 = self.positives.iter().sum::<u64>() + self.negatives.iter().sum::<u64>();
        let correct: u64 = self.positives_correct.iter().sum::<u64>()
            + self.negatives_correct.iter().sum::<u64>();
        100.0 * correct as f64 / total as f64
    }

    /// Percentage of correct positive predictions per bin, NaN for empty bins.
    pub fn per_bin_positive(&self) -> Vec<f64> {
        percentages(&self.positives_correct, &self.positives)
    }

    /// Percentage of correct negative predictions per bin, NaN for empty bins.
    pub fn per_bin_negative(&self) -> Vec<f64> {
        percentages(&self.negatives_correct, &self.negatives)
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.2}% --> ", self.average())?;
        let positive = self.per_bin_positive();
        let negative = self.per_bin_negative();
        for (bin, boundary) in self.bins.boundaries().iter().enumerate() {
            write!(f, "bin-{}: p:{:.2}%({}) n:{:.2}%({}) | ", boundary, positive[bin],
                self.positives[bin], negative[bin], self.negatives[bin])?;
        }
        Ok(())
    }
}

fn add_into(target: &mut [u64], other: &[u64]) {
    for (value, other_value) in target.iter_mut().zip(other.iter()) {
        *value += *other_value;
    }
}

fn percentages(correct: &[u64], total: &[u64]) -> Vec<f64> {
    correct.iter()
        .zip(total.iter())
        .map(|(correct, total)| 100.0 * *correct as f64 / *total as f64)
        .collect()
}

#[cfg(test)]
mod tests {

    use super::*;

    fn bins() -> Bins {
        Bins::new(vec![10, 20, 30, 40]).unwrap()
    }

    fn close_enough_to(value: f64, expected: f64) -> bool {
        (value - expected).abs() < 0.0001
    }

    #[test]
    fn bin() {
        let bins = bins();
        assert_eq!(bins.bin(5).unwrap(), 0);
        assert_eq!(bins.bin(10).unwrap(), 1);
        assert_eq!(bins.bin(15).unwrap(), 1);
        assert_eq!(bins.bin(29).unwrap(), 2);

        match bins.bin(50) {
            Err(err @ Error::OutOfRange { .. }) =>
                assert!(err.to_string().starts_with("50 is outside the bins")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn invalid_bins() {
        assert!(Bins::new(vec![]).is_err());
        assert!(Bins::new(vec![10, 10, 20]).is_err());
        assert!(Bins::new(vec![20, 10]).is_err());
    }

    #[test]
    fn averages() {
        let mut averager = LossAverager::new(&bins());
        averager.add(1.0, 5).unwrap();
        averager.add(3.0, 5).unwrap();
        averager.add(2.0, 25).unwrap();

        assert_eq!(averager.count(), 3);
        assert!(close_enough_to(averager.average(), 2.0));

        let per_bin = averager.per_bin_average();
        assert!(close_enough_to(per_bin[0], 2.0));
        assert!(per_bin[1].is_nan());
        assert!(close_enough_to(per_bin[2], 2.0));
        assert!(per_bin[3].is_nan());

        assert!(averager.add(1.0, 40).is_err());
        assert_eq!(averager.count(), 3);
    }

    #[test]
    fn merge_adds_bucket_wise() {
        let mut a = LossAverager::new(&bins());
        a.add(1.0, 1).unwrap();
        let mut b = LossAverager::new(&bins());
        b.add(2.0, 1).unwrap();
        b.add(4.0, 35).unwrap();

        let ab = a.clone().merged(&b);
        let ba = b.clone().merged(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.bin_counts(), &[2, 0, 0, 1]);
        assert!(close_enough_to(ab.average(), 7.0 / 3.0));
    }

    #[test]
    fn display() {
        let mut averager = LossAverager::new(&Bins::new(vec![10]).unwrap());
        averager.add(0.5, 1).unwrap();
        assert_eq!(averager.to_string(), "0.5000 --> bin-10:0.5000 (1) | ");
    }

    #[test]
    fn accuracy() {
        let mut accuracy = Accuracy::new(&bins());
        accuracy.add_positive(0.7, 0.0, 1).unwrap();
        accuracy.add_positive(-0.2, 0.0, 1).unwrap();
        accuracy.add_negative(-1.0, 0.0, 12).unwrap();
        accuracy.add_negative(-3.0, 0.0, 12).unwrap();

        assert!(close_enough_to(accuracy.average(), 75.0));
        assert!(close_enough_to(accuracy.per_bin_positive()[0], 50.0));
        assert!(close_enough_to(accuracy.per_bin_negative()[1], 100.0));
        assert!(accuracy.per_bin_negative()[0].is_nan());

        let mut other = Accuracy::new(&bins());
        other.add_positive(1.0, 0.0, 1).unwrap();
        accuracy.merge(&other);
        assert!(close_enough_to(accuracy.average(), 80.0));

        assert!(accuracy.add_positive(1.0, 0.0, 1_000).is_err());
    }
}
