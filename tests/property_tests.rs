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

//! Property based tests for invariants that hold for arbitrary inputs.

use proptest::prelude::*;

mod metrics_props {
    use super::*;

    use fmembed::{Bins, LossAverager};

    fn arb_losses() -> impl Strategy<Value = Vec<(u32, u32)>> {
        prop::collection::vec((0u32..100, 0u32..100_000), 0..50)
    }

    fn averager(losses: &[(u32, u32)]) -> LossAverager {
        let mut averager = LossAverager::new(&Bins::default());
        for &(loss, count) in losses {
            averager.add(f64::from(loss), count).unwrap();
        }
        averager
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // integer valued losses keep the sums exact
        #[test]
        fn merge_is_associative(a in arb_losses(), b in arb_losses(), c in arb_losses()) {
            let (a, b, c) = (averager(&a), averager(&b), averager(&c));

            let left = a.clone().merged(&b).merged(&c);
            let right = a.clone().merged(&b.clone().merged(&c));

            prop_assert_eq!(left.count(), a.count() + b.count() + c.count());
            prop_assert_eq!(left, right);
        }

        #[test]
        fn merging_matches_adding_everything(a in arb_losses(), b in arb_losses()) {
            let mut all = a.clone();
            all.extend_from_slice(&b);

            prop_assert_eq!(averager(&a).merged(&averager(&b)), averager(&all));
        }
    }
}

mod sampling_props {
    use super::*;

    use fmembed::sampling::sampling_table;

    fn arb_counts() -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(0u32..50, 1..30)
            .prop_filter("at least one positive count", |counts| counts.iter().any(|&count| count > 0))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn table_is_sorted_and_covers_only_observed_ids(
            counts in arb_counts(),
            alpha in 0.1f64..1.0,
            table_size in 1usize..500,
        ) {
            let table = sampling_table(&counts, alpha, table_size).unwrap();

            prop_assert_eq!(table.len(), table_size);
            prop_assert!(table.windows(2).all(|pair| pair[0] <= pair[1]));
            prop_assert!(table.iter().all(|&id| counts[id as usize] > 0));
        }

        // without smoothing and one slot per occurrence, each id gets about its count
        #[test]
        fn unsmoothed_shares_follow_counts(counts in arb_counts()) {
            let total: u32 = counts.iter().sum();
            let table = sampling_table(&counts, 1.0, total as usize).unwrap();

            for (id, &count) in counts.iter().enumerate() {
                let share = table.iter().filter(|&&sampled| sampled as usize == id).count() as i64;
                prop_assert!((share - i64::from(count)).abs() <= 2, "id {} count {} share {}", id, count, share);
            }
        }

        #[test]
        fn all_zero_counts_are_rejected(len in 1usize..20, table_size in 1usize..100) {
            prop_assert!(sampling_table(&vec![0; len], 0.75, table_size).is_err());
        }
    }
}

mod window_props {
    use super::*;

    use fmembed::{DataPoint, Dataset, WindowDataset};

    fn arb_rows() -> impl Strategy<Value = Vec<Vec<u32>>> {
        prop::collection::vec(prop::collection::vec(0u32..20, 0..8), 0..10)
    }

    fn pairs(dataset: &WindowDataset) -> Vec<DataPoint> {
        dataset.iter().unwrap().map(|data_point| data_point.unwrap()).collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn generation_is_deterministic(rows in arb_rows(), window in 1u32..5, seed in any::<u64>()) {
            let first = WindowDataset::new(rows.clone(), window, seed).unwrap();
            let second = WindowDataset::new(rows, window, seed).unwrap();

            let generated = pairs(&first);
            prop_assert_eq!(generated.len() as u64, first.size());
            prop_assert_eq!(&generated, &pairs(&second));
            prop_assert_eq!(&generated, &pairs(&first));
        }

        #[test]
        fn pairs_come_from_a_single_row(rows in arb_rows(), window in 1u32..5, seed in any::<u64>()) {
            let dataset = WindowDataset::new(rows.clone(), window, seed).unwrap();

            // contexts take the odd slot right after their item slot
            for data_point in pairs(&dataset) {
                let context_item = data_point.context_id - 1;
                let from_one_row = rows.iter()
                    .any(|row| row.contains(&context_item) && row.contains(&data_point.item_id));
                prop_assert!(from_one_row, "pair {:?} not generated from a single row", data_point);
                prop_assert!((data_point.rating - 1.0).abs() < std::f32::EPSILON);
            }
        }

        #[test]
        fn ranges_add_up_to_the_whole(rows in arb_rows(), window in 1u32..5, split in 0u64..100) {
            let dataset = WindowDataset::new(rows, window, 42).unwrap();
            let split = split.min(dataset.size());

            let mut ranged: Vec<DataPoint> = dataset.iter_range(0, split).unwrap()
                .map(|data_point| data_point.unwrap())
                .collect();
            ranged.extend(dataset.iter_range(split, dataset.size() - split).unwrap()
                .map(|data_point| data_point.unwrap()));

            prop_assert_eq!(ranged, pairs(&dataset));
        }
    }
}

mod mapper_props {
    use super::*;

    use std::collections::BTreeSet;

    use fmembed::{DataPoint, Dataset, DenseMapper, InMemoryDataset, RawFeatures, Renaming};

    // contexts overlap only partly with the items, so some contexts never occur as items
    fn arb_interactions() -> impl Strategy<Value = Vec<(u32, u32)>> {
        prop::collection::vec((0u32..60, 20u32..80), 1..40)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn mapping_is_dense_and_reversible(interactions in arb_interactions()) {
            let raw = InMemoryDataset::from(interactions.iter()
                .map(|&(context, item)| DataPoint::new(context, item, 1.0))
                .collect::<Vec<_>>());

            let items: BTreeSet<u32> = interactions.iter().map(|&(_, item)| item).collect();
            let expected: Vec<DataPoint> = raw.data_points().iter()
                .filter(|data_point| items.contains(&data_point.context_id))
                .cloned()
                .collect();

            let mut mapper = DenseMapper::new();
            mapper.learn(&raw, &RawFeatures::default()).unwrap();
            let mapped = mapper.map_dataset(&raw).unwrap();

            prop_assert_eq!(mapper.num_items(), items.len());
            prop_assert_eq!(mapper.num_features() as usize, 2 * items.len());
            prop_assert_eq!(mapped.size(), expected.len() as u64);

            let renaming = Renaming::from(&mapper);
            let mut restored = Vec::with_capacity(expected.len());
            for data_point in mapped.iter().unwrap() {
                let data_point = data_point.unwrap();
                prop_assert_eq!(data_point.item_id % 2, 0);
                prop_assert_eq!(data_point.context_id % 2, 1);
                prop_assert!(data_point.context_id < mapper.num_features());
                restored.push(renaming.unmap(&data_point).unwrap());
            }

            prop_assert_eq!(restored, expected);
        }
    }
}
