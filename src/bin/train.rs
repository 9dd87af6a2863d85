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

use std::env;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use getopts::{Matches, Options};
use tracing_subscriber::EnvFilter;

use fmembed::io::{self, TestReport, TrainingReport};
use fmembed::{
    Bins, Dataset, Embeddings, FactorizationConfig, InMemoryDataset, LossFunction, Objective,
    RawFeatures,
};

fn main() {

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let opts = options();

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, opts, None);
    }

    let (train_path, output_dir) = match (matches.opt_str("i"), matches.opt_str("o")) {
        (Some(train_path), Some(output_dir)) => (train_path, output_dir),
        _ => return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify a trainset via --trainset and an output directory via --output."),
        ),
    };

    if matches.opt_present("bpr") && matches.opt_present("regression") {
        return print_usage_and_exit(&program, opts, Some("--bpr and --regression exclude each other."));
    }

    let (config, window) = match parse_config(&matches) {
        Ok(parsed) => parsed,
        Err(hint) => return print_usage_and_exit(&program, opts, Some(&hint)),
    };

    if let Err(failure) = init_logging() {
        eprintln!("Unable to set up logging: {}", failure);
    }

    let objective = if matches.opt_present("bpr") {
        Objective::Pairwise
    } else {
        Objective::Pointwise { regression: config.regression }
    };

    let run = Run {
        train_path: &train_path,
        test_path: matches.opt_str("t"),
        features_path: matches.opt_str("f"),
        output_dir: Path::new(&output_dir),
        rowbased: matches.opt_present("rowbased"),
        stream: matches.opt_present("stream"),
        window,
    };

    if let Err(failure) = run.execute(config, objective) {
        tracing::error!(error = %failure, "training failed");
        std::process::exit(1);
    }
}

fn options() -> Options {
    let defaults = FactorizationConfig::default();

    let mut opts = Options::new();
    opts.optopt("i", "trainset", "Training interactions (required). One context id, item id and \
        rating per line, separated by tabs. With --rowbased, one row of whitespace separated \
        item ids per line.", "PATH");
    opts.optopt("t", "testset", "Held out interactions to evaluate the model on (optional).", "PATH");
    opts.optopt("f", "features", "Side features of items (optional). One item id per line, \
        followed by tab separated feature:value pairs.", "PATH");
    opts.optopt("o", "output", "Output directory (required), created if missing.", "DIR");
    opts.optopt("d", "dimensions", "Number of latent dimensions (defaults to 20).", "NUMBER");
    opts.optopt("l", "learnrate", "Initial learn rate (defaults to 0.05).", "RATE");
    opts.optopt("", "lambda1", "Regularization of the biases (defaults to 0).", "LAMBDA");
    opts.optopt("", "lambda2", "Regularization of the latent vectors (defaults to 0).", "LAMBDA");
    opts.optopt("n", "iterations", "Number of passes over the data (defaults to 10).", "NUMBER");
    opts.optopt("s", "negatives", "Negative samples per example (defaults to 5).", "NUMBER");
    opts.optopt("", "lossfunction", "One of logistic, hinge or mse (defaults to logistic).", "NAME");
    opts.optflag("", "regression", "Fit ln(1 + rating) instead of classifying observed pairs \
        against sampled ones.");
    opts.optflag("", "bpr", "Rank observed items above sampled items (pairwise objective).");
    opts.optflag("", "stream", "Stream the mapped training data from disk instead of holding \
        it in memory.");
    opts.optflag("", "rowbased", "Read rows of item ids and generate pairs within a window.");
    opts.optopt("w", "window", "Maximum window size for --rowbased (defaults to 5).", "NUMBER");
    let default_bins: Vec<String> = defaults.bins.boundaries().iter().map(u32::to_string).collect();
    opts.optopt("b", "bins", &format!("Comma separated upper bounds of the item frequency bins used \
        for reporting (defaults to {}).", default_bins.join(",")), "LIST");
    opts.optopt("", "tablesize", "Size of the negative sampling table (defaults to 100000000).", "NUMBER");
    opts.optopt("", "mincount", "Count from which on examples get full weight in regression \
        mode (defaults to 100).", "NUMBER");
    opts.optopt("a", "alpha", "Smoothing exponent for sampling and weights (defaults to 0.75).", "NUMBER");
    opts.optopt("p", "threads", "Number of worker threads (defaults to the number of cores).", "NUMBER");
    opts.optopt("", "seed", "Seed for initialization and sampling.", "NUMBER");
    opts.optflag("h", "help", "Print this help menu");

    opts
}

fn init_logging() -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fmembed=info,fmembed_train=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
}

/// Prints the usage and ends the process, unsuccessfully if there is a `hint` on what went wrong.
fn print_usage_and_exit(
    program: &str,
    opts: Options,
    hint: Option<&str>
) -> ! {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));

    std::process::exit(exit_status(hint))
}

fn exit_status(hint: Option<&str>) -> i32 {
    if hint.is_some() { 1 } else { 0 }
}

fn option<T: FromStr>(matches: &Matches, name: &str, default: T) -> Result<T, String>
    where T::Err: std::fmt::Display
{
    matches.opt_get_default(name, default)
        .map_err(|failure| format!("Problem with option '{}': {}", name, failure))
}

fn parse_config(matches: &Matches) -> Result<(FactorizationConfig, u32), String> {
    let defaults = FactorizationConfig::default();

    let loss = match matches.opt_str("lossfunction") {
        Some(name) => LossFunction::from_name(&name).map_err(|failure| failure.to_string())?,
        None => defaults.loss,
    };

    let bins = match matches.opt_str("b") {
        Some(list) => {
            let boundaries = list.split(',')
                .map(|boundary| boundary.trim().parse::<u32>())
                .collect::<Result<Vec<u32>, _>>()
                .map_err(|failure| format!("Problem with option 'bins': {}", failure))?;
            Bins::new(boundaries).map_err(|failure| failure.to_string())?
        },
        None => defaults.bins.clone(),
    };

    let config = FactorizationConfig {
        dimensions: option(matches, "d", defaults.dimensions)?,
        learn_rate: option(matches, "l", defaults.learn_rate)?,
        lambda1: option(matches, "lambda1", defaults.lambda1)?,
        lambda2: option(matches, "lambda2", defaults.lambda2)?,
        iterations: option(matches, "n", defaults.iterations)?,
        negatives: option(matches, "s", defaults.negatives)?,
        loss,
        regression: matches.opt_present("regression"),
        table_size: option(matches, "tablesize", defaults.table_size)?,
        min_count: option(matches, "mincount", defaults.min_count)?,
        alpha: option(matches, "a", defaults.alpha)?,
        bins,
        threads: option(matches, "p", defaults.threads)?,
        seed: option(matches, "seed", defaults.seed)?,
    };

    config.validate().map_err(|failure| failure.to_string())?;

    let window = option(matches, "w", 5)?;

    Ok((config, window))
}

struct Run<'a> {
    train_path: &'a str,
    test_path: Option<String>,
    features_path: Option<String>,
    output_dir: &'a Path,
    rowbased: bool,
    stream: bool,
    window: u32,
}

impl<'a> Run<'a> {

    fn execute(&self, config: FactorizationConfig, objective: Objective) -> fmembed::Result<()> {
        fs::create_dir_all(self.output_dir)?;

        let raw_features = match self.features_path {
            Some(ref path) => {
                let features = io::read_features(path)?;
                tracing::info!(path = %path, items = features.len(), "read side features");
                features
            },
            None => RawFeatures::default(),
        };

        let (embeddings, train_size) = if self.rowbased {
            let rows = io::read_rows(self.train_path)?;
            tracing::info!(path = self.train_path, rows = rows.len(), "read rows");
            let num_rows = rows.len() as u64;
            let embeddings = fmembed::train_embeddings_from_rows(
                rows, self.window, &raw_features, config, objective)?;
            (embeddings, num_rows)
        } else {
            let interactions = read_interactions(self.train_path)?;
            let train_size = interactions.size();

            let embeddings = if self.stream {
                let mapped_path = self.output_dir.join("train.mapped.tsv");
                fmembed::train_embeddings_on_disk(
                    &interactions, &raw_features, mapped_path, config, objective)?
            } else {
                fmembed::train_embeddings(&interactions, &raw_features, config, objective)?
            };
            (embeddings, train_size)
        };

        tracing::info!(
            items = embeddings.mapper.num_items(),
            contexts = embeddings.mapper.num_contexts(),
            features = embeddings.mapper.num_features(),
            "model trained"
        );

        let test = match self.test_path {
            Some(ref path) => Some(evaluate(&embeddings, path, &raw_features)?),
            None => None,
        };

        self.write_embeddings(&embeddings, &raw_features)?;

        let report = TrainingReport {
            config: embeddings.model.config(),
            objective: embeddings.model.objective(),
            num_features: embeddings.mapper.num_features(),
            train_size,
            iterations: &embeddings.iterations,
            test,
        };
        io::write_report(&report, &mut io::output_file(self.output_dir, "report.json")?)?;

        tracing::info!(output = %self.output_dir.display(), "all files written");

        Ok(())
    }

    fn write_embeddings(&self, embeddings: &Embeddings, raw_features: &RawFeatures) -> fmembed::Result<()> {
        let model = &embeddings.model;
        let mapper = &embeddings.mapper;
        let output_dir = self.output_dir;

        io::write_biases(&model.biases(), &mut io::output_file(output_dir, "biases.tsv")?)?;
        io::write_vectors(&embeddings.item_vectors(), &mut io::output_file(output_dir, "item_embeddings.tsv")?)?;
        io::write_vectors(&embeddings.context_vectors(), &mut io::output_file(output_dir, "context_embeddings.tsv")?)?;

        if !raw_features.is_empty() {
            let feature_map = mapper.feature_map();

            io::write_vectors(
                &model.side_feature_vectors(feature_map, raw_features),
                &mut io::output_file(output_dir, "feature_embeddings.tsv")?,
            )?;
            io::write_vectors(
                &model.feature_vectors(mapper.item_map(), feature_map, raw_features),
                &mut io::output_file(output_dir, "item_feature_embeddings.tsv")?,
            )?;
            io::write_vectors(
                &model.feature_vectors(mapper.context_map(), feature_map, raw_features),
                &mut io::output_file(output_dir, "context_feature_embeddings.tsv")?,
            )?;
        }

        Ok(())
    }
}

fn read_interactions(path: &str) -> fmembed::Result<InMemoryDataset> {
    let mut interactions = InMemoryDataset::default();
    let num_interactions = io::read_interactions(path, &mut interactions)?;
    tracing::info!(path, interactions = num_interactions, "read interactions");
    Ok(interactions)
}

/// Loss and accuracy on the test examples whose ids are known to the model.
fn evaluate(embeddings: &Embeddings, path: &str, raw_features: &RawFeatures) -> fmembed::Result<TestReport> {
    let raw_test = read_interactions(path)?;
    let test = embeddings.mapper.map_dataset(&raw_test)?;
    let features = embeddings.mapper.map_features(raw_features);

    let predictable = if raw_test.size() > 0 {
        100.0 * test.size() as f64 / raw_test.size() as f64
    } else {
        0.0
    };
    tracing::info!(size = raw_test.size(), predictable, "evaluating on test set");

    let model = &embeddings.model;
    let loss = model.predict_dataset(&test, &features)?;

    let accuracy = match model.objective() {
        Objective::Pointwise { regression: true } => None,
        _ => Some(model.accuracy(&test, &features, 0.0)?),
    };

    tracing::info!(test_loss = %loss, "test set evaluated");
    if let Some(ref accuracy) = accuracy {
        tracing::info!(accuracy = %accuracy, "test set accuracy");
    }

    Ok(TestReport { size: raw_test.size(), predictable, loss, accuracy })
}

#[cfg(test)]
mod tests {

    use super::*;

    fn parse(args: &[&str]) -> Result<(FactorizationConfig, u32), String> {
        let matches = options().parse(args).unwrap();
        parse_config(&matches)
    }

    #[test]
    fn defaults() {
        let (config, window) = parse(&[]).unwrap();
        assert_eq!(config, FactorizationConfig::default());
        assert_eq!(window, 5);
    }

    #[test]
    fn usage_shows_the_default_bins() {
        let usage = options().usage("Usage: fmembed-train [options]");
        assert!(usage.contains("10,20,50,100,1000,5000,100000"), "{}", usage);
    }

    #[test]
    fn invalid_settings_fail() {
        let hint = parse(&["--lossfunction", "nope"]).unwrap_err();
        assert!(hint.contains("nope"), "{}", hint);

        assert!(parse(&["--bins", "100,10"]).is_err());
        assert!(parse(&["--dimensions", "many"]).is_err());
        assert!(parse(&["--dimensions", "0"]).is_err());

        let (config, window) = parse(&["--bins", "5,50", "--window", "3", "--bpr"]).unwrap();
        assert_eq!(config.bins.boundaries(), &[5, 50]);
        assert_eq!(window, 3);
    }

    #[test]
    fn usage_errors_exit_unsuccessfully() {
        assert_eq!(exit_status(Some("Please specify a trainset")), 1);
        assert_eq!(exit_status(None), 0);
    }
}
