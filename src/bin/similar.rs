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

use getopts::Options;
use tracing_subscriber::EnvFilter;

use fmembed::{io, similar};

fn main() {

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("e", "embeddings", "Embeddings file written by fmembed-train (required), such as \
        item_embeddings.tsv.", "PATH");
    opts.optopt("q", "items", "Comma separated ids to find similar items for (required).", "LIST");
    opts.optopt("k", "num-similar", "Number of similar items per id (optional, defaults to 10).", "NUMBER");
    opts.optflag("h", "help", "Print this help menu");

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

    let (embeddings_path, query) = match (matches.opt_str("e"), matches.opt_str("q")) {
        (Some(embeddings_path), Some(query)) => (embeddings_path, query),
        _ => return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify an embeddings file via --embeddings and ids via --items."),
        ),
    };

    let k: usize = match matches.opt_get_default("k", 10) {
        Ok(k) => k,
        Err(failure) => {
            let hint = format!("Problem with option 'k': {}", failure);
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let items = match query.split(',').map(|id| id.trim().parse::<u32>()).collect::<Result<Vec<u32>, _>>() {
        Ok(items) => items,
        Err(failure) => {
            let hint = format!("Problem with option 'items': {}", failure);
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fmembed=info,fmembed_similar=info"));
    if let Err(failure) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Unable to set up logging: {}", failure);
    }

    let vectors = match io::read_vectors(&embeddings_path) {
        Ok(vectors) => vectors,
        Err(failure) => {
            tracing::error!(path = %embeddings_path, error = %failure, "cannot read embeddings");
            std::process::exit(1);
        },
    };
    tracing::info!(path = %embeddings_path, vectors = vectors.len(), "read embeddings");

    for item in items {
        match similar::most_similar(item, &vectors, k) {
            Some(neighbours) => {
                for neighbour in neighbours.iter().filter(|neighbour| neighbour.item != item) {
                    println!("{}\t{}\t{:.4}", item, neighbour.item, neighbour.score);
                }
            },
            None => tracing::warn!(item, "no embedding for item"),
        }
    }
}

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

    std::process::exit(if hint.is_some() { 1 } else { 0 })
}
