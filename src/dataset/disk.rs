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

use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::dataset::{DataPoints, Dataset};
use crate::error::{Error, Result};
use crate::types::DataPoint;
use crate::utils;

/// Data points streamed from a tab separated file, one `context item rating` line per data
/// point. Nothing is held in memory, each cursor opens its own reader on the file and closes it
/// when dropped. Suited for train sets that do not fit into main memory.
pub struct DiskDataset {
    path: PathBuf,
    size: u64,
    writer: Option<BufWriter<File>>,
}

impl DiskDataset {

    /// A dataset over an existing file with `size` lines, counted beforehand.
    pub fn new<P: AsRef<Path>>(path: P, size: u64) -> Self {
        DiskDataset { path: path.as_ref().to_path_buf(), size, writer: None }
    }

    /// A dataset over an existing file, counting its lines once.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let size = utils::count_lines(path.as_ref())?;
        Ok(DiskDataset::new(path, size))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and closes the writer opened by [`Dataset::add_datapoint`]. Appended data points
    /// only become visible to cursors after closing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Dataset for DiskDataset {

    /// The first append starts a fresh file, replacing previous contents.
    fn add_datapoint(&mut self, data_point: DataPoint) -> Result<bool> {
        if self.writer.is_none() {
            self.writer = Some(BufWriter::new(File::create(&self.path)?));
            self.size = 0;
        }

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", data_point)?;
        }
        self.size += 1;

        Ok(true)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn iter(&self) -> Result<DataPoints<'_>> {
        Ok(Box::new(DiskCursor::open(&self.path, 0)?))
    }

    fn iter_range(&self, start: u64, len: u64) -> Result<DataPoints<'_>> {
        Ok(Box::new(DiskCursor::open(&self.path, start)?.take(len as usize)))
    }
}

struct DiskCursor {
    reader: BufReader<File>,
    line: String,
    line_number: u64,
}

impl DiskCursor {

    /// Opens the file and skips the first `start` lines without parsing them. Every worker reads
    /// the file up to the end of its own range, a pass reads it `threads` times over at worst.
    fn open(path: &Path, start: u64) -> Result<Self> {
        let mut cursor = DiskCursor {
            reader: BufReader::new(File::open(path)?),
            line: String::new(),
            line_number: 0,
        };

        while cursor.line_number < start && cursor.read_line()? {}

        Ok(cursor)
    }

    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let bytes_read = self.reader.read_line(&mut self.line)?;
        if bytes_read > 0 {
            self.line_number += 1;
        }
        Ok(bytes_read > 0)
    }
}

impl Iterator for DiskCursor {
    type Item = Result<DataPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_line() {
            Ok(true) => {
                let line_number = self.line_number;
                let parsed = self.line
                    .trim_end_matches(&['\n', '\r'][..])
                    .parse::<DataPoint>()
                    .map_err(|reason| Error::Parse { line: line_number, reason });
                Some(parsed)
            },
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
