// Copyright 2019 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::QaError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// # Utility to deserialize JSON config files
/// Implemented by the encoder, head and training configurations so that a full
/// experiment can be described by a set of JSON files.
pub trait Config
where
    Self: Sized + DeserializeOwned + Serialize,
{
    /// Loads a `Config` object from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - `Path` to the configuration JSON file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_subjqa::training::TrainingConfig;
    /// use rust_subjqa::Config;
    ///
    /// let config = TrainingConfig::from_file("path/to/training.json").unwrap();
    /// ```
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, QaError> {
        let f = File::open(path)?;
        let br = BufReader::new(f);
        Ok(serde_json::from_reader(br)?)
    }

    /// Writes the configuration to a JSON file, next to a saved checkpoint for instance.
    fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), QaError> {
        let f = File::create(path)?;
        let bw = BufWriter::new(f);
        Ok(serde_json::to_writer_pretty(bw, self)?)
    }
}
