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

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Loss functions available for training. The margin based losses (logistic, hinge) expect
/// targets of -1 or +1, squared error accepts any target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossFunction {
    Logistic,
    Hinge,
    Mse,
}

impl LossFunction {

    /// Looks up a loss function by name, ignoring case and surrounding whitespace.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "logistic" => Ok(LossFunction::Logistic),
            "hinge" => Ok(LossFunction::Hinge),
            "mse" => Ok(LossFunction::Mse),
            _ => Err(Error::Config(format!("invalid loss function parameter: {}", name))),
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            LossFunction::Logistic => "logistic",
            LossFunction::Hinge => "hinge",
            LossFunction::Mse => "mse",
        }
    }

    #[inline]
    pub fn loss(&self, predicted: f32, target: f32) -> f32 {
        match *self {
            // log(1 + e^z) rewritten so that e^z cannot overflow for large margins
            LossFunction::Logistic => {
                let z = -target * predicted;
                z.max(0.0) + (-z.abs()).exp().ln_1p()
            },
            LossFunction::Hinge => {
                let z = target * predicted;
                if z <= 0.0 {
                    0.5 - z
                } else if z < 1.0 {
                    0.5 * (1.0 - z) * (1.0 - z)
                } else {
                    0.0
                }
            },
            LossFunction::Mse => (predicted - target) * (predicted - target),
        }
    }

    /// Derivative of the loss with respect to the prediction.
    #[inline]
    pub fn derivative(&self, predicted: f32, target: f32) -> f32 {
        match *self {
            LossFunction::Logistic => -target / ((target * predicted).exp() + 1.0),
            LossFunction::Hinge => {
                let z = target * predicted;
                if z <= 0.0 {
                    -target
                } else if z < 1.0 {
                    target * (z - 1.0)
                } else {
                    0.0
                }
            },
            LossFunction::Mse => 2.0 * (predicted - target),
        }
    }
}

impl Default for LossFunction {
    fn default() -> Self {
        LossFunction::Logistic
    }
}

impl FromStr for LossFunction {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        LossFunction::from_name(name)
    }
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
