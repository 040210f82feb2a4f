//! Per-feature batch profiles.
//!
//! Every feature drives the same engine. A profile only decides how inputs
//! fan out into jobs, how many run at once, and which variation dimensions
//! diversify the results.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::variation::{Dimensions, dimensions};

const PORTRAIT_DIMENSIONS: &[(&str, &[&str])] = &[
    (
        "lighting",
        &["soft window light", "golden hour", "studio key light", "overcast daylight"],
    ),
    ("angle", &["eye level", "three-quarter view", "slightly low angle"]),
    ("expression", &["relaxed smile", "neutral and confident", "candid laugh"]),
];

const THEMED_DIMENSIONS: &[(&str, &[&str])] = &[
    ("composition", &["centered", "rule of thirds", "wide environmental"]),
    ("pose", &["standing", "seated", "walking", "looking over shoulder"]),
    ("palette", &["warm", "cool", "muted"]),
];

const COUPLE_DIMENSIONS: &[(&str, &[&str])] = &[
    ("interaction", &["side by side", "facing each other", "arm in arm"]),
    ("framing", &["half body", "full body", "close-up"]),
    ("mood", &["joyful", "romantic", "playful", "calm"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    /// Many distinct photos, one ID photo each, bounded concurrency.
    IdPhoto,
    /// N portraits from one photo, all at once.
    Portrait,
    /// N themed scenes from one photo, all at once.
    Themed,
    /// N couple or group shots from one photo, all at once.
    Couple,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::IdPhoto => write!(f, "id-photo"),
            Feature::Portrait => write!(f, "portrait"),
            Feature::Themed => write!(f, "themed"),
            Feature::Couple => write!(f, "couple"),
        }
    }
}

/// How many jobs a feature allows in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Bounded(usize),
    /// One worker per job.
    FullyParallel,
}

impl Concurrency {
    /// Resolve to a concrete `max_concurrent` for `jobs` jobs.
    pub fn limit(self, jobs: usize) -> usize {
        match self {
            Concurrency::Bounded(k) => k.max(1),
            Concurrency::FullyParallel => jobs.max(1),
        }
    }
}

impl Feature {
    pub fn concurrency(self) -> Concurrency {
        match self {
            Feature::IdPhoto => Concurrency::Bounded(3),
            Feature::Portrait | Feature::Themed | Feature::Couple => Concurrency::FullyParallel,
        }
    }

    /// Quantity features replicate one input; ID photos use each input once.
    pub fn is_quantity(self) -> bool {
        !matches!(self, Feature::IdPhoto)
    }

    pub fn dimensions(self) -> Dimensions {
        match self {
            Feature::IdPhoto => Dimensions::new(),
            Feature::Portrait => dimensions(PORTRAIT_DIMENSIONS),
            Feature::Themed => dimensions(THEMED_DIMENSIONS),
            Feature::Couple => dimensions(COUPLE_DIMENSIONS),
        }
    }

    /// Expand `inputs` into the submission list.
    ///
    /// Quantity features repeat every input `quantity` times. No upper bound
    /// is placed on `quantity`.
    pub fn plan<T: Clone>(self, inputs: Vec<T>, quantity: usize) -> Vec<T> {
        if !self.is_quantity() {
            return inputs;
        }
        inputs
            .into_iter()
            .flat_map(|input| std::iter::repeat_n(input, quantity))
            .collect()
    }
}
