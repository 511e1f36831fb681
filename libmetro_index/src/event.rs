use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The two kinds of detections a fill word can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Particle {
    Electron,
    Photon,
}

impl Display for Particle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Electron => write!(f, "electron"),
            Self::Photon => write!(f, "photon"),
        }
    }
}

/// Which particles the second detector channel recorded.
///
/// For `EI` coincidences every `P` in a category label is written as `I`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParticleMode {
    #[default]
    EP,
    EI,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    E,
    P,
    EP,
    EE,
    PP,
    EEP,
    EEE,
    EEEE,
    Other,
}

impl EventCategory {
    /// All named categories, in the order they are reported
    pub const NAMED: [EventCategory; 8] = [
        Self::E,
        Self::EE,
        Self::EEE,
        Self::EEEE,
        Self::P,
        Self::PP,
        Self::EP,
        Self::EEP,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::E => "E",
            Self::P => "P",
            Self::EP => "EP",
            Self::EE => "EE",
            Self::PP => "PP",
            Self::EEP => "EEP",
            Self::EEE => "EEE",
            Self::EEEE => "EEEE",
            Self::Other => "other",
        }
    }

    pub fn label_for(&self, mode: ParticleMode) -> String {
        match (self, mode) {
            (Self::Other, _) | (_, ParticleMode::EP) => self.label().to_string(),
            (_, ParticleMode::EI) => self.label().replace('P', "I"),
        }
    }
}

/// A classified bunch.
///
/// Named categories carry the raw arg3 values, electrons first. Other carries the
/// textual encoding `{e}E{p}P|{electrons}|{photons}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRecord {
    E(i32),
    P(i32),
    EP(i32, i32),
    EE([i32; 2]),
    PP([i32; 2]),
    EEP([i32; 3]),
    EEE([i32; 3]),
    EEEE([i32; 4]),
    Other(String),
}

impl EventRecord {
    pub fn category(&self) -> EventCategory {
        match self {
            Self::E(_) => EventCategory::E,
            Self::P(_) => EventCategory::P,
            Self::EP(..) => EventCategory::EP,
            Self::EE(_) => EventCategory::EE,
            Self::PP(_) => EventCategory::PP,
            Self::EEP(_) => EventCategory::EEP,
            Self::EEE(_) => EventCategory::EEE,
            Self::EEEE(_) => EventCategory::EEEE,
            Self::Other(_) => EventCategory::Other,
        }
    }
}

/// The accumulator the composer appends classified events to
pub trait EventSink {
    fn append(&mut self, event: EventRecord);
}

impl EventSink for Vec<EventRecord> {
    fn append(&mut self, event: EventRecord) {
        self.push(event);
    }
}

/// Per-category ordered event lists
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    e: Vec<[i32; 1]>,
    p: Vec<[i32; 1]>,
    ep: Vec<[i32; 2]>,
    ee: Vec<[i32; 2]>,
    pp: Vec<[i32; 2]>,
    eep: Vec<[i32; 3]>,
    eee: Vec<[i32; 3]>,
    eeee: Vec<[i32; 4]>,
    other: Vec<String>,
}

impl EventSink for EventStore {
    fn append(&mut self, event: EventRecord) {
        match event {
            EventRecord::E(e) => self.e.push([e]),
            EventRecord::P(p) => self.p.push([p]),
            EventRecord::EP(e, p) => self.ep.push([e, p]),
            EventRecord::EE(values) => self.ee.push(values),
            EventRecord::PP(values) => self.pp.push(values),
            EventRecord::EEP(values) => self.eep.push(values),
            EventRecord::EEE(values) => self.eee.push(values),
            EventRecord::EEEE(values) => self.eeee.push(values),
            EventRecord::Other(text) => self.other.push(text),
        }
    }
}

fn rows_to_matrix<const N: usize>(rows: &[[i32; N]]) -> Array2<i32> {
    Array2::from_shape_fn((rows.len(), N), |(row, col)| rows[row][col])
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, category: EventCategory) -> usize {
        match category {
            EventCategory::E => self.e.len(),
            EventCategory::P => self.p.len(),
            EventCategory::EP => self.ep.len(),
            EventCategory::EE => self.ee.len(),
            EventCategory::PP => self.pp.len(),
            EventCategory::EEP => self.eep.len(),
            EventCategory::EEE => self.eee.len(),
            EventCategory::EEEE => self.eeee.len(),
            EventCategory::Other => self.other.len(),
        }
    }

    /// Total number of classified events, including Other
    pub fn total(&self) -> usize {
        EventCategory::NAMED
            .iter()
            .map(|cat| self.count(*cat))
            .sum::<usize>()
            + self.other.len()
    }

    /// Shape the events of a named category into a matrix with one row per event.
    ///
    /// Returns None for Other, which has no fixed width.
    pub fn to_matrix(&self, category: EventCategory) -> Option<Array2<i32>> {
        match category {
            EventCategory::E => Some(rows_to_matrix(&self.e)),
            EventCategory::P => Some(rows_to_matrix(&self.p)),
            EventCategory::EP => Some(rows_to_matrix(&self.ep)),
            EventCategory::EE => Some(rows_to_matrix(&self.ee)),
            EventCategory::PP => Some(rows_to_matrix(&self.pp)),
            EventCategory::EEP => Some(rows_to_matrix(&self.eep)),
            EventCategory::EEE => Some(rows_to_matrix(&self.eee)),
            EventCategory::EEEE => Some(rows_to_matrix(&self.eeee)),
            EventCategory::Other => None,
        }
    }

    pub fn other(&self) -> &[String] {
        &self.other
    }

    /// All Other encodings as a newline separated block, relabeled for the particle mode
    pub fn other_text(&self, mode: ParticleMode) -> String {
        let text = self.other.join("\n");
        match mode {
            ParticleMode::EP => text,
            ParticleMode::EI => text.replace('P', "I"),
        }
    }
}
