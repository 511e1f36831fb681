use std::borrow::Borrow;

use super::constants::BUNCH_CAPACITY;
use super::error::ComposerError;
use super::event::{EventRecord, EventSink, Particle};
use super::word::{Word, WordKind};

const ELECTRON_ARG: i8 = 1;
const PHOTON_ARG: i8 = 2;

/// The detections seen since the last reset marker
#[derive(Debug, Clone)]
struct Bunch {
    electrons: [i32; BUNCH_CAPACITY],
    n_electrons: usize,
    photons: [i32; BUNCH_CAPACITY],
    n_photons: usize,
}

impl Default for Bunch {
    fn default() -> Self {
        Self {
            electrons: [0; BUNCH_CAPACITY],
            n_electrons: 0,
            photons: [0; BUNCH_CAPACITY],
            n_photons: 0,
        }
    }
}

fn join_values(values: &[i32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<String>>()
        .join(",")
}

impl Bunch {
    fn push(&mut self, particle: Particle, value: i32) -> Result<(), ComposerError> {
        let (buffer, count) = match particle {
            Particle::Electron => (&mut self.electrons, &mut self.n_electrons),
            Particle::Photon => (&mut self.photons, &mut self.n_photons),
        };
        if *count == BUNCH_CAPACITY {
            return Err(ComposerError::BunchOverflow(particle));
        }
        buffer[*count] = value;
        *count += 1;
        Ok(())
    }

    /// Classify the bunch. The rules are checked in order and are not exhaustive;
    /// anything unnamed but non-empty is Other.
    fn classify(&self) -> Option<EventRecord> {
        let e = &self.electrons[..self.n_electrons];
        let p = &self.photons[..self.n_photons];
        match (e.len(), p.len()) {
            (0, 0) => None,
            (1, 0) => Some(EventRecord::E(e[0])),
            (0, 1) => Some(EventRecord::P(p[0])),
            (1, 1) => Some(EventRecord::EP(e[0], p[0])),
            (2, 0) => Some(EventRecord::EE([e[0], e[1]])),
            (0, 2) => Some(EventRecord::PP([p[0], p[1]])),
            (2, 1) => Some(EventRecord::EEP([e[0], e[1], p[0]])),
            (3, 0) => Some(EventRecord::EEE([e[0], e[1], e[2]])),
            (4, 0) => Some(EventRecord::EEEE([e[0], e[1], e[2], e[3]])),
            (n_e, n_p) => Some(EventRecord::Other(format!(
                "{n_e}E{n_p}P|{}|{}",
                join_values(e),
                join_values(p)
            ))),
        }
    }

    fn clear(&mut self) {
        self.n_electrons = 0;
        self.n_photons = 0;
    }
}

/// EventComposer sorts TDC words into events.
///
/// Reset words (tag `R…`) close the current bunch, which is then classified by how many
/// electrons and photons it holds. Fill words (tag `F…`) add a detection to the bunch.
/// Group words and anything else are ignored. A bunch which is never closed by a reset
/// is never classified.
#[derive(Debug, Clone, Default)]
pub struct EventComposer {
    bunch: Bunch,
    n_resets: u64,
}

impl EventComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a single word to the composer
    pub fn process_word<S: EventSink>(
        &mut self,
        word: &Word,
        events: &mut S,
    ) -> Result<(), ComposerError> {
        match word.kind() {
            WordKind::Reset => {
                self.n_resets += 1;
                if let Some(event) = self.bunch.classify() {
                    events.append(event);
                }
                self.bunch.clear();
            }
            WordKind::Detection => match word.arg1 {
                ELECTRON_ARG => self.bunch.push(Particle::Electron, word.arg3)?,
                PHOTON_ARG => self.bunch.push(Particle::Photon, word.arg3)?,
                _ => (),
            },
            WordKind::Group | WordKind::Other => (),
        }
        Ok(())
    }

    /// Number of reset markers seen so far
    pub fn n_resets(&self) -> u64 {
        self.n_resets
    }
}

/// Compose every word of a sequence into events, appending them to the sink.
///
/// Returns the number of reset markers encountered.
pub fn compose_events<I, S>(words: I, events: &mut S) -> Result<u64, ComposerError>
where
    I: IntoIterator,
    I::Item: Borrow<Word>,
    S: EventSink,
{
    let mut composer = EventComposer::new();
    for word in words {
        composer.process_word(word.borrow(), events)?;
    }
    Ok(composer.n_resets())
}
