use std::collections::BTreeSet;

use serde::Serialize;

/// Run provenance for one file: a run number and the sub-run ("lumi")
/// numbers observed within it. Lumi sets are merge-only; adding the same
/// lumi twice is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Run {
    number: u32,
    lumis: BTreeSet<u32>,
}

impl Run {
    pub fn new(number: u32, lumis: impl IntoIterator<Item = u32>) -> Self {
        Self {
            number,
            lumis: lumis.into_iter().collect(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn lumis(&self) -> &BTreeSet<u32> {
        &self.lumis
    }

    pub fn add_lumi(&mut self, lumi: u32) {
        self.lumis.insert(lumi);
    }

    pub fn extend_lumis(&mut self, lumis: impl IntoIterator<Item = u32>) {
        self.lumis.extend(lumis);
    }

    pub fn contains_lumi(&self, lumi: u32) -> bool {
        self.lumis.contains(&lumi)
    }
}
