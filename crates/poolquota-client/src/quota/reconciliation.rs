use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::quota::discretize::ceil_count;

/// Additive-only year-end top-ups keyed by checkpoint date.
///
/// `carried` holds a legacy single-number reconciliation loaded from older
/// persisted state. It counts toward the total and is never reduced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    entries: BTreeMap<NaiveDate, u32>,
    carried: u32,
}

impl Reconciliation {
    pub fn entries(&self) -> &BTreeMap<NaiveDate, u32> {
        &self.entries
    }

    pub fn carried(&self) -> u32 {
        self.carried
    }

    pub fn get(&self, checkpoint: NaiveDate) -> Option<u32> {
        self.entries.get(&checkpoint).copied()
    }

    pub fn latest(&self) -> Option<(NaiveDate, u32)> {
        self.entries
            .iter()
            .next_back()
            .map(|(date, amount)| (*date, *amount))
    }

    pub fn total(&self) -> u64 {
        self.entries
            .values()
            .map(|amount| u64::from(*amount))
            .sum::<u64>()
            + u64::from(self.carried)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.carried == 0
    }

    /// Adds `amount` to the entry for `checkpoint` and returns the new entry value.
    pub(crate) fn top_up(&mut self, checkpoint: NaiveDate, amount: u32) -> u32 {
        let entry = self.entries.entry(checkpoint).or_insert(0);
        *entry = entry.saturating_add(amount);
        *entry
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum ReconciliationOut<'a> {
    Split {
        carried: u32,
        entries: &'a BTreeMap<NaiveDate, u32>,
    },
    Scalar(u32),
    Dated(&'a BTreeMap<NaiveDate, u32>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReconciliationIn {
    Split {
        carried: u32,
        entries: BTreeMap<NaiveDate, u32>,
    },
    Scalar(f64),
    Dated(BTreeMap<NaiveDate, u32>),
}

impl Serialize for Reconciliation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let out = if self.carried == 0 {
            ReconciliationOut::Dated(&self.entries)
        } else if self.entries.is_empty() {
            ReconciliationOut::Scalar(self.carried)
        } else {
            ReconciliationOut::Split {
                carried: self.carried,
                entries: &self.entries,
            }
        };
        out.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Reconciliation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match ReconciliationIn::deserialize(deserializer)? {
            ReconciliationIn::Split { carried, entries } => Ok(Self { entries, carried }),
            ReconciliationIn::Dated(entries) => Ok(Self {
                entries,
                carried: 0,
            }),
            ReconciliationIn::Scalar(value) => {
                if !value.is_finite() || value < 0.0 {
                    return Err(D::Error::custom(
                        "reconciliation must be a non-negative number",
                    ));
                }
                Ok(Self {
                    entries: BTreeMap::new(),
                    carried: ceil_count(value),
                })
            }
        }
    }
}
