//! Per-recipe normalization: defaults, validation, derived fields, dedup.

use crate::listing::{build_listing, IdentityKey, Listing, RawRecord};
use crate::recipe::Descriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Counters for one recipe run. `raw == emitted + rejected + duplicates`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub raw: usize,
    pub emitted: usize,
    pub rejected: usize,
    pub duplicates: usize,
    /// Rejection reason → count.
    pub rejections: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeOutput {
    pub listings: Vec<Listing>,
    pub tally: Tally,
}

/// Turns one recipe's raw records into listings. Not shared across recipes.
pub struct Normalizer {
    builder: String,
    community: String,
    sub_community: Option<String>,
    kind: String,
    seen: HashSet<IdentityKey>,
    output: NormalizeOutput,
}

impl Normalizer {
    pub fn new(descriptor: &Descriptor) -> Self {
        Self {
            builder: descriptor.builder.clone(),
            community: descriptor.community.clone(),
            sub_community: descriptor.sub_community.clone(),
            kind: descriptor.kind.to_string(),
            seen: HashSet::new(),
            output: NormalizeOutput::default(),
        }
    }

    /// Normalize one record. Returns the listing when it was emitted.
    pub fn push(&mut self, mut raw: RawRecord) -> Option<&Listing> {
        self.output.tally.raw += 1;
        self.inject_defaults(&mut raw);

        let listing = match build_listing(&raw) {
            Ok(listing) => listing,
            Err(rejection) => {
                tracing::debug!(builder = %self.builder, community = %self.community, "rejected record: {rejection}");
                self.output.tally.rejected += 1;
                *self
                    .output
                    .tally
                    .rejections
                    .entry(rejection.reason())
                    .or_default() += 1;
                return None;
            }
        };

        if !self.seen.insert(listing.identity_key()) {
            self.output.tally.duplicates += 1;
            return None;
        }

        self.output.tally.emitted += 1;
        self.output.listings.push(listing);
        self.output.listings.last()
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = RawRecord>) {
        for raw in records {
            self.push(raw);
        }
    }

    pub fn tally(&self) -> &Tally {
        &self.output.tally
    }

    pub fn finish(self) -> NormalizeOutput {
        self.output
    }

    fn inject_defaults(&self, raw: &mut RawRecord) {
        if raw.text("builder").is_none() {
            raw.set("builder", self.builder.as_str());
        }
        if raw.text("community").is_none() {
            raw.set("community", self.community.as_str());
        }
        if raw.text("sub_community").is_none() {
            if let Some(sub) = &self.sub_community {
                raw.set("sub_community", sub.as_str());
            }
        }
        if raw.text("kind").is_none() {
            raw.set("kind", self.kind.as_str());
        }
    }
}

/// Normalize a whole batch at once.
pub fn normalize(descriptor: &Descriptor, records: Vec<RawRecord>) -> NormalizeOutput {
    let mut normalizer = Normalizer::new(descriptor);
    normalizer.extend(records);
    normalizer.finish()
}
