//! Star lists: best-match lookup and list-into-list cross-match merging

use crate::config::MergeSettings;
use crate::crossmatch::{Criteria, MatchResult};
use crate::error::{StarError, StarResult};
use crate::origin::{Confidence, Origin};
use crate::schema::{fields, PropertySchema};
use crate::stars::StarRecord;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use starfuse_core::coordinates::deg_to_arcsec;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Best candidate found for one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    pub index: usize,
    pub result: MatchResult,
    /// Number of candidates that satisfied the criteria
    pub candidates: usize,
}

/// Summary of one `merge_from` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub processed: usize,
    pub matched: usize,
    /// Matches whose merge changed the target
    pub updated: usize,
    pub appended: usize,
    /// Unmatched records left out because appending is disabled
    pub unmatched: usize,
    /// Records without a usable position under spatial criteria
    pub skipped: usize,
}

/// Ordered collection of records sharing one schema
#[derive(Debug, Clone)]
pub struct StarList {
    schema: Arc<PropertySchema>,
    stars: Vec<StarRecord>,
}

impl StarList {
    pub fn new(schema: Arc<PropertySchema>) -> Self {
        Self { schema, stars: Vec::new() }
    }

    pub fn standard() -> Self {
        Self::new(PropertySchema::standard())
    }

    pub fn schema(&self) -> &Arc<PropertySchema> {
        &self.schema
    }

    pub fn push(&mut self, star: StarRecord) -> StarResult<()> {
        if star.len() != self.schema.len() {
            return Err(StarError::SchemaMismatch { left: self.schema.len(), right: star.len() });
        }
        self.stars.push(star);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StarRecord> {
        self.stars.iter()
    }

    pub fn get(&self, index: usize) -> Option<&StarRecord> {
        self.stars.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut StarRecord> {
        self.stars.get_mut(index)
    }

    pub fn clear(&mut self) {
        self.stars.clear();
    }

    pub fn into_records(self) -> Vec<StarRecord> {
        self.stars
    }

    /// Closest record matching `star`.
    ///
    /// Candidates are the left operand of the criteria, so a list holding
    /// estimated magnitudes can be matched against incoming catalog values.
    /// Ties fall back to magnitude distance, then to the lower index.
    pub fn find_best_match(&self, star: &StarRecord, criteria: &Criteria) -> StarResult<Option<BestMatch>> {
        self.best_match_within(star, criteria, self.stars.len())
    }

    fn best_match_within(&self, star: &StarRecord, criteria: &Criteria, limit: usize) -> StarResult<Option<BestMatch>> {
        let matches = self.stars[..limit.min(self.stars.len())]
            .par_iter()
            .enumerate()
            .filter_map(|(index, candidate)| match criteria.evaluate(candidate, star) {
                Ok(result) if result.matched => Some(Ok((index, result))),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<StarResult<Vec<_>>>()?;

        let candidates = matches.len();
        let best = matches.into_iter().min_by(|(ia, a), (ib, b)| rank(a, b).then(ia.cmp(ib)));

        Ok(best.map(|(index, result)| BestMatch { index, result, candidates }))
    }

    /// Cross-match every record of `other` into this list.
    ///
    /// Only records present before the call are candidates, so two incoming
    /// records never match each other. A matched record is merged into its
    /// best candidate and tagged with `XM_SEP` (arcsec) and `XM_N_MATES`;
    /// `GROUP_SIZE` then counts how many inputs each record fuses.
    pub fn merge_from(&mut self, other: &StarList, criteria: &Criteria, settings: &MergeSettings) -> StarResult<MergeStats> {
        if other.schema.len() != self.schema.len() {
            return Err(StarError::SchemaMismatch { left: self.schema.len(), right: other.schema.len() });
        }

        let mask = settings.mask(&self.schema)?;
        let spatial = criteria.has_spatial();
        let existing = self.stars.len();
        let slots = Bookkeeping::new(&self.schema);

        tracing::info!("Cross-matching {} stars against {}", other.len(), existing);

        let pb = if settings.show_progress {
            ProgressBar::new(other.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({per_sec})") {
            pb.set_style(style);
        }

        let mut stats = MergeStats::default();
        let mut groups: HashMap<usize, i64> = HashMap::new();

        for star in other.iter() {
            pb.inc(1);
            stats.processed += 1;

            if spatial {
                if let Err(e) = star.position() {
                    tracing::warn!("Skipping '{}': {}", star.resolve_display_id(), e);
                    stats.skipped += 1;
                    continue;
                }
            }

            let Some(best) = self.best_match_within(star, criteria, existing)? else {
                if settings.append_unmatched {
                    self.stars.push(star.clone());
                    stats.appended += 1;
                } else {
                    stats.unmatched += 1;
                }
                continue;
            };

            // sizes are read before the merge copies the incoming bookkeeping
            let current = slots.group_size(&self.stars[best.index]);
            *groups.entry(best.index).or_insert(current) += slots.group_size(star);

            let target = &mut self.stars[best.index];
            if settings.rules.apply(target, star, settings.policy, mask.as_ref(), None)? {
                stats.updated += 1;
            }
            slots.tag_match(target, &best)?;
            stats.matched += 1;
        }

        for (index, size) in groups {
            slots.set_group_size(&mut self.stars[index], size)?;
        }

        pb.finish_with_message("Cross-match complete");
        tracing::info!(
            "Cross-match: {} processed, {} matched ({} updated), {} appended, {} skipped",
            stats.processed, stats.matched, stats.updated, stats.appended, stats.skipped
        );

        Ok(stats)
    }

    /// Drop records whose position is bit-identical to an earlier one.
    ///
    /// Records without a position are kept.
    pub fn remove_duplicates(&mut self) -> usize {
        let before = self.stars.len();
        let mut seen = HashSet::new();
        self.stars.retain(|star| match star.position() {
            Ok(p) => seen.insert((p.ra.to_bits(), p.dec.to_bits())),
            Err(_) => true,
        });

        let removed = before - self.stars.len();
        if removed > 0 {
            tracing::debug!("Removed {} duplicate stars", removed);
        }
        removed
    }
}

impl<'a> IntoIterator for &'a StarList {
    type Item = &'a StarRecord;
    type IntoIter = std::slice::Iter<'a, StarRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.stars.iter()
    }
}

fn rank(a: &MatchResult, b: &MatchResult) -> Ordering {
    let key = |d: Option<f64>| d.unwrap_or(f64::INFINITY);
    key(a.distance_angular)
        .total_cmp(&key(b.distance_angular))
        .then(key(a.distance_magnitude).total_cmp(&key(b.distance_magnitude)))
}

/// Schema slots written by the cross-match, absent ones are skipped
struct Bookkeeping {
    separation: Option<usize>,
    mates: Option<usize>,
    group: Option<usize>,
}

impl Bookkeeping {
    fn new(schema: &PropertySchema) -> Self {
        Self {
            separation: schema.index_of(fields::XM_SEP),
            mates: schema.index_of(fields::XM_N_MATES),
            group: schema.index_of(fields::GROUP_SIZE),
        }
    }

    fn group_size(&self, star: &StarRecord) -> i64 {
        self.group
            .and_then(|i| star.integer(i).ok())
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }

    fn tag_match(&self, star: &mut StarRecord, best: &BestMatch) -> StarResult<()> {
        if let (Some(i), Some(distance)) = (self.separation, best.result.distance_angular) {
            star.set_number(i, deg_to_arcsec(distance), Origin::Computed, Confidence::High, true)?;
        }
        if let Some(i) = self.mates {
            star.set_integer(i, best.candidates as i64, Origin::Computed, Confidence::High, true)?;
        }
        Ok(())
    }

    fn set_group_size(&self, star: &mut StarRecord, size: i64) -> StarResult<()> {
        if let Some(i) = self.group {
            star.set_integer(i, size, Origin::Computed, Confidence::High, true)?;
        }
        Ok(())
    }
}
