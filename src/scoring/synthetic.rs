//! Synthetic Note Populations
//!
//! Deterministic generator for note statistics used by determinism and
//! property tests. All randomness comes from a seeded `ChaCha8Rng`; the
//! same seed always yields the same population.

use crate::scoring::note_stats::{NoteId, NoteStats, NoteStatsFrame};
use crate::scoring::status::{Classification, Status};
use crate::scoring::tags::{HELPFUL_TAG_COUNT, NOT_HELPFUL_TAG_COUNT};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Seeded generator producing plausible per-note statistics.
pub struct SyntheticNoteGenerator {
    rng: ChaCha8Rng,
    next_note_id: NoteId,
}

impl SyntheticNoteGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_note_id: 1,
        }
    }

    /// Generate one note with randomized signals. Roughly a third of the
    /// signal fields are left missing so null handling stays exercised.
    pub fn note(&mut self) -> NoteStats {
        let note_id = self.next_note_id;
        self.next_note_id += 1;
        let mut stats = NoteStats::new(note_id);

        let rng = &mut self.rng;
        stats.internal_note_intercept = Some(rng.gen_range(-0.5..0.7));
        stats.internal_note_factor1 = Some(rng.gen_range(-1.2..1.2));
        if rng.gen_bool(0.7) {
            stats.core_note_intercept = Some(rng.gen_range(-0.5..0.7));
            stats.core_note_factor1 = Some(rng.gen_range(-1.2..1.2));
            stats.core_rating_status = Some(Self::status_from(rng.gen_range(0..10)));
        }
        if rng.gen_bool(0.5) {
            stats.expansion_note_intercept = Some(rng.gen_range(-0.5..0.7));
            stats.expansion_rating_status = Some(Self::status_from(rng.gen_range(0..10)));
        }
        if rng.gen_bool(0.4) {
            stats.group_rating_status = Some(Self::status_from(rng.gen_range(0..10)));
            stats.modeling_group = Some(rng.gen_range(1..=14));
        }
        if rng.gen_bool(0.3) {
            stats.low_diligence_note_intercept = Some(rng.gen_range(-0.2..0.5));
        }
        stats.classification = if rng.gen_bool(0.9) {
            if rng.gen_bool(0.8) {
                Some(Classification::Misleading)
            } else {
                Some(Classification::NotMisleading)
            }
        } else {
            None
        };
        stats.num_ratings = Some(rng.gen_range(0..200));
        if rng.gen_bool(0.5) {
            stats.current_label = Some(Self::status_from(rng.gen_range(0..10)));
        }
        for i in 0..NOT_HELPFUL_TAG_COUNT {
            if rng.gen_bool(0.6) {
                let adjusted = rng.gen_range(0.0..6.0);
                stats.not_helpful_adjusted[i] = Some(adjusted);
                stats.not_helpful_adjusted_ratio[i] = Some(rng.gen_range(0.0..1.0));
            }
            stats.not_helpful_tag_counts[i] = Some(rng.gen_range(0.0_f64..8.0).floor());
        }
        for i in 0..HELPFUL_TAG_COUNT {
            stats.helpful_tag_counts[i] = Some(rng.gen_range(0.0_f64..8.0).floor());
        }
        stats.not_helpful_incorrect_interval = Some(rng.gen_range(0.0_f64..5.0).floor());
        stats.num_voters_interval = Some(rng.gen_range(0.0_f64..10.0).floor());
        stats.tf_idf_incorrect_interval = Some(rng.gen_range(0.0..4.0));
        stats
    }

    /// Generate a population of the given size.
    pub fn population(&mut self, note_count: usize) -> Vec<NoteStats> {
        (0..note_count).map(|_| self.note()).collect()
    }

    /// Generate a fully-declared frame of the given size.
    pub fn frame(&mut self, note_count: usize) -> NoteStatsFrame {
        NoteStatsFrame::with_all_columns(self.population(note_count))
            .expect("generated note ids are unique")
    }

    fn status_from(roll: u32) -> Status {
        match roll {
            0..=2 => Status::CurrentlyRatedHelpful,
            3..=4 => Status::CurrentlyRatedNotHelpful,
            _ => Status::NeedsMoreRatings,
        }
    }
}
