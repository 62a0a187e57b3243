//! Tests for the tag vocabulary and top-tag selection.

use crate::scoring::tags::{
    top_two_tags, HelpfulTag, NotHelpfulTag, RatingTag, HELPFUL_TAGS_TIEBREAK_ORDER,
    HELPFUL_TAGS_TSV_ORDER, NOT_HELPFUL_TAGS_TIEBREAK_ORDER, NOT_HELPFUL_TAGS_TSV_ORDER,
};
use std::collections::HashSet;

#[test]
fn test_orders_cover_the_same_tags() {
    let tsv: HashSet<_> = HELPFUL_TAGS_TSV_ORDER.iter().collect();
    let tiebreak: HashSet<_> = HELPFUL_TAGS_TIEBREAK_ORDER.iter().collect();
    assert_eq!(tsv, tiebreak);

    let tsv: HashSet<_> = NOT_HELPFUL_TAGS_TSV_ORDER.iter().collect();
    let tiebreak: HashSet<_> = NOT_HELPFUL_TAGS_TIEBREAK_ORDER.iter().collect();
    assert_eq!(tsv, tiebreak);
}

#[test]
fn test_tag_keys_are_unique() {
    let mut keys = HashSet::new();
    for tag in HELPFUL_TAGS_TSV_ORDER {
        assert!(keys.insert(tag.key()), "duplicate key {}", tag.key());
    }
    for tag in NOT_HELPFUL_TAGS_TSV_ORDER {
        assert!(keys.insert(tag.key()), "duplicate key {}", tag.key());
    }
}

#[test]
fn test_index_round_trips_through_tsv_order() {
    for (i, tag) in HELPFUL_TAGS_TSV_ORDER.iter().enumerate() {
        assert_eq!(tag.index(), i);
    }
    for (i, tag) in NOT_HELPFUL_TAGS_TSV_ORDER.iter().enumerate() {
        assert_eq!(tag.index(), i);
    }
}

fn helpful_order() -> Vec<RatingTag> {
    HELPFUL_TAGS_TIEBREAK_ORDER
        .iter()
        .copied()
        .map(RatingTag::Helpful)
        .collect()
}

#[test]
fn test_top_two_picks_largest_counts() {
    let order = helpful_order();
    let (first, second) = top_two_tags(
        &order,
        |tag| match tag {
            RatingTag::Helpful(HelpfulTag::Clear) => 5.0,
            RatingTag::Helpful(HelpfulTag::GoodSources) => 3.0,
            RatingTag::Helpful(HelpfulTag::Other) => 1.0,
            _ => 0.0,
        },
        1.0,
    );
    assert_eq!(first, Some(RatingTag::Helpful(HelpfulTag::Clear)));
    assert_eq!(second, Some(RatingTag::Helpful(HelpfulTag::GoodSources)));
}

#[test]
fn test_top_two_breaks_ties_by_priority_order() {
    // Clear and Informative tie; Clear precedes Informative in the helpful
    // tie-break order, so it wins first place.
    let order = helpful_order();
    let (first, second) = top_two_tags(
        &order,
        |tag| match tag {
            RatingTag::Helpful(HelpfulTag::Informative) => 4.0,
            RatingTag::Helpful(HelpfulTag::Clear) => 4.0,
            _ => 0.0,
        },
        1.0,
    );
    assert_eq!(first, Some(RatingTag::Helpful(HelpfulTag::Clear)));
    assert_eq!(second, Some(RatingTag::Helpful(HelpfulTag::Informative)));
}

#[test]
fn test_top_two_respects_min_ratings() {
    let order = helpful_order();
    let (first, second) = top_two_tags(
        &order,
        |tag| match tag {
            RatingTag::Helpful(HelpfulTag::Clear) => 2.0,
            RatingTag::Helpful(HelpfulTag::GoodSources) => 1.0,
            _ => 0.0,
        },
        2.0,
    );
    assert_eq!(first, Some(RatingTag::Helpful(HelpfulTag::Clear)));
    assert_eq!(second, None);
}

#[test]
fn test_top_two_skips_missing_counts() {
    let order = helpful_order();
    let (first, second) = top_two_tags(
        &order,
        |tag| match tag {
            RatingTag::Helpful(HelpfulTag::Clear) => f64::NAN,
            RatingTag::Helpful(HelpfulTag::GoodSources) => 3.0,
            _ => f64::NAN,
        },
        1.0,
    );
    assert_eq!(first, Some(RatingTag::Helpful(HelpfulTag::GoodSources)));
    assert_eq!(second, None);
}

#[test]
fn test_top_two_empty_when_nothing_qualifies() {
    let order = helpful_order();
    let (first, second) = top_two_tags(&order, |_| 0.0, 1.0);
    assert_eq!(first, None);
    assert_eq!(second, None);
}

#[test]
fn test_disabled_outlier_tag_is_hard_to_understand() {
    // The outlier filter skips exactly this tag; pin its key so a rename
    // does not silently re-enable filtering.
    assert_eq!(
        NotHelpfulTag::HardToUnderstand.key(),
        "notHelpfulHardToUnderstand"
    );
}
