//! Closed-interval algebra over heights.
//!
//! Every function here is pure and synchronous; the only state is whatever
//! the caller threads through. `Tracker` (in `tracker.rs`) is the stateful,
//! I/O-touching wrapper built on top of this module.

use std::cmp::Ordering;

/// A closed interval `[start, end]`, `start <= end` always (normalized on
/// construction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Section {
    pub start: u64,
    pub end: u64,
}

impl Section {
    /// Builds a section, swapping the bounds if they were given inverted.
    pub fn new(start: u64, end: u64) -> Self {
        if start > end {
            Section { start: end, end: start }
        } else {
            Section { start, end }
        }
    }

    pub fn single(height: u64) -> Self {
        Section { start: height, end: height }
    }

    fn overlaps_or_touches(&self, other: &Section) -> bool {
        other.start <= self.end || other.start == self.end.saturating_add(1)
    }
}

/// A canonical (sorted, non-overlapping, non-adjacent) set of sections.
pub type Sections = Vec<Section>;

/// Sorts, normalizes and merges overlapping/adjacent sections into
/// canonical form. Idempotent: `merge_sections(merge_sections(s)) ==
/// merge_sections(s)`.
pub fn merge_sections(mut sections: Sections) -> Sections {
    for s in sections.iter_mut() {
        *s = Section::new(s.start, s.end);
    }
    sections.sort_by(|a, b| a.start.cmp(&b.start));

    let mut merged: Sections = Vec::with_capacity(sections.len());
    for section in sections {
        match merged.last_mut() {
            Some(last) if last.overlaps_or_touches(&section) => {
                if section.end > last.end {
                    last.end = section.end;
                }
            }
            _ => merged.push(section),
        }
    }
    merged
}

/// Builds a canonical section set from a (possibly unsorted, possibly
/// duplicated) list of individual heights.
pub fn build_sections_from_heights(heights: &[u64]) -> Sections {
    let singles: Sections = heights.iter().map(|h| Section::single(*h)).collect();
    merge_sections(singles)
}

/// Expands a section set into the full ascending list of heights it covers.
pub fn build_heights_from_sections(sections: &Sections) -> Vec<u64> {
    let merged = merge_sections(sections.clone());
    let mut out = Vec::new();
    for section in merged {
        out.extend(section.start..=section.end);
    }
    out
}

/// Finds every height strictly between consecutive sections once `sections`
/// is merged (callers append synthetic `[genesis, genesis]` / `[tip, tip]`
/// single-point sections before calling this so the outer bounds are
/// included in gap discovery). Returned in descending order so callers
/// prioritize the most recent heights first.
pub fn find_gaps_in_sections(sections: &Sections) -> Vec<u64> {
    let merged = merge_sections(sections.clone());
    if merged.len() < 2 {
        return Vec::new();
    }

    let mut missing = Vec::new();
    for pair in merged.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        let high = next.start.saturating_sub(1);
        let low = prev.end;
        let mut j = high;
        while j > low {
            missing.push(j);
            j -= 1;
        }
    }

    missing.sort_unstable_by(|a, b| b.cmp(a));
    missing
}

/// Returns `sections` with every height present in `to_remove` taken out.
/// Heights in `to_remove` that aren't present in `sections` are ignored.
pub fn remove_sections(sections: &Sections, to_remove: &Sections) -> Sections {
    let base = build_heights_from_sections(sections);
    let removed = build_heights_from_sections(to_remove);

    let mut result = Vec::with_capacity(base.len());
    let (mut i, mut j) = (0usize, 0usize);
    while i < base.len() && j < removed.len() {
        match base[i].cmp(&removed[j]) {
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                result.push(base[i]);
                i += 1;
            }
            Ordering::Greater => {
                j += 1;
            }
        }
    }
    result.extend_from_slice(&base[i..]);

    build_sections_from_heights(&result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sections_matches_reference_cases() {
        let cases: &[(&[(u64, u64)], &[(u64, u64)])] = &[
            (&[(1, 3), (2, 6), (8, 10), (15, 18)], &[(1, 6), (8, 10), (15, 18)]),
            (&[(1, 4), (4, 5)], &[(1, 5)]),
            (&[(1, 2)], &[(1, 2)]),
            (&[(8, 7), (2, 1)], &[(1, 2), (7, 8)]),
            (&[], &[]),
            (&[(7, 10), (3, 4), (2, 5)], &[(2, 5), (7, 10)]),
            (
                &[(1, 3), (6, 8), (8, 10), (10, 15), (15, 18), (18, 20)],
                &[(1, 3), (6, 20)],
            ),
            (&[(1, 1), (2, 2)], &[(1, 2)]),
        ];

        for (input, want) in cases {
            let sections: Sections = input.iter().map(|(s, e)| Section { start: *s, end: *e }).collect();
            let got = merge_sections(sections);
            let want: Sections = want.iter().map(|(s, e)| Section { start: *s, end: *e }).collect();
            assert_eq!(got, want, "input {:?}", input);
        }
    }

    #[test]
    fn merge_sections_is_idempotent() {
        let sections = vec![
            Section::new(1, 3),
            Section::new(2, 6),
            Section::new(8, 10),
            Section::new(15, 18),
        ];
        let once = merge_sections(sections.clone());
        let twice = merge_sections(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn build_sections_from_heights_matches_reference_cases() {
        assert_eq!(
            build_sections_from_heights(&[1, 2, 3, 6, 8]),
            vec![Section::new(1, 3), Section::new(6, 6), Section::new(8, 8)]
        );
        assert_eq!(
            build_sections_from_heights(&[4, 5, 6, 9, 10, 11, 13, 1, 2, 3]),
            vec![Section::new(1, 6), Section::new(9, 11), Section::new(13, 13)]
        );
        assert_eq!(build_sections_from_heights(&[1]), vec![Section::new(1, 1)]);
    }

    #[test]
    fn build_heights_from_sections_round_trips_with_build_sections() {
        let sections = vec![Section::new(1, 6), Section::new(9, 11), Section::new(13, 13)];
        let heights = build_heights_from_sections(&sections);
        assert_eq!(heights, vec![1, 2, 3, 4, 5, 6, 9, 10, 11, 13]);
        assert_eq!(build_sections_from_heights(&heights), sections);
    }

    #[test]
    fn find_gaps_matches_reference_cases() {
        assert_eq!(
            find_gaps_in_sections(&vec![Section::new(1, 3), Section::new(2, 6), Section::new(8, 10), Section::new(15, 18)]),
            vec![14, 13, 12, 11, 7]
        );
        assert_eq!(
            find_gaps_in_sections(&vec![Section::new(0, 0), Section::new(5, 5)]),
            vec![4, 3, 2, 1]
        );
        assert_eq!(find_gaps_in_sections(&vec![Section::new(1, 1), Section::new(1, 1)]), Vec::<u64>::new());
        assert_eq!(find_gaps_in_sections(&vec![Section::new(2, 3), Section::new(0, 0)]), vec![1]);
    }

    #[test]
    fn remove_sections_matches_reference_cases() {
        let sections = vec![Section::new(0, 20)];
        let to_remove = vec![
            Section::new(1, 1),
            Section::new(4, 7),
            Section::new(18, 22),
            Section::new(19, 19),
        ];
        assert_eq!(
            remove_sections(&sections, &to_remove),
            vec![Section::new(0, 0), Section::new(2, 3), Section::new(8, 17)]
        );

        let sections = vec![
            Section::new(0, 2),
            Section::new(5, 5),
            Section::new(8, 50),
            Section::new(52, 100),
        ];
        let to_remove = vec![
            Section::new(1, 5),
            Section::new(10, 22),
            Section::new(7, 7),
            Section::new(60, 150),
            Section::new(130, 150),
        ];
        assert_eq!(
            remove_sections(&sections, &to_remove),
            vec![
                Section::new(0, 0),
                Section::new(8, 9),
                Section::new(23, 50),
                Section::new(52, 59),
            ]
        );
    }

    #[test]
    fn remove_sections_self_subtraction_is_empty() {
        let sections = vec![Section::new(1, 3), Section::new(8, 10), Section::new(15, 18)];
        assert_eq!(remove_sections(&sections, &sections), Vec::new());
    }
}
