//! Ordered combination generation.

use itertools::Itertools;

/// Every combination of 1..=`max_size` items, smallest size first and in
/// input order within a size.
///
/// `max_size` is clamped to `items.len()`; zero or empty input yields nothing.
pub fn combine<T: Clone>(items: &[T], max_size: usize) -> Vec<Vec<T>> {
    let max_size = max_size.min(items.len());
    (1..=max_size)
        .flat_map(|size| items.iter().cloned().combinations(size))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binomial(n: usize, k: usize) -> usize {
        (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
    }

    #[test]
    fn count_matches_sum_of_binomials() {
        let items: Vec<usize> = (0..6).collect();
        for max_size in 1..=8 {
            let expected: usize = (1..=max_size.min(6)).map(|k| binomial(6, k)).sum();
            assert_eq!(combine(&items, max_size).len(), expected, "max_size={max_size}");
        }
    }

    #[test]
    fn sizes_are_non_decreasing_and_input_ordered() {
        let combos = combine(&["a", "b", "c"], 2);
        assert_eq!(
            combos,
            vec![
                vec!["a"],
                vec!["b"],
                vec!["c"],
                vec!["a", "b"],
                vec!["a", "c"],
                vec!["b", "c"],
            ]
        );
        assert!(combos.windows(2).all(|w| w[0].len() <= w[1].len()));
    }

    #[test]
    fn duplicates_keep_distinct_positions() {
        let combos = combine(&["x", "x"], 2);
        assert_eq!(combos, vec![vec!["x"], vec!["x"], vec!["x", "x"]]);
    }

    #[test]
    fn degenerate_inputs() {
        assert!(combine::<u8>(&[], 3).is_empty());
        assert!(combine(&[1, 2], 0).is_empty());
        assert_eq!(combine(&[1, 2], 1), vec![vec![1], vec![2]]);
    }
}
