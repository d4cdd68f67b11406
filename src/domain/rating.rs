use crate::domain::message::FeedItem;

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 10.0;

/// Lowest and highest rating in `ratings`, or the full scale when empty.
#[must_use]
pub fn rating_span(ratings: impl IntoIterator<Item = f64>) -> (f64, f64) {
    let mut iter = ratings.into_iter();
    let Some(first) = iter.next() else {
        return (MIN_RATING, MAX_RATING);
    };
    iter.fold((first, first), |(lo, hi), r| (lo.min(r), hi.max(r)))
}

/// Spreads the ratings of a result set over `[0, 10]` for display.
///
/// A set that already spans exactly `1..=10` is returned untouched, as is a
/// set whose ratings are all equal (there is no spread to remap). Never
/// touches the store.
pub fn normalize(items: &mut [FeedItem]) {
    let (min, max) = rating_span(items.iter().map(|i| i.rating));

    #[allow(clippy::float_cmp)]
    let already_spread = min == MIN_RATING && max == MAX_RATING;
    if already_spread || max <= min {
        return;
    }

    let range = max - min;
    for item in items.iter_mut() {
        item.rating = (item.rating - min) / range * MAX_RATING;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::GeoPoint;

    fn items(ratings: &[f64]) -> Vec<FeedItem> {
        ratings
            .iter()
            .map(|&rating| FeedItem { text: format!("r{rating}"), location: GeoPoint::new(0.0, 0.0), rating })
            .collect()
    }

    fn ratings(items: &[FeedItem]) -> Vec<f64> {
        items.iter().map(|i| i.rating).collect()
    }

    #[test]
    fn test_span_of_empty_set_is_full_scale() {
        assert_eq!(rating_span(std::iter::empty()), (1.0, 10.0));
    }

    #[test]
    fn test_full_span_is_identity() {
        let mut set = items(&[1.0, 4.0, 10.0, 7.0]);
        normalize(&mut set);
        assert_eq!(ratings(&set), vec![1.0, 4.0, 10.0, 7.0]);
    }

    #[test]
    fn test_partial_span_is_remapped_to_zero_ten() {
        let mut set = items(&[2.0, 3.0, 4.0]);
        normalize(&mut set);
        assert_eq!(ratings(&set), vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn test_remap_preserves_order_and_bounds() {
        let input = [1.0, 9.0, 3.0, 5.0, 2.0];
        let mut set = items(&input);
        normalize(&mut set);
        let output = ratings(&set);

        for r in &output {
            assert!((0.0..=10.0).contains(r), "{r} out of bounds");
        }
        for i in 0..input.len() {
            for j in 0..input.len() {
                if input[i] < input[j] {
                    assert!(output[i] < output[j]);
                }
            }
        }
    }

    #[test]
    fn test_uniform_ratings_are_left_alone() {
        let mut set = items(&[1.0, 1.0, 1.0]);
        normalize(&mut set);
        assert_eq!(ratings(&set), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_empty_set_is_noop() {
        let mut set: Vec<FeedItem> = Vec::new();
        normalize(&mut set);
        assert!(set.is_empty());
    }
}
