use std::cmp::Ordering;

/// Returns the total order between two peer ids.
///
/// If both ids are digit-only they compare as big integers, so `"2"` sorts
/// before `"10"`. On numeric equality the raw strings break the tie
/// lexicographically, so `"02"` sorts before `"2"`. Any other pair compares
/// byte-wise lexicographically (locale-independent).
///
/// # Examples
/// ```
/// # use std::cmp::Ordering;
/// # use meshsync_shared::peer_id_cmp;
/// assert_eq!(peer_id_cmp("2", "10"), Ordering::Less);
/// assert_eq!(peer_id_cmp("02", "2"), Ordering::Less);
/// assert_eq!(peer_id_cmp("2", "A"), Ordering::Less);
/// ```
pub fn peer_id_cmp(a: &str, b: &str) -> Ordering {
    if is_digits(a) && is_digits(b) {
        let cmp = big_int_cmp(a, b);
        if cmp != Ordering::Equal {
            return cmp;
        }
        // numerically equal, e.g. "02" vs "2"
        return a.cmp(b);
    }

    a.cmp(b)
}

/// Elects the host: the minimum id under [`peer_id_cmp`] over the given ids.
/// Returns `None` for an empty iterator.
pub fn elect_host<'a, I>(ids: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    ids.into_iter().min_by(|a, b| peer_id_cmp(a, b))
}

fn is_digits(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Compares two digit-only strings as arbitrary-precision integers.
fn big_int_cmp(a: &str, b: &str) -> Ordering {
    let a_stripped = a.trim_start_matches('0');
    let b_stripped = b.trim_start_matches('0');

    match a_stripped.len().cmp(&b_stripped.len()) {
        Ordering::Equal => a_stripped.cmp(b_stripped),
        unequal => unequal,
    }
}
