//! Track-name normalization shared by every matching tier.

/// Normalize a track name for matching: lowercase, punctuation stripped,
/// whitespace collapsed. Segue arrows and soundcheck/edit markers that
/// tapers append to titles are dropped before comparison.
pub fn normalize(name: &str) -> String {
    let name = name
        .trim()
        .trim_end_matches("->")
        .trim_end_matches('>')
        .trim_end_matches('*');

    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_space = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_normalization() {
        assert_eq!(normalize("Scarlet Begonias"), "scarlet begonias");
        assert_eq!(normalize("  SCARLET   BEGONIAS  "), "scarlet begonias");
    }

    #[test]
    fn test_punctuation_stripped() {
        assert_eq!(normalize("Truckin'"), "truckin");
        assert_eq!(normalize("U.S. Blues"), "u s blues");
        assert_eq!(normalize("Goin' Down The Road Feelin' Bad"), "goin down the road feelin bad");
    }

    #[test]
    fn test_segue_and_markers_dropped() {
        assert_eq!(normalize("Scarlet Begonias ->"), "scarlet begonias");
        assert_eq!(normalize("Fire On The Mountain>"), "fire on the mountain");
        assert_eq!(normalize("Dark Star*"), "dark star");
    }

    #[test]
    fn test_empty_and_symbol_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("---"), "");
    }
}
