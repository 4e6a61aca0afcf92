//! Character-similarity scoring for the bounded fuzzy tier.

/// Length of the longest common subsequence of two strings.
///
/// Two-row DP, O(len(a) * len(b)) time and O(len(b)) space.
pub fn lcs_length(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() || b_chars.is_empty() {
        return 0;
    }

    let mut prev_row: Vec<usize> = vec![0; b_chars.len() + 1];
    let mut curr_row: Vec<usize> = vec![0; b_chars.len() + 1];

    for a_char in &a_chars {
        for (j, b_char) in b_chars.iter().enumerate() {
            curr_row[j + 1] = if a_char == b_char {
                prev_row[j] + 1
            } else {
                prev_row[j + 1].max(curr_row[j])
            };
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_chars.len()]
}

/// Similarity ratio in [0, 1]: `2 * LCS / (len(a) + len(b))`.
///
/// 1.0 means identical; identical-length strings with no common
/// subsequence score 0.0. Two empty strings count as identical.
pub fn lcs_ratio(a: &str, b: &str) -> f32 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_length(a, b)) as f32 / total as f32
}
