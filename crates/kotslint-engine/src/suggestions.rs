//! "Did you mean" suggestions for unknown template functions

/// Maximum edit distance for a suggestion to be considered
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Closest known name to `input`, if any is close enough.
///
/// A case-insensitive exact match always wins.
pub fn closest_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    if let Some(exact) = candidates.iter().find(|c| c.eq_ignore_ascii_case(input)) {
        return Some(*exact);
    }

    candidates
        .iter()
        .map(|c| (strsim::levenshtein(input, c), *c))
        .filter(|(distance, _)| *distance > 0 && *distance <= MAX_SUGGESTION_DISTANCE)
        .min_by_key(|(distance, c)| (*distance, *c))
        .map(|(_, c)| c)
}

/// Go-style message for a call to an unknown function
pub fn function_not_defined(name: &str, candidates: &[&str]) -> String {
    match closest_match(name, candidates) {
        Some(suggestion) => {
            format!("function \"{name}\" not defined, did you mean \"{suggestion}\"?")
        }
        None => format!("function \"{name}\" not defined"),
    }
}
