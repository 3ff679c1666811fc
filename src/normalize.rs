/// The source dataset suffixes every location name with its LGD code,
/// e.g. `Gujarat_1` or `Mehsana_5`. Everything after the first `_` is
/// the code, never part of the name.
const CODE_DELIMITER: char = '_';

/// Strip the code suffix from a raw location name.
///
/// Returns the prefix before the first delimiter, or the input unchanged
/// when no delimiter is present. Idempotent: a canonical label contains
/// no delimiter, so a second pass is a no-op.
pub fn canonical_label(raw: &str) -> &str {
    match raw.split_once(CODE_DELIMITER) {
        Some((name, _code)) => name,
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::canonical_label;

    #[test]
    fn strips_first_code_suffix() {
        assert_eq!(canonical_label("Gujarat_1"), "Gujarat");
        assert_eq!(canonical_label("Mehsana_5_old"), "Mehsana");
    }

    #[test]
    fn passes_through_unsuffixed_names() {
        assert_eq!(canonical_label("Gujarat"), "Gujarat");
        assert_eq!(canonical_label(""), "");
    }

    #[test]
    fn is_idempotent() {
        for raw in ["Gujarat_1", "Kadi_2", "Banaskantha", "", "_7"] {
            let once = canonical_label(raw);
            assert_eq!(canonical_label(once), once);
        }
    }
}
