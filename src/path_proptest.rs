//! Property-based tests for host path helpers.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::path::{file_name, file_stem, join, separator_of, trim_trailing_separator};
    use proptest::prelude::*;

    // ============================================================================
    // trim_trailing_separator property tests
    // ============================================================================

    proptest! {
        /// Property: a trimmed path never ends in a separator unless it is a root
        #[test]
        fn trimmed_path_has_no_trailing_separator(input in "[a-zA-Z0-9_/\\\\:.]{0,40}") {
            let trimmed = trim_trailing_separator(&input);
            let is_root = trimmed == "/" || trimmed == "\\"
                || (trimmed.len() == 3 && trimmed.as_bytes()[1] == b':');
            prop_assert!(
                is_root || !(trimmed.ends_with('/') || trimmed.ends_with('\\')),
                "'{}' trimmed to '{}'",
                input,
                trimmed
            );
        }

        /// Property: trimming is idempotent
        #[test]
        fn trim_is_idempotent(input in "[a-zA-Z0-9_/\\\\:.]{0,40}") {
            let once = trim_trailing_separator(&input);
            let twice = trim_trailing_separator(once);
            prop_assert_eq!(once, twice);
        }

        /// Property: trimming only removes characters from the end
        #[test]
        fn trim_is_prefix(input in "[a-zA-Z0-9_/\\\\:.]{0,40}") {
            let trimmed = trim_trailing_separator(&input);
            prop_assert!(input.starts_with(trimmed));
        }
    }

    // ============================================================================
    // join / file_name property tests
    // ============================================================================

    proptest! {
        /// Property: the joined name is recovered by file_name
        #[test]
        fn join_then_file_name_roundtrips(
            dir in "(C:\\\\|/)[a-z]{1,8}([\\\\/][a-z]{1,8}){0,3}[\\\\/]?",
            name in "[A-Za-z0-9_]{1,12}\\.[a-z]{3,5}",
        ) {
            let joined = join(&dir, &name);
            prop_assert_eq!(file_name(&joined), name.as_str());
        }

        /// Property: joining keeps the directory's separator style
        #[test]
        fn join_keeps_separator_style(
            dir in "C:\\\\[a-z]{1,8}(\\\\[a-z]{1,8}){0,3}",
            name in "[a-z]{1,8}",
        ) {
            let joined = join(&dir, &name);
            prop_assert_eq!(separator_of(&joined), '\\');
            prop_assert!(!joined.contains('/'));
        }

        /// Property: a stem is never longer than its file name
        #[test]
        fn stem_is_within_file_name(path in "[a-zA-Z0-9_/.]{1,40}") {
            let name = file_name(&path);
            let stem = file_stem(&path);
            prop_assert!(name.starts_with(stem));
        }
    }
}
