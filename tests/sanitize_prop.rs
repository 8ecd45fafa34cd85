//! Property tests for filename sanitization.

use proptest::prelude::*;

use tomesplit::util::{MAX_FILENAME_LEN, expand_pattern, sanitize_filename};

fn is_forbidden(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
}

proptest! {
    #[test]
    fn output_is_always_a_usable_filename(input in "\\PC{0,400}") {
        let out = sanitize_filename(&input);
        prop_assert!(!out.is_empty());
        prop_assert!(out.len() <= MAX_FILENAME_LEN);
        prop_assert!(out.chars().all(|c| !is_forbidden(c)));
        prop_assert!(!out.starts_with(char::is_whitespace));
        prop_assert!(!out.ends_with(char::is_whitespace));
        prop_assert!(!out.ends_with('.'));
        prop_assert!(!out.contains("__"));
    }

    #[test]
    fn sanitization_is_idempotent(input in ".{0,400}") {
        let once = sanitize_filename(&input);
        prop_assert_eq!(sanitize_filename(&once), once);
    }

    #[test]
    fn expanded_patterns_sanitize_cleanly(
        title in "\\PC{0,40}",
        num in 1usize..500,
        chapter in "\\PC{0,40}",
    ) {
        let name = expand_pattern("{title}_{chapter_num}_{chapter_title}", &title, num, &chapter);
        let out = sanitize_filename(&name);
        prop_assert!(!out.is_empty());
        prop_assert!(out.chars().all(|c| !is_forbidden(c)));
    }
}

#[test]
fn multi_line_titles_flatten_to_one_name() {
    let name = expand_pattern(
        "{title}_{chapter_num}_{chapter_title}",
        "Sample",
        1,
        "Intro\nPart",
    );
    assert_eq!(sanitize_filename(&name), "Sample_1_Intro_Part");
}
