//! Property-based tests for recipe rewriting.
//!
//! These tests use proptest to generate recipe texts and versions and verify
//! that the rewrite invariants hold for all of them.

#[cfg(test)]
mod proptest_tests {
    use std::path::Path;

    use crate::recipe::{apply_change, is_valid_pkgver, RecipeChange};
    use crate::srcinfo::parse_release;
    use proptest::prelude::*;

    fn pkgver_strategy() -> impl Strategy<Value = String> {
        "[0-9]{1,3}(\\.[0-9a-z]{1,4}){0,3}"
    }

    /// Lines that never start with `pkgver=` or `pkgrel=`.
    fn filler_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("(# [a-z ]{0,20}|x_[a-z]{1,8}=\\([a-z0-9 ]{0,12}\\)|  pkgver=[0-9.]{1,5})", 0..5)
    }

    fn recipe(before: &[String], version: &str, release: u32, after: &[String]) -> String {
        let mut lines: Vec<String> = before.to_vec();
        lines.push(format!("pkgver={}", version));
        lines.push(format!("pkgrel={}", release));
        lines.extend(after.iter().cloned());
        lines.join("\n") + "\n"
    }

    fn assignment(content: &str, key: &str) -> Option<String> {
        let prefix = format!("{}=", key);
        content
            .lines()
            .find(|l| l.starts_with(&prefix))
            .map(|l| l[prefix.len()..].to_string())
    }

    proptest! {
        /// Property: a version change always yields pkgver == latest and pkgrel == 1
        #[test]
        fn set_version_resets_release(
            before in filler_strategy(),
            after in filler_strategy(),
            old in pkgver_strategy(),
            new in pkgver_strategy(),
            release in 1u32..500,
        ) {
            let text = recipe(&before, &old, release, &after);
            let out = apply_change(&text, &RecipeChange::SetVersion(new.clone()), Path::new("PKGBUILD")).unwrap();

            prop_assert_eq!(assignment(&out.content, "pkgver"), Some(new.clone()));
            prop_assert_eq!(assignment(&out.content, "pkgrel"), Some("1".to_string()));
            prop_assert_eq!(out.target.version, new);
            prop_assert_eq!(out.target.release, 1);
        }

        /// Property: a release bump keeps pkgver and increments pkgrel by one
        #[test]
        fn bump_release_increments(
            before in filler_strategy(),
            after in filler_strategy(),
            version in pkgver_strategy(),
            release in 1u32..500,
        ) {
            let text = recipe(&before, &version, release, &after);
            let out = apply_change(&text, &RecipeChange::BumpRelease, Path::new("PKGBUILD")).unwrap();

            prop_assert_eq!(assignment(&out.content, "pkgver"), Some(version));
            let rel = assignment(&out.content, "pkgrel").and_then(|r| parse_release(&r));
            prop_assert_eq!(rel, Some(release + 1));
        }

        /// Property: every line other than the two assignments is preserved
        #[test]
        fn other_lines_are_untouched(
            before in filler_strategy(),
            after in filler_strategy(),
            old in pkgver_strategy(),
            new in pkgver_strategy(),
        ) {
            let text = recipe(&before, &old, 2, &after);
            let out = apply_change(&text, &RecipeChange::SetVersion(new), Path::new("PKGBUILD")).unwrap();

            let untouched = |s: &str| {
                s.lines()
                    .filter(|l| !l.starts_with("pkgver=") && !l.starts_with("pkgrel="))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            };
            prop_assert_eq!(untouched(&text), untouched(&out.content));
        }

        /// Property: rewriting twice with the same version is idempotent
        #[test]
        fn set_version_is_idempotent(
            before in filler_strategy(),
            version in pkgver_strategy(),
            new in pkgver_strategy(),
        ) {
            let text = recipe(&before, &version, 4, &[]);
            let change = RecipeChange::SetVersion(new);
            let once = apply_change(&text, &change, Path::new("PKGBUILD")).unwrap();
            let twice = apply_change(&once.content, &change, Path::new("PKGBUILD")).unwrap();
            prop_assert_eq!(once, twice);
        }

        /// Property: versions with separators makepkg rejects are never written
        #[test]
        fn invalid_versions_are_rejected(
            head in "[0-9]{1,3}",
            sep in "[-: /]",
            tail in "[0-9]{1,3}",
        ) {
            let version = format!("{}{}{}", head, sep, tail);
            prop_assert!(!is_valid_pkgver(&version));
            let result = apply_change("pkgver=1\npkgrel=1\n", &RecipeChange::SetVersion(version), Path::new("PKGBUILD"));
            prop_assert!(result.is_err());
        }
    }
}
