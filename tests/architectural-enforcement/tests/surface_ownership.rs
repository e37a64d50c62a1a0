//! Integration Test: Surface Ownership
//!
//! **Policy**: Surface visibility changes only inside the surface pair, which
//! keeps exactly one surface shown. Nothing else may call `set_visible`.

use architectural_enforcement::production_lines;

const VISIBILITY_OWNER: &str = "pair.rs";

#[test]
fn test_only_surface_pair_toggles_visibility() {
    let violations: Vec<String> = production_lines()
        .into_iter()
        .filter(|line| line.code.contains(".set_visible("))
        .filter(|line| !line.path.ends_with(VISIBILITY_OWNER))
        .map(|line| line.to_string())
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ Surface visibility changed outside {VISIBILITY_OWNER}:\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        panic!(
            "\nFound {} visibility violation(s). Route swaps through SurfacePair.",
            violations.len()
        );
    }
}

#[test]
fn test_surface_pair_still_owns_visibility() {
    let owner_calls = production_lines()
        .into_iter()
        .filter(|line| line.path.ends_with(VISIBILITY_OWNER))
        .filter(|line| line.code.contains(".set_visible("))
        .count();
    assert!(owner_calls > 0, "{VISIBILITY_OWNER} no longer sets visibility");
}
