//! Citation resolution against a populated registry.

use meridian::{bibliography, render_bibliography, resolve, SourceDoc, SourceRegistry};

fn registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(&[
        SourceDoc::new("https://url1").title("One"),
        SourceDoc::new("https://url2").title("Two"),
    ]);
    registry
}

#[test]
fn resolves_known_markers_and_keeps_unknown_ones() {
    let registry = registry();
    let resolved = resolve("Result A [1]. Result B [2, 3].", &registry);

    assert_eq!(
        resolved.text,
        "Result A [1](https://url1). Result B [2](https://url2), [3]."
    );
    // Bibliography lists only registered entries, ascending, no duplicates.
    let numbers: Vec<u32> = resolved.bibliography.iter().map(|e| e.reference).collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[test]
fn no_marker_is_ever_deleted() {
    let registry = registry();
    let draft = "Intro [1], middle [9], grouped [1, 9, 2], end.";
    let resolved = resolve(draft, &registry);

    for marker in ["[1](https://url1)", "[9]", "[2](https://url2)"] {
        assert!(
            resolved.text.contains(marker),
            "missing {marker} in {}",
            resolved.text
        );
    }
}

#[test]
fn resolution_is_idempotent() {
    let registry = registry();
    let once = resolve("Cited [1] and unknown [5].", &registry);
    let twice = resolve(&once.text, &registry);
    assert_eq!(once.text, twice.text);
    assert_eq!(once.bibliography.len(), twice.bibliography.len());
}

#[test]
fn bibliography_renders_fixed_format() {
    let mut registry = registry();
    registry.register(&[SourceDoc::new("https://url3")]);

    let rendered = render_bibliography(&bibliography(&registry));
    assert_eq!(
        rendered,
        "1. One(https://url1)\n2. Two(https://url2)\n3. Untitled(https://url3)"
    );
}
