use ado_anchors::anchor::{self, AnchorKind, AnchorTarget, InvalidAnchor};
use speculate2::speculate;

fn targets(text: &str) -> Vec<(AnchorKind, String)> {
    anchor::parse(text)
        .map(|a| (a.kind(), a.identifier().to_string()))
        .collect()
}

speculate! {
    describe "parse" {
        it "finds nothing in plain text" {
            assert!(anchor::parse("no anchors here").next().is_none());
        }

        it "finds both kinds in order" {
            assert_eq!(
                targets("<<#42>> and <<Q#My/Path>>"),
                vec![
                    (AnchorKind::Container, "42".to_string()),
                    (AnchorKind::SavedQuery, "My/Path".to_string()),
                ]
            );
        }

        it "reports byte spans of each token" {
            let spans: Vec<_> = anchor::parse("é <<#7>> x <<Q#a b>>").map(|a| a.span).collect();
            assert_eq!(spans, vec![3..9, 12..21]);
        }

        it "returns non-overlapping matches ordered by start" {
            let text = "<<#1>><<#2>> <<Q#x>> <<#3>>";
            let spans: Vec<_> = anchor::parse(text).map(|a| a.span).collect();
            for pair in spans.windows(2) {
                assert!(pair[0].end <= pair[1].start);
            }
            assert_eq!(spans.len(), 4);
        }

        it "is deterministic across runs" {
            let text = "a <<#10>> b <<Q#Shared Queries/Open>> c";
            let first: Vec<_> = anchor::parse(text).collect();
            let second: Vec<_> = anchor::parse(text).collect();
            assert_eq!(first, second);
        }

        it "ignores malformed tokens" {
            assert!(targets("<<#>> <<#abc>> <<Q#>> <#5> <<# 5>>").is_empty());
        }

        it "does not let a query identifier span lines" {
            assert!(targets("<<Q#first\nsecond>>").is_empty());
        }

        it "keeps the shortest query identifier" {
            assert_eq!(
                targets("<<Q#one>> then >>"),
                vec![(AnchorKind::SavedQuery, "one".to_string())]
            );
        }
    }

    describe "parse_exact" {
        it "accepts a lone token with surrounding whitespace" {
            assert_eq!(anchor::parse_exact("  <<#9>> "), Some(AnchorTarget::container(9)));
        }

        it "rejects tokens with extra text" {
            assert_eq!(anchor::parse_exact("see <<#9>>"), None);
            assert_eq!(anchor::parse_exact("<<#9>><<#10>>"), None);
        }
    }

    describe "insert_anchor" {
        it "round-trips a container through parse" {
            let mut text = "Tracked in X today".to_string();
            let span = anchor::insert_anchor(&mut text, 11..12, &AnchorTarget::container(1234));

            assert_eq!(text, "Tracked in <<#1234>> today");
            let found: Vec<_> = anchor::parse(&text).collect();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].span, span);
            assert_eq!(found[0].kind(), AnchorKind::Container);
            assert_eq!(found[0].identifier(), "1234");
        }

        it "round-trips a saved query path" {
            let target = AnchorTarget::saved_query("Shared Queries/Team/Active Bugs").unwrap();
            let mut text = String::new();
            anchor::insert_anchor(&mut text, 0..0, &target);

            let found: Vec<_> = anchor::parse(&text).collect();
            assert_eq!(found[0].target, target);
        }

        it "inserts at a collapsed selection without removing text" {
            let mut text = "ab".to_string();
            anchor::insert_anchor(&mut text, 1..1, &AnchorTarget::container(5));
            assert_eq!(text, "a<<#5>>b");
        }

        it "clamps selections past the end" {
            let mut text = "ab".to_string();
            let span = anchor::insert_anchor(&mut text, 10..20, &AnchorTarget::container(5));
            assert_eq!(text, "ab<<#5>>");
            assert_eq!(span, 2..8);
        }
    }

    describe "saved_query validation" {
        it "rejects identifiers the grammar cannot carry" {
            assert!(matches!(AnchorTarget::saved_query(""), Err(InvalidAnchor::EmptyIdentifier)));
            assert!(AnchorTarget::saved_query("a>>b").is_err());
            assert!(AnchorTarget::saved_query("line\nbreak").is_err());
            assert!(AnchorTarget::saved_query("ends>").is_err());
        }
    }
}
