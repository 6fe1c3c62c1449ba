//! Tests for finite and streaming context extraction.

use std::convert::Infallible;
use std::io::Write;

use ctxtail::context::{ContextBundle, ContextExtractor};
use ctxtail::tail::{Line, TailError};
use futures_util::{stream, StreamExt};
use regex::Regex;
use tempfile::NamedTempFile;

fn numbered(contents: &[&str]) -> Vec<Line> {
    contents
        .iter()
        .zip(1..)
        .map(|(content, n)| Line::new(n, *content))
        .collect()
}

fn bundle(preceding: &[Line], line: &Line, following: &[Line]) -> ContextBundle {
    let window: Vec<Line> = preceding
        .iter()
        .chain(std::iter::once(line))
        .chain(following)
        .cloned()
        .collect();
    ContextBundle::from_window(window, preceding.len()).unwrap()
}

#[test]
fn no_pattern_emits_every_full_window() {
    let lines = numbered(&["A", "B", "C", "D"]);
    let bundles: Vec<ContextBundle> = ContextExtractor::new(1, 1).extract(lines.clone()).collect();

    assert_eq!(
        bundles,
        vec![
            bundle(&lines[0..1], &lines[1], &lines[2..3]),
            bundle(&lines[1..2], &lines[2], &lines[3..4]),
        ]
    );
}

#[test]
fn pattern_selects_focus_line() {
    let lines = numbered(&["A", "B", "C", "D"]);
    let extractor = ContextExtractor::new(1, 1).with_pattern(Regex::new("^C$").unwrap());
    let bundles: Vec<ContextBundle> = extractor.extract(lines.clone()).collect();

    assert_eq!(bundles, vec![bundle(&lines[1..2], &lines[2], &lines[3..4])]);
}

#[test]
fn bundle_line_numbers_are_contiguous() {
    let lines = numbered(&["a", "b", "c", "d", "e", "f", "g", "h"]);
    for preceding in 0..=3 {
        for following in 0..=3 {
            let extractor = ContextExtractor::new(preceding, following);
            let bundles: Vec<ContextBundle> = extractor.extract(lines.clone()).collect();
            assert_eq!(
                bundles.len(),
                (lines.len() + 1).saturating_sub(extractor.window_size())
            );

            for b in &bundles {
                assert_eq!(b.preceding_lines().len(), preceding);
                assert_eq!(b.following_lines().len(), following);
                let numbers: Vec<u64> = b.lines().map(Line::line_number).collect();
                assert!(numbers.windows(2).all(|pair| pair[1] == pair[0] + 1));
                if let Some(last) = b.preceding_lines().last() {
                    assert_eq!(b.line().line_number(), last.line_number() + 1);
                }
                if let Some(first) = b.following_lines().first() {
                    assert_eq!(first.line_number(), b.line().line_number() + 1);
                }
            }
        }
    }
}

#[test]
fn extraction_is_repeatable() {
    let lines = numbered(&["x ERROR", "y", "z ERROR", "w", "v"]);
    let extractor = ContextExtractor::new(1, 1).with_pattern(Regex::new("ERROR").unwrap());

    let first: Vec<ContextBundle> = extractor.extract(lines.clone()).collect();
    let second: Vec<ContextBundle> = extractor.extract(lines).collect();

    assert_eq!(first, second);
    assert_eq!(
        first.iter().map(ToString::to_string).collect::<Vec<_>>(),
        second.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}

#[test]
fn read_file_includes_unterminated_last_line() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "one\ntwo ERROR\nthree").unwrap();
    file.flush().unwrap();

    let extractor = ContextExtractor::new(1, 1).with_pattern(Regex::new("ERROR").unwrap());
    let bundles = extractor.read_file(file.path()).unwrap();

    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].line(), &Line::new(2, "two ERROR"));
    assert_eq!(bundles[0].following_lines(), &[Line::new(3, "three")]);
}

#[test]
fn read_file_missing_is_access_error() {
    let result = ContextExtractor::new(0, 0)
        .read_file(std::path::Path::new("/tmp/nonexistent-ctxtail-read.log"));
    assert!(matches!(result, Err(TailError::NotFound(_))));
}

#[tokio::test]
async fn stream_and_finite_forms_agree() {
    let lines = numbered(&["a", "ERROR b", "c", "ERROR d", "e", "f"]);
    for (preceding, following) in [(0, 0), (1, 1), (2, 1), (0, 3)] {
        let extractor =
            ContextExtractor::new(preceding, following).with_pattern(Regex::new("ERROR").unwrap());
        let finite: Vec<ContextBundle> = extractor.extract(lines.clone()).collect();

        let source = stream::iter(lines.clone().into_iter().map(Ok::<_, Infallible>));
        let pushed: Vec<ContextBundle> = extractor
            .extract_stream(source)
            .map(|result| result.unwrap())
            .collect()
            .await;

        assert_eq!(pushed, finite, "preceding={preceding} following={following}");
    }
}

#[tokio::test]
async fn stream_error_is_delivered() {
    let source = stream::iter(vec![
        Ok(Line::new(1, "a")),
        Err(TailError::Task("read failed".to_string())),
    ]);
    let results: Vec<Result<ContextBundle, TailError>> =
        ContextExtractor::new(2, 2).extract_stream(source).collect().await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(TailError::Task(_))));
}
