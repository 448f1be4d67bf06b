// tests/reconcile_sets.rs
use std::fs;

use news_signals::reconcile::{reconcile_files, ReportStatus, FUZZY_MATCH_THRESHOLD};
use news_signals::Sentiment;

#[test]
fn opposite_labels_give_zero_agreement() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("gpt.json");
    let b = dir.path().join("finbert.json");
    fs::write(
        &a,
        r#"[{"title":"T1","published":"2024-01-01","gpt_signals":[{"ticker":"AAPL","sentiment":"positive","confidence":0.8,"justification":"x"}]}]"#,
    )
    .unwrap();
    fs::write(
        &b,
        r#"[{"title":"T1","published":"2024-01-01","finbert_signals":[{"ticker":"aapl","sentiment":"negative","confidence":0.7,"justification":"y"}]}]"#,
    )
    .unwrap();

    let report = reconcile_files(&a, &b, FUZZY_MATCH_THRESHOLD);
    assert_eq!(report.status, ReportStatus::Ok);
    assert_eq!(report.joined(), 1);
    assert_eq!(report.disagreements(), 1);
    assert_eq!(report.agreement_rate(), Some(0.0));
    assert_eq!(report.rows[0].sentiment_a, Sentiment::Positive);
    assert_eq!(report.rows[0].sentiment_b, Sentiment::Negative);
    assert!(!report.rows[0].is_match);

    let out = dir.path().join("results");
    report.write_to_dir(&out, "llm", "classifier").unwrap();
    let full = fs::read_to_string(out.join("comparison_full.csv")).unwrap();
    assert!(full.starts_with("title,ticker,sentiment_a,sentiment_b,confidence_a,confidence_b,match"));
    assert_eq!(full.lines().count(), 2);
}

#[test]
fn near_identical_titles_join_and_unrelated_ones_do_not() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.json");
    let b = dir.path().join("b.json");
    fs::write(
        &a,
        r#"[
  {"title":"Apple posts record quarter","published":"d","signals":[{"ticker":"AAPL","sentiment":"positive","confidence":0.9,"justification":""}]},
  {"title":"Tesla recalls vehicles","published":"d","signals":[{"ticker":"TSLA","sentiment":"negative","confidence":0.9,"justification":""}]}
]"#,
    )
    .unwrap();
    fs::write(
        &b,
        r#"[
  {"title":"Apple posts record quarter.","published":"d","signals":[{"ticker":"AAPL","sentiment":"positive","confidence":0.7,"justification":""}]},
  {"title":"Ford expands EV plant","published":"d","signals":[{"ticker":"TSLA","sentiment":"neutral","confidence":0.5,"justification":""}]}
]"#,
    )
    .unwrap();

    let report = reconcile_files(&a, &b, FUZZY_MATCH_THRESHOLD);
    assert_eq!(report.joined(), 1);
    assert_eq!(report.fuzzy_joins, 1);
    assert_eq!(report.rows[0].ticker, "AAPL");
    assert_eq!(report.agreement_rate(), Some(1.0));
}

#[test]
fn no_overlap_and_missing_inputs_are_reported_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.json");
    let b = dir.path().join("b.json");
    fs::write(
        &a,
        r#"[{"title":"Alpha","published":"d","signals":[{"ticker":"AAPL","sentiment":"positive","confidence":0.9,"justification":""}]}]"#,
    )
    .unwrap();
    fs::write(
        &b,
        r#"[{"title":"Beta","published":"d","signals":[{"ticker":"MSFT","sentiment":"positive","confidence":0.9,"justification":""}]}]"#,
    )
    .unwrap();

    let report = reconcile_files(&a, &b, FUZZY_MATCH_THRESHOLD);
    assert_eq!(report.status, ReportStatus::NoOverlap);
    assert_eq!(report.agreement_rate(), None);
    assert!(report.summary("a", "b").contains("No overlaps found."));

    // Stale results from an earlier run are replaced by empty ones.
    let out = dir.path().join("results");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("disagreements.csv"), "title,ticker\nold,ROW\n").unwrap();
    report.write_to_dir(&out, "a", "b").unwrap();
    let header = "title,ticker,sentiment_a,sentiment_b,confidence_a,confidence_b,match\n";
    assert_eq!(fs::read_to_string(out.join("disagreements.csv")).unwrap(), header);
    assert_eq!(fs::read_to_string(out.join("comparison_full.csv")).unwrap(), header);
    assert!(fs::read_to_string(out.join("comparison_summary.txt"))
        .unwrap()
        .starts_with("No overlaps found."));

    let missing = reconcile_files(&a, &dir.path().join("nope.json"), FUZZY_MATCH_THRESHOLD);
    assert!(matches!(missing.status, ReportStatus::NoData { .. }));
}

#[test]
fn wire_service_prefix_still_joins() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.json");
    let b = dir.path().join("b.json");
    fs::write(
        &a,
        r#"[{"title":"Apple beats Wall Street estimates on strong iPhone sales","published":"d","signals":[{"ticker":"AAPL","sentiment":"positive","confidence":0.9,"justification":""}]}]"#,
    )
    .unwrap();
    fs::write(
        &b,
        r#"[{"title":"UPDATE 1-Apple beats Wall Street estimates on strong iPhone sales","published":"d","signals":[{"ticker":"AAPL","sentiment":"neutral","confidence":0.6,"justification":""}]}]"#,
    )
    .unwrap();

    let report = reconcile_files(&a, &b, FUZZY_MATCH_THRESHOLD);
    assert_eq!(report.joined(), 1);
    assert_eq!(report.fuzzy_joins, 1);
    assert_eq!(report.rows[0].sentiment_b, Sentiment::Neutral);
}
