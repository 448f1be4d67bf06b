// tests/lexicon_pipeline.rs
// Full offline pass: config → index → fallback queue → lexicon backend → output.

use std::fs;

use news_signals::config::{AiConfig, PipelineConfig};
use news_signals::{run_generation, store, BackendKind, Sentiment};

#[tokio::test]
async fn lexicon_run_labels_every_ticker_and_resumes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let enriched = dir.path().join("enriched");
    fs::create_dir_all(&enriched).unwrap();
    fs::write(
        enriched.join("day.json"),
        r#"[
  {"title": "Chipmakers rally", "published": "2024-05-02", "tickers": ["NVDA", "AMD"],
   "article_text": "Chip stocks surge as Nvidia beats estimates and AMD gains."},
  {"title": "Retailer slumps", "published": "2024-05-02", "tickers": ["TGT"],
   "article_text": "Target shares plunge after the retailer misses forecasts."},
  {"title": "No tickers here", "published": "2024-05-02",
   "article_text": "Markets were quiet."}
]"#,
    )
    .unwrap();

    let mut cfg = PipelineConfig::default();
    cfg.enriched_dir = enriched;
    cfg.clustered_file = dir.path().join("clustered.json");
    cfg.outputs.lexicon = dir.path().join("out").join("lexicon.json");
    cfg.generation.delay_ms = 0;

    let ai = AiConfig::default();
    let summary = run_generation(BackendKind::Lexicon, &cfg, &ai).await.unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.errored, 1);

    let records = store::load_output(&cfg.outputs.lexicon).unwrap();
    let chips = records.iter().find(|r| r.title == "Chipmakers rally").unwrap();
    let tickers: Vec<&str> = chips.signals.iter().map(|s| s.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["NVDA", "AMD"]);
    assert!(chips.signals.iter().all(|s| s.sentiment == Sentiment::Positive));
    assert!(chips.signals[0].justification.ends_with("as positive"));

    let retail = records.iter().find(|r| r.title == "Retailer slumps").unwrap();
    assert_eq!(retail.signals[0].sentiment, Sentiment::Negative);

    let untickered = records.iter().find(|r| r.title == "No tickers here").unwrap();
    assert!(untickered.error.as_deref().unwrap().contains("no candidate tickers"));

    // Only the errored item is attempted again.
    let again = run_generation(BackendKind::Lexicon, &cfg, &ai).await.unwrap();
    assert_eq!(again.skipped, 2);
    assert_eq!(again.processed, 1);
}
