// tests/ingest_normalize.rs
use ai_news_publisher::ingest::{normalize_text, truncate_chars};

#[test]
fn empty_is_ok() {
    assert_eq!(normalize_text(""), "");
}

#[test]
fn strips_html_and_unescapes() {
    let s = "<p>OpenAI&nbsp;<b>新モデル</b> &amp; API</p>";
    assert_eq!(normalize_text(s), "OpenAI 新モデル & API");
}

#[test]
fn adjacent_tags_do_not_glue_words() {
    assert_eq!(normalize_text("<li>GPT</li><li>Claude</li>"), "GPT Claude");
}

#[test]
fn folds_whitespace_and_nbsp() {
    let s = "A\u{00A0}\n\tB\u{3000}  C";
    assert_eq!(normalize_text(s), "A B C");
}

#[test]
fn truncation_is_by_characters() {
    let s = "あ".repeat(300);
    let t = truncate_chars(&normalize_text(&s), 200);
    assert_eq!(t.chars().count(), 200);
    assert_eq!(t.len(), 600);
}
