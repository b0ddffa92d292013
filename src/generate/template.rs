//! Named prompt templates.
//!
//! Two built-ins ship with the binary: `detailed` (primary provider) and `compact`
//! (fallback). `[templates.<name>]` in the config adds new ones or replaces a built-in.
//!
//! Placeholders filled by [`render`]:
//! - `{date}`: post date, JST `YYYY/MM/DD`
//! - `{count}`: number of articles
//! - `{target_length}`: desired length in characters
//! - `{articles}`: one block per article (title, summary, url, source, score)
//! - `{article_list}`: one `- title: summary` line per article, summary cut to 100 chars

use std::collections::BTreeMap;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::generate::GenerationRequest;
use crate::ingest::truncate_chars;

pub const DETAILED: &str = "detailed";
pub const COMPACT: &str = "compact";

const DETAILED_TEXT: &str = r#"以下のAI関連ニュースをもとに、ブログ記事を日本語で書いてください。

条件:
- 文字数はおよそ{target_length}文字
- です・ます調で、自然で親しみやすい文章
- 絵文字は控えめに使う（🚀 🤖 💡 🔬 ⚡ 🎯 🌟 📊 から選ぶ）
- 元記事へのリンクを必ず残す

構成:
# 今日のAIニュースまとめ（{date}）

今日注目のAI関連ニュースを{count}本ピックアップしました。

各記事ごとに:
## 絵文字 + 魅力的に言い換えた見出し
**要約**: 50文字程度
**詳細**: 100〜150文字で背景や意義
[元記事を読む](URL)

最後に:
## 💡 今日のまとめ
- 注目ポイントを3つ

入力記事:
{articles}
"#;

const COMPACT_TEXT: &str = r#"以下のAI関連ニュースをもとに、{target_length}文字程度のブログ記事を書いてください。

タイトル: 今日のAIニュースまとめ（{date}）
記事数: {count}

記事:
{article_list}

構成: 導入、各記事の要約と解説、まとめ。読みやすい日本語で書いてください。
"#;

#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: BTreeMap<String, String>,
}

impl PromptTemplates {
    pub fn builtin() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert(DETAILED.to_string(), DETAILED_TEXT.to_string());
        templates.insert(COMPACT.to_string(), COMPACT_TEXT.to_string());
        Self { templates }
    }

    /// Built-ins overlaid with `[templates.*]` from the config.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut out = Self::builtin();
        for (name, text) in &cfg.templates {
            out.templates.insert(name.clone(), text.clone());
        }
        out
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, PipelineError> {
        self.get(name)
            .ok_or_else(|| PipelineError::Config(format!("unknown prompt template '{name}'")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

fn article_blocks(req: &GenerationRequest) -> String {
    let mut out = String::new();
    for (i, it) in req.items.iter().enumerate() {
        out.push_str(&format!(
            "\n記事{}:\n- タイトル: {}\n- 要約: {}\n- URL: {}\n- ソース: {}\n- スコア: {:.1}\n",
            i + 1,
            it.title,
            it.summary,
            it.url,
            it.source,
            it.score
        ));
    }
    out
}

fn article_lines(req: &GenerationRequest) -> String {
    req.items
        .iter()
        .map(|it| format!("- {}: {}", it.title, truncate_chars(&it.summary, 100)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fill every known placeholder in one pass over the template; unknown `{...}`
/// sequences are left as they are, and inserted text is never rescanned.
pub fn render(template: &str, req: &GenerationRequest) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        let value = match &tail[1..close] {
            "date" => Some(req.date.clone()),
            "count" => Some(req.items.len().to_string()),
            "target_length" => Some(req.target_length.to_string()),
            "articles" => Some(article_blocks(req)),
            "article_list" => Some(article_lines(req)),
            _ => None,
        };
        match value {
            Some(v) => {
                out.push_str(&v);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Item;

    fn req() -> GenerationRequest {
        GenerationRequest {
            items: vec![
                Item::new("Claude 新機能", "https://e.test/1", "要約その1", "Zenn AI").with_score(8.5),
                Item::new("Gemini 更新", "https://e.test/2", "要約その2", "ITmedia AI+"),
            ],
            date: "2025/09/30".to_string(),
            target_length: 800,
        }
    }

    #[test]
    fn builtins_are_present() {
        let t = PromptTemplates::builtin();
        assert!(t.contains(DETAILED));
        assert!(t.contains(COMPACT));
        assert!(t.require("missing").is_err());
    }

    #[test]
    fn detailed_lists_every_article_field() {
        let t = PromptTemplates::builtin();
        let p = render(t.get(DETAILED).unwrap(), &req());
        assert!(p.contains("今日のAIニュースまとめ（2025/09/30）"));
        assert!(p.contains("2本"));
        assert!(p.contains("およそ800文字"));
        assert!(p.contains("- URL: https://e.test/1"));
        assert!(p.contains("- ソース: ITmedia AI+"));
        assert!(p.contains("- スコア: 8.5"));
        assert!(!p.contains("{articles}"));
    }

    #[test]
    fn compact_uses_one_line_per_article() {
        let t = PromptTemplates::builtin();
        let p = render(t.get(COMPACT).unwrap(), &req());
        assert!(p.contains("- Claude 新機能: 要約その1"));
        assert!(p.contains("- Gemini 更新: 要約その2"));
    }

    #[test]
    fn config_overrides_and_extends() {
        let mut cfg = AppConfig::default();
        cfg.templates.insert("short".into(), "{count} items on {date}".into());
        cfg.templates.insert(COMPACT.into(), "custom {unknown}".into());
        let t = PromptTemplates::from_config(&cfg);
        assert_eq!(render(t.get("short").unwrap(), &req()), "2 items on 2025/09/30");
        assert_eq!(render(t.get(COMPACT).unwrap(), &req()), "custom {unknown}");
    }

    #[test]
    fn placeholders_inside_article_text_stay_literal() {
        let mut r = req();
        r.items[0].title = "{article_list} と {date}".to_string();
        let p = render("{articles}\n--\n{article_list}", &r);
        assert!(p.contains("- タイトル: {article_list} と {date}"), "{p}");
        assert!(p.contains("- {article_list} と {date}: 要約その1"), "{p}");
        assert_eq!(p.matches("要約その2").count(), 2, "{p}");
    }

    #[test]
    fn unbalanced_braces_pass_through() {
        assert_eq!(render("{ {date} {oops", &req()), "{ 2025/09/30 {oops");
    }
}
