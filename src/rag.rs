//! RAG answerer: provider resolution, prompt assembly, and the
//! document-name short-circuit, grounded on the original `rag_service.py`.

use std::collections::HashMap;
use std::sync::Arc;

use unicode_normalization::UnicodeNormalization;

use crate::error::Result;
use crate::llm::provider::LlmProvider;
use crate::llm::{system_message, user_message, GenerationStream, Message};
use crate::retrieval::RetrievalHit;

/// Character budget for the assembled context block, matching the
/// original's `_truncate_contexts` default.
pub const DEFAULT_CONTEXT_CHAR_BUDGET: usize = 6000;

const DOCUMENT_NAME_KEYWORDS: &[&str] = &[
    "ten tai lieu",
    "tai lieu nay la gi",
    "ten file",
    "ten cua tai lieu",
    "document name",
    "name of the document",
    "what is this document",
    "what document is this",
    "which document",
];

/// Strip diacritics via NFKD normalization + filtering combining marks,
/// then lowercase, so accent-insensitive keyword matching works for both
/// Vietnamese and English phrasing.
pub fn strip_accents(input: &str) -> String {
    input
        .nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Whether `question` is asking for the name/identity of the document
/// rather than its content, matching the original's keyword heuristic.
pub fn is_document_name_question(question: &str) -> bool {
    let normalized = strip_accents(question);
    DOCUMENT_NAME_KEYWORDS
        .iter()
        .any(|kw| normalized.contains(kw))
}

/// Resolve a provider from a model identifier. Accepts an explicit
/// `"provider:model"` or `"provider/model"` prefix; otherwise falls back
/// to a substring match on known provider names, defaulting to OpenAI.
pub fn resolve_provider_name(model: &str) -> (&'static str, String) {
    let lower = model.to_lowercase();

    for sep in [':', '/'] {
        if let Some((prefix, rest)) = lower.split_once(sep) {
            let provider = normalize_alias(prefix);
            if let Some(provider) = provider {
                return (provider, rest.to_string());
            }
        }
    }

    if lower.contains("claude") || lower.contains("anthropic") {
        ("anthropic", model.to_string())
    } else if lower.contains("gemini") || lower.contains("google") {
        ("google", model.to_string())
    } else {
        ("openai", model.to_string())
    }
}

fn normalize_alias(prefix: &str) -> Option<&'static str> {
    match prefix {
        "openai" | "oai" => Some("openai"),
        "anthropic" | "claude" => Some("anthropic"),
        "gemini" | "google" => Some("google"),
        _ => None,
    }
}

/// Truncate the list of context texts to fit within `budget` characters,
/// preserving order and dropping whole contexts from the tail rather than
/// cutting one in half. If even the first context exceeds `budget`, no
/// context is kept (the caller still calls the LLM, just without context).
pub fn truncate_contexts(contexts: &[String], budget: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut used = 0usize;
    for context in contexts {
        if used + context.len() > budget {
            break;
        }
        used += context.len();
        out.push(context.clone());
    }
    out
}

/// Render one context line exactly as it appears in the assembled prompt,
/// so truncation can budget against the same bytes the LLM actually sees.
fn render_context_line(index: usize, hit: &RetrievalHit) -> String {
    let doc_name = hit
        .payload
        .get("document_name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    format!(
        "[{}] (score={:.3}, doc={}) {}",
        index,
        hit.score,
        doc_name,
        hit.text.clone().unwrap_or_default()
    )
}

fn format_context_block(hits: &[RetrievalHit], budget: usize) -> String {
    if hits.is_empty() {
        return "No context available.".to_string();
    }
    let texts: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| render_context_line(i, hit))
        .collect();
    let kept = truncate_contexts(&texts, budget);
    if kept.is_empty() {
        "No context available.".to_string()
    } else {
        kept.join("\n\n")
    }
}

/// Contexts still within `budget` characters after truncation, matching
/// what the caller should report back to the client as `hits_used`. Budgets
/// against the same rendered `"[i] (score=…, doc=…) text"` line length that
/// `format_context_block` uses, so this never diverges from what was
/// actually sent to the LLM.
pub fn contexts_within_budget(hits: &[RetrievalHit], budget: usize) -> Vec<&RetrievalHit> {
    let mut used = 0usize;
    let mut kept = Vec::new();
    for (i, hit) in hits.iter().enumerate() {
        let len = render_context_line(i, hit).len();
        if used + len > budget {
            break;
        }
        used += len;
        kept.push(hit);
    }
    kept
}

fn build_prompt_messages(
    question: &str,
    hits: &[RetrievalHit],
    history: &[Message],
    max_context_chars: usize,
) -> Vec<Message> {
    let mut messages = vec![system_message(
        "You are a helpful assistant answering questions using only the provided context. \
         Use only the provided context, admit uncertainty when the context does not contain \
         the answer, and cite context entries by their [i] index when you rely on them.",
    )];
    messages.extend(history.iter().cloned());

    let context_block = format_context_block(hits, max_context_chars);
    messages.push(user_message(format!(
        "Context:\n{context_block}\n\nQuestion: {question}"
    )));
    messages
}

/// Collect distinct document names referenced by a set of retrieval hits,
/// for the document-name short-circuit answer.
fn collect_doc_names(hits: &[RetrievalHit]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut names = Vec::new();
    for hit in hits {
        if let Some(name) = hit.payload.get("document_name").and_then(|v| v.as_str()) {
            if seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }
    names
}

pub struct RagAnswerer {
    providers: HashMap<&'static str, Arc<dyn LlmProvider>>,
}

impl RagAnswerer {
    pub fn new(providers: HashMap<&'static str, Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    fn provider_for(&self, model: &str) -> Result<(Arc<dyn LlmProvider>, String)> {
        let (provider_name, resolved_model) = resolve_provider_name(model);
        let provider = self.providers.get(provider_name).cloned().ok_or_else(|| {
            crate::error::AppError::DependencyMissing(format!(
                "no provider configured for '{provider_name}'"
            ))
        })?;
        Ok((provider, resolved_model))
    }

    /// Answer `question` given retrieved context and prior chat history.
    /// Short-circuits to a direct list of document names when the question
    /// is asking for the document's identity rather than its content.
    pub async fn answer(
        &self,
        question: &str,
        model: &str,
        hits: &[RetrievalHit],
        history: &[Message],
        max_context_chars: usize,
    ) -> Result<String> {
        if is_document_name_question(question) {
            let names = collect_doc_names(hits);
            if !names.is_empty() {
                return Ok(format!("This document is named: {}", names.join(", ")));
            }
        }

        let (provider, resolved_model) = self.provider_for(model)?;
        let _ = resolved_model;
        let messages = build_prompt_messages(question, hits, history, max_context_chars);
        let response = provider.generate(&messages).await?;
        Ok(response.text)
    }

    /// Same as `answer`, but streamed. Only OpenAI streams token-by-token
    /// in this crate; other providers yield the whole answer as one chunk.
    pub async fn answer_stream(
        &self,
        question: &str,
        model: &str,
        hits: &[RetrievalHit],
        history: &[Message],
        max_context_chars: usize,
    ) -> Result<GenerationStream> {
        if is_document_name_question(question) {
            let names = collect_doc_names(hits);
            if !names.is_empty() {
                let answer = format!("This document is named: {}", names.join(", "));
                return Ok(Box::pin(futures::stream::once(async move { Ok(answer) })));
            }
        }

        let (provider, _resolved_model) = self.provider_for(model)?;
        let messages = build_prompt_messages(question, hits, history, max_context_chars);
        provider.generate_stream(&messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_explicit_prefix_syntax() {
        assert_eq!(resolve_provider_name("openai:gpt-4o").0, "openai");
        assert_eq!(resolve_provider_name("anthropic/claude-3-sonnet").0, "anthropic");
    }

    #[test]
    fn resolves_by_substring_match() {
        assert_eq!(resolve_provider_name("claude-3-sonnet-20240229").0, "anthropic");
        assert_eq!(resolve_provider_name("gemini-1.5-pro").0, "google");
        assert_eq!(resolve_provider_name("gpt-4o-mini").0, "openai");
        assert_eq!(resolve_provider_name("some-unknown-model").0, "openai");
    }

    #[test]
    fn detects_document_name_questions_with_accents_stripped() {
        assert!(is_document_name_question("tên tài liệu này là gì?"));
        assert!(is_document_name_question("What is this document?"));
        assert!(!is_document_name_question("What does section 3 say about refunds?"));
    }

    #[test]
    fn truncates_contexts_preserving_order_without_splitting() {
        let contexts = vec!["a".repeat(10), "b".repeat(10), "c".repeat(10)];
        let truncated = truncate_contexts(&contexts, 15);
        assert_eq!(truncated, vec!["a".repeat(10)]);
    }

    #[test]
    fn budget_smaller_than_first_context_keeps_nothing() {
        let contexts = vec!["a".repeat(20)];
        assert!(truncate_contexts(&contexts, 5).is_empty());
    }

    fn retrieval_hit(text: &str, score: f32) -> RetrievalHit {
        RetrievalHit {
            logical_id: "x".to_string(),
            score,
            text: Some(text.to_string()),
            payload: std::collections::HashMap::new(),
        }
    }

    #[test]
    fn contexts_within_budget_drops_everything_when_first_hit_is_oversized() {
        let hits = vec![retrieval_hit(&"a".repeat(20), 0.9)];
        assert!(contexts_within_budget(&hits, 5).is_empty());
    }

    #[test]
    fn contexts_within_budget_keeps_a_prefix_by_order() {
        let hits = vec![
            retrieval_hit(&"a".repeat(10), 0.9),
            retrieval_hit(&"b".repeat(10), 0.8),
        ];
        // Budget covers one rendered "[i] (score=…, doc=…) {text}" line
        // (~41 bytes here) but not two.
        let kept = contexts_within_budget(&hits, 50);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text.as_deref(), Some("a".repeat(10).as_str()));
    }

    #[test]
    fn contexts_within_budget_matches_rendered_prompt_line_length() {
        let hits = vec![retrieval_hit(&"a".repeat(10), 0.9)];
        let rendered = render_context_line(0, &hits[0]);
        assert!(contexts_within_budget(&hits, rendered.len() - 1).is_empty());
        assert_eq!(contexts_within_budget(&hits, rendered.len()).len(), 1);
    }
}
