//! Grounded prompt assembly.
//!
//! Turns retrieved passages into a numbered, relevance-annotated context
//! block and wraps it in the system instruction sent to the chat model.

use crate::conversation::Turn;
use crate::document::RetrievalResult;

/// Instruction used when the caller supplies none.
pub const DEFAULT_INSTRUCTION: &str =
    "You are a helpful AI assistant with access to a local knowledge base.";

/// Context substituted when no passage passed the relevance threshold.
pub const NO_CONTEXT: &str = "No specific information found in knowledge base.";

const DEFAULT_DIRECTIVES: &[&str] = &[
    "Use the knowledge base context to provide accurate, helpful answers",
    "If the context doesn't fully answer the question, supplement with your general knowledge",
    "Be conversational and friendly - this will be converted to speech",
    "Keep responses concise but informative (good for voice output)",
    "If you reference the knowledge base, mention it naturally",
    "If unsure about something, acknowledge the uncertainty",
];

const PERSONA_DIRECTIVES: &[&str] = &[
    "Use the knowledge base context to provide accurate answers",
    "Stay in character based on the persona described above",
    "Be conversational and natural",
    "Keep responses suitable for voice output",
    "If unsure about something, acknowledge the uncertainty",
];

/// Format one source line: `[Source <rank> - <pct>% relevant]: <text>`.
pub fn format_source(rank: usize, result: &RetrievalResult) -> String {
    let percent = (result.similarity * 100.0).round() as i64;
    format!("[Source {rank} - {percent}% relevant]: {}", result.document)
}

/// Build the context block from ranked results, separated by blank lines.
///
/// Sources are numbered from 1 in rank order. With a non-zero `max_chars`,
/// sources that would push the block past the bound (counted in characters)
/// are left out whole; the top-ranked source is always kept. Returns the
/// block and how many leading `results` it holds. An empty result list
/// yields [`NO_CONTEXT`] and `0`.
pub fn build_context(results: &[RetrievalResult], max_chars: usize) -> (String, usize) {
    let mut context = String::new();
    let mut context_chars = 0;
    let mut kept = 0;
    for (index, result) in results.iter().enumerate() {
        let line = format_source(index + 1, result);
        let separator = if kept == 0 { "" } else { "\n\n" };
        let added = separator.len() + line.chars().count();
        if max_chars > 0 && kept > 0 && context_chars + added > max_chars {
            break;
        }
        context.push_str(separator);
        context.push_str(&line);
        context_chars += added;
        kept += 1;
    }

    if kept == 0 { (NO_CONTEXT.to_string(), 0) } else { (context, kept) }
}

/// Compose the full system instruction around a context block.
///
/// A caller-supplied instruction is treated as a persona and gets the
/// stay-in-character directives; otherwise [`DEFAULT_INSTRUCTION`] is used.
pub fn build_system_prompt(instruction: Option<&str>, context: &str) -> String {
    let (head, directives) = match instruction.map(str::trim).filter(|s| !s.is_empty()) {
        Some(custom) => (custom, PERSONA_DIRECTIVES),
        None => (DEFAULT_INSTRUCTION, DEFAULT_DIRECTIVES),
    };

    let directives: Vec<String> = directives.iter().map(|d| format!("- {d}")).collect();
    format!(
        "{head}\n\nKNOWLEDGE BASE CONTEXT:\n{context}\n\nINSTRUCTIONS:\n{}",
        directives.join("\n")
    )
}

/// The message sequence sent to the model: instruction, prior history, new query.
pub fn build_messages(system_prompt: String, history: &[Turn], query: &str) -> Vec<Turn> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Turn::system(system_prompt));
    messages.extend(history.iter().cloned());
    messages.push(Turn::user(query));
    messages
}
