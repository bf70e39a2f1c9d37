use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use voxkb_rag::RagPipeline;

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

/// Interactive question loop on one conversation until EOF, Ctrl-C, or `exit`.
pub async fn run(
    pipeline: &RagPipeline,
    conversation: &str,
    system_prompt: Option<&str>,
) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("voxkb chat (conversation '{conversation}'). Type 'exit' to leave.");

    loop {
        let line = match editor.readline("you> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if is_exit(query) {
            break;
        }
        editor.add_history_entry(query)?;

        let answer = pipeline.generate_response(query, Some(conversation), system_prompt).await?;
        println!("\n{}\n", answer.response);
        if answer.success && !answer.sources.is_empty() {
            let scores: Vec<String> =
                answer.relevance_scores().iter().map(|s| format!("{:.0}%", s * 100.0)).collect();
            println!("[{} sources: {}]\n", answer.sources_used(), scores.join(", "));
        }
    }
    Ok(())
}

fn is_exit(input: &str) -> bool {
    EXIT_WORDS.iter().any(|w| input.eq_ignore_ascii_case(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_words_are_case_insensitive() {
        assert!(is_exit("EXIT"));
        assert!(is_exit("quit"));
        assert!(!is_exit("exit strategy"));
    }
}
