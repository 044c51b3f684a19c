// src/cli/progress.rs — Terminal progress renderer for reasoning runs

use crate::core::types::ProgressEvent;
use crate::util::preview;

const PREVIEW_CHARS: usize = 120;

/// Build a progress callback that writes formatted output to stderr.
///
/// Stdout stays reserved for the final answer.
/// Returns a closure suitable for `ReasoningController::with_progress()`.
pub fn terminal_progress() -> impl Fn(ProgressEvent) + Send + Sync + 'static {
    move |event| {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        eprintln!("{} {}", stamp, format_event(&event));
    }
}

pub(crate) fn format_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::StepStart {
            step,
            chosen_path_tokens,
        } => format!("[step {}] thinking... ({} tokens so far)", step, chosen_path_tokens),
        ProgressEvent::QuestionChosen {
            step,
            index,
            backend,
            role,
            question,
        } => format!(
            "[step {}]   question #{} from {} ({}): {}",
            step,
            index,
            backend,
            role,
            preview(question, PREVIEW_CHARS),
        ),
        ProgressEvent::AnswerChosen {
            step,
            index,
            backend,
            answer,
        } => format!(
            "[step {}]   answer #{} from {}: {}",
            step,
            index,
            backend,
            preview(answer, PREVIEW_CHARS),
        ),
        ProgressEvent::Finished {
            steps,
            status,
            input_tokens,
            output_tokens,
        } => format!(
            "[done] status={} steps={} tokens={}in/{}out",
            status, steps, input_tokens, output_tokens,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Role, RunStatus};
    use std::sync::{Arc, Mutex};

    fn capturing_progress() -> (
        impl Fn(ProgressEvent) + Send + Sync + 'static,
        Arc<Mutex<Vec<String>>>,
    ) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let cb = move |event: ProgressEvent| {
            sink.lock().unwrap().push(format_event(&event));
        };
        (cb, lines)
    }

    #[test]
    fn test_step_start_format() {
        let line = format_event(&ProgressEvent::StepStart {
            step: 2,
            chosen_path_tokens: 37,
        });
        assert_eq!(line, "[step 2] thinking... (37 tokens so far)");
    }

    #[test]
    fn test_question_is_flattened() {
        let line = format_event(&ProgressEvent::QuestionChosen {
            step: 1,
            index: 0,
            backend: "openai/gpt-4o".into(),
            role: Role::External,
            question: "What is\n  2+2?".into(),
        });
        assert_eq!(
            line,
            "[step 1]   question #0 from openai/gpt-4o (external): What is 2+2?"
        );
    }

    #[test]
    fn test_long_answer_truncated() {
        let line = format_event(&ProgressEvent::AnswerChosen {
            step: 3,
            index: 1,
            backend: "anthropic/claude".into(),
            answer: "x".repeat(500),
        });
        let expected = format!(
            "[step 3]   answer #1 from anthropic/claude: {}...",
            "x".repeat(PREVIEW_CHARS)
        );
        assert_eq!(line, expected);
    }

    #[test]
    fn test_multibyte_answer_cut_on_char_boundary() {
        let line = format_event(&ProgressEvent::AnswerChosen {
            step: 1,
            index: 0,
            backend: "openai/gpt-4o".into(),
            answer: "é".repeat(300),
        });
        assert!(line.ends_with(&format!("{}...", "é".repeat(PREVIEW_CHARS))));
    }

    #[test]
    fn test_finished_format() {
        let line = format_event(&ProgressEvent::Finished {
            steps: 4,
            status: RunStatus::TerminalSuccess,
            input_tokens: 1200,
            output_tokens: 300,
        });
        assert_eq!(line, "[done] status=TERMINAL_SUCCESS steps=4 tokens=1200in/300out");
    }

    #[test]
    fn test_capturing_sequence() {
        let (cb, lines) = capturing_progress();
        cb(ProgressEvent::StepStart {
            step: 1,
            chosen_path_tokens: 0,
        });
        cb(ProgressEvent::Finished {
            steps: 1,
            status: RunStatus::ExceededBudget,
            input_tokens: 0,
            output_tokens: 0,
        });
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("EXCEEDED_BUDGET"));
    }
}
