use crate::memory::ledger::Turn;
use crate::protocol::Request;
use crate::retrieval::Retrieved;
use crate::types::{ChatMessage, Dialog};

pub use crate::protocol::NONE_FIELD;

/// Render a request and its retrieved context into the dialog sent to the model.
///
/// Order: related turns (summaries), recent turns (raw query/output), then one
/// final user message carrying the task. Empty messages are skipped.
pub fn assemble(request: &Request, context: &Retrieved) -> Dialog {
    let mut dialog = Dialog::new();

    for turn in context.related.iter().flatten() {
        if let Some(summary) = &turn.summary {
            push(&mut dialog, ChatMessage::user(summary.input.as_str()));
            push(&mut dialog, ChatMessage::assistant(summary.output.as_str()));
        }
    }

    for turn in &context.recent {
        push_exchange(&mut dialog, turn);
    }

    push(&mut dialog, ChatMessage::user(task_message(request)));
    dialog
}

/// The closing user message: instruction, belief and query lines, each
/// omitted when the field is `None`.
pub fn task_message(request: &Request) -> String {
    let mut content = String::new();
    if request.instruction != NONE_FIELD {
        content.push_str(&request.instruction);
        content.push('\n');
    }
    if request.triples != NONE_FIELD {
        content.push_str(&format!("'belief': {{{}}}\n", request.triples));
    }
    if request.query != NONE_FIELD {
        content.push_str(&format!("'query': {}\n", request.query));
    }
    content
}

fn push_exchange(dialog: &mut Dialog, turn: &Turn) {
    push(dialog, ChatMessage::user(turn.query.as_str()));
    push(dialog, ChatMessage::assistant(turn.output.as_str()));
}

fn push(dialog: &mut Dialog, message: ChatMessage) {
    if !message.content.trim().is_empty() {
        dialog.push(message);
    }
}
