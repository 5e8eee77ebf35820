//! Terminal rendering of conversations and turn results.

use audit_chat::{Conversation, DocumentBuckets, Exchange, InitSummary, Role, TurnOutcome};

pub fn print_summary(summary: &InitSummary) {
    let name = if summary.session_name.is_empty() {
        "(unnamed session)"
    } else {
        summary.session_name.as_str()
    };
    println!(
        "{name} [{}] conversation {}",
        summary.compliance_domain, summary.conversation_id
    );
    println!("{} document(s) loaded", summary.documents);
}

pub fn print_exchange(exchange: &Exchange) {
    let speaker = match exchange.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    println!(
        "[{}] {speaker}: {}",
        exchange.timestamp.format("%Y-%m-%d %H:%M"),
        exchange.text
    );
    if !exchange.sources.is_empty() {
        println!("    sources: {}", exchange.sources.join(", "));
    }
}

pub fn print_history(conversation: &Conversation) {
    if conversation.is_empty() {
        println!("(no previous exchanges)");
        return;
    }
    for exchange in conversation.exchanges() {
        print_exchange(exchange);
    }
}

pub fn print_documents(buckets: &DocumentBuckets) {
    for (label, documents) in [
        ("reference", &buckets.reference),
        ("implementation", &buckets.implementation),
        ("assessment", &buckets.assessment),
    ] {
        println!("{label} ({}):", documents.len());
        for document in documents {
            match &document.document_version {
                Some(version) => println!("  {} ({version})", document.filename),
                None => println!("  {}", document.filename),
            }
        }
    }
}

/// Finish the line a streamed answer was printed on.
pub fn print_outcome(outcome: &TurnOutcome, error: Option<&str>) {
    match outcome {
        TurnOutcome::Completed {
            sources,
            response_time_ms,
            ..
        } => {
            println!();
            if !sources.is_empty() {
                println!("sources: {}", sources.join(", "));
            }
            println!("({response_time_ms} ms)");
        }
        TurnOutcome::Failed { .. } | TurnOutcome::Abandoned => {
            println!();
            eprintln!("error: {}", error.unwrap_or("the answer did not complete"));
        }
    }
}
