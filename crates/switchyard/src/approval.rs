//! Interactive approval prompt on the controlling terminal.

use async_trait::async_trait;
use log::warn;
use std::io::{BufRead, Write};
use switchyard_core::{ApprovalDecision, ApprovalHandler, ApprovalRequest};

/// Asks on stderr and reads the answer from stdin.
pub struct ConsoleApproval;

/// `y`/`yes` (any case) approves; everything else denies.
pub fn parse_answer(answer: &str) -> ApprovalDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ApprovalDecision::Allow,
        _ => ApprovalDecision::Deny,
    }
}

fn question(request: &ApprovalRequest) -> String {
    let mut text = format!(
        "Allow operation {} on provider {}?",
        request.operation, request.provider
    );
    if !request.reasons.is_empty() {
        text.push_str(&format!(" ({})", request.reasons.join("; ")));
    }
    text.push_str(" [y/N] ");
    text
}

#[async_trait]
impl ApprovalHandler for ConsoleApproval {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalDecision {
        let prompt = question(request);
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(prompt.as_bytes());
            let _ = stderr.flush();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => parse_answer(&line),
            Ok(Err(err)) => {
                warn!("approval prompt unreadable, denying (err={})", err);
                ApprovalDecision::Deny
            }
            Err(err) => {
                warn!("approval prompt task failed, denying (err={})", err);
                ApprovalDecision::Deny
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_yes_approves() {
        assert_eq!(parse_answer("y\n"), ApprovalDecision::Allow);
        assert_eq!(parse_answer(" YES "), ApprovalDecision::Allow);
        assert_eq!(parse_answer(""), ApprovalDecision::Deny);
        assert_eq!(parse_answer("sure"), ApprovalDecision::Deny);
    }

    #[test]
    fn question_names_operation_and_reasons() {
        let request = ApprovalRequest {
            operation: "listDirectory".to_string(),
            provider: "fs".to_string(),
            prompt: "list files".to_string(),
            reasons: vec!["confirm-listing: lists local files".to_string()],
        };
        assert_eq!(
            question(&request),
            "Allow operation listDirectory on provider fs? (confirm-listing: lists local files) [y/N] "
        );
    }
}
