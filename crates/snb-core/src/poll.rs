use std::sync::OnceLock;

use regex::Regex;

/// Poll as the transport should create it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollRequest {
    pub question: String,
    pub options: Vec<String>,
    pub is_anonymous: bool,
    pub allows_multiple_answers: bool,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PollParseError {
    #[error("poll question is missing")]
    MissingQuestion,

    #[error("a poll needs at least two options, got {0}")]
    TooFewOptions(usize),
}

pub const POLL_USAGE: &str = "Please provide a valid question followed by at least two options, separated by semicolons. For example:\n/poll Your question here; Option 1; Option 2; Option 3";

fn control_flags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\|mpoll|\|nonanon").expect("valid regex"))
}

/// Parse the argument of `/poll`.
///
/// Format: `question; option; option[; ...]` with optional `|mpoll`
/// (multiple answers) and `|nonanon` (named voters) flags anywhere in the text.
pub fn parse_poll_command(input: &str) -> Result<PollRequest, PollParseError> {
    let lower = input.to_lowercase();
    let allows_multiple_answers = lower.contains("|mpoll");
    let is_anonymous = !lower.contains("|nonanon");

    let cleaned = control_flags().replace_all(input, "");
    let mut parts = cleaned.trim().split(';').map(str::trim);

    let question = parts.next().unwrap_or_default();
    if question.is_empty() {
        return Err(PollParseError::MissingQuestion);
    }

    let options: Vec<String> = parts
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();
    if options.len() < 2 {
        return Err(PollParseError::TooFewOptions(options.len()));
    }

    Ok(PollRequest {
        question: question.to_string(),
        options,
        is_anonymous,
        allows_multiple_answers,
    })
}
