//! Shared `ureq` agent construction and error description.

use std::time::Duration;

/// Longest slice of an error body kept in messages.
const MAX_BODY_SNIPPET: usize = 300;

/// Build an agent with a whole-request timeout and the given User-Agent.
pub fn build_agent(timeout_secs: u64, user_agent: &str) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .redirects(5)
        .build()
}

/// HTTP status carried by a `ureq` error, if the server answered.
pub fn status_of(err: &ureq::Error) -> Option<u16> {
    match err {
        ureq::Error::Status(code, _) => Some(*code),
        ureq::Error::Transport(_) => None,
    }
}

/// Turn a `ureq` error into a message, including a short body excerpt for
/// status errors since APIs put the useful part there.
pub fn describe_error(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            let body = body.trim();
            if body.is_empty() {
                format!("HTTP {code}")
            } else {
                format!("HTTP {code}: {}", truncate(body, MAX_BODY_SNIPPET))
            }
        }
        ureq::Error::Transport(transport) => describe_transport(&transport),
    }
}

/// Kind and message only. The URL can carry credentials in its query string.
fn describe_transport(transport: &ureq::Transport) -> String {
    let mut text = transport.kind().to_string();
    if let Some(message) = transport.message() {
        text.push_str(&format!(": {message}"));
    }
    if let Some(source) = std::error::Error::source(transport) {
        text.push_str(&format!(": {source}"));
    }
    text
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
