//! Message intent classification.
//!
//! Every inbound chat message is classified in a single pass into one of
//! three outcomes: a bare `/start`, a website mention (optionally followed by
//! a question), or a question about the website already on record for the
//! conversation.

mod parser;

use serde::Serialize;
use sitebot_shared::ConversationId;
use tracing::debug;

/// Command token that may prefix a message.
pub const START_COMMAND: &str = "/start";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a message asks the bot to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    /// `/start` with nothing after it.
    EmptyCommand,
    /// The message names a website, optionally with a question after it.
    SiteMention {
        /// Absolute URL with scheme.
        url: String,
        /// Trimmed, non-empty question text.
        #[serde(skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    /// No website found; the whole text is a question.
    QueryOnly { text: String },
}

/// A classified message bound to its conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedMessage {
    pub conversation_id: ConversationId,
    pub intent: Intent,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Classify a message and attach the conversation it came from.
pub fn parse_message(text: Option<&str>, conversation_id: ConversationId) -> ParsedMessage {
    ParsedMessage {
        conversation_id,
        intent: classify(text),
    }
}

/// Classify raw message text.
///
/// 1. Strip a leading `/start` (any ASCII case); nothing left means
///    [`Intent::EmptyCommand`].
/// 2. Repair `name_tld` into `name.tld` when there is no period.
/// 3. Match the site pattern.
/// 4. Failing that, widen a single bare word (`shop` → `shop.com`) and retry once.
/// 5. Anything else is [`Intent::QueryOnly`] carrying the text as typed.
pub fn classify(text: Option<&str>) -> Intent {
    let raw = text.unwrap_or_default();

    let text = match strip_command(raw) {
        Some(rest) if rest.is_empty() => return Intent::EmptyCommand,
        Some(rest) => rest,
        None => raw,
    };

    let repaired = parser::repair_underscore_domain(text);
    if let Some(candidate) = &repaired {
        debug!(%candidate, "rewrote underscore domain");
    }
    let candidate = repaired.as_deref().unwrap_or(text);

    if let Some(intent) = site_intent(candidate) {
        return intent;
    }

    if let Some(widened) = parser::widen_bare_word(candidate) {
        debug!(%widened, "retrying as bare domain");
        if let Some(intent) = site_intent(&widened) {
            return intent;
        }
    }

    Intent::QueryOnly {
        text: text.to_string(),
    }
}

/// Remove the command token, returning the remainder without leading whitespace.
fn strip_command(text: &str) -> Option<&str> {
    let prefix = text.get(..START_COMMAND.len())?;
    if !prefix.eq_ignore_ascii_case(START_COMMAND) {
        return None;
    }
    Some(text[START_COMMAND.len()..].trim_start())
}

fn site_intent(candidate: &str) -> Option<Intent> {
    let m = parser::match_site(candidate)?;
    let query = m
        .trailing
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string);

    Some(Intent::SiteMention {
        url: parser::with_scheme(m.site),
        query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(url: &str, query: Option<&str>) -> Intent {
        Intent::SiteMention {
            url: url.into(),
            query: query.map(String::from),
        }
    }

    fn query_only(text: &str) -> Intent {
        Intent::QueryOnly { text: text.into() }
    }

    #[test]
    fn bare_start_is_empty_command() {
        assert_eq!(classify(Some("/start")), Intent::EmptyCommand);
        assert_eq!(classify(Some("/start   ")), Intent::EmptyCommand);
        assert_eq!(classify(Some("/START")), Intent::EmptyCommand);
    }

    #[test]
    fn plain_domain() {
        assert_eq!(
            classify(Some("example.com")),
            site("https://example.com", None)
        );
    }

    #[test]
    fn domain_with_question() {
        assert_eq!(
            classify(Some("example.com how much does it cost")),
            site("https://example.com", Some("how much does it cost"))
        );
    }

    #[test]
    fn start_with_domain_and_question() {
        assert_eq!(
            classify(Some("/Start   https://www.example.org/about  кто вы? ")),
            site("https://www.example.org/about", Some("кто вы?"))
        );
    }

    #[test]
    fn underscore_domain_is_repaired() {
        assert_eq!(
            classify(Some("wikilect_com")),
            site("https://wikilect.com", None)
        );
        assert_eq!(
            classify(Some("/start wikilect_com какие курсы?")),
            site("https://wikilect.com", Some("какие курсы?"))
        );
    }

    #[test]
    fn short_word_is_a_question() {
        assert_eq!(classify(Some("hi")), query_only("hi"));
    }

    #[test]
    fn sentence_without_domain_is_unchanged() {
        assert_eq!(
            classify(Some("tell me about your pricing")),
            query_only("tell me about your pricing")
        );
    }

    #[test]
    fn bare_word_is_widened() {
        assert_eq!(classify(Some("google")), site("https://google.com", None));
    }

    #[test]
    fn failed_widening_returns_unmutated_text() {
        // widened to "привет.com", which still fails the ASCII label rule
        assert_eq!(classify(Some("привет")), query_only("привет"));
        assert_eq!(classify(Some("what?")), query_only("what?"));
    }

    #[test]
    fn query_only_keeps_pre_repair_text() {
        // "a_b" repairs to "a.b", whose TLD is too short
        assert_eq!(classify(Some("a_b")), query_only("a_b"));
    }

    #[test]
    fn whitespace_only_trailing_text_is_absent() {
        assert_eq!(
            classify(Some("example.com \n\t ")),
            site("https://example.com", None)
        );
    }

    #[test]
    fn missing_text_is_empty_query() {
        assert_eq!(classify(None), query_only(""));
        assert_eq!(classify(Some("")), query_only(""));
    }

    #[test]
    fn scheme_alone_is_not_a_site() {
        assert_eq!(classify(Some("https://")), query_only("https://"));
    }

    #[test]
    fn start_prefix_without_separator_is_stripped() {
        assert_eq!(
            classify(Some("/startexample.com")),
            site("https://example.com", None)
        );
    }

    #[test]
    fn parse_message_carries_conversation() {
        let parsed = parse_message(Some("example.com"), ConversationId(42));
        assert_eq!(parsed.conversation_id, ConversationId(42));
        assert!(matches!(parsed.intent, Intent::SiteMention { .. }));
    }

    #[test]
    fn intent_serializes_with_type_tag() {
        let json = serde_json::to_string(&site("https://example.com", None)).unwrap();
        assert_eq!(json, r#"{"type":"site_mention","url":"https://example.com"}"#);
    }
}
