//! Bot mention detection and question extraction.
//!
//! A message mentions the bot when the bot's display name appears anywhere
//! in it, ignoring case. The question is what remains after every
//! occurrence of the name (with an optional leading `@`) is removed.
//! The name is matched literally, so names containing regex
//! metacharacters such as `C++Bot` work as expected.

use regex::RegexBuilder;

/// Case-insensitive substring match of `bot_name` in `content`.
///
/// An empty bot name never matches.
pub fn is_mention(content: &str, bot_name: &str) -> bool {
    if bot_name.is_empty() {
        return false;
    }
    content.to_lowercase().contains(&bot_name.to_lowercase())
}

/// Strip every `@?{bot_name}` occurrence (any case) and trim the result.
///
/// ```rust
/// use coachbot_core::mention::extract_question;
///
/// assert_eq!(extract_question("Hey COACHBOT, help", "CoachBot"), "Hey , help");
/// assert_eq!(extract_question("@CoachBot when is class?", "CoachBot"), "when is class?");
/// ```
pub fn extract_question(content: &str, bot_name: &str) -> String {
    if bot_name.is_empty() {
        return content.trim().to_string();
    }

    let pattern = format!("@?{}", regex::escape(bot_name));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.replace_all(content, "").trim().to_string(),
        // Only reachable for names that blow the regex size limit.
        Err(_) => content.trim().to_string(),
    }
}
