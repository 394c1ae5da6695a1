//! System prompt assembly for grounded generation.

use crate::models::Personality;

/// Reply used when the model returns no content.
pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't generate a response.";

/// Separator placed between retrieved context chunks.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

impl Personality {
    /// Opening sentence that sets the bot's tone.
    pub fn framing(&self) -> &'static str {
        match self {
            Personality::Friendly => {
                "You are a helpful, friendly AI coach that responds in a warm and approachable manner."
            }
            Personality::Professional => {
                "You are a professional AI coach that provides clear, concise, and expert advice."
            }
            Personality::Motivational => {
                "You are an energetic, motivational AI coach that inspires and encourages users."
            }
        }
    }
}

/// Build the system prompt: tone, identity, answering rules, then the
/// retrieved context.
///
/// An empty `context` still yields the "Context from knowledge base:"
/// heading, which tells the model it has nothing to ground on.
pub fn system_prompt(personality: Personality, bot_name: &str, context: &[String]) -> String {
    format!(
        "{framing}\n\n\
         Your name is {bot_name}. You are trained on custom knowledge provided by the community admin.\n\n\
         When answering questions:\n\
         - Use the context provided below to ground your responses\n\
         - If the context doesn't contain relevant information, say so honestly\n\
         - Keep responses concise but helpful\n\
         - Maintain the {tone} tone throughout\n\n\
         Context from knowledge base:\n\
         {context}",
        framing = personality.framing(),
        bot_name = bot_name,
        tone = personality.as_str(),
        context = context.join(CONTEXT_SEPARATOR),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_all_parts() {
        let context = vec!["We are open 9-5 Mon-Fri.".to_string()];
        let prompt = system_prompt(Personality::Friendly, "CoachBot", &context);
        assert!(prompt.starts_with(Personality::Friendly.framing()));
        assert!(prompt.contains("Your name is CoachBot."));
        assert!(prompt.contains("Maintain the friendly tone throughout"));
        assert!(prompt.ends_with("Context from knowledge base:\nWe are open 9-5 Mon-Fri."));
    }

    #[test]
    fn test_chunks_joined_with_separator() {
        let context = vec!["one".to_string(), "two".to_string()];
        let prompt = system_prompt(Personality::Professional, "Ada", &context);
        assert!(prompt.contains("one\n\n---\n\ntwo"));
        assert!(prompt.contains("clear, concise, and expert advice"));
    }

    #[test]
    fn test_each_personality_has_distinct_framing() {
        let framings: Vec<&str> = Personality::ALL.iter().map(|p| p.framing()).collect();
        assert_ne!(framings[0], framings[1]);
        assert_ne!(framings[1], framings[2]);
    }
}
