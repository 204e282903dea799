
/// Shown to the model in place of an empty context block
pub const FALLBACK_CONTEXT: &str = "No relevant team history was found for this question.";

const ROLE: &str = "You are the AI Co-founder for a startup. Your role is to provide strategic \
advice, track progress, and help the founders grow. You have access to the team's history \
(chat messages, journal entries, documents and tasks).";

const INSTRUCTIONS: &str = "\
- Use the provided context to answer the user's query accurately.
- When you rely on the context, say which kind of data the answer comes from (CHAT, JOURNAL, DOC or TASK).
- If the context doesn't contain the answer, use your general startup knowledge but mention that you don't have specific data on it.
- Be encouraging, professional, and concise.
- Suggest actionable next steps if appropriate.";

/// Merge the fixed instructions, the assembled context and the user's query into one prompt
#[inline]
pub fn build_prompt(context: &str, query: &str) -> String {
    let context = match context.trim() {
        "" => FALLBACK_CONTEXT,
        trimmed => trimmed,
    };

    format!(
        "{ROLE}\n\nCONTEXT FROM TEAM HISTORY:\n{context}\n\nUSER QUERY:\n{query}\n\nINSTRUCTIONS:\n{INSTRUCTIONS}\n"
    )
}
