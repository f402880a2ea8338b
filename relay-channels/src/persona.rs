//! Persona loading.
//!
//! The persona is product copy, not engineering: it is loaded verbatim
//! from a configured text file, or falls back to a compact built-in. It is
//! sent as the system instruction on every completion call (stateless,
//! repeated per request) rather than pinned into session history.

use relay_common::Result;

/// Built-in persona used when no file is configured.
pub const DEFAULT_PERSONA: &str = "\
You are Alex, the Senior Growth Partner at a digital growth agency. \
You reply over WhatsApp chat: short, direct, confident messages. \
Diagnose the customer's business problem before proposing anything, \
keep every reply under three sentences, and always end with a concrete \
next step or question.";

/// Load the persona text.
///
/// A configured file that cannot be read is a startup error; a missing
/// configuration falls back to [`DEFAULT_PERSONA`].
pub fn load(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            tracing::info!(path = %path, bytes = text.len(), "Persona loaded from file");
            Ok(text)
        }
        None => Ok(DEFAULT_PERSONA.to_string()),
    }
}
