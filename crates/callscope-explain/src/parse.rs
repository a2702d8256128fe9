use serde_json::Value;

/// Brief summary used when a model reply cannot be read as JSON.
pub const UNPARSABLE_SUMMARY: &str = "The explanation service returned an unreadable response.";

/// Read a JSON object out of free-form model output.
///
/// Tried in order: the whole text, the first fenced code block, the span
/// from the first `{` to the last `}`. Anything else yields the fixed
/// fallback object, whose `error` field carries the raw text.
pub fn parse_json_lenient(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && value.is_object()
    {
        return value;
    }

    if let Some(block) = fenced_block(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(block)
        && value.is_object()
    {
        return value;
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
        && value.is_object()
    {
        return value;
    }

    tracing::warn!(chars = raw.len(), "Model reply is not JSON; using fallback");
    fallback_object(raw)
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip an info string such as `json`.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// The fixed object substituted for unreadable replies.
pub fn fallback_object(raw: &str) -> Value {
    serde_json::json!({
        "briefSummary": UNPARSABLE_SUMMARY,
        "detailedBehaviour": "",
        "flowRepresentation": "",
        "error": raw.trim(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_json() {
        let value = parse_json_lenient(r#" {"briefSummary": "loads rows"} "#);
        assert_eq!(value["briefSummary"], "loads rows");
    }

    #[test]
    fn accepts_fenced_json() {
        let raw = "Here you go:\n```json\n{\"briefSummary\": \"fenced\"}\n```\nDone.";
        assert_eq!(parse_json_lenient(raw)["briefSummary"], "fenced");

        let bare_fence = "```\n{\"briefSummary\": \"bare\"}\n```";
        assert_eq!(parse_json_lenient(bare_fence)["briefSummary"], "bare");
    }

    #[test]
    fn accepts_json_wrapped_in_prose() {
        let raw = "Sure! {\"briefSummary\": \"inline\", \"flowRepresentation\": \"a -> b\"} Hope it helps.";
        let value = parse_json_lenient(raw);
        assert_eq!(value["briefSummary"], "inline");
        assert_eq!(value["flowRepresentation"], "a -> b");
    }

    #[test]
    fn unreadable_text_yields_fallback() {
        let value = parse_json_lenient("I cannot help with } that {");
        assert_eq!(value["briefSummary"], UNPARSABLE_SUMMARY);
        assert_eq!(value["error"], "I cannot help with } that {");

        // A bare array is not an explanation object either.
        assert_eq!(parse_json_lenient("[1, 2]")["briefSummary"], UNPARSABLE_SUMMARY);
    }
}
