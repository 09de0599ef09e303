//! Named, bounded prompt templates for the three LLM call kinds.
//!
//! Templates are plain format strings rather than a templating engine:
//! three fixed shapes don't need one.

use serde_json::Value;

pub fn mapping_synthesis_prompt(publisher: &str, sample_payload: &Value) -> String {
    format!(
        "You convert webhook payloads into a JSON transform. The publisher is \"{publisher}\".\n\
         Given this sample payload:\n{payload}\n\n\
         Respond with ONLY a JSON object whose keys are exactly \"publisher\", \"resource.type\", \
         \"resource.id\", \"action\", and optionally \"summary\", and whose values are field \
         expressions: either \"literal:<value>\" for a constant, or a dotted path into the sample \
         starting with \"$.\" (array indices written as [N]). The expression for \"resource.id\" \
         must resolve to a string or a number in the sample payload.",
        payload = serde_json::to_string_pretty(sample_payload).unwrap_or_default(),
    )
}

pub fn subject_filter_synthesis_prompt(description: &str, known_triples: &[(String, String, String)]) -> String {
    let catalog: Vec<String> = known_triples
        .iter()
        .map(|(publisher, rtype, action)| format!("{publisher}.{rtype}.*.{action}"))
        .collect();
    format!(
        "A subscriber wrote this description of what they want to be notified about:\n\"{description}\"\n\n\
         The known event subjects (publisher.resource_type.resource_id.action, with resource_id \
         always a wildcard) are:\n{catalog}\n\n\
         Respond with ONLY a single broker subject filter string using the tokens above. Use \"*\" \
         for a single wildcard segment and \">\" for a trailing multi-segment wildcard. Every \
         non-wildcard token in your answer must be one of the tokens shown above.",
        catalog = catalog.join("\n"),
    )
}

pub fn gate_evaluation_prompt(prompt_or_description: &str, canonical_event_json: &str) -> String {
    format!(
        "Evaluate whether this event should pass a notification gate, given this instruction:\n\
         \"{prompt_or_description}\"\n\n\
         Event:\n{canonical_event_json}\n\n\
         Respond with ONLY a JSON object: {{\"decision\": bool, \"confidence\": number between 0 \
         and 1, \"reasoning\": string}}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mapping_prompt_includes_publisher_and_payload() {
        let prompt = mapping_synthesis_prompt("github", &json!({"a": 1}));
        assert!(prompt.contains("github"));
        assert!(prompt.contains("\"a\""));
    }

    #[test]
    fn subject_filter_prompt_lists_known_triples() {
        let prompt = subject_filter_synthesis_prompt(
            "PR approved",
            &[("github".to_string(), "pull_request".to_string(), "update".to_string())],
        );
        assert!(prompt.contains("github.pull_request.*.update"));
    }
}
