//! Input/output data mapping between steps and the shared context.

use std::collections::HashMap;

use serde_json::Value;

use armada_core::context::{value_at_path, ExecutionContext};
use armada_core::workflow::Step;

/// Context paths with this prefix read another step's stored result.
pub const STEP_REF_PREFIX: &str = "$step.";

/// Build a step's payload from its input mapping.
///
/// Sources that resolve to nothing are left out of the payload.
pub fn resolve_input(
    step: &Step,
    context: &ExecutionContext,
    step_results: &HashMap<String, Value>,
) -> Value {
    let mut payload = ExecutionContext::new();
    for (target, source) in &step.input_mapping {
        if let Some(value) = read_source(source, context, step_results) {
            payload.set_path(target, value.clone());
        }
    }
    payload.into_value()
}

/// Copy selected result fields into the context. An empty result path
/// selects the whole result.
pub fn apply_output(step: &Step, result: &Value, context: &mut ExecutionContext) {
    for (source, target) in &step.output_mapping {
        if let Some(value) = value_at_path(result, source) {
            context.set_path(target, value.clone());
        }
    }
}

fn read_source<'a>(
    source: &str,
    context: &'a ExecutionContext,
    step_results: &'a HashMap<String, Value>,
) -> Option<&'a Value> {
    match source.strip_prefix(STEP_REF_PREFIX) {
        Some(reference) => {
            let (step_id, path) = reference.split_once('.').unwrap_or((reference, ""));
            value_at_path(step_results.get(step_id)?, path)
        }
        None => context.get_path(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_from_context_and_step_results() {
        let step = Step::new("s2", "x")
            .with_input("doc.text", "request.body")
            .with_input("lang", "$step.s1.language")
            .with_input("whole", "$step.s1")
            .with_input("absent", "request.missing");
        let ctx = ExecutionContext::from_value(json!({"request": {"body": "hola"}}));
        let mut results = HashMap::new();
        results.insert("s1".to_string(), json!({"language": "es"}));

        let payload = resolve_input(&step, &ctx, &results);
        assert_eq!(
            payload,
            json!({
                "doc": {"text": "hola"},
                "lang": "es",
                "whole": {"language": "es"}
            })
        );
    }

    #[test]
    fn test_empty_mapping_gives_empty_payload() {
        let payload = resolve_input(&Step::new("s", "x"), &ExecutionContext::new(), &HashMap::new());
        assert_eq!(payload, json!({}));
    }

    #[test]
    fn test_output_written_at_nested_paths() {
        let step = Step::new("s1", "x")
            .with_output("summary", "report.summary")
            .with_output("", "raw.s1")
            .with_output("missing", "report.missing");
        let mut ctx = ExecutionContext::new();
        let result = json!({"summary": "short", "tokens": 12});

        apply_output(&step, &result, &mut ctx);
        assert_eq!(ctx.get_path("report.summary"), Some(&json!("short")));
        assert_eq!(ctx.get_path("raw.s1.tokens"), Some(&json!(12)));
        assert_eq!(ctx.get_path("report.missing"), None);
    }
}
