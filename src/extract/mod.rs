//! Recover structured tool invocations from free-form LLM output.
//!
//! The model signals a tool call with an XML-ish block embedded anywhere in
//! its reply text:
//!
//! ```text
//! <use_tool>
//! <server_name>example-server</server_name>
//! <tool_name>file-reader</tool_name>
//! <arguments>{"path": "notes.txt"}</arguments>
//! </use_tool>
//! ```
//!
//! Marker recognition lives entirely in this module so the syntax can be
//! swapped for a stricter structured-output contract without touching the
//! orchestrator.

use std::sync::OnceLock;

use regex::Regex;

/// A validated tool invocation recovered from reply text. Transient:
/// produced here, consumed once by the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolRequest {
    pub server_name: String,
    pub tool_name: String,
    /// Always a JSON object; blocks with non-object arguments are skipped.
    pub arguments: serde_json::Value,
}

fn block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?s)<use_tool>\s*<server_name>(.*?)</server_name>\s*<tool_name>(.*?)</tool_name>\s*<arguments>(.*?)</arguments>\s*</use_tool>",
        )
        .expect("tool block pattern is valid")
    })
}

/// Lazily scan `text` for well-formed `<use_tool>` blocks.
///
/// Malformed or incomplete blocks are skipped, never fatal; surrounding
/// prose is ignored. Requests are yielded in textual order. The iterator is
/// finite and derived fresh from the text on each call.
pub fn tool_requests(text: &str) -> impl Iterator<Item = ParsedToolRequest> + '_ {
    block_pattern().captures_iter(text).filter_map(|captures| {
        let server_name = captures[1].trim();
        let tool_name = captures[2].trim();
        if server_name.is_empty() || tool_name.is_empty() {
            return None;
        }

        let arguments: serde_json::Value = match serde_json::from_str(captures[3].trim()) {
            Ok(value @ serde_json::Value::Object(_)) => value,
            _ => return None,
        };

        Some(ParsedToolRequest {
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
            arguments,
        })
    })
}

/// First well-formed request in `text`, if any. Extra blocks are ignored:
/// the orchestrator acts on at most one tool call per reply.
pub fn first_tool_request(text: &str) -> Option<ParsedToolRequest> {
    tool_requests(text).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn block(server: &str, tool: &str, args: &str) -> String {
        format!(
            "<use_tool>\n<server_name>{server}</server_name>\n<tool_name>{tool}</tool_name>\n<arguments>{args}</arguments>\n</use_tool>"
        )
    }

    #[test]
    fn plain_prose_yields_nothing() {
        assert_eq!(tool_requests("just chatting about <tools> here").count(), 0);
        assert_eq!(tool_requests("").count(), 0);
    }

    #[test]
    fn single_block_yields_one_request() {
        let text = format!(
            "Let me read that file.\n{}\nOne moment.",
            block("example-server", "file-reader", r#"{"path":"examples/example.txt"}"#)
        );

        let requests: Vec<_> = tool_requests(&text).collect();
        assert_eq!(
            requests,
            vec![ParsedToolRequest {
                server_name: "example-server".into(),
                tool_name: "file-reader".into(),
                arguments: json!({"path": "examples/example.txt"}),
            }]
        );
    }

    #[test]
    fn multiple_blocks_preserve_textual_order() {
        let text = format!(
            "{}\nand then\n{}",
            block("s1", "first", "{}"),
            block("s2", "second", "{}")
        );

        let tools: Vec<_> = tool_requests(&text).map(|r| r.tool_name).collect();
        assert_eq!(tools, vec!["first", "second"]);
    }

    #[test]
    fn malformed_arguments_skip_that_block_only() {
        let text = format!(
            "{}\n{}",
            block("s1", "broken", r#"{"path": unterminated"#),
            block("s2", "ok", r#"{"path":"a"}"#)
        );

        let requests: Vec<_> = tool_requests(&text).collect();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tool_name, "ok");
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        assert_eq!(tool_requests(&block("s", "t", r#"["array"]"#)).count(), 0);
        assert_eq!(tool_requests(&block("s", "t", r#""string""#)).count(), 0);
        assert_eq!(tool_requests(&block("s", "t", "42")).count(), 0);
    }

    #[test]
    fn incomplete_block_yields_nothing() {
        let text = "<use_tool>\n<server_name>s</server_name>\n<tool_name>t</tool_name>";
        assert_eq!(tool_requests(text).count(), 0);
    }

    #[test]
    fn empty_names_are_rejected() {
        assert_eq!(tool_requests(&block("", "t", "{}")).count(), 0);
        assert_eq!(tool_requests(&block("s", "", "{}")).count(), 0);
    }

    #[test]
    fn nested_argument_objects_survive() {
        let args = r#"{"filter": {"kind": "dir", "depth": 2}, "paths": ["a", "b"]}"#;
        let request = first_tool_request(&block("fs", "list", args)).unwrap();
        assert_eq!(request.arguments["filter"]["depth"], json!(2));
    }

    #[test]
    fn first_tool_request_truncates_to_first() {
        let text = format!("{}{}", block("s1", "one", "{}"), block("s2", "two", "{}"));
        assert_eq!(first_tool_request(&text).unwrap().tool_name, "one");
    }
}
