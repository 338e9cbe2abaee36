//! Result classification: an ordered list of rules mapping an execution
//! outcome to exactly one result kind. The first matching rule wins.

use serde::Serialize;

use crate::session::ExecutionOutcome;

pub const EMPTY_MESSAGE: &str = "Code executed successfully. No output produced.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Plot,
    Markup,
    Structured,
    Text,
    Empty,
    Error,
}

impl std::fmt::Display for ResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResultKind::Plot => "plot",
            ResultKind::Markup => "markup",
            ResultKind::Structured => "structured",
            ResultKind::Text => "text",
            ResultKind::Empty => "empty",
            ResultKind::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExecutionResult {
    /// `data` is still base64; decoding belongs to the renderer.
    Plot { media_type: String, data: String },
    Markup { content: String, full_document: bool },
    Structured { content: String },
    Text { content: String },
    Empty { message: String },
    Error { message: String },
}

impl ExecutionResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            ExecutionResult::Plot { .. } => ResultKind::Plot,
            ExecutionResult::Markup { .. } => ResultKind::Markup,
            ExecutionResult::Structured { .. } => ResultKind::Structured,
            ExecutionResult::Text { .. } => ResultKind::Text,
            ExecutionResult::Empty { .. } => ResultKind::Empty,
            ExecutionResult::Error { .. } => ResultKind::Error,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ExecutionResult::Error { message: message.into() }
    }
}

pub fn classify(outcome: &ExecutionOutcome) -> ExecutionResult {
    if outcome.threw {
        let message = outcome
            .error_message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        return ExecutionResult::Error { message };
    }

    if let Some(markup) = &outcome.markup_source {
        return ExecutionResult::Markup {
            content: markup.clone(),
            full_document: is_full_document(markup),
        };
    }

    if let Some(s) = outcome.raw_value.as_str() {
        if let Some((media_type, data)) = split_image_marker(s) {
            return ExecutionResult::Plot { media_type: media_type.to_string(), data: data.to_string() };
        }
        if contains_table(s) {
            return ExecutionResult::Markup { content: s.to_string(), full_document: false };
        }
        if let Some(pretty) = reformat_structured(s) {
            return ExecutionResult::Structured { content: pretty };
        }
    }

    let printed = outcome.captured_output.trim();
    if !printed.is_empty() {
        return ExecutionResult::Text { content: printed.to_string() };
    }

    if let Some(text) = outcome.raw_value.display_text() {
        if !text.is_empty() {
            return ExecutionResult::Text { content: text.to_string() };
        }
    }

    ExecutionResult::Empty { message: EMPTY_MESSAGE.to_string() }
}

/// Markup that is a whole document rather than a fragment.
pub fn is_full_document(markup: &str) -> bool {
    let head: String = markup.trim_start().chars().take(9).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

/// `image/<subtype>;base64,<data>`, optionally behind a `data:` scheme.
pub fn split_image_marker(s: &str) -> Option<(&str, &str)> {
    let rest = s.strip_prefix("data:").unwrap_or(s);
    if !rest.starts_with("image/") {
        return None;
    }
    let (media_type, data) = rest.split_once(";base64,")?;
    if media_type.len() <= "image/".len() || media_type.contains([',', ';', ' ']) {
        return None;
    }
    Some((media_type, data))
}

fn contains_table(s: &str) -> bool {
    s.to_ascii_lowercase().contains("<table")
}

fn reformat_structured(s: &str) -> Option<String> {
    let t = s.trim();
    if !(t.starts_with('{') || t.starts_with('[')) {
        return None;
    }
    // Not valid JSON is expected for things like Python reprs; fall through.
    let value: serde_json::Value = serde_json::from_str(t).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::RawValue;

    fn returned(v: RawValue) -> ExecutionOutcome {
        ExecutionOutcome::value(v, String::new())
    }

    fn s(v: &str) -> RawValue {
        RawValue::Str(v.to_string())
    }

    #[test]
    fn error_wins_over_everything() {
        let mut o = ExecutionOutcome::raised("NameError: name 'x' is not defined".into(), "partial".into());
        o.raw_value = s("image/png;base64,AAAA");
        assert_eq!(classify(&o), ExecutionResult::error("NameError: name 'x' is not defined"));
    }

    #[test]
    fn markup_fragment_source() {
        let r = classify(&ExecutionOutcome::markup("<div>hi</div>"));
        assert_eq!(r, ExecutionResult::Markup { content: "<div>hi</div>".into(), full_document: false });
    }

    #[test]
    fn markup_full_document_source() {
        let r = classify(&ExecutionOutcome::markup("<!DOCTYPE html><html><body>x</body></html>"));
        assert!(matches!(r, ExecutionResult::Markup { full_document: true, .. }));
        let r = classify(&ExecutionOutcome::markup("<HTML><body>x</body></HTML>"));
        assert!(matches!(r, ExecutionResult::Markup { full_document: true, .. }));
    }

    #[test]
    fn image_marker_is_plot() {
        let r = classify(&returned(s("image/png;base64,AAAA")));
        assert_eq!(r, ExecutionResult::Plot { media_type: "image/png".into(), data: "AAAA".into() });
        let r = classify(&returned(s("data:image/jpeg;base64,/9j/")));
        assert_eq!(r.kind(), ResultKind::Plot);
    }

    #[test]
    fn plot_beats_structured_lookalike() {
        let r = classify(&returned(s("image/png;base64,[1,2,3]")));
        assert_eq!(r.kind(), ResultKind::Plot);
    }

    #[test]
    fn table_is_markup_fragment() {
        let html = "<table class=\"generated-table\"><tr><td>1</td></tr></table>";
        let r = classify(&returned(s(html)));
        assert_eq!(r, ExecutionResult::Markup { content: html.into(), full_document: false });

        let wrapped = classify(&returned(s("<p>summary</p><table></table>")));
        assert_eq!(wrapped.kind(), ResultKind::Markup);
    }

    #[test]
    fn json_string_is_structured() {
        let r = classify(&returned(s("[1,2,3]")));
        assert_eq!(r, ExecutionResult::Structured { content: "[\n  1,\n  2,\n  3\n]".into() });
    }

    #[test]
    fn structured_keeps_key_order() {
        let r = classify(&returned(s(r#" {"b":1,"a":2} "#)));
        assert_eq!(r, ExecutionResult::Structured { content: "{\n  \"b\": 1,\n  \"a\": 2\n}".into() });
    }

    #[test]
    fn invalid_json_falls_through() {
        let r = classify(&returned(s("{'a': 1}")));
        assert_eq!(r, ExecutionResult::Text { content: "{'a': 1}".into() });
    }

    #[test]
    fn printed_output_beats_return_value() {
        let o = ExecutionOutcome::value(s("42"), "  done\n".into());
        assert_eq!(classify(&o), ExecutionResult::Text { content: "done".into() });
    }

    #[test]
    fn printed_output_with_undefined_value() {
        let o = ExecutionOutcome::value(RawValue::Undefined, "done".into());
        assert_eq!(classify(&o), ExecutionResult::Text { content: "done".into() });
    }

    #[test]
    fn structured_beats_printed_output() {
        let o = ExecutionOutcome::value(s("{\"a\":1}"), "noise".into());
        assert_eq!(classify(&o).kind(), ResultKind::Structured);
    }

    #[test]
    fn object_repr_is_text() {
        let r = classify(&returned(RawValue::Object { repr: "[-2, 2]".into() }));
        assert_eq!(r, ExecutionResult::Text { content: "[-2, 2]".into() });
    }

    #[test]
    fn nothing_is_empty() {
        let r = classify(&returned(RawValue::Undefined));
        assert_eq!(r, ExecutionResult::Empty { message: EMPTY_MESSAGE.into() });
        assert_eq!(classify(&returned(RawValue::Null)).kind(), ResultKind::Empty);
        assert_eq!(classify(&returned(s(""))).kind(), ResultKind::Empty);
    }

    #[test]
    fn whitespace_only_output_is_ignored() {
        let o = ExecutionOutcome::value(RawValue::Undefined, " \n\t".into());
        assert_eq!(classify(&o).kind(), ResultKind::Empty);
    }

    #[test]
    fn image_marker_requires_subtype() {
        assert_eq!(split_image_marker("image/;base64,AAAA"), None);
        assert_eq!(split_image_marker("text/plain;base64,AAAA"), None);
        assert_eq!(split_image_marker("image/png,AAAA"), None);
        assert_eq!(split_image_marker("image/svg+xml;base64,PHN2Zz4="), Some(("image/svg+xml", "PHN2Zz4=")));
    }

    #[test]
    fn results_serialize_with_kind_tag() {
        let v = serde_json::to_value(ExecutionResult::Text { content: "x".into() }).unwrap();
        assert_eq!(v["kind"], "text");
        assert_eq!(v["content"], "x");
    }
}
