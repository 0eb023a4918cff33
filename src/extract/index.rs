//! Automatic span index
//!
//! Correlation is a lookup, not a streaming match: the index is built from a
//! complete pass over the tree before any manual span is turned into a
//! record, so an automatic span that appears after its manual span in the
//! export is still found.

use std::collections::HashMap;

use super::attributes::{AttributeMap, decode_attributes};
use super::classify::{SpanOrigin, classify};
use super::model::{Span, TraceExport};

/// An automatic span together with its decoded attributes
#[derive(Debug, Clone)]
pub struct AutoSpan<'a> {
    pub span: &'a Span,
    pub attributes: AttributeMap,
}

/// Automatic spans grouped by trace identifier, in traversal order
#[derive(Debug, Default)]
pub struct AutoSpanIndex<'a> {
    by_trace: HashMap<&'a str, Vec<AutoSpan<'a>>>,
}

impl<'a> AutoSpanIndex<'a> {
    /// Build the index from every span in the export
    ///
    /// Spans without a trace identifier are never indexed.
    pub fn build(export: &'a TraceExport) -> Self {
        let mut by_trace: HashMap<&'a str, Vec<AutoSpan<'a>>> = HashMap::new();

        let spans = export
            .resource_spans
            .iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .flat_map(|ss| ss.spans.iter());

        for span in spans {
            if span.trace_id.is_empty() {
                continue;
            }
            let attributes = decode_attributes(&span.attributes);
            if classify(&attributes) == SpanOrigin::Automatic {
                by_trace
                    .entry(span.trace_id.as_str())
                    .or_default()
                    .push(AutoSpan { span, attributes });
            }
        }

        Self { by_trace }
    }

    /// Automatic spans sharing the given trace identifier
    pub fn lookup(&self, trace_id: &str) -> Option<&[AutoSpan<'a>]> {
        if trace_id.is_empty() {
            return None;
        }
        self.by_trace.get(trace_id).map(Vec::as_slice)
    }

    /// Number of distinct trace identifiers with at least one automatic span
    pub fn trace_count(&self) -> usize {
        self.by_trace.len()
    }

    /// Total number of indexed automatic spans
    pub fn span_count(&self) -> usize {
        self.by_trace.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::model::{AnyValue, KeyValue, ResourceSpans, ScopeSpans};

    fn span(trace_id: &str, key: &str) -> Span {
        Span {
            trace_id: trace_id.to_string(),
            name: key.to_string(),
            attributes: vec![KeyValue::new(key, AnyValue::string("v"))],
            ..Default::default()
        }
    }

    fn export(spans: Vec<Span>) -> TraceExport {
        TraceExport {
            resource_spans: vec![ResourceSpans {
                resource: None,
                scope_spans: vec![ScopeSpans { scope: None, spans }],
            }],
        }
    }

    #[test]
    fn test_groups_automatic_spans_by_trace() {
        let export = export(vec![
            span("t1", "etl.process_name"),
            span("t1", "db.statement"),
            span("t2", "http.url"),
            span("t1", "http.url"),
            span("", "db.statement"),
        ]);

        let index = AutoSpanIndex::build(&export);
        assert_eq!(index.trace_count(), 2);
        assert_eq!(index.span_count(), 3);

        let t1 = index.lookup("t1").unwrap();
        assert_eq!(t1.len(), 2);
        assert_eq!(t1[0].span.name, "db.statement");
        assert_eq!(t1[1].span.name, "http.url");
        assert!(index.lookup("").is_none());
        assert!(index.lookup("t3").is_none());
    }
}
