//! Pre-run validation: graph integrity plus tweak resolution, reported as
//! diagnostics without building anything.
//!
//! | Code | Meaning |
//! |------|---------|
//! | E001 | definition could not be parsed |
//! | E002 | duplicate vertex id |
//! | E003 | dangling edge endpoint |
//! | E004 | non-empty graph without edges |
//! | E101 | cycle |
//! | E102 | streaming vertex feeds a non-output vertex |
//! | E201 | conflicting tweaks |
//! | E202 | ambiguous tweak key |
//! | E203 | tweak value is not an object |
//! | E204 | tweak and run input both set an input value |
//! | W201 | tweak key matches nothing |
//! | W202 | display-name key names only aliased vertices |
//! | W203 | unknown field |
//! | W204 | `code` override ignored |

mod types;

use crate::dsl::parser::{parse_dsl, DslFormat};
use crate::dsl::schema::FlowSchema;
use crate::error::TweakResolutionError;
use crate::graph::{build_graph, integrity_issues};
use crate::tweak::{analyze_tweaks, Tweaks};

pub use types::{Diagnostic, DiagnosticLevel, ValidationReport};

/// Every diagnostic for running `schema` with `tweaks`.
pub fn validate(tweaks: &Tweaks, schema: &FlowSchema) -> Vec<Diagnostic> {
    let graph = build_graph(schema);
    let mut diagnostics: Vec<Diagnostic> = integrity_issues(graph.vertices(), graph.edges())
        .into_iter()
        .map(|issue| {
            Diagnostic::error(issue.code.code(), issue.message)
                .with_vertex(issue.vertex_id)
                .with_edge(issue.edge_id)
        })
        .collect();

    let analysis = analyze_tweaks(graph.vertices(), tweaks, None);
    for err in &analysis.errors {
        diagnostics.extend(tweak_error_diagnostics(err));
    }
    for ignored in &analysis.report.ignored {
        let vertex_id = match &ignored.reason {
            crate::tweak::IgnoreReason::UnknownField { vertex_id }
            | crate::tweak::IgnoreReason::CodeField { vertex_id } => Some(vertex_id.clone()),
            _ => None,
        };
        diagnostics.push(
            Diagnostic::warning(ignored.reason.code(), ignored.message())
                .with_vertex(vertex_id)
                .with_tweak_key(ignored.key.clone()),
        );
    }
    diagnostics
}

/// Parse then [`validate`]. A parse failure is reported as `E001`.
pub fn validate_dsl(content: &str, format: DslFormat, tweaks: &Tweaks) -> ValidationReport {
    match parse_dsl(content, format) {
        Ok(schema) => ValidationReport::from_diagnostics(validate(tweaks, &schema)),
        Err(err) => ValidationReport::from_diagnostics(vec![Diagnostic::error(
            "E001",
            err.to_string(),
        )]),
    }
}

fn tweak_error_diagnostics(err: &TweakResolutionError) -> Vec<Diagnostic> {
    match err {
        TweakResolutionError::Conflicting { conflicts } => conflicts
            .iter()
            .map(|c| {
                Diagnostic::error(
                    "E201",
                    format!(
                        "tweaks {} write different values to '{}' of vertex '{}'",
                        c.keys().join(", "),
                        c.field,
                        c.vertex_id
                    ),
                )
                .with_vertex(Some(c.vertex_id.clone()))
                .with_tweak_key(c.keys().join(", "))
            })
            .collect(),
        TweakResolutionError::Ambiguous { key, .. } => {
            vec![Diagnostic::error("E202", err.to_string()).with_tweak_key(key.clone())]
        }
        TweakResolutionError::NotAnObject { key } => {
            vec![Diagnostic::error("E203", err.to_string()).with_tweak_key(key.clone())]
        }
        TweakResolutionError::InputConflict { vertex_id, key } => vec![Diagnostic::error(
            "E204",
            err.to_string(),
        )
        .with_vertex(Some(vertex_id.clone()))
        .with_tweak_key(key.clone())],
    }
}
