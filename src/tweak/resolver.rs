use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::dsl::schema::CODE_FIELD;
use crate::error::{TweakConflict, TweakResolutionError};
use crate::graph::{Graph, RunInputs, Vertex, INPUT_VALUE_FIELD};

/// Caller overrides keyed by vertex id, alias or display name. Each value is
/// an object of field overrides; a `vertex|field` key carries one field.
pub type Tweaks = BTreeMap<String, Value>;

/// Separator of the flat `vertex|field` key form.
pub const FLAT_KEY_SEPARATOR: char = '|';

/// Namespace a tweak key was resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Id,
    Alias,
    DisplayName,
}

/// Parameter slot written by an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSlot {
    Value,
    FilePath,
}

/// One `(vertex, field) <- value` write implied by a tweak key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TweakAssignment {
    pub key: String,
    pub vertex_id: String,
    pub field: String,
    pub value: Value,
    pub matched_by: MatchedBy,
    pub slot: FieldSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum IgnoreReason {
    /// No vertex has this id, alias or display name.
    Unresolved,
    /// The display name only names aliased vertices.
    AliasedDisplayName { vertex_ids: Vec<String> },
    UnknownField { vertex_id: String },
    /// Source text is never replaceable through tweaks.
    CodeField { vertex_id: String },
}

impl IgnoreReason {
    pub fn code(&self) -> &'static str {
        match self {
            IgnoreReason::Unresolved => "W201",
            IgnoreReason::AliasedDisplayName { .. } => "W202",
            IgnoreReason::UnknownField { .. } => "W203",
            IgnoreReason::CodeField { .. } => "W204",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IgnoredTweak {
    pub key: String,
    pub field: Option<String>,
    #[serde(flatten)]
    pub reason: IgnoreReason,
}

impl IgnoredTweak {
    pub fn message(&self) -> String {
        let field = self.field.as_deref().unwrap_or("*");
        match &self.reason {
            IgnoreReason::Unresolved => {
                format!("tweak key '{}' matches no vertex id, alias or display name", self.key)
            }
            IgnoreReason::AliasedDisplayName { vertex_ids } => format!(
                "tweak key '{}' is the display name of aliased vertices ({}); address them by alias",
                self.key,
                vertex_ids.join(", ")
            ),
            IgnoreReason::UnknownField { vertex_id } => format!(
                "tweak key '{}' sets unknown field '{}' on vertex '{}'",
                self.key, field, vertex_id
            ),
            IgnoreReason::CodeField { vertex_id } => format!(
                "tweak key '{}' cannot replace the code of vertex '{}'",
                self.key, vertex_id
            ),
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TweakReport {
    pub applied: Vec<TweakAssignment>,
    pub ignored: Vec<IgnoredTweak>,
}

/// Every finding for a tweak set, errors included.
#[derive(Debug, Clone, Default)]
pub struct TweakAnalysis {
    pub report: TweakReport,
    pub errors: Vec<TweakResolutionError>,
}

impl TweakAnalysis {
    /// The report, or the first error.
    pub fn into_result(self) -> Result<TweakReport, TweakResolutionError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.report),
        }
    }
}

enum Resolution {
    Vertex(usize, MatchedBy),
    AliasedDisplayName(Vec<String>),
    Unresolved,
}

fn resolve_key(vertices: &[Vertex], key: &str) -> Result<Resolution, TweakResolutionError> {
    if let Some(i) = vertices.iter().position(|v| v.id == key) {
        return Ok(Resolution::Vertex(i, MatchedBy::Id));
    }

    let aliased: Vec<usize> = positions(vertices, |v| v.alias.as_deref() == Some(key));
    match aliased.as_slice() {
        [i] => return Ok(Resolution::Vertex(*i, MatchedBy::Alias)),
        [] => {}
        many => return Err(ambiguous(vertices, key, many)),
    }

    let named: Vec<usize> = positions(vertices, |v| v.display_name == key);
    if named.is_empty() {
        return Ok(Resolution::Unresolved);
    }
    if named.iter().all(|&i| vertices[i].alias.is_some()) {
        let ids = named.iter().map(|&i| vertices[i].id.clone()).collect();
        return Ok(Resolution::AliasedDisplayName(ids));
    }
    match named.as_slice() {
        [i] => Ok(Resolution::Vertex(*i, MatchedBy::DisplayName)),
        many => Err(ambiguous(vertices, key, many)),
    }
}

fn positions(vertices: &[Vertex], pred: impl Fn(&Vertex) -> bool) -> Vec<usize> {
    vertices
        .iter()
        .enumerate()
        .filter(|(_, v)| pred(v))
        .map(|(i, _)| i)
        .collect()
}

fn ambiguous(vertices: &[Vertex], key: &str, found: &[usize]) -> TweakResolutionError {
    TweakResolutionError::Ambiguous {
        key: key.to_string(),
        candidates: found.iter().map(|&i| vertices[i].id.clone()).collect(),
    }
}

/// `(origin key, target key, overrides)` after flat-key expansion.
type Expanded = (String, String, Map<String, Value>);

fn expand(
    vertices: &[Vertex],
    tweaks: &Tweaks,
    errors: &mut Vec<TweakResolutionError>,
) -> Vec<Expanded> {
    let mut out = Vec::new();
    for (key, value) in tweaks {
        if let Value::Object(fields) = value {
            out.push((key.clone(), key.clone(), fields.clone()));
            continue;
        }
        let flat = key
            .rsplit_once(FLAT_KEY_SEPARATOR)
            .filter(|(target, field)| !target.is_empty() && !field.is_empty());
        let directly_addressed = matches!(resolve_key(vertices, key), Ok(Resolution::Vertex(..)));
        match flat {
            Some((target, field)) if !directly_addressed => {
                let mut fields = Map::new();
                fields.insert(field.to_string(), value.clone());
                out.push((key.clone(), target.to_string(), fields));
            }
            _ => errors.push(TweakResolutionError::NotAnObject { key: key.clone() }),
        }
    }
    out
}

/// Resolve `tweaks` against `vertices`, collecting every error instead of
/// stopping at the first. Nothing is written.
///
/// `inputs` is the run input; a tweak that sets `input_value` on an input
/// vertex the run input also writes is an
/// [`InputConflict`](TweakResolutionError::InputConflict).
pub fn analyze_tweaks(
    vertices: &[Vertex],
    tweaks: &Tweaks,
    inputs: Option<&RunInputs>,
) -> TweakAnalysis {
    let mut errors = Vec::new();
    let mut report = TweakReport::default();

    for (key, target, fields) in expand(vertices, tweaks, &mut errors) {
        let (idx, matched_by) = match resolve_key(vertices, &target) {
            Ok(Resolution::Vertex(idx, matched_by)) => (idx, matched_by),
            Ok(Resolution::AliasedDisplayName(vertex_ids)) => {
                report.ignored.push(IgnoredTweak {
                    key,
                    field: None,
                    reason: IgnoreReason::AliasedDisplayName { vertex_ids },
                });
                continue;
            }
            Ok(Resolution::Unresolved) => {
                report.ignored.push(IgnoredTweak {
                    key,
                    field: None,
                    reason: IgnoreReason::Unresolved,
                });
                continue;
            }
            Err(e) => {
                errors.push(e);
                continue;
            }
        };

        let vertex = &vertices[idx];
        for (field, value) in fields {
            if field == CODE_FIELD {
                report.ignored.push(IgnoredTweak {
                    key: key.clone(),
                    field: Some(field),
                    reason: IgnoreReason::CodeField {
                        vertex_id: vertex.id.clone(),
                    },
                });
                continue;
            }
            let Some(slot) = vertex.params.get(&field) else {
                report.ignored.push(IgnoredTweak {
                    key: key.clone(),
                    field: Some(field),
                    reason: IgnoreReason::UnknownField {
                        vertex_id: vertex.id.clone(),
                    },
                });
                continue;
            };
            report.applied.push(TweakAssignment {
                key: key.clone(),
                vertex_id: vertex.id.clone(),
                field,
                value,
                matched_by,
                slot: if slot.is_file() {
                    FieldSlot::FilePath
                } else {
                    FieldSlot::Value
                },
            });
        }
    }

    let conflicts = find_conflicts(&report.applied);
    if !conflicts.is_empty() {
        errors.push(TweakResolutionError::Conflicting { conflicts });
    }

    if let Some(inputs) = inputs.filter(|i| i.input_value.is_some()) {
        for a in report.applied.iter().filter(|a| a.field == INPUT_VALUE_FIELD) {
            let input_type = vertices
                .iter()
                .find(|v| v.id == a.vertex_id)
                .and_then(Vertex::input_type);
            if input_type.is_some_and(|t| inputs.input_type.accepts(t)) {
                errors.push(TweakResolutionError::InputConflict {
                    vertex_id: a.vertex_id.clone(),
                    key: a.key.clone(),
                });
            }
        }
    }

    TweakAnalysis { report, errors }
}

/// Groups of assignments from distinct keys writing different values to the
/// same `(vertex, field)`, ordered by vertex then field.
fn find_conflicts(applied: &[TweakAssignment]) -> Vec<TweakConflict> {
    let mut by_target: BTreeMap<(&str, &str), Vec<&TweakAssignment>> = BTreeMap::new();
    for a in applied {
        by_target
            .entry((a.vertex_id.as_str(), a.field.as_str()))
            .or_default()
            .push(a);
    }

    by_target
        .into_iter()
        .filter(|(_, group)| group.iter().any(|a| a.value != group[0].value))
        .map(|((vertex_id, field), group)| {
            let mut assignments: Vec<(String, Value)> =
                group.iter().map(|a| (a.key.clone(), a.value.clone())).collect();
            assignments.sort_by(|a, b| a.0.cmp(&b.0));
            TweakConflict {
                vertex_id: vertex_id.to_string(),
                field: field.to_string(),
                assignments,
            }
        })
        .collect()
}

/// Resolve without writing; fails on the first error.
pub fn plan_tweaks(
    vertices: &[Vertex],
    tweaks: &Tweaks,
    inputs: Option<&RunInputs>,
) -> Result<TweakReport, TweakResolutionError> {
    analyze_tweaks(vertices, tweaks, inputs).into_result()
}

/// Resolve and write every assignment, or write nothing on error.
pub fn apply_tweaks(
    graph: &mut Graph,
    tweaks: &Tweaks,
    inputs: Option<&RunInputs>,
) -> Result<TweakReport, TweakResolutionError> {
    let report = plan_tweaks(&graph.vertices, tweaks, inputs)?;

    for a in &report.applied {
        let Some(field) = graph
            .vertices
            .iter_mut()
            .find(|v| v.id == a.vertex_id)
            .and_then(|v| v.params.get_mut(&a.field))
        else {
            continue;
        };
        match a.slot {
            FieldSlot::Value => field.value = a.value.clone(),
            FieldSlot::FilePath => field.file_path = Some(a.value.clone()),
        }
    }

    for ignored in &report.ignored {
        tracing::warn!(
            flow_id = %graph.flow_id,
            code = ignored.reason.code(),
            "{}",
            ignored.message()
        );
    }
    tracing::debug!(
        flow_id = %graph.flow_id,
        applied = report.applied.len(),
        ignored = report.ignored.len(),
        "Tweaks applied"
    );
    Ok(report)
}
