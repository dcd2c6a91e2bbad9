//! Per-run parameter overrides.
//!
//! A tweak key is resolved against three namespaces in order: vertex id,
//! alias (user-chosen or system `Name#N`), then display name. A display name
//! only addresses a vertex when it is unique and that vertex has no alias.
//! All `(vertex, field)` writes are computed before any is applied, so a
//! conflict leaves the graph untouched.

pub mod resolver;

pub use resolver::{
    analyze_tweaks, apply_tweaks, plan_tweaks, FieldSlot, IgnoreReason, IgnoredTweak, MatchedBy,
    TweakAnalysis, TweakAssignment, TweakReport, Tweaks, FLAT_KEY_SEPARATOR,
};
