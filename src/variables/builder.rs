//! Variable Assignment Builder
//!
//! Merges the three parameter sources of a query into one ordered preamble:
//!
//! 1. Explicit user variables, in dependency order
//! 2. Time range boundaries (`timeRangeStart`, `timeRangeStop`)
//! 3. Window periods for window identifiers the query references
//!
//! A name defined by more than one source keeps its highest-precedence
//! definition; later ones are shadowed.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::variables::error::{VariableError, VariableResult};
use crate::variables::time::TimeRange;
use crate::variables::types::{Assignment, AssignmentSource, Expression, Variable, VARIABLE_RECORD};
use crate::variables::window::WindowPolicy;

/// Ordered, name-unique assignments injected ahead of a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preamble {
    assignments: Vec<Assignment>,
}

impl Preamble {
    /// Assignments in injection order
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Assignment names in injection order
    pub fn names(&self) -> Vec<&str> {
        self.assignments.iter().map(|a| a.name.as_str()).collect()
    }

    /// Look up an assignment by name
    pub fn get(&self, name: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Render as the backend's `extern` JSON AST: `option v = {...}`
    pub fn to_extern(&self) -> serde_json::Value {
        let properties: Vec<serde_json::Value> = self
            .assignments
            .iter()
            .map(|a| {
                json!({
                    "type": "Property",
                    "key": { "type": "Identifier", "name": a.name },
                    "value": a.value.to_ast(),
                })
            })
            .collect();

        json!({
            "type": "File",
            "package": null,
            "imports": null,
            "body": [{
                "type": "OptionStatement",
                "assignment": {
                    "type": "VariableAssignment",
                    "id": { "type": "Identifier", "name": VARIABLE_RECORD },
                    "init": { "type": "ObjectExpression", "properties": properties },
                },
            }],
        })
    }

    /// Render as query source text, e.g. `option v = {bucket: "prod"}`
    pub fn to_flux(&self) -> String {
        let fields: Vec<String> = self
            .assignments
            .iter()
            .map(|a| format!("{}: {}", a.name, a.value))
            .collect();
        format!("option {} = {{{}}}", VARIABLE_RECORD, fields.join(", "))
    }
}

impl IntoIterator for Preamble {
    type Item = Assignment;
    type IntoIter = std::vec::IntoIter<Assignment>;

    fn into_iter(self) -> Self::IntoIter {
        self.assignments.into_iter()
    }
}

/// Builds a [`Preamble`] from variables, a time range and window names
#[derive(Debug, Clone)]
pub struct AssignmentBuilder {
    policy: WindowPolicy,
    now: DateTime<Utc>,
}

impl AssignmentBuilder {
    /// Create a builder that resolves relative ranges against the current time
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            now: Utc::now(),
        }
    }

    /// Resolve relative ranges against a fixed instant
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Build using each variable's own resolution
    pub fn build(
        &self,
        explicit: &[Variable],
        time_range: &TimeRange,
        window_names: &BTreeSet<String>,
    ) -> VariableResult<Preamble> {
        self.build_with(explicit, Variable::resolve, time_range, window_names)
    }

    /// Build with a custom variable-to-assignment conversion
    pub fn build_with<F>(
        &self,
        explicit: &[Variable],
        as_assignment: F,
        time_range: &TimeRange,
        window_names: &BTreeSet<String>,
    ) -> VariableResult<Preamble>
    where
        F: Fn(&Variable) -> Vec<Assignment>,
    {
        let mut assignments: Vec<Assignment> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for variable in order_by_dependencies(explicit)? {
            for assignment in as_assignment(variable) {
                push_unique(&mut assignments, &mut seen, assignment);
            }
        }

        for assignment in time_range.assignments() {
            push_unique(&mut assignments, &mut seen, assignment);
        }

        let span = time_range.span(self.now);
        for name in window_names {
            if seen.contains(name) {
                tracing::debug!(name = %name, "window variable already defined, not computing");
                continue;
            }
            let period = self.policy.period_for(span);
            tracing::debug!(name = %name, period = %period, "computed window period");
            push_unique(
                &mut assignments,
                &mut seen,
                Assignment::new(name.clone(), Expression::Duration(period), AssignmentSource::Window),
            );
        }

        Ok(Preamble { assignments })
    }
}

fn push_unique(assignments: &mut Vec<Assignment>, seen: &mut HashSet<String>, assignment: Assignment) {
    if seen.insert(assignment.name.clone()) {
        assignments.push(assignment);
    } else {
        tracing::debug!(
            name = %assignment.name,
            source = %assignment.source,
            "assignment shadowed by higher-precedence definition"
        );
    }
}

/// Stable topological sort of explicit variables
///
/// Among variables whose dependencies are satisfied, input order wins.
/// Dependencies on names outside `variables` do not constrain the order.
/// Duplicate names keep their first definition.
fn order_by_dependencies(variables: &[Variable]) -> VariableResult<Vec<&Variable>> {
    let mut unique: Vec<&Variable> = Vec::with_capacity(variables.len());
    let mut index: HashMap<&str, usize> = HashMap::new();
    for variable in variables {
        if index.contains_key(variable.name.as_str()) {
            tracing::warn!(name = %variable.name, "duplicate variable definition ignored");
            continue;
        }
        index.insert(variable.name.as_str(), unique.len());
        unique.push(variable);
    }

    let mut pending: Vec<usize> = vec![0; unique.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); unique.len()];
    for (i, variable) in unique.iter().enumerate() {
        for dep in variable.dependencies() {
            if let Some(&j) = index.get(dep.as_str()) {
                pending[i] += 1;
                dependents[j].push(i);
            }
        }
    }

    // Ready set kept sorted by input position so the result is stable
    let mut ready: BTreeSet<usize> = (0..unique.len()).filter(|&i| pending[i] == 0).collect();
    let mut ordered = Vec::with_capacity(unique.len());

    while let Some(i) = ready.pop_first() {
        ordered.push(unique[i]);
        for &d in &dependents[i] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if ordered.len() < unique.len() {
        let names = (0..unique.len())
            .filter(|&i| pending[i] > 0)
            .map(|i| unique[i].name.clone())
            .collect();
        return Err(VariableError::CyclicDependency { names });
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::time::{TIME_RANGE_START, TIME_RANGE_STOP};
    use crate::variables::window::{WindowVariableDetector, WINDOW_PERIOD};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn builder() -> AssignmentBuilder {
        AssignmentBuilder::new(WindowPolicy::default()).at(now())
    }

    fn windows(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn position(preamble: &Preamble, name: &str) -> usize {
        preamble
            .names()
            .iter()
            .position(|n| *n == name)
            .unwrap_or_else(|| panic!("{} missing from preamble", name))
    }

    #[test]
    fn test_bucket_time_range_and_window() {
        let vars = vec![Variable::new("bucket", Expression::String("prod".into()))];
        let range = TimeRange::parse("-1h", "now").unwrap();

        let preamble = builder()
            .build(&vars, &range, &windows(&[WINDOW_PERIOD]))
            .unwrap();

        assert_eq!(
            preamble.names(),
            vec!["bucket", TIME_RANGE_START, TIME_RANGE_STOP, WINDOW_PERIOD]
        );
        let window = preamble.get(WINDOW_PERIOD).unwrap();
        assert_eq!(window.source, AssignmentSource::Window);
        assert_eq!(window.value.to_string(), "10000ms");
    }

    #[test]
    fn test_topological_order() {
        let vars = vec![
            Variable::new("c", Expression::Reference("b".into())),
            Variable::new("b", Expression::Reference("a".into())),
            Variable::new("a", Expression::Integer(1)),
            Variable::new("d", Expression::Integer(2)),
        ];
        let range = TimeRange::last("1h").unwrap();
        let preamble = builder().build(&vars, &range, &BTreeSet::new()).unwrap();

        assert!(position(&preamble, "a") < position(&preamble, "b"));
        assert!(position(&preamble, "b") < position(&preamble, "c"));
        // Unconstrained variables keep their input position relative to each other
        assert!(position(&preamble, "a") < position(&preamble, "d"));

        // No assignment references a name defined later
        for (i, assignment) in preamble.assignments().iter().enumerate() {
            if let Some(target) = assignment.value.reference() {
                assert!(position(&preamble, target) < i);
            }
        }
    }

    #[test]
    fn test_declared_dependency_orders() {
        let vars = vec![
            Variable::new("query_host", Expression::String("h".into())).depends_on("env"),
            Variable::new("env", Expression::String("prod".into())),
        ];
        let range = TimeRange::last("1h").unwrap();
        let preamble = builder().build(&vars, &range, &BTreeSet::new()).unwrap();
        assert_eq!(&preamble.names()[..2], &["env", "query_host"]);
    }

    #[test]
    fn test_cycle_is_error() {
        let vars = vec![
            Variable::new("a", Expression::Reference("b".into())),
            Variable::new("b", Expression::Reference("a".into())),
            Variable::new("ok", Expression::Integer(1)),
        ];
        let range = TimeRange::last("1h").unwrap();
        let err = builder().build(&vars, &range, &BTreeSet::new()).unwrap_err();
        assert_eq!(
            err,
            VariableError::CyclicDependency {
                names: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let vars = vec![Variable::new("a", Expression::Reference("a".into()))];
        let range = TimeRange::last("1h").unwrap();
        assert!(builder().build(&vars, &range, &BTreeSet::new()).is_err());
    }

    #[test]
    fn test_external_dependency_ignored() {
        let vars = vec![Variable::new(
            "start",
            Expression::Reference(TIME_RANGE_START.into()),
        )];
        let range = TimeRange::last("1h").unwrap();
        let preamble = builder().build(&vars, &range, &BTreeSet::new()).unwrap();
        assert_eq!(preamble.names()[0], "start");
    }

    #[test]
    fn test_explicit_shadows_time_range_and_window() {
        let vars = vec![
            Variable::new(TIME_RANGE_START, Expression::parse_literal("-30d")),
            Variable::new(WINDOW_PERIOD, Expression::parse_literal("1h")),
        ];
        let range = TimeRange::last("1h").unwrap();
        let preamble = builder()
            .build(&vars, &range, &windows(&[WINDOW_PERIOD]))
            .unwrap();

        assert_eq!(preamble.len(), 3);
        let start = preamble.get(TIME_RANGE_START).unwrap();
        assert_eq!(start.source, AssignmentSource::Explicit);
        assert_eq!(start.value.to_string(), "-30d");
        let window = preamble.get(WINDOW_PERIOD).unwrap();
        assert_eq!(window.source, AssignmentSource::Explicit);
        assert_eq!(window.value.to_string(), "1h");
    }

    #[test]
    fn test_time_range_shadows_window() {
        let range = TimeRange::last("1h").unwrap();
        let windows = WindowVariableDetector::new([TIME_RANGE_START, WINDOW_PERIOD])
            .detect("range(start: v.timeRangeStart) |> aggregateWindow(every: v.windowPeriod)");
        assert!(windows.contains(TIME_RANGE_START));

        let preamble = builder().build(&[], &range, &windows).unwrap();

        assert_eq!(
            preamble.names(),
            vec![TIME_RANGE_START, TIME_RANGE_STOP, WINDOW_PERIOD]
        );
        let start = preamble.get(TIME_RANGE_START).unwrap();
        assert_eq!(start.source, AssignmentSource::TimeRange);
        assert_eq!(start.value.to_string(), "-1h");
        assert_eq!(
            preamble
                .assignments()
                .iter()
                .filter(|a| a.source == AssignmentSource::Window)
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>(),
            vec![WINDOW_PERIOD]
        );
    }

    #[test]
    fn test_duplicate_explicit_first_wins() {
        let vars = vec![
            Variable::new("bucket", Expression::String("first".into())),
            Variable::new("bucket", Expression::String("second".into())),
        ];
        let range = TimeRange::last("1h").unwrap();
        let preamble = builder().build(&vars, &range, &BTreeSet::new()).unwrap();
        assert_eq!(
            preamble.get("bucket").unwrap().value,
            Expression::String("first".into())
        );
        assert_eq!(preamble.len(), 3);
    }

    #[test]
    fn test_custom_as_assignment() {
        let vars = vec![Variable::new("bucket", Expression::String("prod".into()))];
        let range = TimeRange::last("1h").unwrap();
        let preamble = builder()
            .build_with(
                &vars,
                |v| {
                    vec![
                        Assignment::new(&v.name, Expression::String("x".into()), AssignmentSource::Explicit),
                        Assignment::new(format!("{}_org", v.name), Expression::String("y".into()), AssignmentSource::Explicit),
                    ]
                },
                &range,
                &BTreeSet::new(),
            )
            .unwrap();
        assert_eq!(&preamble.names()[..2], &["bucket", "bucket_org"]);
    }

    #[test]
    fn test_window_fallback_for_empty_range() {
        let range = TimeRange::parse("now", "now").unwrap();
        let preamble = builder()
            .build(&[], &range, &windows(&[WINDOW_PERIOD]))
            .unwrap();
        assert_eq!(preamble.get(WINDOW_PERIOD).unwrap().value.to_string(), "15000ms");
    }

    #[test]
    fn test_render_flux_and_extern() {
        let vars = vec![Variable::new("bucket", Expression::String("prod".into()))];
        let range = TimeRange::parse("-1h", "now").unwrap();
        let preamble = builder().build(&vars, &range, &BTreeSet::new()).unwrap();

        assert_eq!(
            preamble.to_flux(),
            "option v = {bucket: \"prod\", timeRangeStart: -1h, timeRangeStop: now()}"
        );

        let ext = preamble.to_extern();
        let props = &ext["body"][0]["assignment"]["init"]["properties"];
        assert_eq!(props.as_array().unwrap().len(), 3);
        assert_eq!(props[0]["key"]["name"], "bucket");
        assert_eq!(props[0]["value"]["value"], "prod");
        assert_eq!(props[2]["value"]["type"], "CallExpression");
    }
}
