//! Parameterized filter and key-condition expressions.
//!
//! Attribute names are referenced through `#N{index}` placeholders and values
//! through `:V{index}` placeholders. Every call to [`Expression::add_name`] or
//! [`Expression::add_value`] allocates a fresh placeholder, so folding in the
//! same name or value twice never collides with an earlier binding.

use serde_json::Value;

/// Default operator joining clauses.
pub const AND: &str = "AND";

/// Default comparison sign.
pub const EQ: &str = "=";

/// An expression string plus its ordered name and value bindings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expression {
    text: String,
    names: Vec<(String, String)>,
    values: Vec<(String, Value)>,
}

impl Expression {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name = value` clauses joined with `AND`.
    pub fn join_all<N: Into<String>>(pairs: impl IntoIterator<Item = (N, Value)>) -> Self {
        Self::join_all_with(pairs, AND, EQ)
    }

    /// `name <sign> value` clauses joined with `join_operator`.
    pub fn join_all_with<N: Into<String>>(
        pairs: impl IntoIterator<Item = (N, Value)>,
        join_operator: &str,
        comparison_sign: &str,
    ) -> Self {
        let mut expression = Self::new();
        let clause = expression.fold_pairs(pairs, join_operator, comparison_sign);
        expression.text = clause;
        expression
    }

    /// Restrict this expression to rows matching every `name = value` pair.
    ///
    /// The pairs get fresh placeholders after the existing bindings, and the
    /// existing text is grouped so an `OR` inside it cannot escape the
    /// restriction.
    pub fn scoped<N: Into<String>>(mut self, pairs: impl IntoIterator<Item = (N, Value)>) -> Self {
        let scope = self.fold_pairs(pairs, AND, EQ);
        self.text = match (scope.is_empty(), self.text.is_empty()) {
            (true, _) => self.text,
            (false, true) => scope,
            (false, false) => format!("{scope} {AND} ({})", self.text),
        };
        self
    }

    /// Allocate placeholders for each pair and return the joined clause without
    /// appending it.
    fn fold_pairs<N: Into<String>>(
        &mut self,
        pairs: impl IntoIterator<Item = (N, Value)>,
        join_operator: &str,
        comparison_sign: &str,
    ) -> String {
        let clauses: Vec<String> = pairs
            .into_iter()
            .map(|(name, value)| {
                let name = self.add_name(name);
                let value = self.add_value(value);
                format!("{name} {comparison_sign} {value}")
            })
            .collect();
        clauses.join(&format!(" {join_operator} "))
    }

    /// Bind an attribute name, returning its placeholder.
    pub fn add_name(&mut self, name: impl Into<String>) -> String {
        let placeholder = format!("#N{}", self.names.len());
        self.names.push((placeholder.clone(), name.into()));
        placeholder
    }

    /// Bind a nested attribute path (`content.title`), returning `#Na.#Nb`.
    pub fn add_path<S: AsRef<str>>(&mut self, path: &[S]) -> String {
        path.iter()
            .map(|segment| self.add_name(segment.as_ref()))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Bind a value, returning its placeholder.
    pub fn add_value(&mut self, value: Value) -> String {
        let placeholder = format!(":V{}", self.values.len());
        self.values.push((placeholder.clone(), value));
        placeholder
    }

    /// Append a clause, joined to any existing text with `join_operator`.
    pub fn push_clause(&mut self, join_operator: &str, clause: &str) {
        if clause.is_empty() {
            return;
        }
        if self.text.is_empty() {
            self.text = clause.to_string();
        } else {
            self.text = format!("{} {join_operator} {clause}", self.text);
        }
    }

    /// Append a clause with `AND`.
    pub fn and(&mut self, clause: &str) {
        self.push_clause(AND, clause);
    }

    /// Builder form of [`Expression::and`] for a `contains(path, value)` predicate.
    pub fn and_contains<S: AsRef<str>>(mut self, path: &[S], value: Value) -> Self {
        let name = self.add_path(path);
        let value = self.add_value(value);
        self.and(&format!("contains({name}, {value})"));
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn names(&self) -> &[(String, String)] {
        &self.names
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Resolve a name placeholder.
    pub fn name(&self, placeholder: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|(p, _)| p == placeholder)
            .map(|(_, name)| name.as_str())
    }

    /// Resolve a value placeholder.
    pub fn value(&self, placeholder: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(p, _)| p == placeholder)
            .map(|(_, value)| value)
    }
}
