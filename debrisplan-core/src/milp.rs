//! Solver-neutral mixed-integer linear program.
//!
//! The formulator writes into a [`MilpModel`]; solver adapters translate it into their
//! backend's representation and report values back as an [`Assignment`] indexed by
//! [`VarId`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Index of a variable inside its model.
pub struct VarId(usize);

impl VarId {
    /// Position in [`MilpModel::variables`].
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Domain of a variable.
pub enum VarKind {
    /// 0 or 1.
    Binary,
    /// Whole numbers within the bounds.
    Integer,
    /// Real numbers within the bounds.
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
/// A decision variable with bounds.
pub struct Variable {
    /// Readable name such as `trips_collection[0->1,3]`.
    pub name: String,
    /// Domain.
    pub kind: VarKind,
    /// Lower bound.
    pub lower: f64,
    /// Upper bound, `None` for unbounded.
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Relation between a constraint's left-hand side and its right-hand side.
pub enum Sense {
    /// `lhs <= rhs`
    Le,
    /// `lhs >= rhs`
    Ge,
    /// `lhs == rhs`
    Eq,
}

impl fmt::Display for Sense {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Sense::Le => "<=",
            Sense::Ge => ">=",
            Sense::Eq => "==",
        };
        write!(formatter, "{symbol}")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Linear combination of variables plus a constant.
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    /// Empty expression.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `coefficient * var`.
    #[must_use]
    pub fn term(mut self, var: VarId, coefficient: f64) -> Self {
        self.add_term(var, coefficient);
        self
    }

    /// Add a constant offset.
    #[must_use]
    pub fn constant(mut self, value: f64) -> Self {
        self.constant += value;
        self
    }

    /// Add `coefficient * var` in place.
    pub fn add_term(&mut self, var: VarId, coefficient: f64) {
        self.terms.push((var, coefficient));
    }

    /// Add `coefficient * var` for every var yielded.
    pub fn add_all<I: IntoIterator<Item = VarId>>(&mut self, vars: I, coefficient: f64) {
        self.terms
            .extend(vars.into_iter().map(|var| (var, coefficient)));
    }

    /// Sum of `vars`, each with coefficient 1.
    #[must_use]
    pub fn sum<I: IntoIterator<Item = VarId>>(vars: I) -> Self {
        let mut expr = Self::new();
        expr.add_all(vars, 1.0);
        expr
    }

    /// Variable terms.
    #[must_use]
    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    /// Constant offset.
    #[must_use]
    pub fn offset(&self) -> f64 {
        self.constant
    }

    /// Value of the expression under `assignment`.
    #[must_use]
    pub fn evaluate(&self, assignment: &Assignment) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|&(var, coefficient)| coefficient * assignment.value(var))
                .sum::<f64>()
    }
}

#[derive(Debug, Clone, PartialEq)]
/// `Σ terms  sense  rhs`, with any expression constant already moved to `rhs`.
pub struct Constraint {
    /// Family name such as `queue_balance`.
    pub name: &'static str,
    /// Variable terms of the left-hand side.
    pub terms: Vec<(VarId, f64)>,
    /// Relation.
    pub sense: Sense,
    /// Right-hand side.
    pub rhs: f64,
}

impl Constraint {
    /// Absolute amount by which `assignment` violates the constraint.
    #[must_use]
    pub fn violation(&self, assignment: &Assignment) -> f64 {
        let lhs: f64 = self
            .terms
            .iter()
            .map(|&(var, coefficient)| coefficient * assignment.value(var))
            .sum();
        match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        }
    }
}

#[derive(Debug, Clone)]
/// A minimisation problem over binary, integer, and continuous variables.
pub struct MilpModel {
    name: String,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: LinearExpr,
}

impl MilpModel {
    /// Empty model.
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: LinearExpr::new(),
        }
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a 0/1 variable.
    pub fn binary<S: Into<String>>(&mut self, name: S) -> VarId {
        self.push(name.into(), VarKind::Binary, 0.0, Some(1.0))
    }

    /// Add a non-negative integer variable with an optional upper bound.
    pub fn integer<S: Into<String>>(&mut self, name: S, upper: Option<f64>) -> VarId {
        self.push(name.into(), VarKind::Integer, 0.0, upper)
    }

    /// Add a non-negative continuous variable.
    pub fn continuous<S: Into<String>>(&mut self, name: S) -> VarId {
        self.push(name.into(), VarKind::Continuous, 0.0, None)
    }

    fn push(&mut self, name: String, kind: VarKind, lower: f64, upper: Option<f64>) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(Variable {
            name,
            kind,
            lower,
            upper,
        });
        id
    }

    /// Add `expr  sense  rhs`.
    pub fn constrain(&mut self, name: &'static str, expr: LinearExpr, sense: Sense, rhs: f64) {
        let LinearExpr { terms, constant } = expr;
        self.constraints.push(Constraint {
            name,
            terms,
            sense,
            rhs: rhs - constant,
        });
    }

    /// Add `expr <= rhs`.
    pub fn le(&mut self, name: &'static str, expr: LinearExpr, rhs: f64) {
        self.constrain(name, expr, Sense::Le, rhs);
    }

    /// Add `expr >= rhs`.
    pub fn ge(&mut self, name: &'static str, expr: LinearExpr, rhs: f64) {
        self.constrain(name, expr, Sense::Ge, rhs);
    }

    /// Add `expr == rhs`.
    pub fn eq(&mut self, name: &'static str, expr: LinearExpr, rhs: f64) {
        self.constrain(name, expr, Sense::Eq, rhs);
    }

    /// Replace the objective (always minimised).
    pub fn minimize(&mut self, objective: LinearExpr) {
        self.objective = objective;
    }

    /// All variables, indexed by [`VarId::index`].
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// All constraints in insertion order.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Objective expression.
    #[must_use]
    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    /// Objective value under `assignment`.
    #[must_use]
    pub fn evaluate(&self, assignment: &Assignment) -> f64 {
        self.objective.evaluate(assignment)
    }

    /// Variable behind `id`.
    #[must_use]
    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    /// Number of constraints in the family `name`.
    #[must_use]
    pub fn count_constraints(&self, name: &str) -> usize {
        self.constraints
            .iter()
            .filter(|constraint| constraint.name == name)
            .count()
    }

    /// Constraints violated by more than `tolerance`, plus variables outside their domain.
    #[must_use]
    pub fn violations(&self, assignment: &Assignment, tolerance: f64) -> Vec<String> {
        let mut found: Vec<String> = self
            .constraints
            .iter()
            .filter(|constraint| constraint.violation(assignment) > tolerance)
            .map(|constraint| {
                format!(
                    "{} violated by {:.6}",
                    constraint.name,
                    constraint.violation(assignment)
                )
            })
            .collect();

        for (index, variable) in self.variables.iter().enumerate() {
            let value = assignment.value(VarId(index));
            let below = value < variable.lower - tolerance;
            let above = variable.upper.is_some_and(|upper| value > upper + tolerance);
            let fractional = variable.kind != VarKind::Continuous
                && (value - value.round()).abs() > tolerance;
            if below || above || fractional {
                found.push(format!("{} out of domain: {value}", variable.name));
            }
        }
        found
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Values reported by a solver, indexed by [`VarId`].
pub struct Assignment {
    /// Objective value reported by the solver.
    pub objective: f64,
    values: Vec<f64>,
}

impl Assignment {
    /// Wrap solver output; `values[i]` belongs to the `i`-th variable.
    #[must_use]
    pub fn new(objective: f64, values: Vec<f64>) -> Self {
        Self { objective, values }
    }

    /// Value of `var`; variables the solver did not report read as 0.
    #[must_use]
    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(0.0)
    }

    /// Raw values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}
