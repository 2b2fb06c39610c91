//! Thin wrapper around the `minilp` simplex solver.
//!
//! The all-ones objective is not a physical optimization target; it only
//! forces the simplex to terminate at one feasible vertex of the current
//! constraint polytope. Battery fleets usually have a consistent feasible
//! sign regime within one cycle (discharge-dominant or charge-dominant), so
//! probing Quadrant I and then Quadrant III cheaply finds a vertex without a
//! full two-phase formulation.
//!
//! Known limitation: a region that is feasible only with mixed signs (one
//! unit charging while another discharges) is found by neither probe and
//! solves as infeasible.

use minilp::{ComparisonOp, Error, LinearExpr, OptimizationDirection, Problem, Variable};

use super::constraint::{LinearConstraint, Relationship};

fn comparison_op(relationship: Relationship) -> ComparisonOp {
    match relationship {
        Relationship::Eq => ComparisonOp::Eq,
        Relationship::Leq => ComparisonOp::Le,
        Relationship::Geq => ComparisonOp::Ge,
    }
}

fn add_constraints(problem: &mut Problem, variables: &[Variable], constraints: &[LinearConstraint]) {
    for constraint in constraints {
        let mut expr = LinearExpr::empty();
        for (index, &coefficient) in constraint.coefficients.iter().enumerate() {
            if coefficient != 0.0 {
                expr.add(variables[index], coefficient);
            }
        }
        problem.add_constraint(expr, comparison_op(constraint.relationship), constraint.value);
    }
}

fn attempt(
    constraints: &[LinearConstraint],
    num_coefficients: usize,
    direction: OptimizationDirection,
    bounds: (f64, f64),
) -> Result<Vec<f64>, Error> {
    let mut problem = Problem::new(direction);
    let variables: Vec<Variable> = (0..num_coefficients)
        .map(|_| problem.add_var(1.0, bounds))
        .collect();
    add_constraints(&mut problem, &variables, constraints);
    let solution = problem.solve()?;
    Ok(variables.iter().map(|&variable| solution[variable]).collect())
}

/// Finds one feasible vertex of the merged constraint set.
///
/// First MINIMIZEs with every unknown bounded to Quadrant I (>= 0); if that
/// is infeasible or unbounded, MAXIMIZEs with every unknown bounded to
/// Quadrant III (<= 0). A feasible-but-unbounded second attempt yields the
/// all-zero vector: no solution preference can be derived, so command
/// nothing. Only `Error::Infeasible` escapes.
pub(crate) fn solve_feasible(
    constraints: &[LinearConstraint],
    num_coefficients: usize,
) -> Result<Vec<f64>, Error> {
    if num_coefficients == 0 {
        return Ok(Vec::new());
    }
    if let Ok(solution) = attempt(
        constraints,
        num_coefficients,
        OptimizationDirection::Minimize,
        (0.0, f64::INFINITY),
    ) {
        return Ok(solution);
    }
    match attempt(
        constraints,
        num_coefficients,
        OptimizationDirection::Maximize,
        (f64::NEG_INFINITY, 0.0),
    ) {
        Ok(solution) => Ok(solution),
        Err(Error::Unbounded) => Ok(vec![0.0; num_coefficients]),
        Err(error) => Err(error),
    }
}

/// Extremum of `Σ x[i]` over `objective_indices` under the merged
/// constraints, with free unknowns.
pub(crate) fn extremum(
    constraints: &[LinearConstraint],
    num_coefficients: usize,
    objective_indices: &[usize],
    direction: OptimizationDirection,
) -> Result<f64, Error> {
    if num_coefficients == 0 {
        return Ok(0.0);
    }
    let mut problem = Problem::new(direction);
    let variables: Vec<Variable> = (0..num_coefficients)
        .map(|index| {
            let weight = if objective_indices.contains(&index) {
                1.0
            } else {
                0.0
            };
            // minilp declares the whole problem unbounded over any free
            // variable, even one with zero weight. An unknown outside every
            // constraint and the objective cannot influence the extremum;
            // pin it so only true objective rays report Unbounded.
            let touched = weight != 0.0
                || constraints
                    .iter()
                    .any(|constraint| constraint.coefficients[index] != 0.0);
            let bounds = if touched {
                (f64::NEG_INFINITY, f64::INFINITY)
            } else {
                (0.0, 0.0)
            };
            problem.add_var(weight, bounds)
        })
        .collect();
    add_constraints(&mut problem, &variables, constraints);
    let solution = problem.solve()?;
    Ok(objective_indices
        .iter()
        .map(|&index| solution[variables[index]])
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(coefficients: Vec<f64>, relationship: Relationship, value: f64) -> LinearConstraint {
        LinearConstraint {
            coefficients,
            relationship,
            value,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn finds_vertex_in_quadrant_one() {
        let constraints = [constraint(vec![1.0, 0.0], Relationship::Eq, 700.0)];
        let solution = solve_feasible(&constraints, 2).unwrap();
        assert_close(solution[0], 700.0);
        assert_close(solution[1], 0.0);
    }

    #[test]
    fn falls_back_to_quadrant_three() {
        let constraints = [constraint(vec![1.0, 0.0], Relationship::Eq, -700.0)];
        let solution = solve_feasible(&constraints, 2).unwrap();
        assert_close(solution[0], -700.0);
        assert_close(solution[1], 0.0);
    }

    #[test]
    fn empty_constraint_set_solves_to_zero() {
        let solution = solve_feasible(&[], 3).unwrap();
        assert_eq!(solution, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn contradicting_bounds_are_infeasible() {
        let constraints = [
            constraint(vec![1.0], Relationship::Geq, 5.0),
            constraint(vec![1.0], Relationship::Leq, 3.0),
        ];
        assert!(matches!(
            solve_feasible(&constraints, 1),
            Err(Error::Infeasible)
        ));
    }

    #[test]
    fn mixed_sign_region_is_not_found() {
        // One unknown must be positive, the other negative. Neither quadrant
        // probe covers this; the heuristic reports infeasible.
        let constraints = [
            constraint(vec![1.0, 0.0], Relationship::Eq, 500.0),
            constraint(vec![0.0, 1.0], Relationship::Eq, -500.0),
        ];
        assert!(matches!(
            solve_feasible(&constraints, 2),
            Err(Error::Infeasible)
        ));
    }

    #[test]
    fn extremum_respects_direction() {
        let constraints = [
            constraint(vec![1.0, 0.0], Relationship::Leq, 800.0),
            constraint(vec![1.0, 0.0], Relationship::Geq, -200.0),
        ];
        let max = extremum(&constraints, 2, &[0], OptimizationDirection::Maximize).unwrap();
        let min = extremum(&constraints, 2, &[0], OptimizationDirection::Minimize).unwrap();
        assert_close(max, 800.0);
        assert_close(min, -200.0);
    }

    #[test]
    fn unconstrained_extremum_is_unbounded() {
        assert!(matches!(
            extremum(&[], 1, &[0], OptimizationDirection::Maximize),
            Err(Error::Unbounded)
        ));
    }
}
