use std::f64::consts::PI;
use std::fmt;

use itertools::Itertools;

/// Relational operator of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Relationship {
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "<=")]
    Leq,
    #[strum(serialize = ">=")]
    Geq,
}

/// Lifetime of a constraint in the store: Static constraints persist across
/// control cycles, Cycle constraints are discarded at every cycle boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Static,
    Cycle,
}

/// Immutable linear constraint over the full unknown vector:
/// `coefficients · x  <relationship>  value`. The coefficient vector always
/// has the engine's full length, sparse in practice.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub coefficients: Vec<f64>,
    pub relationship: Relationship,
    pub value: f64,
}

/// A mutable constraint that materializes into zero or more linear
/// constraints on demand. Parameters (target value, radius) can be updated
/// in place without re-registering; the next solve picks up the new bound.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Coefficient 1 at each index of `indices`:
    /// `Σ x[i]  <relationship>  value`.
    CoefficientOne {
        indices: Vec<usize>,
        relationship: Relationship,
        value: f64,
    },
    /// Tangent-polygon approximation of `P² + Q² <= radius²` for one (P, Q)
    /// index pair. `sections_per_quadrant = K` yields `4·K` chord
    /// constraints; the polygon is inscribed in the circle, so it never
    /// permits an apparent power above `radius`. Produces no constraints
    /// while `radius` is unset; a non-positive radius admits only the
    /// origin.
    Circle {
        p_index: usize,
        q_index: usize,
        sections_per_quadrant: usize,
        radius: Option<f64>,
    },
}

impl Constraint {
    /// Materializes into linear constraints of length `num_coefficients`.
    pub fn linearize(&self, num_coefficients: usize) -> Vec<LinearConstraint> {
        match self {
            Constraint::CoefficientOne {
                indices,
                relationship,
                value,
            } => {
                let mut coefficients = vec![0.0; num_coefficients];
                for &index in indices {
                    coefficients[index] = 1.0;
                }
                vec![LinearConstraint {
                    coefficients,
                    relationship: *relationship,
                    value: *value,
                }]
            }
            Constraint::Circle {
                p_index,
                q_index,
                sections_per_quadrant,
                radius,
            } => {
                let Some(radius) = *radius else {
                    return Vec::new();
                };
                // With a degenerate radius every circle point collapses to
                // the origin and the chord slopes below become 0/0. Only the
                // origin is feasible there, so pin both axes directly.
                if !radius.is_finite() || radius <= 0.0 {
                    return [*p_index, *q_index]
                        .into_iter()
                        .map(|index| {
                            let mut coefficients = vec![0.0; num_coefficients];
                            coefficients[index] = 1.0;
                            LinearConstraint {
                                coefficients,
                                relationship: Relationship::Eq,
                                value: 0.0,
                            }
                        })
                        .collect();
                }
                let sections = 4 * sections_per_quadrant;
                let step = 2.0 * PI / sections as f64;
                (0..=sections)
                    .map(|i| {
                        let angle = step * i as f64;
                        (angle, radius * angle.cos(), radius * angle.sin())
                    })
                    .tuple_windows()
                    .map(|((angle, x1, y1), (_, x2, y2))| {
                        // Chord through two adjacent circle points, written as
                        // Q <= m·P + b on the upper semicircle and
                        // Q >= m·P + b on the lower one. No chord is ever
                        // vertical: cos θ₁ = cos θ₂ would need 2i+1 to be a
                        // multiple of 4K.
                        let slope = (y2 - y1) / (x2 - x1);
                        let intercept = y1 - slope * x1;
                        let midpoint = angle + step / 2.0;
                        let relationship = if midpoint < PI {
                            Relationship::Leq
                        } else {
                            Relationship::Geq
                        };
                        let mut coefficients = vec![0.0; num_coefficients];
                        coefficients[*p_index] = -slope;
                        coefficients[*q_index] = 1.0;
                        LinearConstraint {
                            coefficients,
                            relationship,
                            value: intercept,
                        }
                    })
                    .collect()
            }
        }
    }

    /// Updates the scalar bound in place: the target value of a
    /// CoefficientOne constraint, or the radius of a Circle constraint.
    pub fn set_bound(&mut self, bound: f64) {
        match self {
            Constraint::CoefficientOne { value, .. } => *value = bound,
            Constraint::Circle { radius, .. } => *radius = Some(bound),
        }
    }

    /// Unsets the radius of a Circle constraint so that it produces no
    /// linear constraints. Returns false for other variants.
    pub fn clear_radius(&mut self) -> bool {
        match self {
            Constraint::Circle { radius, .. } => {
                *radius = None;
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::CoefficientOne {
                indices,
                relationship,
                value,
            } => write!(f, "sum(x{:?}) {} {}", indices, relationship, value),
            Constraint::Circle {
                p_index,
                q_index,
                radius: Some(radius),
                ..
            } => write!(
                f,
                "apparent power of (x{}, x{}) <= {}",
                p_index, q_index, radius
            ),
            Constraint::Circle {
                p_index, q_index, ..
            } => write!(f, "apparent power of (x{}, x{}) unlimited", p_index, q_index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn satisfies(constraint: &LinearConstraint, point: &[f64]) -> bool {
        let lhs: f64 = constraint
            .coefficients
            .iter()
            .zip(point)
            .map(|(c, x)| c * x)
            .sum();
        match constraint.relationship {
            Relationship::Eq => (lhs - constraint.value).abs() < 1e-9,
            Relationship::Leq => lhs <= constraint.value + 1e-9,
            Relationship::Geq => lhs >= constraint.value - 1e-9,
        }
    }

    #[test]
    fn coefficient_one_sets_ones_at_indices() {
        let constraint = Constraint::CoefficientOne {
            indices: vec![0, 2],
            relationship: Relationship::Eq,
            value: 1000.0,
        };
        let linear = constraint.linearize(4);
        assert_eq!(linear.len(), 1);
        assert_eq!(linear[0].coefficients, vec![1.0, 0.0, 1.0, 0.0]);
        assert_eq!(linear[0].relationship, Relationship::Eq);
        assert_eq!(linear[0].value, 1000.0);
    }

    #[test]
    fn circle_without_radius_produces_nothing() {
        let constraint = Constraint::Circle {
            p_index: 0,
            q_index: 1,
            sections_per_quadrant: 1,
            radius: None,
        };
        assert!(constraint.linearize(2).is_empty());
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(4)]
    fn circle_produces_four_constraints_per_quadrant(#[case] sections_per_quadrant: usize) {
        let constraint = Constraint::Circle {
            p_index: 0,
            q_index: 1,
            sections_per_quadrant,
            radius: Some(300.0),
        };
        assert_eq!(
            constraint.linearize(2).len(),
            4 * sections_per_quadrant
        );
    }

    #[rstest]
    #[case(0.0)]
    #[case(-5.0)]
    fn degenerate_radius_pins_both_axes_to_zero(#[case] radius: f64) {
        let constraint = Constraint::Circle {
            p_index: 0,
            q_index: 1,
            sections_per_quadrant: 2,
            radius: Some(radius),
        };
        let linear = constraint.linearize(2);
        assert_eq!(linear.len(), 2);
        assert!(linear
            .iter()
            .all(|c| c.relationship == Relationship::Eq && c.value == 0.0));
        assert!(linear.iter().all(|c| c.coefficients.iter().all(|x| x.is_finite())));
        assert!(linear.iter().all(|c| satisfies(c, &[0.0, 0.0])));
        assert!(linear.iter().any(|c| !satisfies(c, &[10.0, 0.0])));
        assert!(linear.iter().any(|c| !satisfies(c, &[0.0, -10.0])));
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    fn circle_polygon_contains_inradius_and_excludes_outside(
        #[case] sections_per_quadrant: usize,
    ) {
        let radius = 300.0;
        let constraint = Constraint::Circle {
            p_index: 0,
            q_index: 1,
            sections_per_quadrant,
            radius: Some(radius),
        };
        let linear = constraint.linearize(2);

        // Points just inside the polygon's inradius satisfy every chord.
        let inradius = radius * (PI / (4.0 * sections_per_quadrant as f64)).cos();
        for i in 0..16 {
            let angle = 2.0 * PI * i as f64 / 16.0;
            let point = [
                0.999 * inradius * angle.cos(),
                0.999 * inradius * angle.sin(),
            ];
            assert!(
                linear.iter().all(|c| satisfies(c, &point)),
                "point at angle {angle} should be inside"
            );
        }

        // A point outside the circle violates at least one chord.
        let outside = [1.001 * radius, 0.0];
        assert!(linear.iter().any(|c| !satisfies(c, &outside)));
    }

    #[test]
    fn circle_vertices_lie_on_polygon_boundary() {
        let radius = 500.0;
        let constraint = Constraint::Circle {
            p_index: 0,
            q_index: 1,
            sections_per_quadrant: 1,
            radius: Some(radius),
        };
        let linear = constraint.linearize(2);
        // The K=1 polygon is the diamond |P| + |Q| <= r; its vertices lie on
        // the circle and satisfy all chords.
        for vertex in [
            [radius, 0.0],
            [0.0, radius],
            [-radius, 0.0],
            [0.0, -radius],
        ] {
            assert!(linear.iter().all(|c| satisfies(c, &vertex)));
        }
    }

    #[test]
    fn bound_updates_in_place() {
        let mut constraint = Constraint::CoefficientOne {
            indices: vec![0],
            relationship: Relationship::Leq,
            value: 100.0,
        };
        constraint.set_bound(700.0);
        assert_eq!(constraint.linearize(1)[0].value, 700.0);

        let mut circle = Constraint::Circle {
            p_index: 0,
            q_index: 1,
            sections_per_quadrant: 1,
            radius: None,
        };
        assert!(circle.linearize(2).is_empty());
        circle.set_bound(250.0);
        assert_eq!(circle.linearize(2).len(), 4);
        assert!(circle.clear_radius());
        assert!(circle.linearize(2).is_empty());
        assert!(!constraint.clear_radius());
    }
}
