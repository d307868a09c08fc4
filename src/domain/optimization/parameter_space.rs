//! Declared search bounds for every tunable parameter.
//!
//! A numeric parameter lives on the lattice `min + i * step` for
//! `i in 0..=steps`. Every optimizer samples, mutates and enumerates on that
//! lattice, so any value an optimizer returns is a valid step multiple inside
//! the declared bounds.

use super::parameter_set::{ParameterSet, ParameterValue};
use crate::domain::errors::OptimizationError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const LATTICE_EPSILON: f64 = 1e-9;
const DECIMALS: f64 = 1e10;

/// Domain of a single parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterDomain {
    Range { min: f64, max: f64, step: f64 },
    Categorical { values: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub domain: ParameterDomain,
}

impl ParameterSpec {
    /// Number of lattice points (or categories).
    pub fn cardinality(&self) -> usize {
        match &self.domain {
            ParameterDomain::Range { min, max, step } => steps(*min, *max, *step).saturating_add(1),
            ParameterDomain::Categorical { values } => values.len(),
        }
    }

    /// Every admissible value in enumeration order.
    pub fn grid_values(&self) -> Vec<ParameterValue> {
        match &self.domain {
            ParameterDomain::Range { min, max, step } => (0..=steps(*min, *max, *step))
                .map(|i| self.numeric_value(lattice_point(*min, *step, i)))
                .collect(),
            ParameterDomain::Categorical { values } => values
                .iter()
                .map(|v| ParameterValue::Categorical(v.clone()))
                .collect(),
        }
    }

    /// Clamps a raw number into bounds and snaps it to the nearest lattice point.
    /// Returns `None` for categorical parameters.
    pub fn quantize(&self, raw: f64) -> Option<ParameterValue> {
        match &self.domain {
            ParameterDomain::Range { min, max, step } => {
                let i = lattice_index(*min, *max, *step, raw);
                Some(self.numeric_value(lattice_point(*min, *step, i)))
            }
            ParameterDomain::Categorical { .. } => None,
        }
    }

    /// Uniform draw over the lattice or the category list.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match &self.domain {
            ParameterDomain::Range { min, max, step } => {
                let i = rng.random_range(0..=steps(*min, *max, *step));
                self.numeric_value(lattice_point(*min, *step, i))
            }
            ParameterDomain::Categorical { values } => {
                let i = rng.random_range(0..values.len());
                ParameterValue::Categorical(values[i].clone())
            }
        }
    }

    /// True when `value` is admissible for this parameter.
    pub fn admits(&self, value: &ParameterValue) -> bool {
        match (&self.domain, value) {
            (ParameterDomain::Categorical { values }, ParameterValue::Categorical(v)) => {
                values.contains(v)
            }
            (ParameterDomain::Range { min, max, step }, v) => match v.as_f64() {
                Some(x) => {
                    if x < min - LATTICE_EPSILON || x > max + LATTICE_EPSILON {
                        return false;
                    }
                    let offset = (x - min) / step;
                    (offset - offset.round()).abs() < 1e-6
                }
                None => false,
            },
            _ => false,
        }
    }

    fn is_integral(&self) -> bool {
        match &self.domain {
            ParameterDomain::Range { min, max, step } => {
                min.fract() == 0.0 && max.fract() == 0.0 && step.fract() == 0.0
            }
            ParameterDomain::Categorical { .. } => false,
        }
    }

    fn numeric_value(&self, x: f64) -> ParameterValue {
        if self.is_integral() {
            ParameterValue::Int(x.round() as i64)
        } else {
            ParameterValue::Float(x)
        }
    }

    fn validate(&self) -> Result<(), OptimizationError> {
        let invalid = |reason: String| OptimizationError::InvalidParameterSpace { reason };
        match &self.domain {
            ParameterDomain::Range { min, max, step } => {
                if !(min.is_finite() && max.is_finite() && step.is_finite()) {
                    return Err(invalid(format!("{}: bounds must be finite", self.name)));
                }
                if min > max {
                    return Err(invalid(format!("{}: min {} > max {}", self.name, min, max)));
                }
                if *step <= 0.0 {
                    return Err(invalid(format!("{}: step must be > 0", self.name)));
                }
                Ok(())
            }
            ParameterDomain::Categorical { values } => {
                if values.is_empty() {
                    return Err(invalid(format!("{}: empty categorical set", self.name)));
                }
                Ok(())
            }
        }
    }
}

/// Ordered collection of parameter specs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterSpace {
    params: Vec<ParameterSpec>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        self.params.push(ParameterSpec {
            name: name.into(),
            domain: ParameterDomain::Range { min, max, step },
        });
        self
    }

    pub fn with_categorical<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.params.push(ParameterSpec {
            name: name.into(),
            domain: ParameterDomain::Categorical {
                values: values.into_iter().map(Into::into).collect(),
            },
        });
        self
    }

    pub fn push(&mut self, spec: ParameterSpec) {
        self.params.push(spec);
    }

    pub fn specs(&self) -> &[ParameterSpec] {
        &self.params
    }

    pub fn spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Checks bounds, steps, category lists and name uniqueness.
    pub fn validate(&self) -> Result<(), OptimizationError> {
        let mut seen = HashSet::new();
        for spec in &self.params {
            if !seen.insert(spec.name.as_str()) {
                return Err(OptimizationError::InvalidParameterSpace {
                    reason: format!("duplicate parameter {}", spec.name),
                });
            }
            spec.validate()?;
        }
        Ok(())
    }

    /// Size of the full Cartesian product, saturating at `usize::MAX`.
    pub fn combination_count(&self) -> usize {
        self.params
            .iter()
            .fold(1usize, |acc, p| acc.saturating_mul(p.cardinality()))
    }

    /// Draws one set uniformly from the space.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterSet {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    /// True when `set` names exactly the parameters of this space with
    /// admissible values.
    pub fn contains(&self, set: &ParameterSet) -> bool {
        set.len() == self.params.len()
            && self
                .params
                .iter()
                .all(|p| set.get(&p.name).is_some_and(|v| p.admits(v)))
    }

    /// Sub-space centred on `center`, spanning `ratio` of each numeric range
    /// on either side. The sub-space keeps the original step and bounds, so
    /// its lattice is a subset of this one. Categorical parameters are pinned
    /// to the centre value.
    pub fn narrowed_around(&self, center: &ParameterSet, ratio: f64) -> ParameterSpace {
        let params = self
            .params
            .iter()
            .map(|spec| {
                let domain = match (&spec.domain, center.get(&spec.name)) {
                    (ParameterDomain::Range { min, max, step }, Some(value)) => {
                        match value.as_f64() {
                            Some(c) => {
                                let n = steps(*min, *max, *step);
                                let ci = lattice_index(*min, *max, *step, c);
                                let k = ((n as f64 * ratio.max(0.0)).ceil() as usize).max(1);
                                let lo = ci.saturating_sub(k);
                                let hi = ci.saturating_add(k).min(n);
                                ParameterDomain::Range {
                                    min: lattice_point(*min, *step, lo),
                                    max: lattice_point(*min, *step, hi),
                                    step: *step,
                                }
                            }
                            None => spec.domain.clone(),
                        }
                    }
                    (ParameterDomain::Categorical { values }, Some(ParameterValue::Categorical(v)))
                        if values.contains(v) =>
                    {
                        ParameterDomain::Categorical {
                            values: vec![v.clone()],
                        }
                    }
                    _ => spec.domain.clone(),
                };
                ParameterSpec {
                    name: spec.name.clone(),
                    domain,
                }
            })
            .collect();
        ParameterSpace { params }
    }
}

fn steps(min: f64, max: f64, step: f64) -> usize {
    ((max - min) / step + LATTICE_EPSILON).floor().max(0.0) as usize
}

fn lattice_point(min: f64, step: f64, i: usize) -> f64 {
    ((min + i as f64 * step) * DECIMALS).round() / DECIMALS
}

fn lattice_index(min: f64, max: f64, step: f64, raw: f64) -> usize {
    let n = steps(min, max, step);
    if !raw.is_finite() {
        return 0;
    }
    let clamped = raw.clamp(min, max);
    (((clamped - min) / step).round().max(0.0) as usize).min(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn space() -> ParameterSpace {
        ParameterSpace::new()
            .with_range("x", 0.0, 10.0, 1.0)
            .with_range("threshold", 0.3, 0.7, 0.05)
            .with_categorical("mode", ["a", "b"])
    }

    #[test]
    fn test_grid_values_include_max_without_drift() {
        let spec = space().spec("threshold").cloned().unwrap();
        let values = spec.grid_values();
        assert_eq!(values.len(), 9);
        assert_eq!(values.first(), Some(&ParameterValue::Float(0.3)));
        assert_eq!(values.last(), Some(&ParameterValue::Float(0.7)));
        assert!(values.contains(&ParameterValue::Float(0.45)));
    }

    #[test]
    fn test_integral_range_yields_ints() {
        let spec = space().spec("x").cloned().unwrap();
        assert_eq!(spec.quantize(6.6), Some(ParameterValue::Int(7)));
        assert_eq!(spec.quantize(-3.0), Some(ParameterValue::Int(0)));
        assert_eq!(spec.quantize(42.0), Some(ParameterValue::Int(10)));
    }

    #[test]
    fn test_validate_rejects_bad_specs() {
        assert!(space().validate().is_ok());
        assert!(ParameterSpace::new().with_range("x", 2.0, 1.0, 0.5).validate().is_err());
        assert!(ParameterSpace::new().with_range("x", 0.0, 1.0, 0.0).validate().is_err());
        assert!(
            ParameterSpace::new()
                .with_categorical::<&str>("m", [])
                .validate()
                .is_err()
        );
        assert!(
            ParameterSpace::new()
                .with_range("x", 0.0, 1.0, 0.5)
                .with_range("x", 0.0, 1.0, 0.5)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_samples_stay_in_space() {
        let space = space();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let set = space.sample(&mut rng);
            assert!(space.contains(&set), "{} escaped the space", set);
        }
    }

    #[test]
    fn test_combination_count() {
        assert_eq!(space().combination_count(), 11 * 9 * 2);
        assert_eq!(ParameterSpace::new().combination_count(), 1);
    }

    #[test]
    fn test_huge_range_saturates_instead_of_overflowing() {
        let space = ParameterSpace::new().with_range("x", 0.0, 1e30, 1.0);
        assert_eq!(space.spec("x").unwrap().cardinality(), usize::MAX);
        assert_eq!(space.combination_count(), usize::MAX);
        let wider = space.with_range("y", 0.0, 1.0, 0.5);
        assert_eq!(wider.combination_count(), usize::MAX);
    }

    #[test]
    fn test_huge_narrowing_ratio_keeps_full_bounds() {
        let space = ParameterSpace::new().with_range("x", 0.0, 10.0, 1.0);
        let narrow = space.narrowed_around(&ParameterSet::new().with("x", 5), 1e30);
        match &narrow.spec("x").unwrap().domain {
            ParameterDomain::Range { min, max, step } => {
                assert_eq!((*min, *max, *step), (0.0, 10.0, 1.0));
            }
            _ => panic!("x should stay numeric"),
        }
    }

    #[test]
    fn test_narrowed_space_stays_on_original_lattice() {
        let space = space();
        let center = ParameterSet::new()
            .with("x", 9)
            .with("threshold", 0.35)
            .with("mode", "b");
        let narrow = space.narrowed_around(&center, 0.25);

        match &narrow.spec("x").unwrap().domain {
            ParameterDomain::Range { min, max, step } => {
                assert_eq!((*min, *max, *step), (6.0, 10.0, 1.0));
            }
            _ => panic!("x should stay numeric"),
        }
        match &narrow.spec("mode").unwrap().domain {
            ParameterDomain::Categorical { values } => assert_eq!(values, &vec!["b".to_string()]),
            _ => panic!("mode should stay categorical"),
        }

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let set = narrow.sample(&mut rng);
            assert!(space.contains(&set));
        }
    }
}
