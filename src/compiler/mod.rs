//! # Predicate Compiler
//!
//! Translates a [`FilterSpec`] into typed predicate fragments plus one
//! binding map. Pure function, no I/O.
//!
//! Fragments never carry literal values; every user-controlled value is
//! bound under a parameter name. Only fixed identifiers (the subject alias,
//! property keys, labels from [`EntityType`]) end up in rendered text.
//!
//! Vertex fragments and relation fragments are returned separately: the
//! assembler routes relation fragments to a pattern that binds a relation
//! variable, and refuses patterns that don't.

use crate::filter::{EntityType, FilterSpec, NumericRange, VertexDimension};
use crate::model::{PropertyMap, Value};
use crate::{Error, Result};

/// Which end of a range a bound comparison checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// `value >= $param`
    Min,
    /// `value <= $param`
    Max,
}

/// One boolean predicate fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Any of `keys` on `alias` holds one of `$param`, as a scalar or
    /// inside an array.
    PropertyIn {
        alias: String,
        keys: &'static [&'static str],
        param: String,
    },
    /// Some label of `alias` is in `$param`.
    LabelIn { alias: String, param: String },
    /// `alias` carries `label` and its name or stringified identity is in `$param`.
    Identifier {
        alias: String,
        label: EntityType,
        param: String,
    },
    /// Relation property `key` on `alias` is in `$param`.
    RelPropertyIn {
        alias: String,
        key: &'static str,
        param: String,
    },
    /// Relation property `key` on `alias` compared against `$param`.
    /// With `numeric_cast` the stored value goes through `toFloat` first.
    RelBound {
        alias: String,
        key: &'static str,
        bound: Bound,
        param: String,
        numeric_cast: bool,
    },
}

impl Predicate {
    /// Parameter the fragment reads.
    pub fn param(&self) -> &str {
        match self {
            Predicate::PropertyIn { param, .. }
            | Predicate::LabelIn { param, .. }
            | Predicate::Identifier { param, .. }
            | Predicate::RelPropertyIn { param, .. }
            | Predicate::RelBound { param, .. } => param,
        }
    }

    pub fn is_relation_level(&self) -> bool {
        matches!(self, Predicate::RelPropertyIn { .. } | Predicate::RelBound { .. })
    }
}

/// Output of [`compile`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    /// Fragments over the subject vertex.
    pub vertex: Vec<Predicate>,
    /// Fragments over the bound relation. Empty unless a relation alias was given.
    pub relation: Vec<Predicate>,
    /// Parameter name → bound value.
    pub bindings: PropertyMap,
}

impl CompiledFilter {
    /// A filter that matches everything.
    pub fn unfiltered() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex.is_empty() && self.relation.is_empty()
    }

    pub fn has_relation_predicates(&self) -> bool {
        !self.relation.is_empty()
    }
}

/// Compile `spec` against the subject vertex `subject` and, if the
/// traversal binds one, the relation `relation`.
///
/// Fails with [`Error::IncompatibleFilter`] when a rating/rank dimension is
/// populated but `relation` is `None`.
pub fn compile(spec: &FilterSpec, subject: &str, relation: Option<&str>) -> Result<CompiledFilter> {
    let mut out = CompiledFilter::default();

    if !spec.entity_types.is_empty() {
        let labels: Vec<Value> = spec.entity_types.iter().map(|t| Value::from(t.label())).collect();
        out.bindings.insert("entity_types".into(), Value::List(labels));
        out.vertex.push(Predicate::LabelIn {
            alias: subject.to_string(),
            param: "entity_types".into(),
        });
    }

    for dim in VertexDimension::ALL {
        let values = spec.vertex_values(dim);
        if values.is_empty() {
            continue;
        }
        out.bindings.insert(dim.param().into(), string_list(values));
        out.vertex.push(Predicate::PropertyIn {
            alias: subject.to_string(),
            keys: dim.property_keys(),
            param: dim.param().into(),
        });
    }

    for ty in EntityType::ALL {
        let values = spec.identifiers(ty);
        if values.is_empty() {
            continue;
        }
        out.bindings.insert(ty.identifier_param().into(), string_list(values));
        out.vertex.push(Predicate::Identifier {
            alias: subject.to_string(),
            label: ty,
            param: ty.identifier_param().into(),
        });
    }

    if spec.has_relation_filters() {
        let Some(rel) = relation else {
            return Err(Error::IncompatibleFilter {
                dimension: first_relation_dimension(spec),
                pattern: "vertex-only",
            });
        };
        compile_relation(spec, rel, &mut out);
    }

    Ok(out)
}

fn compile_relation(spec: &FilterSpec, rel: &str, out: &mut CompiledFilter) {
    if let Some(range) = spec.rating_range {
        push_range(out, rel, "rankvalue", "rating", range.min.map(Value::from), range.max.map(Value::from), true);
    }

    let sets: [(&'static str, &'static str, &[String]); 3] = [
        ("rating_change", "rating_changes", &spec.rating_changes),
        ("rankgroup", "rank_groups", &spec.rank_groups),
        ("rankvalue", "rank_values", &spec.rank_values),
    ];
    for (key, param, values) in sets {
        if values.is_empty() {
            continue;
        }
        out.bindings.insert(param.into(), string_list(values));
        out.relation.push(Predicate::RelPropertyIn {
            alias: rel.to_string(),
            key,
            param: param.into(),
        });
    }

    if let Some(NumericRange { min, max }) = spec.rank_order_range {
        push_range(out, rel, "rankorder", "rank_order", min.map(Value::from), max.map(Value::from), false);
    }
}

fn push_range(
    out: &mut CompiledFilter,
    rel: &str,
    key: &'static str,
    prefix: &str,
    min: Option<Value>,
    max: Option<Value>,
    numeric_cast: bool,
) {
    for (bound, value, suffix) in [(Bound::Min, min, "min"), (Bound::Max, max, "max")] {
        let Some(value) = value else { continue };
        let param = format!("{prefix}_{suffix}");
        out.bindings.insert(param.clone(), value);
        out.relation.push(Predicate::RelBound {
            alias: rel.to_string(),
            key,
            bound,
            param,
            numeric_cast,
        });
    }
}

fn first_relation_dimension(spec: &FilterSpec) -> &'static str {
    if spec.rating_range.is_some_and(|r| !r.is_unbounded()) {
        "rating_range"
    } else if !spec.rating_changes.is_empty() {
        "rating_change"
    } else if !spec.rank_groups.is_empty() {
        "rank_group"
    } else if !spec.rank_values.is_empty() {
        "rank_value"
    } else {
        "rank_order_range"
    }
}

fn string_list(values: &[String]) -> Value {
    Value::List(values.iter().map(|v| Value::from(v.as_str())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_empty_spec_compiles_to_nothing() {
        let compiled = compile(&FilterSpec::new(), "n", Some("r")).unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.bindings.is_empty());
    }

    #[test]
    fn test_one_fragment_per_populated_dimension() {
        let spec = FilterSpec {
            entity_types: vec![EntityType::Product],
            asset_classes: vec!["Equity".into()],
            channels: vec!["Retail".into(), "Institutional".into()],
            ..FilterSpec::default()
        };
        let compiled = compile(&spec, "n", None).unwrap();

        assert_eq!(compiled.vertex.len(), 3);
        assert!(compiled.relation.is_empty());
        assert_eq!(
            compiled.bindings.get("entity_types"),
            Some(&Value::from(vec!["PRODUCT"]))
        );
        assert_eq!(
            compiled.bindings.get("channels"),
            Some(&Value::from(vec!["Retail", "Institutional"]))
        );
    }

    #[test]
    fn test_identifier_filter_is_label_scoped() {
        let spec = FilterSpec {
            companies: vec!["Acme".into(), "17".into()],
            ..FilterSpec::default()
        };
        let compiled = compile(&spec, "subject", None).unwrap();
        assert_eq!(
            compiled.vertex,
            vec![Predicate::Identifier {
                alias: "subject".into(),
                label: EntityType::Company,
                param: "company".into(),
            }]
        );
    }

    #[test]
    fn test_rating_filter_without_relation_binding_is_incompatible() {
        let spec = FilterSpec {
            rank_groups: vec!["Positive".into()],
            ..FilterSpec::default()
        };
        let err = compile(&spec, "n", None).unwrap_err();
        assert!(matches!(err, Error::IncompatibleFilter { dimension: "rank_group", .. }));
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn test_ranges_compile_to_independent_bounds() {
        let spec = FilterSpec {
            rating_range: Some(NumericRange::new(Some(2.0), None)),
            rank_order_range: Some(NumericRange::new(Some(1), Some(5))),
            ..FilterSpec::default()
        };
        let compiled = compile(&spec, "n", Some("r")).unwrap();

        assert!(compiled.vertex.is_empty());
        assert_eq!(compiled.relation.len(), 3);
        assert_eq!(compiled.bindings.get("rating_min"), Some(&Value::Float(2.0)));
        assert!(!compiled.bindings.contains_key("rating_max"));
        assert_eq!(compiled.bindings.get("rank_order_max"), Some(&Value::Int(5)));
        assert!(compiled.relation.iter().all(Predicate::is_relation_level));
        assert!(compiled.relation.iter().any(|p| matches!(
            p,
            Predicate::RelBound { key: "rankvalue", bound: Bound::Min, numeric_cast: true, .. }
        )));
    }

    #[test]
    fn test_every_fragment_param_is_bound() {
        let spec = FilterSpec {
            regions: vec!["EMEA".into()],
            products: vec!["Fund A".into()],
            rating_changes: vec!["Upgrade".into()],
            rank_values: vec!["Buy".into()],
            ..FilterSpec::default()
        };
        let compiled = compile(&spec, "n", Some("r")).unwrap();
        for p in compiled.vertex.iter().chain(&compiled.relation) {
            assert!(compiled.bindings.contains_key(p.param()), "unbound {}", p.param());
        }
    }

    proptest! {
        #[test]
        fn prop_fragment_count_tracks_populated_dimensions(
            regions in proptest::collection::vec("[A-Z]{2,5}", 0..3),
            channels in proptest::collection::vec("[a-z]{1,8}", 0..3),
            pca in proptest::collection::vec("[a-z ]{1,8}", 0..3),
        ) {
            let spec = FilterSpec {
                regions: regions.clone(),
                channels: channels.clone(),
                pca: pca.clone(),
                ..FilterSpec::default()
            };
            let compiled = compile(&spec, "n", None).unwrap();
            let expected = [regions, channels, pca].iter().filter(|v| !v.is_empty()).count();
            prop_assert_eq!(compiled.vertex.len(), expected);
            prop_assert_eq!(compiled.bindings.len(), expected);
        }
    }
}
