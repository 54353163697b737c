//! # Filter Specification
//!
//! The declarative, per-dimension constraint set driving a query.
//!
//! Semantics are open-world: an empty dimension imposes no constraint, a
//! populated dimension accepts any of its values (OR), and dimensions
//! combine with AND. The request layer hands these over already typed;
//! nothing here parses raw query strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::query::Page;
use crate::Error;

// ============================================================================
// Entity types
// ============================================================================

/// Primary entity categories. Each maps to one store label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Consultant,
    FieldConsultant,
    Company,
    Product,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Consultant,
        EntityType::FieldConsultant,
        EntityType::Company,
        EntityType::Product,
    ];

    /// Store label for this type.
    pub fn label(self) -> &'static str {
        match self {
            EntityType::Consultant => "CONSULTANT",
            EntityType::FieldConsultant => "FIELD_CONSULTANT",
            EntityType::Company => "COMPANY",
            EntityType::Product => "PRODUCT",
        }
    }

    /// Parameter name used for the identifier filter on this type.
    pub fn identifier_param(self) -> &'static str {
        match self {
            EntityType::Consultant => "consultant",
            EntityType::FieldConsultant => "field_consultant",
            EntityType::Company => "company",
            EntityType::Product => "product",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidParameter(format!("unknown entity type '{s}'")))
    }
}

// ============================================================================
// Numeric range
// ============================================================================

/// Inclusive numeric range; either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericRange<T> {
    #[serde(default)]
    pub min: Option<T>,
    #[serde(default)]
    pub max: Option<T>,
}

impl<T> NumericRange<T> {
    pub fn new(min: Option<T>, max: Option<T>) -> Self {
        Self { min, max }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

// ============================================================================
// Vertex dimensions
// ============================================================================

/// Set-valued dimensions tested against vertex properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexDimension {
    Region,
    SalesRegion,
    Channel,
    AssetClass,
    MandateStatus,
    PrivacyLevel,
    InfluenceLevel,
    Pca,
    Aca,
}

impl VertexDimension {
    pub const ALL: [VertexDimension; 9] = [
        VertexDimension::Region,
        VertexDimension::SalesRegion,
        VertexDimension::Channel,
        VertexDimension::AssetClass,
        VertexDimension::MandateStatus,
        VertexDimension::PrivacyLevel,
        VertexDimension::InfluenceLevel,
        VertexDimension::Pca,
        VertexDimension::Aca,
    ];

    /// Name of the bound parameter holding the accepted values.
    pub fn param(self) -> &'static str {
        match self {
            VertexDimension::Region => "regions",
            VertexDimension::SalesRegion => "sales_regions",
            VertexDimension::Channel => "channels",
            VertexDimension::AssetClass => "asset_classes",
            VertexDimension::MandateStatus => "mandate_status",
            VertexDimension::PrivacyLevel => "privacy_levels",
            VertexDimension::InfluenceLevel => "level_of_influence",
            VertexDimension::Pca => "pca",
            VertexDimension::Aca => "aca",
        }
    }

    /// Property keys the dimension is read from. A vertex matches when any
    /// of the keys matches.
    pub fn property_keys(self) -> &'static [&'static str] {
        match self {
            VertexDimension::Region => &["region"],
            VertexDimension::SalesRegion => &["sales_region"],
            VertexDimension::Channel => &["channel"],
            VertexDimension::AssetClass => &["asset_class"],
            VertexDimension::MandateStatus => &["mandate_status"],
            VertexDimension::PrivacyLevel => &["privacy"],
            VertexDimension::InfluenceLevel => {
                &["level_of_influence", "influence_level", "levelOfInfluence", "influence"]
            }
            VertexDimension::Pca => &["pca"],
            VertexDimension::Aca => &["aca"],
        }
    }
}

// ============================================================================
// FilterSpec
// ============================================================================

/// All active constraints for one query.
///
/// Field aliases accept the request layer's historical parameter names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    // Geography
    pub regions: Vec<String>,
    pub sales_regions: Vec<String>,
    pub channels: Vec<String>,

    // Entity types
    #[serde(alias = "node_types")]
    pub entity_types: Vec<EntityType>,

    // Named entities (by name or stringified identity)
    #[serde(alias = "company")]
    pub companies: Vec<String>,
    #[serde(alias = "consultant")]
    pub consultants: Vec<String>,
    #[serde(alias = "product")]
    pub products: Vec<String>,
    #[serde(alias = "field_consultant")]
    pub field_consultants: Vec<String>,

    // Product & status
    pub asset_classes: Vec<String>,
    #[serde(alias = "mandate_status")]
    pub mandate_statuses: Vec<String>,
    pub privacy_levels: Vec<String>,
    #[serde(alias = "level_of_influence")]
    pub influence_levels: Vec<String>,

    // Advisors
    pub pca: Vec<String>,
    pub aca: Vec<String>,

    // Rating relation
    pub rating_range: Option<NumericRange<f64>>,
    #[serde(alias = "rating_change")]
    pub rating_changes: Vec<String>,
    #[serde(alias = "rank_group")]
    pub rank_groups: Vec<String>,
    #[serde(alias = "rank_value")]
    pub rank_values: Vec<String>,
    pub rank_order_range: Option<NumericRange<i64>>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepted values for a vertex dimension.
    pub fn vertex_values(&self, dim: VertexDimension) -> &[String] {
        match dim {
            VertexDimension::Region => &self.regions,
            VertexDimension::SalesRegion => &self.sales_regions,
            VertexDimension::Channel => &self.channels,
            VertexDimension::AssetClass => &self.asset_classes,
            VertexDimension::MandateStatus => &self.mandate_statuses,
            VertexDimension::PrivacyLevel => &self.privacy_levels,
            VertexDimension::InfluenceLevel => &self.influence_levels,
            VertexDimension::Pca => &self.pca,
            VertexDimension::Aca => &self.aca,
        }
    }

    /// Names or stringified identities selected for one entity type.
    pub fn identifiers(&self, ty: EntityType) -> &[String] {
        match ty {
            EntityType::Consultant => &self.consultants,
            EntityType::FieldConsultant => &self.field_consultants,
            EntityType::Company => &self.companies,
            EntityType::Product => &self.products,
        }
    }

    /// Whether any rating/rank dimension is populated. Those compile
    /// against relation properties.
    pub fn has_relation_filters(&self) -> bool {
        self.rating_range.is_some_and(|r| !r.is_unbounded())
            || self.rank_order_range.is_some_and(|r| !r.is_unbounded())
            || !self.rating_changes.is_empty()
            || !self.rank_groups.is_empty()
            || !self.rank_values.is_empty()
    }

    /// Whether any vertex-level dimension is populated.
    pub fn has_vertex_filters(&self) -> bool {
        !self.entity_types.is_empty()
            || EntityType::ALL.into_iter().any(|t| !self.identifiers(t).is_empty())
            || VertexDimension::ALL.into_iter().any(|d| !self.vertex_values(d).is_empty())
    }

    pub fn is_empty(&self) -> bool {
        !self.has_vertex_filters() && !self.has_relation_filters()
    }

    /// Copy with every relation-level dimension cleared.
    pub fn vertex_scoped(&self) -> FilterSpec {
        FilterSpec {
            rating_range: None,
            rating_changes: Vec::new(),
            rank_groups: Vec::new(),
            rank_values: Vec::new(),
            rank_order_range: None,
            ..self.clone()
        }
    }
}

// ============================================================================
// GraphQuery
// ============================================================================

/// How much of each subject's surroundings a filtered fetch returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Neighborhood {
    /// Only the matching subjects.
    #[default]
    Subject,
    /// Subjects, their direct neighbors and connecting relations.
    OneHop,
    /// As `OneHop`, plus one further hop from each neighbor.
    TwoHop,
}

/// A filtered-fetch request: filters plus paging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphQuery {
    pub filters: FilterSpec,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub neighborhood: Neighborhood,
}

impl GraphQuery {
    pub fn new(filters: FilterSpec) -> Self {
        Self { filters, ..Self::default() }
    }

    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    pub fn with_neighborhood(mut self, neighborhood: Neighborhood) -> Self {
        self.neighborhood = neighborhood;
        self
    }

    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_spec_has_no_filters() {
        let spec = FilterSpec::new();
        assert!(spec.is_empty());
        assert!(!spec.has_relation_filters());
    }

    #[test]
    fn test_unbounded_range_is_not_a_filter() {
        let spec = FilterSpec {
            rating_range: Some(NumericRange::new(None, None)),
            ..FilterSpec::default()
        };
        assert!(!spec.has_relation_filters());
    }

    #[test]
    fn test_vertex_scoped_drops_rating_dimensions() {
        let spec = FilterSpec {
            channels: vec!["Retail".into()],
            rank_groups: vec!["Positive".into()],
            rank_order_range: Some(NumericRange::new(Some(1), None)),
            ..FilterSpec::default()
        };
        let scoped = spec.vertex_scoped();
        assert_eq!(scoped.channels, spec.channels);
        assert!(!scoped.has_relation_filters());
        assert!(scoped.has_vertex_filters());
    }

    #[test]
    fn test_deserialize_with_request_aliases() {
        let spec: FilterSpec = serde_json::from_value(serde_json::json!({
            "node_types": ["PRODUCT"],
            "company": ["Acme"],
            "level_of_influence": ["High"],
            "rating_range": {"min": 2.5}
        }))
        .unwrap();
        assert_eq!(spec.entity_types, vec![EntityType::Product]);
        assert_eq!(spec.companies, vec!["Acme".to_string()]);
        assert_eq!(spec.influence_levels, vec!["High".to_string()]);
        assert_eq!(spec.rating_range, Some(NumericRange::new(Some(2.5), None)));
    }

    #[test]
    fn test_entity_type_from_str() {
        assert_eq!("product".parse::<EntityType>().unwrap(), EntityType::Product);
        assert_eq!("FIELD_CONSULTANT".parse::<EntityType>().unwrap(), EntityType::FieldConsultant);
        assert!("VENDOR".parse::<EntityType>().unwrap_err().is_invalid_parameter());
    }

    #[test]
    fn test_influence_reads_every_alias_key() {
        assert_eq!(VertexDimension::InfluenceLevel.property_keys().len(), 4);
        assert_eq!(VertexDimension::PrivacyLevel.property_keys(), &["privacy"]);
    }
}
