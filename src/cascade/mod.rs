//! # Cascading Filter Resolver
//!
//! For a partial selection, finds the values still selectable in every
//! other filter dimension: one query per dimension over the matching
//! subjects and their one-hop neighborhood.
//!
//! Dimensions resolve concurrently and fail independently. A failed
//! dimension comes back empty and is named in [`FilterOptions::degraded`];
//! only an unreachable store fails the whole call, whether the initial
//! ping or any dimension's query finds it gone.

use std::collections::BTreeMap;
use std::fmt;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::compiler::compile;
use crate::execution::Row;
use crate::filter::{EntityType, FilterSpec, VertexDimension};
use crate::query::{assemble, Page, TraversalPattern};
use crate::session::GraphSession;
use crate::storage::GraphStore;
use crate::Result;

/// Top-level regions. Fixed, never derived from the store.
pub const STATIC_REGIONS: [&str; 3] = ["NAI", "EMEA", "APAC"];

// ============================================================================
// Dimensions
// ============================================================================

/// Where a dimension's values live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSource {
    /// Vertex property (any of the dimension's keys).
    Property(VertexDimension),
    /// Property of `RATES` relations incident to a subject.
    Rating(&'static str),
    /// Vertices carrying the type's label, offered as `{id, name}`.
    Entity(EntityType),
}

/// Every dimension whose options are resolved from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionDimension {
    SalesRegions,
    Channels,
    AssetClasses,
    MandateStatus,
    PrivacyLevels,
    LevelOfInfluence,
    PcaOptions,
    AcaOptions,
    RatingChanges,
    RankGroups,
    RankValues,
    Consultants,
    Companies,
    Products,
    FieldConsultants,
}

impl OptionDimension {
    pub const ALL: [OptionDimension; 15] = [
        OptionDimension::SalesRegions,
        OptionDimension::Channels,
        OptionDimension::AssetClasses,
        OptionDimension::MandateStatus,
        OptionDimension::PrivacyLevels,
        OptionDimension::LevelOfInfluence,
        OptionDimension::PcaOptions,
        OptionDimension::AcaOptions,
        OptionDimension::RatingChanges,
        OptionDimension::RankGroups,
        OptionDimension::RankValues,
        OptionDimension::Consultants,
        OptionDimension::Companies,
        OptionDimension::Products,
        OptionDimension::FieldConsultants,
    ];

    pub fn source(self) -> OptionSource {
        use OptionDimension::*;
        match self {
            SalesRegions => OptionSource::Property(VertexDimension::SalesRegion),
            Channels => OptionSource::Property(VertexDimension::Channel),
            AssetClasses => OptionSource::Property(VertexDimension::AssetClass),
            MandateStatus => OptionSource::Property(VertexDimension::MandateStatus),
            PrivacyLevels => OptionSource::Property(VertexDimension::PrivacyLevel),
            LevelOfInfluence => OptionSource::Property(VertexDimension::InfluenceLevel),
            PcaOptions => OptionSource::Property(VertexDimension::Pca),
            AcaOptions => OptionSource::Property(VertexDimension::Aca),
            RatingChanges => OptionSource::Rating("rating_change"),
            RankGroups => OptionSource::Rating("rankgroup"),
            RankValues => OptionSource::Rating("rankvalue"),
            Consultants => OptionSource::Entity(EntityType::Consultant),
            Companies => OptionSource::Entity(EntityType::Company),
            Products => OptionSource::Entity(EntityType::Product),
            FieldConsultants => OptionSource::Entity(EntityType::FieldConsultant),
        }
    }

    /// Field name in [`FilterOptions`].
    pub fn name(self) -> &'static str {
        use OptionDimension::*;
        match self {
            SalesRegions => "sales_regions",
            Channels => "channels",
            AssetClasses => "asset_classes",
            MandateStatus => "mandate_status",
            PrivacyLevels => "privacy_levels",
            LevelOfInfluence => "level_of_influence",
            PcaOptions => "pca_options",
            AcaOptions => "aca_options",
            RatingChanges => "rating_changes",
            RankGroups => "rank_groups",
            RankValues => "rank_values",
            Consultants => "consultants",
            Companies => "companies",
            Products => "products",
            FieldConsultants => "field_consultants",
        }
    }
}

impl fmt::Display for OptionDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Options
// ============================================================================

/// A selectable named entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityOption {
    pub id: String,
    pub name: String,
}

/// Selectable values per dimension, each list sorted and distinct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub regions: Vec<String>,
    pub sales_regions: Vec<String>,
    pub channels: Vec<String>,
    pub asset_classes: Vec<String>,
    pub mandate_status: Vec<String>,
    pub privacy_levels: Vec<String>,
    pub level_of_influence: Vec<String>,
    pub pca_options: Vec<String>,
    pub aca_options: Vec<String>,
    pub rating_changes: Vec<String>,
    pub rank_groups: Vec<String>,
    pub rank_values: Vec<String>,
    pub consultants: Vec<EntityOption>,
    pub companies: Vec<EntityOption>,
    pub products: Vec<EntityOption>,
    pub field_consultants: Vec<EntityOption>,
    /// Dimensions whose query failed, with the reason. Their lists are empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub degraded: BTreeMap<OptionDimension, String>,
}

impl FilterOptions {
    fn with_static_regions() -> Self {
        Self {
            regions: STATIC_REGIONS.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Values of a string-valued dimension.
    pub fn values(&self, dimension: OptionDimension) -> Option<&[String]> {
        use OptionDimension::*;
        let values = match dimension {
            SalesRegions => &self.sales_regions,
            Channels => &self.channels,
            AssetClasses => &self.asset_classes,
            MandateStatus => &self.mandate_status,
            PrivacyLevels => &self.privacy_levels,
            LevelOfInfluence => &self.level_of_influence,
            PcaOptions => &self.pca_options,
            AcaOptions => &self.aca_options,
            RatingChanges => &self.rating_changes,
            RankGroups => &self.rank_groups,
            RankValues => &self.rank_values,
            Consultants | Companies | Products | FieldConsultants => return None,
        };
        Some(values)
    }

    /// Options of an entity dimension.
    pub fn entities(&self, dimension: OptionDimension) -> Option<&[EntityOption]> {
        use OptionDimension::*;
        let entities = match dimension {
            Consultants => &self.consultants,
            Companies => &self.companies,
            Products => &self.products,
            FieldConsultants => &self.field_consultants,
            _ => return None,
        };
        Some(entities)
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    fn values_mut(&mut self, dimension: OptionDimension) -> Option<&mut Vec<String>> {
        use OptionDimension::*;
        Some(match dimension {
            SalesRegions => &mut self.sales_regions,
            Channels => &mut self.channels,
            AssetClasses => &mut self.asset_classes,
            MandateStatus => &mut self.mandate_status,
            PrivacyLevels => &mut self.privacy_levels,
            LevelOfInfluence => &mut self.level_of_influence,
            PcaOptions => &mut self.pca_options,
            AcaOptions => &mut self.aca_options,
            RatingChanges => &mut self.rating_changes,
            RankGroups => &mut self.rank_groups,
            RankValues => &mut self.rank_values,
            _ => return None,
        })
    }

    fn entities_mut(&mut self, dimension: OptionDimension) -> Option<&mut Vec<EntityOption>> {
        use OptionDimension::*;
        Some(match dimension {
            Consultants => &mut self.consultants,
            Companies => &mut self.companies,
            Products => &mut self.products,
            FieldConsultants => &mut self.field_consultants,
            _ => return None,
        })
    }

    fn fill(&mut self, dimension: OptionDimension, rows: &[Row]) -> Result<()> {
        if let Some(slot) = self.values_mut(dimension) {
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                let value: String = row.get("value")?;
                if !value.is_empty() {
                    values.push(value);
                }
            }
            values.sort();
            values.dedup();
            *slot = values;
        } else if let Some(slot) = self.entities_mut(dimension) {
            let mut entities = Vec::with_capacity(rows.len());
            for row in rows {
                let id: String = row.get("id")?;
                let name: Option<String> = row.get("name")?;
                entities.push(EntityOption { name: name.unwrap_or_else(|| id.clone()), id });
            }
            entities.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            entities.dedup();
            *slot = entities;
        }
        Ok(())
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the options still reachable under `selection`.
///
/// Only vertex-level dimensions of the selection scope the subject set;
/// rating/rank selections are ignored here.
pub async fn resolve_options<S: GraphStore>(
    session: &GraphSession<'_, S>,
    selection: &FilterSpec,
) -> Result<FilterOptions> {
    session.ping().await?;

    let compiled = compile(&selection.vertex_scoped(), "n", None)?;
    let mut queries = Vec::with_capacity(OptionDimension::ALL.len());
    for dimension in OptionDimension::ALL {
        let query = assemble(
            TraversalPattern::CascadingOptions { dimension },
            compiled.clone(),
            Page::default(),
        )?;
        queries.push((dimension, query));
    }

    let results = join_all(queries.iter().map(|(_, q)| session.execute(q))).await;

    let mut options = FilterOptions::with_static_regions();
    for ((dimension, _), result) in queries.iter().zip(results) {
        let outcome = match result {
            Err(e) if e.is_connectivity() => return Err(e),
            other => other.and_then(|rows| options.fill(*dimension, &rows)),
        };
        if let Err(e) = outcome {
            warn!(dimension = dimension.name(), error = %e, "filter options degraded");
            options.degraded.insert(*dimension, e.to_string());
        }
    }
    debug!(degraded = options.degraded.len(), "filter options resolved");
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{property_map, NodeId, Value};
    use crate::storage::MemoryStore;
    use crate::Error;
    use pretty_assertions::assert_eq;

    fn store() -> (MemoryStore, NodeId) {
        let store = MemoryStore::new();
        let company = store.create_node(
            &["COMPANY"],
            property_map([("name", Value::from("Acme")), ("channel", Value::from("Institutional"))]),
        );
        let product = store.create_node(
            &["PRODUCT"],
            property_map([
                ("name", Value::from("Fund A")),
                ("asset_class", Value::from(vec!["Equity", "Multi-Asset"])),
                ("channel", Value::from("")),
            ]),
        );
        store
            .create_relationship(company, product, "OWNS", property_map([("mandate_status", "Active")]))
            .unwrap();
        (store, company)
    }

    #[tokio::test]
    async fn test_unscoped_options() {
        let (store, company) = store();
        let session = GraphSession::new(&store, None);
        let options = resolve_options(&session, &FilterSpec::new()).await.unwrap();

        assert_eq!(options.regions, vec!["NAI", "EMEA", "APAC"]);
        assert_eq!(options.asset_classes, vec!["Equity", "Multi-Asset"]);
        assert_eq!(options.channels, vec!["Institutional"]);
        assert_eq!(
            options.companies,
            vec![EntityOption { id: company.to_string(), name: "Acme".into() }]
        );
        assert!(!options.is_degraded());
    }

    #[tokio::test]
    async fn test_failed_dimension_is_reported_not_fatal() {
        let (store, _) = store();
        store.fail_when(|plan| match plan.pattern {
            TraversalPattern::CascadingOptions { dimension: OptionDimension::Channels } => {
                Some(Error::StorageError("channel index offline".into()))
            }
            _ => None,
        });
        let session = GraphSession::new(&store, None);
        let options = resolve_options(&session, &FilterSpec::new()).await.unwrap();

        assert!(options.channels.is_empty());
        assert_eq!(options.degraded.len(), 1);
        assert!(options.degraded[&OptionDimension::Channels].contains("channel index offline"));
        assert_eq!(options.asset_classes, vec!["Equity", "Multi-Asset"]);
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_whole_call() {
        let (store, _) = store();
        store.set_available(false);
        let session = GraphSession::new(&store, None);
        let err = resolve_options(&session, &FilterSpec::new()).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_connection_lost_mid_resolution_fails_whole_call() {
        let (store, _) = store();
        store.fail_when(|plan| match plan.pattern {
            TraversalPattern::CascadingOptions { .. } => {
                Some(Error::StoreUnavailable("connection reset".into()))
            }
            _ => None,
        });
        let session = GraphSession::new(&store, None);

        let err = resolve_options(&session, &FilterSpec::new()).await.unwrap_err();
        assert!(err.is_connectivity());
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_non_string_entity_name_is_stringified() {
        let (store, company) = store();
        let coded = store.create_node(&["PRODUCT"], property_map([("name", Value::from(42))]));
        store
            .create_relationship(company, coded, "OWNS", property_map([("mandate_status", "Active")]))
            .unwrap();
        let session = GraphSession::new(&store, None);
        let options = resolve_options(&session, &FilterSpec::new()).await.unwrap();

        assert!(!options.degraded.contains_key(&OptionDimension::Products));
        assert!(options
            .products
            .contains(&EntityOption { id: coded.to_string(), name: "42".into() }));
    }

    #[test]
    fn test_degraded_map_serializes_by_dimension_name() {
        let mut options = FilterOptions::default();
        options.degraded.insert(OptionDimension::RankGroups, "timeout".into());
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["degraded"], serde_json::json!({"rank_groups": "timeout"}));
        let empty = serde_json::to_value(FilterOptions::default()).unwrap();
        assert!(empty.get("degraded").is_none());
    }
}
