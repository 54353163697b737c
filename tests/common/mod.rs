//! Shared fixture for the end-to-end suites.
//!
//! A small advisory network, loaded straight through the store API:
//!
//! ```text
//! Alice Advisory -EMPLOYS-> Fiona Field -COVERS-> Acme Pension -OWNS-> Global Equity
//!       |                                               \-OWNS-> Core Bond
//!       +-RATES-> Global Equity, Core Bond
//! Bob Partners   -EMPLOYS-> Frank Field -COVERS-> Globex Fund  -OWNS-> US Equity Income
//!       +-RATES-> US Equity Income
//! Orphan Fund (isolated)
//! ```

#![allow(dead_code)]

use graphfilter::model::property_map;
use graphfilter::{FilterEngine, MemoryStore, NodeId, PropertyMap, RelId, Value};

pub struct Fixture {
    pub engine: FilterEngine<MemoryStore>,
    pub alice: NodeId,
    pub bob: NodeId,
    pub fiona: NodeId,
    pub frank: NodeId,
    pub acme: NodeId,
    pub globex: NodeId,
    pub global_equity: NodeId,
    pub equity_income: NodeId,
    pub core_bond: NodeId,
    pub orphan: NodeId,
}

impl Fixture {
    pub fn store(&self) -> &MemoryStore {
        self.engine.store()
    }

    pub fn id(node: NodeId) -> String {
        node.to_string()
    }
}

fn rates(store: &MemoryStore, from: NodeId, to: NodeId, group: &str, value: &str, order: i64, change: &str) -> RelId {
    store
        .create_relationship(
            from,
            to,
            "RATES",
            property_map([
                ("rankgroup", Value::from(group)),
                ("rankvalue", Value::from(value)),
                ("rankorder", Value::from(order)),
                ("rating_change", Value::from(change)),
            ]),
        )
        .unwrap()
}

pub fn advisory_network() -> Fixture {
    let engine = FilterEngine::open_memory();
    let store = engine.store();

    let alice = store.create_node(
        &["CONSULTANT"],
        property_map([
            ("name", Value::from("Alice Advisory")),
            ("region", Value::from("NAI")),
            ("sales_region", Value::from("US East")),
            ("level_of_influence", Value::from("High")),
        ]),
    );
    let bob = store.create_node(
        &["CONSULTANT"],
        property_map([
            ("name", Value::from("Bob Partners")),
            ("region", Value::from("EMEA")),
            ("sales_region", Value::from("UK")),
            ("influence_level", Value::from("Medium")),
        ]),
    );
    let fiona = store.create_node(
        &["FIELD_CONSULTANT"],
        property_map([
            ("name", Value::from("Fiona Field")),
            ("region", Value::from("NAI")),
            ("channel", Value::from("Institutional")),
        ]),
    );
    let frank = store.create_node(
        &["FIELD_CONSULTANT"],
        property_map([
            ("name", Value::from("Frank Field")),
            ("region", Value::from("EMEA")),
            ("channel", Value::from("Retail")),
        ]),
    );
    let acme = store.create_node(
        &["COMPANY"],
        property_map([
            ("name", Value::from("Acme Pension")),
            ("region", Value::from("NAI")),
            ("channel", Value::from("Institutional")),
            ("privacy", Value::from("Public")),
            ("pca", Value::from("Jane Doe")),
        ]),
    );
    let globex = store.create_node(
        &["COMPANY"],
        property_map([
            ("name", Value::from("Globex Fund")),
            ("region", Value::from("EMEA")),
            ("channel", Value::from("Retail")),
            ("privacy", Value::from("Private")),
            ("aca", Value::from("John Roe")),
        ]),
    );
    let global_equity = store.create_node(
        &["PRODUCT"],
        property_map([("name", Value::from("Global Equity")), ("asset_class", Value::from("Equity"))]),
    );
    let equity_income = store.create_node(
        &["PRODUCT"],
        property_map([
            ("name", Value::from("US Equity Income")),
            ("asset_class", Value::from(vec!["Equity", "Income"])),
        ]),
    );
    let core_bond = store.create_node(
        &["PRODUCT"],
        property_map([("name", Value::from("Core Bond")), ("asset_class", Value::from("Fixed Income"))]),
    );
    let orphan = store.create_node(
        &["PRODUCT"],
        property_map([("name", Value::from("Orphan Fund")), ("asset_class", Value::from("Alternatives"))]),
    );

    store.create_relationship(alice, fiona, "EMPLOYS", PropertyMap::new()).unwrap();
    store.create_relationship(bob, frank, "EMPLOYS", PropertyMap::new()).unwrap();
    store.create_relationship(fiona, acme, "COVERS", PropertyMap::new()).unwrap();
    store.create_relationship(frank, globex, "COVERS", PropertyMap::new()).unwrap();
    for (company, product, status) in [
        (acme, global_equity, "Active"),
        (acme, core_bond, "Pending"),
        (globex, equity_income, "Active"),
    ] {
        store
            .create_relationship(company, product, "OWNS", property_map([("mandate_status", Value::from(status))]))
            .unwrap();
    }
    rates(store, alice, global_equity, "Positive", "4", 1, "Upgrade");
    rates(store, alice, core_bond, "Positive", "3", 2, "Stable");
    rates(store, bob, equity_income, "Neutral", "2", 3, "Downgrade");

    Fixture {
        engine,
        alice,
        bob,
        fiona,
        frank,
        acme,
        globex,
        global_equity,
        equity_income,
        core_bond,
        orphan,
    }
}

/// Sorted identities of a result's nodes.
pub fn node_ids(nodes: &[graphfilter::GraphNode]) -> Vec<String> {
    let mut ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    ids.sort();
    ids
}

/// Sorted identities for a set of fixture nodes.
pub fn ids(nodes: &[NodeId]) -> Vec<String> {
    let mut ids: Vec<String> = nodes.iter().map(NodeId::to_string).collect();
    ids.sort();
    ids
}
