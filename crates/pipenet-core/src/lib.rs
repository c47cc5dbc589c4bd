//! # pipenet-core: Pipe Network Modeling Core
//!
//! Provides the data structures shared by the layout optimizer: junctions,
//! pipes, additive demand records, and the undirected network graph that ties
//! them together.
//!
//! ## Design Philosophy
//!
//! A candidate heating network is modeled as an **undirected multigraph**
//! (two junctions may be joined by parallel pipes):
//! - **Nodes**: [`Junction`]s (supply point, consumer connections, joints)
//! - **Edges**: [`Pipe`]s (one per physical pipe segment that *may* be built)
//!
//! Every pipe carries its own base [`Demand`] (typically nonzero only on the
//! service pipe that connects a building) and a set of result fields that the
//! optimizer writes back once a layout has been chosen: accumulated flow,
//! price, hydraulic sizing, and whether the pipe survived.
//!
//! ## Quick Start
//!
//! ```rust
//! use pipenet_core::*;
//!
//! let mut network = Network::new();
//! let plant = network.add_junction(Junction::supply(JunctionId::new(0), "Plant"));
//! let joint = network.add_junction(Junction::joint(JunctionId::new(1), "J1"));
//! let house = network.add_junction(Junction::consumer(JunctionId::new(2), "House 1"));
//!
//! network
//!     .add_pipe(plant, joint, Pipe::new(PipeId::new(1), Meters(40.0)))
//!     .unwrap();
//! network
//!     .add_pipe(
//!         joint,
//!         house,
//!         Pipe::new(PipeId::new(2), Meters(12.0)).with_load(Demand::new(1, 4, Kilowatts(18.0))),
//!     )
//!     .unwrap();
//!
//! assert_eq!(network.stats().num_pipes, 2);
//! ```
//!
//! ## Modules
//!
//! - [`diagnostics`] - Validation and diagnostic reporting
//! - [`graph_utils`] - Topological summaries (components, cycle rank)
//! - [`units`] - Unit newtypes for loads and lengths

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};

pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{PipeNetError, PipeNetResult};
pub use graph_utils::*;
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use units::{Kilowatts, Meters};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JunctionId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipeId(usize);

/// Opaque handle to the externally owned physical segment a pipe represents.
///
/// The optimizer never looks inside; it only hands the handle back to the
/// cost function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentRef(u64);

impl JunctionId {
    #[inline]
    pub fn new(value: usize) -> Self {
        JunctionId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl PipeId {
    #[inline]
    pub fn new(value: usize) -> Self {
        PipeId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl SegmentRef {
    #[inline]
    pub fn new(value: u64) -> Self {
        SegmentRef(value)
    }
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pipe#{}", self.0)
    }
}

impl std::fmt::Display for JunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Junction#{}", self.0)
    }
}

/// Role of a junction in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JunctionKind {
    /// Heat source; the global root of every layout.
    Supply,
    /// Building connection point.
    Consumer,
    /// Plain pipe joint.
    #[default]
    Joint,
}

#[derive(Debug, Clone, Default)]
pub struct Junction {
    pub id: JunctionId,
    pub name: String,
    pub kind: JunctionKind,
    /// Handle to the originating junction record, if the caller keeps one
    pub external: Option<u64>,
}

impl Junction {
    pub fn new(id: JunctionId, name: impl Into<String>, kind: JunctionKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            external: None,
        }
    }

    pub fn supply(id: JunctionId, name: impl Into<String>) -> Self {
        Self::new(id, name, JunctionKind::Supply)
    }

    pub fn consumer(id: JunctionId, name: impl Into<String>) -> Self {
        Self::new(id, name, JunctionKind::Consumer)
    }

    pub fn joint(id: JunctionId, name: impl Into<String>) -> Self {
        Self::new(id, name, JunctionKind::Joint)
    }

    /// Attach the caller's handle for the originating junction record.
    pub fn with_external(mut self, handle: u64) -> Self {
        self.external = Some(handle);
        self
    }
}

/// Additive demand carried by a pipe.
///
/// Used both for a pipe's own base load and for the flow accumulated over
/// everything downstream of it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Demand {
    /// Connected buildings
    pub buildings: u32,
    /// Dwelling/business units inside those buildings
    pub units: u32,
    /// Peak heat demand
    pub heat: Kilowatts,
}

impl Demand {
    pub fn new(buildings: u32, units: u32, heat: Kilowatts) -> Self {
        Self {
            buildings,
            units,
            heat,
        }
    }

    /// True if every field is zero.
    pub fn is_zero(&self) -> bool {
        self.buildings == 0 && self.units == 0 && self.heat.value() == 0.0
    }
}

impl std::ops::Add for Demand {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            buildings: self.buildings + rhs.buildings,
            units: self.units + rhs.units,
            heat: self.heat + rhs.heat,
        }
    }
}

/// One accumulated field of [`Demand`].
///
/// The set of summable properties is fixed; callers choose which of them a
/// propagation pass should accumulate by passing an ordered slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DemandProperty {
    Buildings,
    Units,
    Heat,
}

impl DemandProperty {
    /// All properties in canonical order.
    pub const ALL: [DemandProperty; 3] = [
        DemandProperty::Buildings,
        DemandProperty::Units,
        DemandProperty::Heat,
    ];

    /// Read this property from a demand record.
    pub fn get(self, demand: &Demand) -> f64 {
        match self {
            DemandProperty::Buildings => demand.buildings as f64,
            DemandProperty::Units => demand.units as f64,
            DemandProperty::Heat => demand.heat.value(),
        }
    }

    /// Write an accumulated value back into a demand record.
    ///
    /// Counts are rounded; they were summed from integers so the rounding
    /// only strips floating noise.
    pub fn set(self, demand: &mut Demand, value: f64) {
        match self {
            DemandProperty::Buildings => demand.buildings = value.round().max(0.0) as u32,
            DemandProperty::Units => demand.units = value.round().max(0.0) as u32,
            DemandProperty::Heat => demand.heat = Kilowatts(value),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DemandProperty::Buildings => "buildings",
            DemandProperty::Units => "units",
            DemandProperty::Heat => "heat",
        }
    }
}

/// Hydraulic outputs returned by the external cost function for one pipe.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sizing {
    /// Total price of building this pipe at the given flow
    pub price: f64,
    /// Selected nominal diameter (DN), if the cost function picks one
    pub nominal_diameter: Option<u32>,
    /// Specific pressure loss in Pa/m
    pub pressure_loss: Option<f64>,
    /// Flow velocity in m/s
    pub velocity: Option<f64>,
}

impl Sizing {
    pub fn priced(price: f64) -> Self {
        Self {
            price,
            ..Self::default()
        }
    }
}

/// A candidate pipe between two junctions.
#[derive(Debug, Clone, Default)]
pub struct Pipe {
    pub id: PipeId,
    pub name: String,
    /// Externally owned physical segment
    pub segment: SegmentRef,
    pub length: Meters,
    /// Base load of this pipe (nonzero on building service pipes)
    pub load: Demand,
    /// Set by the decomposer: removing this pipe disconnects the network
    pub is_bridge: bool,
    /// Set by the optimizer: this pipe is part of the chosen layout
    pub selected: bool,
    /// Demand accumulated over everything downstream of this pipe
    pub flow: Demand,
    pub price: Option<f64>,
    pub sizing: Option<Sizing>,
}

impl Pipe {
    pub fn new(id: PipeId, length: Meters) -> Self {
        Self {
            id,
            name: format!("Pipe {}", id.value()),
            length,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_segment(mut self, segment: SegmentRef) -> Self {
        self.segment = segment;
        self
    }

    pub fn with_load(mut self, load: Demand) -> Self {
        self.load = load;
        self
    }

    /// Clear everything a previous optimization run wrote onto the pipe.
    pub fn reset_results(&mut self) {
        self.is_bridge = false;
        self.selected = false;
        self.flow = Demand::default();
        self.price = None;
        self.sizing = None;
    }
}

/// The candidate pipe network graph
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub graph: Graph<Junction, Pipe, Undirected>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
        }
    }

    pub fn add_junction(&mut self, junction: Junction) -> NodeIndex {
        self.graph.add_node(junction)
    }

    /// Connect two existing junctions with a pipe.
    ///
    /// Rejects self-loops and endpoints that are not part of the graph.
    pub fn add_pipe(&mut self, a: NodeIndex, b: NodeIndex, pipe: Pipe) -> PipeNetResult<EdgeIndex> {
        let count = self.graph.node_count();
        if a.index() >= count || b.index() >= count {
            return Err(PipeNetError::structural(format!(
                "{} references a junction outside the graph ({} or {})",
                pipe.id,
                a.index(),
                b.index()
            )));
        }
        if a == b {
            return Err(PipeNetError::structural(format!(
                "{} is a self-loop on {}",
                pipe.id, self.graph[a].id
            )));
        }
        Ok(self.graph.add_edge(a, b, pipe))
    }

    /// Locate a junction by its id.
    pub fn find_junction(&self, id: JunctionId) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&node| self.graph[node].id == id)
    }

    /// Locate a pipe by its id.
    pub fn find_pipe(&self, id: PipeId) -> Option<EdgeIndex> {
        self.graph
            .edge_indices()
            .find(|&edge| self.graph[edge].id == id)
    }

    /// The (first) supply junction, if any.
    pub fn supply(&self) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&node| self.graph[node].kind == JunctionKind::Supply)
    }

    /// Number of pipes incident to a junction.
    pub fn degree(&self, node: NodeIndex) -> usize {
        self.graph.edges(node).count()
    }

    /// Compute basic statistics about the network
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();

        for junction in self.graph.node_weights() {
            match junction.kind {
                JunctionKind::Supply => stats.num_supplies += 1,
                JunctionKind::Consumer => stats.num_consumers += 1,
                JunctionKind::Joint => stats.num_joints += 1,
            }
        }

        for pipe in self.graph.edge_weights() {
            stats.num_pipes += 1;
            stats.total_length_m += pipe.length.value();
            stats.total_heat_kw += pipe.load.heat.value();
            stats.total_buildings += pipe.load.buildings as usize;
            if pipe.selected {
                stats.num_selected += 1;
            }
        }

        stats
    }

    /// Validate network data for common issues that break the optimizer.
    ///
    /// Populates the provided `Diagnostics` with any warnings/errors found.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        let stats = self.stats();

        if self.graph.node_count() == 0 {
            diag.add_error("structure", "Network has no junctions");
            return;
        }

        if stats.num_supplies == 0 {
            diag.add_warning("structure", "Network has no supply junction");
        } else if stats.num_supplies > 1 {
            diag.add_warning(
                "structure",
                &format!(
                    "Network has {} supply junctions; only the requested root is used",
                    stats.num_supplies
                ),
            );
        }

        let mut junction_ids = std::collections::HashSet::new();
        for junction in self.graph.node_weights() {
            if !junction_ids.insert(junction.id) {
                diag.add_error_with_entity(
                    "reference",
                    "Duplicate junction id",
                    &junction.id.to_string(),
                );
            }
        }

        let mut pipe_ids = std::collections::HashSet::new();
        for edge in self.graph.edge_references() {
            let pipe = edge.weight();
            let entity = pipe.id.to_string();
            if !pipe_ids.insert(pipe.id) {
                diag.add_error_with_entity("reference", "Duplicate pipe id", &entity);
            }
            if edge.source() == edge.target() {
                diag.add_error_with_entity("structure", "Pipe is a self-loop", &entity);
            }
            if !pipe.length.is_finite() || pipe.length.value() < 0.0 {
                diag.add_error_with_entity(
                    "physical",
                    &format!("Pipe length {} is not a non-negative number", pipe.length),
                    &entity,
                );
            }
            if pipe.length.value() == 0.0 {
                diag.add_warning_with_entity("physical", "Pipe has zero length", &entity);
            }
            if !pipe.load.heat.is_finite() || pipe.load.heat.value() < 0.0 {
                diag.add_error_with_entity(
                    "physical",
                    &format!("Heat load {} is not a non-negative number", pipe.load.heat),
                    &entity,
                );
            }
        }

        if stats.total_heat_kw == 0.0 && stats.total_buildings == 0 {
            diag.add_warning("structure", "Network carries no demand");
        }
    }

    /// Run [`Network::validate_into`] on a fresh diagnostics collection.
    pub fn validate(&self) -> Diagnostics {
        let mut diag = Diagnostics::new();
        self.validate_into(&mut diag);
        diag
    }

    /// Reset every pipe's result fields before a new run.
    pub fn reset_results(&mut self) {
        for pipe in self.graph.edge_weights_mut() {
            pipe.reset_results();
        }
    }

    /// Sum of prices over the pipes selected by the last run.
    pub fn selected_cost(&self) -> f64 {
        self.graph
            .edge_weights()
            .filter(|pipe| pipe.selected)
            .filter_map(|pipe| pipe.price)
            .sum()
    }

    /// Ids of the pipes selected by the last run, sorted.
    pub fn selected_pipes(&self) -> Vec<PipeId> {
        let mut ids: Vec<PipeId> = self
            .graph
            .edge_weights()
            .filter(|pipe| pipe.selected)
            .map(|pipe| pipe.id)
            .collect();
        ids.sort();
        ids
    }
}

/// Statistics about a network's size and demand
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub num_supplies: usize,
    pub num_consumers: usize,
    pub num_joints: usize,
    pub num_pipes: usize,
    pub num_selected: usize,
    pub total_length_m: f64,
    pub total_heat_kw: f64,
    pub total_buildings: usize,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} junctions ({} supply, {} consumers), {} pipes ({:.0} m), {} buildings ({:.0} kW)",
            self.num_supplies + self.num_consumers + self.num_joints,
            self.num_supplies,
            self.num_consumers,
            self.num_pipes,
            self.total_length_m,
            self.total_buildings,
            self.total_heat_kw
        )
    }
}
