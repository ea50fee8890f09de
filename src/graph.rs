//! Unit graph
//!
//! Units are wired together with two kinds of edges. Event edges carry
//! discrete [`Event`]s and are delivered as soon as they are produced; stream
//! edges carry one value per sample. The graph is built once, validated and
//! compiled into a fixed schedule, and then advanced one sample at a time:
//!
//! 1. queued events are delivered breadth-first, including every event the
//!    handlers emit in response,
//! 2. every unit ticks in topological order, reading the current sample's
//!    values from its producers,
//! 3. the designated output port is read back.
//!
//! Topology is frozen after [`Graph::compile`]. Nothing on the tick path
//! allocates: the event queue has a fixed capacity and overflow is counted.

use crate::error::GraphError;
use crate::event::Event;
use crate::port::{EventBuffer, PortKind, PortId, PortSpec, StreamValues, Unit, MAX_STREAM_PORTS};
use crate::unit::UnitKind;
use serde::{Deserialize, Serialize};
use slotmap::{DefaultKey, SecondaryMap, SlotMap};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace, warn};

/// Unique identifier for a node in the graph
pub type NodeId = DefaultKey;

/// Default bound on events in flight within one tick
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;

/// Reference to a specific port on a specific node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub port: PortId,
}

/// A directed connection from an output port to an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: PortRef,
    pub to: PortRef,
    pub kind: PortKind,
}

struct Node {
    unit: UnitKind,
    name: String,
}

/// Handle to a node for ergonomic port references
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    spec: PortSpec,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Reference an output port by name.
    ///
    /// # Panics
    ///
    /// Panics if the unit has no output with that name.
    pub fn out(&self, name: &str) -> PortRef {
        let port = self
            .spec
            .output_by_name(name)
            .unwrap_or_else(|| panic!("Unknown output port: {}", name));
        PortRef {
            node: self.id,
            port: port.id,
        }
    }

    /// Reference an input port by name.
    ///
    /// # Panics
    ///
    /// Panics if the unit has no input with that name.
    pub fn in_(&self, name: &str) -> PortRef {
        let port = self
            .spec
            .input_by_name(name)
            .unwrap_or_else(|| panic!("Unknown input port: {}", name));
        PortRef {
            node: self.id,
            port: port.id,
        }
    }

    /// Reference a port by id without a name lookup
    pub fn port(&self, port: PortId) -> PortRef {
        PortRef {
            node: self.id,
            port,
        }
    }

    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }
}

/// One stream input as resolved at compile time
struct StreamInput {
    port: PortId,
    default: f32,
    /// (schedule position, output port) of every writer
    sources: Vec<(usize, PortId)>,
}

/// One unit's slot in the compiled schedule
struct Step {
    node: NodeId,
    inputs: Vec<StreamInput>,
}

/// A graph of units plus its compiled schedule
pub struct Graph {
    nodes: SlotMap<NodeId, Node>,
    edges: Vec<Edge>,
    output: Option<PortRef>,
    sample_rate: f64,

    // compiled state
    compiled: bool,
    schedule: Vec<Step>,
    values: Vec<StreamValues>,
    output_slot: Option<(usize, PortId)>,
    routes: HashMap<PortRef, Vec<PortRef>>,

    // event delivery
    pending: VecDeque<(PortRef, Event)>,
    queue_capacity: usize,
    scratch: EventBuffer,
    dropped: u64,

    sample_index: u64,
}

impl Graph {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_event_capacity(sample_rate, DEFAULT_EVENT_QUEUE_CAPACITY)
    }

    /// Create a graph whose per-tick event queue holds at most `capacity`
    /// events
    pub fn with_event_capacity(sample_rate: f64, capacity: usize) -> Self {
        Self {
            nodes: SlotMap::new(),
            edges: Vec::new(),
            output: None,
            sample_rate,
            compiled: false,
            schedule: Vec::new(),
            values: Vec::new(),
            output_slot: None,
            routes: HashMap::new(),
            pending: VecDeque::with_capacity(capacity),
            queue_capacity: capacity,
            scratch: EventBuffer::with_capacity(capacity),
            dropped: 0,
            sample_index: 0,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Add a unit to the graph
    pub fn add(&mut self, name: impl Into<String>, unit: impl Into<UnitKind>) -> NodeHandle {
        let mut unit = unit.into();
        let name = name.into();
        unit.set_sample_rate(self.sample_rate);
        let spec = unit.port_spec().clone();
        trace!(name = %name, unit = unit.type_id(), "adding unit");

        let id = self.nodes.insert(Node { unit, name });
        self.invalidate();
        NodeHandle { id, spec }
    }

    /// Connect an output port to an input port of the same kind
    pub fn connect(&mut self, from: PortRef, to: PortRef) -> Result<(), GraphError> {
        let from_kind = self.output_kind(from)?;
        let to_kind = self.input_kind(to)?;
        if from_kind != to_kind {
            warn!(?from, ?to, "rejecting edge between event and stream ports");
            return Err(GraphError::PortKindMismatch);
        }

        trace!(?from, ?to, kind = ?from_kind, "connecting");
        self.edges.push(Edge {
            from,
            to,
            kind: from_kind,
        });
        self.invalidate();
        Ok(())
    }

    /// Connect one output to multiple inputs (mult)
    pub fn mult(&mut self, from: PortRef, to: &[PortRef]) -> Result<(), GraphError> {
        to.iter().try_for_each(|&dest| self.connect(from, dest))
    }

    /// Designate the stream output read back by [`Graph::tick`]
    pub fn set_output(&mut self, port: PortRef) -> Result<(), GraphError> {
        if self.output_kind(port)? != PortKind::Stream {
            return Err(GraphError::PortKindMismatch);
        }
        self.output = Some(port);
        self.invalidate();
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).map(|n| n.name.as_str())
    }

    /// Read-only view of a unit
    pub fn unit(&self, node: NodeId) -> Option<&UnitKind> {
        self.nodes.get(node).map(|n| &n.unit)
    }

    /// Mutable access to a unit, for control-rate calls outside the tick
    pub fn unit_mut(&mut self, node: NodeId) -> Option<&mut UnitKind> {
        self.nodes.get_mut(node).map(|n| &mut n.unit)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Units in execution order (empty until compiled)
    pub fn execution_order(&self) -> Vec<NodeId> {
        self.schedule.iter().map(|step| step.node).collect()
    }

    /// Number of samples produced since construction or the last reset
    pub fn sample_index(&self) -> u64 {
        self.sample_index
    }

    /// Events lost to a full queue or a full handler buffer
    pub fn dropped_events(&self) -> u64 {
        self.dropped + self.scratch.dropped()
    }

    fn invalidate(&mut self) {
        self.compiled = false;
        self.schedule.clear();
    }

    fn output_kind(&self, port: PortRef) -> Result<PortKind, GraphError> {
        let node = self.nodes.get(port.node).ok_or(GraphError::InvalidNode)?;
        node.unit
            .port_spec()
            .output_by_id(port.port)
            .map(|p| p.kind)
            .ok_or(GraphError::InvalidPort)
    }

    fn input_kind(&self, port: PortRef) -> Result<PortKind, GraphError> {
        let node = self.nodes.get(port.node).ok_or(GraphError::InvalidNode)?;
        node.unit
            .port_spec()
            .input_by_id(port.port)
            .map(|p| p.kind)
            .ok_or(GraphError::InvalidPort)
    }

    /// Validate the topology and build the execution schedule
    pub fn compile(&mut self) -> Result<(), GraphError> {
        let output = self.output.ok_or(GraphError::NoOutput)?;

        self.check_stream_ports()?;
        self.check_writers()?;
        let order = self.topological_sort()?;
        self.check_reachability(output.node)?;

        let mut positions: SecondaryMap<NodeId, usize> = SecondaryMap::new();
        for (position, &id) in order.iter().enumerate() {
            positions.insert(id, position);
        }

        let mut schedule = Vec::with_capacity(order.len());
        for &id in &order {
            let spec = self.nodes[id].unit.port_spec();
            let inputs = spec
                .inputs
                .iter()
                .filter(|def| def.kind == PortKind::Stream)
                .map(|def| {
                    let to = PortRef {
                        node: id,
                        port: def.id,
                    };
                    let sources = self
                        .edges
                        .iter()
                        .filter(|edge| edge.kind == PortKind::Stream && edge.to == to)
                        .map(|edge| (positions[edge.from.node], edge.from.port))
                        .collect();
                    StreamInput {
                        port: def.id,
                        default: def.default,
                        sources,
                    }
                })
                .collect();
            schedule.push(Step { node: id, inputs });
        }

        let mut routes: HashMap<PortRef, Vec<PortRef>> = HashMap::new();
        for edge in self.edges.iter().filter(|e| e.kind == PortKind::Event) {
            routes.entry(edge.from).or_default().push(edge.to);
        }

        self.values = vec![StreamValues::new(); schedule.len()];
        self.output_slot = Some((positions[output.node], output.port));
        self.schedule = schedule;
        self.routes = routes;
        self.compiled = true;

        debug!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "compiled graph"
        );
        Ok(())
    }

    fn check_stream_ports(&self) -> Result<(), GraphError> {
        for node in self.nodes.values() {
            let spec = node.unit.port_spec();
            let too_wide = spec
                .inputs
                .iter()
                .chain(&spec.outputs)
                .any(|def| def.kind == PortKind::Stream && def.id as usize >= MAX_STREAM_PORTS);
            if too_wide {
                warn!(node = %node.name, "stream port id out of range");
                return Err(GraphError::InvalidPort);
            }
        }
        Ok(())
    }

    fn check_writers(&self) -> Result<(), GraphError> {
        let mut writers: HashMap<PortRef, usize> = HashMap::new();
        for edge in self.edges.iter().filter(|e| e.kind == PortKind::Stream) {
            *writers.entry(edge.to).or_insert(0) += 1;
        }

        for (to, count) in writers {
            if count < 2 {
                continue;
            }
            let node = &self.nodes[to.node];
            let summing = node
                .unit
                .port_spec()
                .input_by_id(to.port)
                .is_some_and(|def| def.summing);
            if !summing {
                warn!(node = %node.name, port = to.port, "multiple writers to a non-summing input");
                return Err(GraphError::MultipleWriters {
                    node: node.name.clone(),
                    port: to.port,
                });
            }
        }
        Ok(())
    }

    /// Kahn's algorithm over both edge kinds, seeded in insertion order so
    /// the schedule is deterministic
    fn topological_sort(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree: SecondaryMap<NodeId, usize> =
            self.nodes.keys().map(|k| (k, 0)).collect();
        let mut successors: SecondaryMap<NodeId, Vec<NodeId>> =
            self.nodes.keys().map(|k| (k, Vec::new())).collect();

        for edge in &self.edges {
            in_degree[edge.to.node] += 1;
            successors[edge.from.node].push(edge.to.node);
        }

        let mut queue: VecDeque<NodeId> = self
            .nodes
            .keys()
            .filter(|&k| in_degree[k] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in &successors[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let nodes: Vec<NodeId> = in_degree
                .iter()
                .filter(|(_, &degree)| degree > 0)
                .map(|(id, _)| id)
                .collect();
            warn!(count = nodes.len(), "cycle detected");
            return Err(GraphError::CycleDetected { nodes });
        }

        Ok(order)
    }

    /// Every unit must have a path to the output node
    fn check_reachability(&self, output: NodeId) -> Result<(), GraphError> {
        let mut reached: SecondaryMap<NodeId, ()> = SecondaryMap::new();
        let mut stack = vec![output];
        reached.insert(output, ());

        while let Some(node) = stack.pop() {
            for edge in self.edges.iter().filter(|e| e.to.node == node) {
                if reached.insert(edge.from.node, ()).is_none() {
                    stack.push(edge.from.node);
                }
            }
        }

        if let Some((_, node)) = self.nodes.iter().find(|(id, _)| !reached.contains_key(*id)) {
            warn!(node = %node.name, "unit cannot reach the output");
            return Err(GraphError::Unreachable {
                name: node.name.clone(),
            });
        }
        Ok(())
    }

    /// Queue an event for delivery at the start of the next tick
    pub fn send(&mut self, to: PortRef, event: Event) {
        if self.pending.len() < self.queue_capacity {
            self.pending.push_back((to, event));
        } else {
            self.dropped += 1;
        }
    }

    /// Queue an event on every edge leaving `from`, as if the unit had
    /// emitted it
    pub fn emit(&mut self, from: PortRef, event: Event) {
        let Some(destinations) = self.routes.get(&from) else {
            return;
        };
        for &to in destinations {
            if self.pending.len() < self.queue_capacity {
                self.pending.push_back((to, event));
            } else {
                self.dropped += 1;
            }
        }
    }

    /// Deliver every queued event without advancing the streams
    pub fn flush_events(&mut self) {
        self.deliver_events();
    }

    fn deliver_events(&mut self) {
        while let Some((target, event)) = self.pending.pop_front() {
            let Some(node) = self.nodes.get_mut(target.node) else {
                continue;
            };
            self.scratch.clear();
            node.unit.handle_event(target.port, &event, &mut self.scratch);

            for &(port, emitted) in self.scratch.iter() {
                let from = PortRef {
                    node: target.node,
                    port,
                };
                let Some(destinations) = self.routes.get(&from) else {
                    continue;
                };
                for &to in destinations {
                    if self.pending.len() < self.queue_capacity {
                        self.pending.push_back((to, emitted));
                    } else {
                        self.dropped += 1;
                    }
                }
            }
        }
        self.scratch.clear();
    }

    /// Advance the whole graph by one sample and return the output value
    pub fn tick(&mut self) -> f32 {
        self.deliver_events();

        for (position, step) in self.schedule.iter().enumerate() {
            let mut inputs = StreamValues::new();
            for input in &step.inputs {
                if input.sources.is_empty() {
                    inputs.set(input.port, input.default);
                }
                for &(source, port) in &input.sources {
                    inputs.accumulate(input.port, self.values[source].get(port));
                }
            }

            let mut outputs = StreamValues::new();
            if let Some(node) = self.nodes.get_mut(step.node) {
                node.unit.tick(&inputs, &mut outputs);
            }
            self.values[position] = outputs;
        }

        self.sample_index += 1;
        match self.output_slot {
            Some((position, port)) if self.compiled => self.values[position].get(port),
            _ => 0.0,
        }
    }

    /// Fill a block of samples
    pub fn process(&mut self, output: &mut [f32]) -> Result<(), GraphError> {
        if !self.compiled {
            return Err(GraphError::NotCompiled);
        }
        for sample in output.iter_mut() {
            *sample = self.tick();
        }
        Ok(())
    }

    /// Reset every unit and clear in-flight events and stream values
    pub fn reset(&mut self) {
        for node in self.nodes.values_mut() {
            node.unit.reset();
        }
        for values in &mut self.values {
            values.clear();
        }
        self.pending.clear();
        self.sample_index = 0;
    }

    /// Iterate over all nodes
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &str, &UnitKind)> {
        self.nodes
            .iter()
            .map(|(id, node)| (id, node.name.as_str(), &node.unit))
    }
}
