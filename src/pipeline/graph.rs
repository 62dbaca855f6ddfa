//! The pipeline graph: named stages wired port-to-port into a DAG and
//! executed as a unit.
//!
//! A graph is assembled once (`add_stage` + `connect`), checked
//! (`validate`), and consumed by a single `run` call. Nothing is pooled or
//! reused across calls; the execution service builds a fresh graph per
//! request so no state can leak between them.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::time::Instant;

use super::PipelineError;
use crate::models::{Document, SparseVector};

/// A value travelling between stage ports.
#[derive(Debug, Clone)]
pub enum StageValue {
    Text(String),
    Documents(Vec<Document>),
    Embedding(Vec<f32>),
    SparseEmbedding(SparseVector),
    Replies(Vec<String>),
    Count(usize),
}

impl StageValue {
    /// Short label used in port type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            StageValue::Text(_) => "text",
            StageValue::Documents(_) => "documents",
            StageValue::Embedding(_) => "embedding",
            StageValue::SparseEmbedding(_) => "sparse_embedding",
            StageValue::Replies(_) => "replies",
            StageValue::Count(_) => "count",
        }
    }
}

/// One named processing unit. Ports are declared up front so wiring can be
/// checked before anything runs.
pub trait Stage: Send + Sync {
    fn input_ports(&self) -> &'static [&'static str];
    fn output_ports(&self) -> &'static [&'static str];
    fn run(
        &self,
        inputs: BTreeMap<String, StageValue>,
    ) -> Result<BTreeMap<String, StageValue>, PipelineError>;
}

/// Pop a text value off a stage's input map.
pub fn take_text(
    inputs: &mut BTreeMap<String, StageValue>,
    stage: &str,
    port: &str,
) -> Result<String, PipelineError> {
    match inputs.remove(port) {
        Some(StageValue::Text(text)) => Ok(text),
        Some(other) => Err(PipelineError::PortType {
            stage: stage.to_string(),
            port: port.to_string(),
            got: other.kind(),
        }),
        None => Err(PipelineError::MissingInput {
            stage: stage.to_string(),
            port: port.to_string(),
        }),
    }
}

/// Pop a document list off a stage's input map.
pub fn take_documents(
    inputs: &mut BTreeMap<String, StageValue>,
    stage: &str,
    port: &str,
) -> Result<Vec<Document>, PipelineError> {
    match inputs.remove(port) {
        Some(StageValue::Documents(docs)) => Ok(docs),
        Some(other) => Err(PipelineError::PortType {
            stage: stage.to_string(),
            port: port.to_string(),
            got: other.kind(),
        }),
        None => Err(PipelineError::MissingInput {
            stage: stage.to_string(),
            port: port.to_string(),
        }),
    }
}

/// Pop a dense embedding off a stage's input map.
pub fn take_embedding(
    inputs: &mut BTreeMap<String, StageValue>,
    stage: &str,
    port: &str,
) -> Result<Vec<f32>, PipelineError> {
    match inputs.remove(port) {
        Some(StageValue::Embedding(vector)) => Ok(vector),
        Some(other) => Err(PipelineError::PortType {
            stage: stage.to_string(),
            port: port.to_string(),
            got: other.kind(),
        }),
        None => Err(PipelineError::MissingInput {
            stage: stage.to_string(),
            port: port.to_string(),
        }),
    }
}

/// Pop a sparse embedding off a stage's input map.
pub fn take_sparse_embedding(
    inputs: &mut BTreeMap<String, StageValue>,
    stage: &str,
    port: &str,
) -> Result<SparseVector, PipelineError> {
    match inputs.remove(port) {
        Some(StageValue::SparseEmbedding(vector)) => Ok(vector),
        Some(other) => Err(PipelineError::PortType {
            stage: stage.to_string(),
            port: port.to_string(),
            got: other.kind(),
        }),
        None => Err(PipelineError::MissingInput {
            stage: stage.to_string(),
            port: port.to_string(),
        }),
    }
}

/// External inputs for one run, keyed stage name → port name → value.
pub type PipelineInputs = BTreeMap<String, BTreeMap<String, StageValue>>;

/// Output bundle of one run: leaf outputs (ports no connection consumed)
/// plus all ports of any stage the caller asked to capture.
#[derive(Debug, Default)]
pub struct PipelineOutputs {
    values: BTreeMap<String, BTreeMap<String, StageValue>>,
}

impl PipelineOutputs {
    pub fn get(&self, stage: &str, port: &str) -> Option<&StageValue> {
        self.values.get(stage).and_then(|ports| ports.get(port))
    }

    pub fn contains_stage(&self, stage: &str) -> bool {
        self.values.contains_key(stage)
    }

    pub fn replies(&self, stage: &str) -> Option<&[String]> {
        match self.get(stage, "replies") {
            Some(StageValue::Replies(replies)) => Some(replies),
            _ => None,
        }
    }

    pub fn documents(&self, stage: &str, port: &str) -> Option<&[Document]> {
        match self.get(stage, port) {
            Some(StageValue::Documents(docs)) => Some(docs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Connection {
    from_stage: String,
    from_port: String,
    to_stage: String,
    to_port: String,
}

/// A DAG of wired stages, executed as a unit for one call.
#[derive(Default)]
pub struct PipelineGraph {
    stages: BTreeMap<String, Box<dyn Stage>>,
    connections: Vec<Connection>,
}

// `dyn Stage` has no `Debug` bound, so show stage names instead of deriving.
impl fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .field("connections", &self.connections)
            .finish()
    }
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage under a unique name.
    pub fn add_stage(
        &mut self,
        name: impl Into<String>,
        stage: Box<dyn Stage>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.stages.contains_key(&name) {
            return Err(PipelineError::Wiring(format!(
                "stage {name} is already registered"
            )));
        }
        self.stages.insert(name, stage);
        Ok(())
    }

    /// Wire an output port to an input port.
    ///
    /// Endpoints are `"stage.port"`, or a bare `"stage"` when that side has
    /// exactly one port. Each input port accepts at most one connection.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<(), PipelineError> {
        let (from_stage, from_port) = self.resolve_endpoint(from, Direction::Output)?;
        let (to_stage, to_port) = self.resolve_endpoint(to, Direction::Input)?;

        if self
            .connections
            .iter()
            .any(|c| c.to_stage == to_stage && c.to_port == to_port)
        {
            return Err(PipelineError::Wiring(format!(
                "input port {to_stage}.{to_port} is already connected"
            )));
        }

        self.connections.push(Connection {
            from_stage,
            from_port,
            to_stage,
            to_port,
        });
        Ok(())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.keys().map(String::as_str).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// True when `from` feeds `to`, using the same endpoint syntax as
    /// [`connect`](Self::connect).
    pub fn has_connection(&self, from: &str, to: &str) -> bool {
        let Ok((from_stage, from_port)) = self.resolve_endpoint(from, Direction::Output) else {
            return false;
        };
        let Ok((to_stage, to_port)) = self.resolve_endpoint(to, Direction::Input) else {
            return false;
        };
        self.connections.iter().any(|c| {
            c.from_stage == from_stage
                && c.from_port == from_port
                && c.to_stage == to_stage
                && c.to_port == to_port
        })
    }

    /// Check the wiring forms a DAG. Factories call this after assembly so
    /// a mis-wired graph fails during construction, not mid-run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.topological_order().map(|_| ())
    }

    /// Execute the graph over the given external inputs, consuming it.
    ///
    /// Before any stage runs, every declared input port must be covered by
    /// exactly one of a connection or an external input. Stage failures
    /// propagate unchanged after being logged with their stage name.
    pub fn run(
        self,
        inputs: PipelineInputs,
        include_outputs_from: &[String],
    ) -> Result<PipelineOutputs, PipelineError> {
        self.check_external_inputs(&inputs)?;
        self.check_port_coverage(&inputs)?;
        let order = self.topological_order()?;

        let mut pending: PipelineInputs = inputs;
        let mut produced: BTreeMap<String, BTreeMap<String, StageValue>> = BTreeMap::new();

        for name in &order {
            let mut stage_inputs = pending.remove(name).unwrap_or_default();
            for conn in self.connections.iter().filter(|c| &c.to_stage == name) {
                let value = produced
                    .get(&conn.from_stage)
                    .and_then(|ports| ports.get(&conn.from_port))
                    .cloned()
                    .ok_or_else(|| {
                        PipelineError::Wiring(format!(
                            "stage {} produced no value on port {} needed by {}",
                            conn.from_stage, conn.from_port, conn.to_stage
                        ))
                    })?;
                stage_inputs.insert(conn.to_port.clone(), value);
            }

            let started = Instant::now();
            let outputs = self.stages[name].run(stage_inputs).map_err(|e| {
                tracing::error!(stage = %name, error = %e, "Pipeline stage failed");
                e
            })?;
            tracing::debug!(
                stage = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Stage completed"
            );
            produced.insert(name.clone(), outputs);
        }

        // Keep leaf ports; add everything from explicitly captured stages.
        let consumed: BTreeSet<(&str, &str)> = self
            .connections
            .iter()
            .map(|c| (c.from_stage.as_str(), c.from_port.as_str()))
            .collect();
        let mut values: BTreeMap<String, BTreeMap<String, StageValue>> = BTreeMap::new();
        for (stage, ports) in produced {
            let capture_all = include_outputs_from.iter().any(|s| s == &stage);
            let kept: BTreeMap<String, StageValue> = ports
                .into_iter()
                .filter(|(port, _)| {
                    capture_all || !consumed.contains(&(stage.as_str(), port.as_str()))
                })
                .collect();
            if !kept.is_empty() {
                values.insert(stage, kept);
            }
        }
        Ok(PipelineOutputs { values })
    }

    fn resolve_endpoint(
        &self,
        endpoint: &str,
        direction: Direction,
    ) -> Result<(String, String), PipelineError> {
        let (stage_name, port) = match endpoint.split_once('.') {
            Some((stage, port)) => (stage, Some(port)),
            None => (endpoint, None),
        };
        let stage = self.stages.get(stage_name).ok_or_else(|| {
            PipelineError::Wiring(format!("unknown stage {stage_name} in endpoint {endpoint}"))
        })?;
        let ports = match direction {
            Direction::Input => stage.input_ports(),
            Direction::Output => stage.output_ports(),
        };
        let port = match port {
            Some(port) => {
                if !ports.contains(&port) {
                    return Err(PipelineError::Wiring(format!(
                        "stage {stage_name} has no {} port {port}",
                        direction.label()
                    )));
                }
                port
            }
            None => match ports {
                [only] => *only,
                _ => {
                    return Err(PipelineError::Wiring(format!(
                        "stage {stage_name} has {} {} ports, name one explicitly",
                        ports.len(),
                        direction.label()
                    )))
                }
            },
        };
        Ok((stage_name.to_string(), port.to_string()))
    }

    /// Reject inputs naming unknown stages, unknown ports, or ports a
    /// connection already feeds.
    fn check_external_inputs(&self, inputs: &PipelineInputs) -> Result<(), PipelineError> {
        for (stage_name, ports) in inputs {
            let stage = self.stages.get(stage_name).ok_or_else(|| {
                PipelineError::Validation(format!("input for unknown stage {stage_name}"))
            })?;
            for port in ports.keys() {
                if !stage.input_ports().contains(&port.as_str()) {
                    return Err(PipelineError::Validation(format!(
                        "stage {stage_name} has no input port {port}"
                    )));
                }
                if self
                    .connections
                    .iter()
                    .any(|c| &c.to_stage == stage_name && &c.to_port == port)
                {
                    return Err(PipelineError::Validation(format!(
                        "input port {stage_name}.{port} is fed by a connection"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every declared input port must be covered before execution starts.
    fn check_port_coverage(&self, inputs: &PipelineInputs) -> Result<(), PipelineError> {
        for (name, stage) in &self.stages {
            for port in stage.input_ports() {
                let connected = self
                    .connections
                    .iter()
                    .any(|c| &c.to_stage == name && c.to_port == *port);
                let provided = inputs
                    .get(name)
                    .map(|ports| ports.contains_key(*port))
                    .unwrap_or(false);
                if !connected && !provided {
                    return Err(PipelineError::MissingInput {
                        stage: name.clone(),
                        port: (*port).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Kahn's algorithm over stage-level dependencies; leftovers mean a
    /// cycle.
    fn topological_order(&self) -> Result<Vec<String>, PipelineError> {
        let mut indegree: BTreeMap<&str, usize> =
            self.stages.keys().map(|name| (name.as_str(), 0)).collect();
        let mut edges: BTreeSet<(&str, &str)> = BTreeSet::new();
        for conn in &self.connections {
            // Parallel port connections between the same pair count once.
            if edges.insert((conn.from_stage.as_str(), conn.to_stage.as_str())) {
                if let Some(count) = indegree.get_mut(conn.to_stage.as_str()) {
                    *count += 1;
                }
            }
        }

        let mut ready: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.stages.len());
        while let Some(name) = ready.pop_front() {
            order.push(name.to_string());
            for (_, to) in edges.iter().filter(|(from, _)| *from == name) {
                let count = indegree.get_mut(to).ok_or_else(|| {
                    PipelineError::Wiring(format!("connection references unknown stage {to}"))
                })?;
                *count -= 1;
                if *count == 0 {
                    ready.push_back(to);
                }
            }
        }

        if order.len() != self.stages.len() {
            return Err(PipelineError::Wiring(
                "pipeline graph contains a cycle".into(),
            ));
        }
        Ok(order)
    }
}

enum Direction {
    Input,
    Output,
}

impl Direction {
    fn label(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}
