use crate::datasource::DataSource;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
  Query,
  Mutation,
  Subscription,
}

impl OperationType {
  /// Root segment of all buffer paths for this operation.
  pub fn root_path(&self) -> &'static str {
    match self {
      OperationType::Query => "query",
      OperationType::Mutation => "mutation",
      OperationType::Subscription => "subscription",
    }
  }
}

impl Display for OperationType {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      OperationType::Query => write!(f, "query"),
      OperationType::Mutation => write!(f, "mutation"),
      OperationType::Subscription => write!(f, "subscription"),
    }
  }
}

/// The tree the executor walks. Closed set, dispatched exhaustively.
#[derive(Debug)]
pub enum PlanNode {
  Object(Object),
  List(List),
  Value(Value),
}

impl PlanNode {
  pub fn has_resolvers(&self) -> bool {
    match self {
      PlanNode::Object(object) => object.has_resolvers(),
      PlanNode::List(list) => list.value.has_resolvers(),
      PlanNode::Value(_) => false,
    }
  }
}

#[derive(Debug)]
pub struct Object {
  pub fields: Vec<Field>,
  /// Navigation into the current data before rendering, empty at the root.
  pub path: Vec<String>,
  pub fetch: Option<Fetch>,
  pub operation_type: OperationType,
}

impl Object {
  pub fn has_resolvers(&self) -> bool {
    self.fields.iter().any(Field::has_resolvers)
  }
}

#[derive(Debug)]
pub struct Field {
  pub name: String,
  pub value: PlanNode,
  pub skip: Option<SkipCondition>,
  /// When set, the field's data comes from the buffer at the field's path
  /// hash instead of the enclosing object's data.
  pub has_resolver: bool,
}

impl Field {
  pub fn has_resolvers(&self) -> bool {
    self.has_resolver || self.value.has_resolvers()
  }
}

#[derive(Debug)]
pub struct Value {
  pub path: Vec<String>,
  pub quote: bool,
}

#[derive(Debug)]
pub struct List {
  pub path: Vec<String>,
  pub value: Box<PlanNode>,
  pub filter: Option<ListFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
  FirstN(usize),
}

/// Fetch attached to an [`Object`] that spans a subgraph boundary.
#[derive(Debug)]
pub enum Fetch {
  Single(SingleFetch),
  /// Runs in order; later fetches depend on buffers of earlier ones.
  Serial(Vec<Fetch>),
  /// Runs concurrently and joins before rendering continues.
  Parallel(Vec<Fetch>),
}

#[derive(Debug)]
pub struct SingleFetch {
  pub source: DataSourceInvocation,
  /// Buffer key suffix; the full buffer name is `<object path>.<buffer_name>`.
  pub buffer_name: String,
}

#[derive(Debug)]
pub struct DataSourceInvocation {
  pub args: Vec<Argument>,
  pub data_source: Arc<dyn DataSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
  Static {
    name: String,
    value: Vec<u8>,
  },
  /// Resolved from the execution context variables by name hash.
  ContextVariable {
    name: String,
    variable_name: String,
  },
  /// Resolved by JSON-navigating the data the enclosing object was rendered
  /// from. Arguments named with a leading dot are planner-internal and are
  /// filtered out after template resolution.
  ObjectVariable {
    name: String,
    path: Vec<String>,
  },
  List {
    name: String,
    arguments: Vec<Argument>,
  },
}

impl Argument {
  pub fn name(&self) -> &str {
    match self {
      Argument::Static { name, .. } => name,
      Argument::ContextVariable { name, .. } => name,
      Argument::ObjectVariable { name, .. } => name,
      Argument::List { name, .. } => name,
    }
  }
}

/// Field-level omission condition, evaluated against the current data.
#[derive(Debug, Clone)]
pub enum SkipCondition {
  IfEqual { left: Argument, right: Argument },
  IfNotEqual { left: Argument, right: Argument },
}
