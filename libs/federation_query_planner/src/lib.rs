use plan_executor::datasource::{DataSource, Instruction};
use plan_executor::executor::{ExecutionContext, Executor};
use plan_executor::plan::Object;
use std::sync::Arc;
use switchboard_common::graphql::{
  parse_graphql_operation, GraphQLRequest, GraphQLResponse, ParsedGraphQLDocument,
};

pub mod abstract_rewrite;
pub mod error;
pub mod node_selection;
pub mod operation;
pub mod plan_builder;
pub mod suggestions;
pub mod supergraph;

pub use error::PlannerError;
use node_selection::NodeSelectionVisitor;
use operation::Operation;
use suggestions::NodeSuggestions;
use supergraph::Supergraph;

/// A settled plan: the executable tree plus the operation and suggestions it
/// was derived from.
pub struct PlannedOperation {
  pub root: Object,
  pub operation: Operation,
  pub suggestions: NodeSuggestions,
}

/// Runs the node-selection passes to their fixed point and builds the
/// executable plan tree.
#[tracing::instrument(level = "debug", skip_all)]
pub fn plan_operation(
  document: &ParsedGraphQLDocument,
  operation_name: Option<&str>,
  supergraph: &Supergraph,
  data_sources: &[Arc<dyn DataSource>],
) -> Result<PlannedOperation, PlannerError> {
  let mut operation = Operation::from_document(document, operation_name)?;

  let outcome = {
    let mut visitor = NodeSelectionVisitor::new(&mut operation, supergraph, data_sources);
    loop {
      visitor.walk()?;
      if visitor.has_new_fields() {
        continue;
      }
      if visitor.has_unresolved_fields() {
        // a pass without new fields cannot make further progress
        return Err(visitor.unresolved_error());
      }
      break;
    }
    visitor.into_outcome()
  };

  let root = plan_builder::build_plan(&operation, supergraph, data_sources, &outcome)?;

  Ok(PlannedOperation {
    root,
    operation,
    suggestions: outcome.suggestions,
  })
}

/// Plans and executes federated operations against a supergraph.
pub struct FederationExecutor<'a> {
  pub supergraph: &'a Supergraph,
  pub data_sources: Vec<Arc<dyn DataSource>>,
}

impl<'a> FederationExecutor<'a> {
  pub fn new(supergraph: &'a Supergraph) -> Self {
    FederationExecutor {
      supergraph,
      data_sources: supergraph.data_sources(),
    }
  }

  pub fn with_data_sources(
    supergraph: &'a Supergraph,
    data_sources: Vec<Arc<dyn DataSource>>,
  ) -> Self {
    FederationExecutor {
      supergraph,
      data_sources,
    }
  }

  /// Plans the request and executes it into a GraphQL response, together
  /// with the stream-control instructions of every fetch. Failures along the
  /// way fold into the response's errors array, as a gateway answer does.
  pub async fn execute_federation(
    &self,
    request: &GraphQLRequest,
  ) -> (GraphQLResponse, Vec<Instruction>) {
    match self.plan_and_execute(request).await {
      Ok(result) => result,
      Err(error) => (GraphQLResponse::new_error(&error.to_string()), Vec::new()),
    }
  }

  async fn plan_and_execute(
    &self,
    request: &GraphQLRequest,
  ) -> Result<(GraphQLResponse, Vec<Instruction>), anyhow::Error> {
    let document = parse_graphql_operation(&request.operation)?;
    let planned = plan_operation(
      &document,
      request.operation_name.as_deref(),
      self.supergraph,
      &self.data_sources,
    )?;

    let ctx = match &request.variables {
      Some(variables) => ExecutionContext::with_variables(variables),
      None => ExecutionContext::new(),
    };

    let mut data = Vec::new();
    let instructions = Executor::new().execute(&ctx, &planned.root, &mut data).await?;

    Ok((
      GraphQLResponse::new(serde_json::from_slice(&data)?),
      instructions,
    ))
  }
}
