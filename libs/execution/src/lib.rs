pub mod datasource;
pub mod executor;
pub mod graphql_source;
pub mod plan;

pub use datasource::{
  DataSource, FederationConfiguration, FieldConfig, Instruction, SubgraphFederationMetadata,
};
pub use executor::{
  resolve_args, ExecuteError, ExecutionContext, Executor, LockableBufferMap, ResolvedArgs,
  Variables,
};
pub use graphql_source::GraphQLSubgraphSource;
pub use plan::{
  Argument, DataSourceInvocation, Fetch, Field, List, ListFilter, Object, OperationType, PlanNode,
  SingleFetch, SkipCondition, Value,
};
