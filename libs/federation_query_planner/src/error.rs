/// Fatal planner failures. Each message names the type, field and path
/// involved so the caller can produce a precise diagnostic.
#[derive(thiserror::Error, Debug)]
pub enum PlannerError {
  #[error("no operation named \"{operation_name}\" found in the document")]
  OperationNotFound { operation_name: String },

  #[error("fragment named \"{fragment_name}\" is not defined in your query!")]
  UnknownFragment { fragment_name: String },

  #[error("type \"{type_name}\" is not defined in the supergraph schema")]
  UnknownType { type_name: String },

  #[error("field \"{field_name}\" is not available on type \"{type_name}\" at path \"{path}\"")]
  UnknownField {
    type_name: String,
    field_name: String,
    path: String,
  },

  #[error(
    "no data source matches the selected suggestion for field \"{field_name}\" of type \"{type_name}\" at path \"{path}\""
  )]
  SuggestionWithoutDataSource {
    type_name: String,
    field_name: String,
    path: String,
  },

  #[error("field \"{field_name}\" of type \"{type_name}\" at path \"{path}\" cannot be resolved by any data source")]
  UnresolvedField {
    type_name: String,
    field_name: String,
    path: String,
  },

  #[error("no data source can satisfy the key requirement for type \"{type_name}\" at path \"{path}\"")]
  UnsatisfiableKeyRequirement { type_name: String, path: String },

  #[error("failed to parse required fields \"{selection_set}\" for {type_name} at path {path}")]
  RequiredFieldsParse {
    selection_set: String,
    type_name: String,
    path: String,
  },

  #[error("failed to add required fields \"{selection_set}\" for {type_name} at path {path}")]
  RequiredFieldsInjection {
    selection_set: String,
    type_name: String,
    path: String,
  },
}
