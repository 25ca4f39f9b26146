use bytes::Bytes;
use graphql_parser::{
  parse_query, parse_schema,
  query::{Document, ParseError},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GraphQLRequest {
  // The GraphQL operation, as string
  #[serde(rename = "query")]
  pub operation: String,
  // The operation name, if specified
  #[serde(rename = "operationName")]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub operation_name: Option<String>,
  // GraphQL operation variables, in JSON format
  pub variables: Option<Map<String, Value>>,
  // GraphQL execution extensions, in JSON format
  #[serde(skip_serializing_if = "Option::is_none")]
  pub extensions: Option<Map<String, Value>>,
}

/// An error with a message and optional extensions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphQLError {
  /// The error message.
  pub message: String,
  /// Extensions to the error.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
  pub fn new(message: &str) -> Self {
    GraphQLError {
      message: message.to_string(),
      extensions: None,
    }
  }
}

pub type ParsedGraphQLDocument = Document<'static, String>;
pub type ParsedGraphQLSchema = graphql_parser::schema::Document<'static, String>;

#[derive(Deserialize, Serialize, Debug)]
pub struct GraphQLResponse {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub errors: Option<Vec<GraphQLError>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub extensions: Option<Value>,
}

impl GraphQLResponse {
  pub fn new(data: Value) -> Self {
    GraphQLResponse {
      data: Some(data),
      errors: None,
      extensions: None,
    }
  }

  pub fn new_error(error: &str) -> Self {
    GraphQLResponse {
      data: None,
      errors: Some(vec![GraphQLError::new(error)]),
      extensions: None,
    }
  }
}

impl From<GraphQLResponse> for Bytes {
  fn from(response: GraphQLResponse) -> Self {
    serde_json::to_vec(&response).unwrap().into()
  }
}

pub fn parse_graphql_operation(operation_str: &str) -> Result<ParsedGraphQLDocument, ParseError> {
  parse_query::<String>(operation_str).map(|v| v.into_static())
}

pub fn parse_graphql_schema(
  schema_str: &str,
) -> Result<ParsedGraphQLSchema, graphql_parser::schema::ParseError> {
  parse_schema::<String>(schema_str).map(|v| v.into_static())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn requests_deserialize_with_variables() {
    let request: GraphQLRequest = serde_json::from_slice(
      br#"{"query":"query($id: ID!) { user(id: $id) { name } }","variables":{"id":"u1"}}"#,
    )
    .unwrap();

    assert_eq!(
      request.operation,
      "query($id: ID!) { user(id: $id) { name } }"
    );
    assert_eq!(
      request.variables.unwrap().get("id"),
      Some(&Value::String("u1".to_string()))
    );
  }

  #[test]
  fn data_responses_skip_absent_members() {
    let body = Bytes::from(GraphQLResponse::new(serde_json::json!({"me": {"id": "u1"}})));
    assert_eq!(&body[..], br#"{"data":{"me":{"id":"u1"}}}"#);
  }

  #[test]
  fn error_responses_serialize_an_errors_array() {
    let body = Bytes::from(GraphQLResponse::new_error("boom"));
    assert_eq!(&body[..], br#"{"errors":[{"message":"boom"}]}"#);
  }

  #[test]
  fn operation_parsing_reports_malformed_documents() {
    assert!(parse_graphql_operation("query { me { id } }").is_ok());
    assert!(parse_graphql_operation("query {").is_err());
  }
}
