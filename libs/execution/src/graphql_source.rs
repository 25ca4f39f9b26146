use crate::datasource::{
  DataSource, FederationConfiguration, FieldConfig, Instruction, ResolveFuture, SchemaDocument,
  SubgraphFederationMetadata,
};
use crate::executor::{resolved_arg_by_key, ExecutionContext, ResolvedArgs};
use bytes::BytesMut;
use serde_json::{Map, Value};
use tracing::Instrument;
use xxhash_rust::xxh64::xxh64;

/// The stock GraphQL-over-HTTP subgraph source.
///
/// Transport and subgraph failures never escape `resolve`: they are folded
/// into the buffer as a GraphQL errors payload so sibling fetches in a
/// parallel group keep running.
#[derive(Debug)]
pub struct GraphQLSubgraphSource {
  pub name: String,
  pub url: String,
  hash: u64,
  pub metadata: SubgraphFederationMetadata,
  pub upstream_schema: Option<SchemaDocument>,
  client: reqwest::Client,
}

impl GraphQLSubgraphSource {
  pub fn new(
    name: impl Into<String>,
    url: impl Into<String>,
    metadata: SubgraphFederationMetadata,
  ) -> Self {
    let name = name.into();
    GraphQLSubgraphSource {
      hash: xxh64(name.as_bytes(), 0),
      name,
      url: url.into(),
      metadata,
      upstream_schema: None,
      client: reqwest::Client::new(),
    }
  }

  /// Builds the request body from resolved arguments: `query` becomes the
  /// operation, every other argument becomes a variable (parsed as JSON when
  /// possible, carried as a string otherwise).
  fn request_body(args: &ResolvedArgs) -> Value {
    let query = resolved_arg_by_key(args, "query")
      .map(|value| String::from_utf8_lossy(value).into_owned())
      .unwrap_or_default();

    let mut variables = Map::new();
    for arg in args {
      if arg.key == "query" {
        continue;
      }
      let value = serde_json::from_slice::<Value>(&arg.value)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&arg.value).into_owned()));
      variables.insert(arg.key.clone(), value);
    }

    serde_json::json!({ "query": query, "variables": variables })
  }

  fn write_error(out: &mut BytesMut, message: &str) {
    let payload = serde_json::json!({ "errors": [{ "message": message }] });
    out.extend_from_slice(payload.to_string().as_bytes());
  }
}

impl DataSource for GraphQLSubgraphSource {
  fn hash(&self) -> u64 {
    self.hash
  }

  fn resolve<'a>(
    &'a self,
    ctx: &'a ExecutionContext,
    args: ResolvedArgs,
    out: &'a mut BytesMut,
  ) -> ResolveFuture<'a> {
    Box::pin(async move {
      let body = Self::request_body(&args);
      let span = tracing::info_span!(
        "subgraph_request",
        service_name = %self.name,
        url = %self.url,
      );

      let request = self
        .client
        .post(&self.url)
        .header("Content-Type", "application/json")
        .json(&body)
        .send();

      let response = tokio::select! {
        _ = ctx.cancellation.cancelled() => {
          Self::write_error(out, "request cancelled");
          return Instruction::CloseConnection;
        }
        response = request.instrument(span) => response,
      };

      let response = match response {
        Ok(response) => response,
        Err(err) => {
          tracing::warn!("subgraph request to '{}' failed: {}", self.name, err);
          Self::write_error(out, &format!("failed to send request: {err}"));
          return Instruction::CloseConnectionIfNotStream;
        }
      };

      if !response.status().is_success() {
        let status = response.status();
        tracing::warn!("subgraph '{}' returned status {}", self.name, status);
        Self::write_error(out, &format!("failed request with status: {status}"));
        return Instruction::CloseConnectionIfNotStream;
      }

      let payload = match response.bytes().await {
        Ok(payload) => payload,
        Err(err) => {
          Self::write_error(out, &format!("failed to read response: {err}"));
          return Instruction::CloseConnectionIfNotStream;
        }
      };

      // surface the `data` value to the renderer; an error payload passes
      // through untouched so the caller sees the subgraph's errors array
      match switchboard_common::json::get(&payload, &["data"]) {
        Some(data) if data != b"null" => out.extend_from_slice(data),
        _ => out.extend_from_slice(&payload),
      }
      Instruction::CloseConnectionIfNotStream
    })
  }

  fn required_fields_by_key(&self, type_name: &str) -> Vec<FieldConfig> {
    self.metadata.required_fields_by_key(type_name)
  }

  fn required_fields_by_requires(&self, type_name: &str, field_name: &str) -> Option<FieldConfig> {
    self.metadata.required_fields_by_requires(type_name, field_name)
  }

  fn has_key_requirement(&self, type_name: &str, selection_set: &str) -> bool {
    self.metadata.has_key_requirement(type_name, selection_set)
  }

  fn has_interface_object(&self, type_name: &str) -> bool {
    self.metadata.interface_objects.contains(type_name)
  }

  fn has_entity_interface(&self, type_name: &str) -> bool {
    self.metadata.entity_interfaces.contains(type_name)
  }

  fn upstream_schema(&self) -> Option<&SchemaDocument> {
    self.upstream_schema.as_ref()
  }

  fn federation_configuration(&self) -> &FederationConfiguration {
    &self.metadata.federation
  }
}
