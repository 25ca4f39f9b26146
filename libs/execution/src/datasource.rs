use crate::executor::{ExecutionContext, ResolvedArgs};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

/// Stream-control signal returned by every fetch. The caller decides how to
/// apply the ordered sequence (close the response stream, keep a
/// subscription open, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
  KeepStreamAlive,
  CloseConnection,
  CloseConnectionIfNotStream,
}

/// A `@key` or `@requires` selection owned by a data source.
///
/// `field_name` is empty for key entries. `resolvable: false` marks keys of
/// entities with a disabled entity resolver; they only matter for the
/// `@requires` fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
  pub type_name: String,
  pub field_name: String,
  pub selection_set: String,
  pub resolvable: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationConfiguration {
  pub keys: Vec<FieldConfig>,
}

impl FederationConfiguration {
  pub fn keys_for_type(&self, type_name: &str, resolvable: bool) -> Vec<FieldConfig> {
    self
      .keys
      .iter()
      .filter(|key| key.type_name == type_name && key.resolvable == resolvable)
      .cloned()
      .collect()
  }
}

pub type SchemaDocument = graphql_parser::schema::Document<'static, String>;

pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Instruction> + Send + 'a>>;

/// A subgraph the gateway can plan against and fetch from, identified by a
/// stable 64-bit hash.
///
/// `resolve` writes the subgraph response into `out`; transport and subgraph
/// failures are surfaced through the buffer content as a GraphQL errors
/// payload, never through the return value.
pub trait DataSource: Debug + Send + Sync {
  fn hash(&self) -> u64;

  fn resolve<'a>(
    &'a self,
    ctx: &'a ExecutionContext,
    args: ResolvedArgs,
    out: &'a mut BytesMut,
  ) -> ResolveFuture<'a>;

  fn required_fields_by_key(&self, type_name: &str) -> Vec<FieldConfig>;

  fn required_fields_by_requires(&self, type_name: &str, field_name: &str) -> Option<FieldConfig>;

  fn has_key_requirement(&self, type_name: &str, selection_set: &str) -> bool;

  fn has_interface_object(&self, _type_name: &str) -> bool {
    false
  }

  fn has_entity_interface(&self, _type_name: &str) -> bool {
    false
  }

  fn upstream_schema(&self) -> Option<&SchemaDocument> {
    None
  }

  fn federation_configuration(&self) -> &FederationConfiguration;
}

/// Federation capabilities of one subgraph, precomputed from the supergraph
/// schema. Concrete [`DataSource`] implementations delegate their metadata
/// queries here.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphFederationMetadata {
  /// Resolvable and non-resolvable keys per type name.
  pub keys: HashMap<String, Vec<FieldConfig>>,
  /// `@requires` configuration keyed by `Type.field`.
  pub requires: HashMap<String, FieldConfig>,
  /// Types this subgraph represents as an interface object.
  pub interface_objects: HashSet<String>,
  /// Interfaces this subgraph treats as entities (`@key` on an interface).
  pub entity_interfaces: HashSet<String>,
  pub federation: FederationConfiguration,
}

impl SubgraphFederationMetadata {
  pub fn required_fields_by_key(&self, type_name: &str) -> Vec<FieldConfig> {
    self
      .keys
      .get(type_name)
      .map(|keys| keys.iter().filter(|k| k.resolvable).cloned().collect())
      .unwrap_or_default()
  }

  pub fn required_fields_by_requires(
    &self,
    type_name: &str,
    field_name: &str,
  ) -> Option<FieldConfig> {
    self.requires.get(&format!("{type_name}.{field_name}")).cloned()
  }

  pub fn has_key_requirement(&self, type_name: &str, selection_set: &str) -> bool {
    let wanted = normalize_selection(selection_set);
    self
      .keys
      .get(type_name)
      .is_some_and(|keys| keys.iter().any(|k| normalize_selection(&k.selection_set) == wanted))
  }
}

/// Whitespace-insensitive form of a key selection set, for comparisons like
/// `"id organization { id }"` vs `" id  organization {id} "`.
fn normalize_selection(selection_set: &str) -> String {
  selection_set
    .replace('{', " { ")
    .replace('}', " } ")
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(type_name: &str, selection_set: &str, resolvable: bool) -> FieldConfig {
    FieldConfig {
      type_name: type_name.to_string(),
      field_name: String::new(),
      selection_set: selection_set.to_string(),
      resolvable,
    }
  }

  #[test]
  fn key_lookup_ignores_whitespace_differences() {
    let mut metadata = SubgraphFederationMetadata::default();
    metadata
      .keys
      .insert("User".to_string(), vec![key("User", "id organization { id }", true)]);

    assert!(metadata.has_key_requirement("User", " id  organization {id} "));
    assert!(!metadata.has_key_requirement("User", "id"));
    assert!(!metadata.has_key_requirement("Review", "id"));
  }

  #[test]
  fn non_resolvable_keys_are_filtered_from_key_lookup() {
    let mut metadata = SubgraphFederationMetadata::default();
    metadata
      .keys
      .insert("User".to_string(), vec![key("User", "id", false)]);
    metadata.federation.keys.push(key("User", "id", false));

    assert!(metadata.required_fields_by_key("User").is_empty());
    assert_eq!(metadata.federation.keys_for_type("User", false).len(), 1);
  }
}
