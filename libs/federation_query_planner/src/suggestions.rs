use crate::error::PlannerError;
use crate::operation::{Operation, Selection, SelectionSetRef};
use crate::supergraph::{unwrap_graphql_type, Supergraph};
use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// One candidate data source for a field path. The planner consumes these;
/// `selected` marks the candidate the selection algorithm picked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSuggestion {
  pub path: String,
  pub type_name: String,
  pub field_name: String,
  pub source_name: String,
  pub data_source_hash: u64,
  pub selected: bool,
  pub is_required_key_field: bool,
}

/// The planner's input oracle: candidate data sources per field path.
#[derive(Debug, Default, Serialize)]
pub struct NodeSuggestions {
  items: Vec<NodeSuggestion>,
}

impl NodeSuggestions {
  pub fn new() -> Self {
    NodeSuggestions::default()
  }

  pub fn add(&mut self, suggestion: NodeSuggestion) {
    self.items.push(suggestion);
  }

  pub fn iter(&self) -> impl Iterator<Item = &NodeSuggestion> {
    self.items.iter()
  }

  pub fn has_suggestion(&self, type_name: &str, field_name: &str, path: &str) -> bool {
    self
      .items
      .iter()
      .any(|item| item.type_name == type_name && item.field_name == field_name && item.path == path)
  }

  pub fn suggestions_for_path(
    &self,
    type_name: &str,
    field_name: &str,
    path: &str,
  ) -> Vec<&NodeSuggestion> {
    self
      .items
      .iter()
      .filter(|item| {
        item.type_name == type_name && item.field_name == field_name && item.path == path
      })
      .collect()
  }

  pub fn selected_for_path(
    &self,
    type_name: &str,
    field_name: &str,
    path: &str,
  ) -> Option<&NodeSuggestion> {
    self
      .items
      .iter()
      .find(|item| {
        item.type_name == type_name
          && item.field_name == field_name
          && item.path == path
          && item.selected
      })
  }

  /// Hashes of the data sources selected for the field at `path`, i.e. the
  /// parent context of that field's selection set.
  pub fn selected_hashes_at(&self, path: &str) -> Vec<u64> {
    let mut hashes = Vec::new();
    for item in &self.items {
      if item.path == path && item.selected && !hashes.contains(&item.data_source_hash) {
        hashes.push(item.data_source_hash);
      }
    }
    hashes
  }
}

/// Candidate-source ordering: the declared join order of the supergraph;
/// selection prefers, in order, a single join, the declared owner, the
/// parent's source, and finally the first candidate.
pub fn determine_owner(
  field_sources: &[String],
  owner: Option<&String>,
  parent_source: Option<&str>,
) -> Option<String> {
  if field_sources.len() == 1 {
    return field_sources.first().cloned();
  }

  if let Some(owner_str) = owner {
    if field_sources.contains(owner_str) {
      return Some(owner_str.clone());
    }
  }

  if let Some(parent) = parent_source {
    if field_sources.iter().any(|source| source == parent) {
      return Some(parent.to_string());
    }
  }

  field_sources.first().cloned()
}

/// Seeds suggestions for every operation field that does not have them yet.
/// Runs at the top of every planner pass so fields injected by the previous
/// pass get candidates too.
pub fn seed_suggestions(
  operation: &Operation,
  supergraph: &Supergraph,
  suggestions: &mut NodeSuggestions,
) -> Result<(), PlannerError> {
  let root_type = root_type_name(operation);
  let root_path = operation.operation_type.root_path();
  seed_selection_set(
    operation,
    supergraph,
    suggestions,
    operation.root,
    root_type,
    root_path,
    None,
  )
}

pub fn root_type_name(operation: &Operation) -> &'static str {
  match operation.operation_type {
    plan_executor::plan::OperationType::Query => "Query",
    plan_executor::plan::OperationType::Mutation => "Mutation",
    plan_executor::plan::OperationType::Subscription => "Subscription",
  }
}

fn seed_selection_set(
  operation: &Operation,
  supergraph: &Supergraph,
  suggestions: &mut NodeSuggestions,
  selection_set_ref: SelectionSetRef,
  type_name: &str,
  parent_path: &str,
  parent_source: Option<&str>,
) -> Result<(), PlannerError> {
  for selection in &operation.selection_set(selection_set_ref).selections.clone() {
    match selection {
      Selection::Field(field_ref) => {
        let field = operation.field(*field_ref);
        let path = format!("{parent_path}.{}", field.response_name());

        if field.name == "__typename" {
          // resolved from whatever source resolves the parent
          if let Some(parent) = parent_source {
            if !suggestions.has_suggestion(type_name, "__typename", &path) {
              suggestions.add(NodeSuggestion {
                path,
                type_name: type_name.to_string(),
                field_name: "__typename".to_string(),
                source_name: parent.to_string(),
                data_source_hash: xxh64(parent.as_bytes(), 0),
                selected: true,
                is_required_key_field: false,
              });
            }
          }
          continue;
        }

        let Some(gql_type) = supergraph.types.get(type_name) else {
          continue;
        };
        let Some(gql_field) = gql_type.fields.get(&field.name) else {
          // left without suggestions; the visitor reports it as unresolved
          continue;
        };

        let chosen = determine_owner(&gql_field.sources, gql_type.owner.as_ref(), parent_source);

        if !suggestions.has_suggestion(type_name, &field.name, &path) {
          for source in &gql_field.sources {
            suggestions.add(NodeSuggestion {
              path: path.clone(),
              type_name: type_name.to_string(),
              field_name: field.name.clone(),
              source_name: source.clone(),
              data_source_hash: xxh64(source.as_bytes(), 0),
              selected: Some(source) == chosen.as_ref(),
              is_required_key_field: false,
            });
          }
        }

        if let Some(child_selection_set) = field.selection_set {
          let child_type = unwrap_graphql_type(&gql_field.field_type);
          seed_selection_set(
            operation,
            supergraph,
            suggestions,
            child_selection_set,
            child_type,
            &path,
            chosen.as_deref(),
          )?;
        }
      }
      Selection::InlineFragment(fragment_ref) => {
        let fragment = operation.inline_fragment(*fragment_ref);
        let condition = if fragment.type_condition.is_empty() {
          type_name.to_string()
        } else {
          fragment.type_condition.clone()
        };
        seed_selection_set(
          operation,
          supergraph,
          suggestions,
          fragment.selection_set,
          &condition,
          parent_path,
          parent_source,
        )?;
      }
    }
  }

  Ok(())
}
