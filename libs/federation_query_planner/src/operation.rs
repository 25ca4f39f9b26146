use graphql_parser::query::{
  Definition, Document, OperationDefinition, Selection as AstSelection, SelectionSet,
};
use plan_executor::plan::OperationType;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::PlannerError;

pub type FieldRef = usize;
pub type SelectionSetRef = usize;
pub type InlineFragmentRef = usize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldArgument {
  pub name: String,
  /// The argument value as written, variable references included.
  pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldNode {
  pub name: String,
  pub alias: Option<String>,
  pub arguments: Vec<FieldArgument>,
  pub selection_set: Option<SelectionSetRef>,
}

impl FieldNode {
  pub fn leaf(name: impl Into<String>) -> FieldNode {
    FieldNode {
      name: name.into(),
      alias: None,
      arguments: Vec::new(),
      selection_set: None,
    }
  }

  pub fn response_name(&self) -> &str {
    self.alias.as_deref().unwrap_or(&self.name)
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineFragmentNode {
  pub type_condition: String,
  pub selection_set: SelectionSetRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Selection {
  Field(FieldRef),
  InlineFragment(InlineFragmentRef),
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SelectionSetNode {
  pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDefinition {
  pub name: String,
  pub var_type: String,
  pub default_value: Option<String>,
}

/// Arena representation of one executable operation.
///
/// Fields, selection sets and inline fragments live in flat vectors and are
/// addressed by stable integer refs, so the node-selection passes can inject
/// fields and record cross-references without chasing pointers. Fragment
/// spreads are inlined during construction.
#[derive(Debug, Serialize)]
pub struct Operation {
  pub operation_type: OperationType,
  pub name: Option<String>,
  pub variable_definitions: Vec<VariableDefinition>,
  pub root: SelectionSetRef,
  fields: Vec<FieldNode>,
  selection_sets: Vec<SelectionSetNode>,
  inline_fragments: Vec<InlineFragmentNode>,
}

impl Operation {
  /// Converts a parsed document into the arena form, picking the operation
  /// named `operation_name` (or the first one).
  pub fn from_document(
    document: &Document<'static, String>,
    operation_name: Option<&str>,
  ) -> Result<Operation, PlannerError> {
    let mut fragments: HashMap<&str, (&str, &SelectionSet<'static, String>)> = HashMap::new();
    for definition in &document.definitions {
      if let Definition::Fragment(fragment) = definition {
        let graphql_parser::query::TypeCondition::On(type_name) = &fragment.type_condition;
        fragments.insert(&fragment.name, (type_name, &fragment.selection_set));
      }
    }

    for definition in &document.definitions {
      let Definition::Operation(operation) = definition else {
        continue;
      };

      let (operation_type, name, variable_definitions, selection_set) = match operation {
        OperationDefinition::Query(query) => (
          OperationType::Query,
          query.name.clone(),
          convert_variable_definitions(&query.variable_definitions),
          &query.selection_set,
        ),
        OperationDefinition::Mutation(mutation) => (
          OperationType::Mutation,
          mutation.name.clone(),
          convert_variable_definitions(&mutation.variable_definitions),
          &mutation.selection_set,
        ),
        OperationDefinition::Subscription(subscription) => (
          OperationType::Subscription,
          subscription.name.clone(),
          convert_variable_definitions(&subscription.variable_definitions),
          &subscription.selection_set,
        ),
        OperationDefinition::SelectionSet(selection_set) => {
          (OperationType::Query, None, Vec::new(), selection_set)
        }
      };

      if let Some(wanted) = operation_name {
        if name.as_deref() != Some(wanted) {
          continue;
        }
      }

      let mut operation = Operation {
        operation_type,
        name,
        variable_definitions,
        root: 0,
        fields: Vec::new(),
        selection_sets: Vec::new(),
        inline_fragments: Vec::new(),
      };

      operation.root = operation.convert_selection_set(selection_set, &fragments)?;
      return Ok(operation);
    }

    Err(PlannerError::OperationNotFound {
      operation_name: operation_name.unwrap_or_default().to_string(),
    })
  }

  fn convert_selection_set(
    &mut self,
    selection_set: &SelectionSet<'static, String>,
    fragments: &HashMap<&str, (&str, &SelectionSet<'static, String>)>,
  ) -> Result<SelectionSetRef, PlannerError> {
    let mut selections = Vec::with_capacity(selection_set.items.len());

    for item in &selection_set.items {
      match item {
        AstSelection::Field(field) => {
          let child = if field.selection_set.items.is_empty() {
            None
          } else {
            Some(self.convert_selection_set(&field.selection_set, fragments)?)
          };
          let field_ref = self.push_field(FieldNode {
            name: field.name.clone(),
            alias: field.alias.clone(),
            arguments: field
              .arguments
              .iter()
              .map(|(name, value)| FieldArgument {
                name: name.clone(),
                value: value.to_string(),
              })
              .collect(),
            selection_set: child,
          });
          selections.push(Selection::Field(field_ref));
        }
        AstSelection::InlineFragment(fragment) => {
          let type_condition = match &fragment.type_condition {
            Some(graphql_parser::query::TypeCondition::On(type_name)) => type_name.clone(),
            None => String::new(),
          };
          let child = self.convert_selection_set(&fragment.selection_set, fragments)?;
          let fragment_ref = self.push_inline_fragment(InlineFragmentNode {
            type_condition,
            selection_set: child,
          });
          selections.push(Selection::InlineFragment(fragment_ref));
        }
        AstSelection::FragmentSpread(spread) => {
          // fragment spreads are inlined so later passes deal with one shape
          let (type_name, fragment_selection_set) = fragments
            .get(spread.fragment_name.as_str())
            .copied()
            .ok_or_else(|| PlannerError::UnknownFragment {
              fragment_name: spread.fragment_name.clone(),
            })?;
          let child = self.convert_selection_set(fragment_selection_set, fragments)?;
          let fragment_ref = self.push_inline_fragment(InlineFragmentNode {
            type_condition: type_name.to_string(),
            selection_set: child,
          });
          selections.push(Selection::InlineFragment(fragment_ref));
        }
      }
    }

    Ok(self.push_selection_set(SelectionSetNode { selections }))
  }

  pub fn field(&self, field_ref: FieldRef) -> &FieldNode {
    &self.fields[field_ref]
  }

  pub fn field_mut(&mut self, field_ref: FieldRef) -> &mut FieldNode {
    &mut self.fields[field_ref]
  }

  pub fn field_count(&self) -> usize {
    self.fields.len()
  }

  pub fn selection_set(&self, selection_set_ref: SelectionSetRef) -> &SelectionSetNode {
    &self.selection_sets[selection_set_ref]
  }

  pub fn inline_fragment(&self, fragment_ref: InlineFragmentRef) -> &InlineFragmentNode {
    &self.inline_fragments[fragment_ref]
  }

  pub fn push_field(&mut self, field: FieldNode) -> FieldRef {
    self.fields.push(field);
    self.fields.len() - 1
  }

  pub fn push_selection_set(&mut self, selection_set: SelectionSetNode) -> SelectionSetRef {
    self.selection_sets.push(selection_set);
    self.selection_sets.len() - 1
  }

  pub fn push_inline_fragment(&mut self, fragment: InlineFragmentNode) -> InlineFragmentRef {
    self.inline_fragments.push(fragment);
    self.inline_fragments.len() - 1
  }

  /// Adds a field to an existing selection set, returning its ref.
  pub fn add_field(&mut self, selection_set_ref: SelectionSetRef, field: FieldNode) -> FieldRef {
    let field_ref = self.push_field(field);
    self.selection_sets[selection_set_ref]
      .selections
      .push(Selection::Field(field_ref));
    field_ref
  }

  /// Adds an inline fragment with an empty selection set, returning
  /// `(fragment_ref, selection_set_ref)`.
  pub fn add_inline_fragment(
    &mut self,
    selection_set_ref: SelectionSetRef,
    type_condition: impl Into<String>,
  ) -> (InlineFragmentRef, SelectionSetRef) {
    let child = self.push_selection_set(SelectionSetNode::default());
    let fragment_ref = self.push_inline_fragment(InlineFragmentNode {
      type_condition: type_condition.into(),
      selection_set: child,
    });
    self.selection_sets[selection_set_ref]
      .selections
      .push(Selection::InlineFragment(fragment_ref));
    (fragment_ref, child)
  }

  pub fn replace_selections(
    &mut self,
    selection_set_ref: SelectionSetRef,
    selections: Vec<Selection>,
  ) {
    self.selection_sets[selection_set_ref].selections = selections;
  }

  /// Ensures the field's child selection set exists, creating an empty one
  /// when missing.
  pub fn ensure_selection_set(&mut self, field_ref: FieldRef) -> SelectionSetRef {
    if let Some(existing) = self.fields[field_ref].selection_set {
      return existing;
    }
    let created = self.push_selection_set(SelectionSetNode::default());
    self.fields[field_ref].selection_set = Some(created);
    created
  }

  /// Finds an unaliased field with the given name directly in the selection
  /// set.
  pub fn find_field(&self, selection_set_ref: SelectionSetRef, name: &str) -> Option<FieldRef> {
    self
      .selection_sets[selection_set_ref]
      .selections
      .iter()
      .find_map(|selection| match selection {
        Selection::Field(field_ref)
          if self.fields[*field_ref].name == name && self.fields[*field_ref].alias.is_none() =>
        {
          Some(*field_ref)
        }
        _ => None,
      })
  }

  /// Deep copy of a field and its subtree into the arena.
  pub fn clone_field_subtree(&mut self, field_ref: FieldRef) -> FieldRef {
    let field = self.fields[field_ref].clone();
    let selection_set = field
      .selection_set
      .map(|selection_set_ref| self.clone_selection_set_subtree(selection_set_ref));
    self.push_field(FieldNode {
      selection_set,
      ..field
    })
  }

  fn clone_selection_set_subtree(&mut self, selection_set_ref: SelectionSetRef) -> SelectionSetRef {
    let selections = self.selection_sets[selection_set_ref].selections.clone();
    let mut copied = Vec::with_capacity(selections.len());
    for selection in selections {
      match selection {
        Selection::Field(field_ref) => {
          copied.push(Selection::Field(self.clone_field_subtree(field_ref)));
        }
        Selection::InlineFragment(fragment_ref) => {
          let fragment = self.inline_fragments[fragment_ref].clone();
          let child = self.clone_selection_set_subtree(fragment.selection_set);
          let new_fragment = self.push_inline_fragment(InlineFragmentNode {
            type_condition: fragment.type_condition,
            selection_set: child,
          });
          copied.push(Selection::InlineFragment(new_fragment));
        }
      }
    }
    self.push_selection_set(SelectionSetNode { selections: copied })
  }
}

fn convert_variable_definitions(
  definitions: &[graphql_parser::query::VariableDefinition<'static, String>],
) -> Vec<VariableDefinition> {
  definitions
    .iter()
    .map(|definition| VariableDefinition {
      name: definition.name.clone(),
      var_type: definition.var_type.to_string(),
      default_value: definition.default_value.as_ref().map(|v| v.to_string()),
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use switchboard_common::graphql::parse_graphql_operation;

  #[test]
  fn converts_operations_with_arguments_and_aliases() {
    let document =
      parse_graphql_operation("query Top($first: Int = 5) { top: topProducts(first: $first) { upc } }")
        .unwrap();
    let operation = Operation::from_document(&document, None).unwrap();

    assert_eq!(operation.operation_type, OperationType::Query);
    assert_eq!(operation.name.as_deref(), Some("Top"));
    assert_eq!(
      operation.variable_definitions,
      vec![VariableDefinition {
        name: "first".to_string(),
        var_type: "Int".to_string(),
        default_value: Some("5".to_string()),
      }]
    );

    let root = operation.selection_set(operation.root);
    assert_eq!(root.selections.len(), 1);
    let Selection::Field(top) = root.selections[0] else {
      panic!("expected a field");
    };
    let field = operation.field(top);
    assert_eq!(field.name, "topProducts");
    assert_eq!(field.response_name(), "top");
    assert_eq!(
      field.arguments,
      vec![FieldArgument {
        name: "first".to_string(),
        value: "$first".to_string(),
      }]
    );
    assert!(field.selection_set.is_some());
  }

  #[test]
  fn inlines_fragment_spreads() {
    let document = parse_graphql_operation(
      "fragment UserFields on User { id name } query { users { ...UserFields } }",
    )
    .unwrap();
    let operation = Operation::from_document(&document, None).unwrap();

    let root = operation.selection_set(operation.root);
    let Selection::Field(users) = root.selections[0] else {
      panic!("expected a field");
    };
    let users_selection_set = operation.field(users).selection_set.unwrap();
    let Selection::InlineFragment(fragment_ref) =
      operation.selection_set(users_selection_set).selections[0]
    else {
      panic!("expected the spread to be inlined");
    };
    let fragment = operation.inline_fragment(fragment_ref);
    assert_eq!(fragment.type_condition, "User");
    assert_eq!(
      operation.selection_set(fragment.selection_set).selections.len(),
      2
    );
  }

  #[test]
  fn unknown_fragments_are_an_error() {
    let document = parse_graphql_operation("query { users { ...Missing } }").unwrap();
    let error = Operation::from_document(&document, None).unwrap_err();
    assert!(error.to_string().contains("Missing"));
  }

  #[test]
  fn selects_operation_by_name() {
    let document =
      parse_graphql_operation("query A { users { id } } query B { products { upc } }").unwrap();

    let operation = Operation::from_document(&document, Some("B")).unwrap();
    assert_eq!(operation.name.as_deref(), Some("B"));

    assert!(Operation::from_document(&document, Some("C")).is_err());
  }

  #[test]
  fn injected_fields_get_stable_refs() {
    let document = parse_graphql_operation("query { users { name } }").unwrap();
    let mut operation = Operation::from_document(&document, None).unwrap();

    let root = operation.selection_set(operation.root);
    let Selection::Field(users) = root.selections[0] else {
      panic!("expected a field");
    };
    let users_selection_set = operation.field(users).selection_set.unwrap();

    let before = operation.field_count();
    let injected = operation.add_field(users_selection_set, FieldNode::leaf("id"));
    assert_eq!(injected, before);
    assert_eq!(operation.field(injected).name, "id");
    assert_eq!(
      operation.find_field(users_selection_set, "id"),
      Some(injected)
    );
  }
}
