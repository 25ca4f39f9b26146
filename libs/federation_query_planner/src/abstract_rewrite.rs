use crate::error::PlannerError;
use crate::node_selection::NodeSelectionVisitor;
use crate::operation::{FieldRef, InlineFragmentNode, Selection, SelectionSetNode};
use crate::supergraph::{unwrap_graphql_type, TypeKind};
use plan_executor::datasource::DataSource;
use std::sync::Arc;

impl NodeSelectionVisitor<'_> {
  /// Rewrites the selection set of a union/interface field when the chosen
  /// data source only knows a subset of the members, or represents the type
  /// as an interface object. Returns whether anything changed; a change
  /// aborts the current pass so the next one observes the rewrite.
  pub(crate) fn rewrite_abstract_selection(
    &mut self,
    field_ref: FieldRef,
    enclosing_type: &str,
    ds: &Arc<dyn DataSource>,
  ) -> Result<bool, PlannerError> {
    if !self.visited_fields_abstract_checks.insert(field_ref) {
      return Ok(false);
    }

    let field = self.operation.field(field_ref).clone();
    let Some(child_selection_set) = field.selection_set else {
      return Ok(false);
    };

    let Some(gql_type) = self.supergraph.types.get(enclosing_type) else {
      return Ok(false);
    };
    let Some(gql_field) = gql_type.fields.get(&field.name) else {
      return Ok(false);
    };

    let field_type_name = unwrap_graphql_type(&gql_field.field_type);
    let Some(field_type) = self.supergraph.types.get(field_type_name) else {
      return Ok(false);
    };
    if field_type.kind == TypeKind::Object {
      return Ok(false);
    }

    let Some(graph) = self.source_names.get(&ds.hash()).cloned() else {
      return Ok(false);
    };

    if ds.has_interface_object(field_type_name) {
      return Ok(self.flatten_interface_object_selection(child_selection_set));
    }

    let all_members = &field_type.implementers;
    let known_members: Vec<String> = match field_type.kind {
      TypeKind::Union => field_type
        .union_members
        .get(&graph)
        .cloned()
        .unwrap_or_else(|| all_members.clone()),
      _ => all_members
        .iter()
        .filter(|member| {
          self
            .supergraph
            .types
            .get(*member)
            .is_some_and(|t| t.subgraphs.contains(&graph))
        })
        .cloned()
        .collect(),
    };

    if known_members.len() == all_members.len() {
      return Ok(false);
    }

    // expand to inline fragments per concrete type the subgraph knows,
    // dropping fragments for members it cannot resolve
    let selections = self
      .operation
      .selection_set(child_selection_set)
      .selections
      .clone();

    let mut kept = Vec::new();
    let mut direct_fields: Vec<FieldRef> = Vec::new();
    let mut changed = false;

    for selection in selections {
      match selection {
        Selection::Field(inner_ref) if self.operation.field(inner_ref).name == "__typename" => {
          kept.push(Selection::Field(inner_ref));
        }
        Selection::Field(inner_ref) => {
          direct_fields.push(inner_ref);
        }
        Selection::InlineFragment(fragment_ref) => {
          let condition = self
            .operation
            .inline_fragment(fragment_ref)
            .type_condition
            .clone();
          if known_members.contains(&condition) {
            kept.push(Selection::InlineFragment(fragment_ref));
          } else {
            changed = true;
          }
        }
      }
    }

    if direct_fields.is_empty() && !changed {
      return Ok(false);
    }

    // the renderer discriminates members by __typename, so the subgraph
    // selection has to carry it
    let has_typename = kept.iter().any(|selection| {
      matches!(selection, Selection::Field(field_ref)
        if self.operation.field(*field_ref).name == "__typename")
    });
    if !has_typename {
      let typename_ref = self
        .operation
        .push_field(crate::operation::FieldNode::leaf("__typename"));
      self.skip_field_refs.push(typename_ref);
      kept.insert(0, Selection::Field(typename_ref));
    }

    let mut rewritten = kept;
    for member in &known_members {
      if direct_fields.is_empty() {
        break;
      }
      let mut member_selections = Vec::with_capacity(direct_fields.len());
      for field_ref in &direct_fields {
        let copy = self.operation.clone_field_subtree(*field_ref);
        member_selections.push(Selection::Field(copy));
      }
      let member_selection_set = self.operation.push_selection_set(SelectionSetNode {
        selections: member_selections,
      });
      let fragment_ref = self.operation.push_inline_fragment(InlineFragmentNode {
        type_condition: member.clone(),
        selection_set: member_selection_set,
      });
      rewritten.push(Selection::InlineFragment(fragment_ref));
    }

    self
      .operation
      .replace_selections(child_selection_set, rewritten);
    Ok(true)
  }

  /// An interface-object subgraph sees the type as a concrete object, so
  /// member fragments collapse into the parent selection.
  fn flatten_interface_object_selection(
    &mut self,
    selection_set_ref: crate::operation::SelectionSetRef,
  ) -> bool {
    let selections = self
      .operation
      .selection_set(selection_set_ref)
      .selections
      .clone();

    let mut flattened = Vec::new();
    let mut seen_names: Vec<String> = Vec::new();
    let mut changed = false;

    for selection in &selections {
      if let Selection::Field(field_ref) = selection {
        seen_names.push(self.operation.field(*field_ref).response_name().to_string());
        flattened.push(*selection);
      }
    }

    for selection in &selections {
      if let Selection::InlineFragment(fragment_ref) = selection {
        changed = true;
        let fragment_selection_set = self.operation.inline_fragment(*fragment_ref).selection_set;
        let inner = self
          .operation
          .selection_set(fragment_selection_set)
          .selections
          .clone();
        for inner_selection in inner {
          if let Selection::Field(inner_ref) = inner_selection {
            let name = self.operation.field(inner_ref).response_name().to_string();
            if !seen_names.contains(&name) {
              seen_names.push(name);
              flattened.push(Selection::Field(inner_ref));
            }
          }
        }
      }
    }

    if changed {
      self.operation.replace_selections(selection_set_ref, flattened);
    }
    changed
  }
}

#[cfg(test)]
mod tests {
  use crate::plan_operation;
  use crate::supergraph::parse_supergraph;
  use plan_executor::plan::{Argument, Fetch, PlanNode};
  use switchboard_common::graphql::{parse_graphql_operation, parse_graphql_schema};

  fn search_supergraph() -> crate::supergraph::Supergraph {
    let schema = r#"
    directive @join__graph(name: String!, url: String!) on ENUM_VALUE

    enum join__Graph {
        SEARCH @join__graph(name: "search", url: "http://0.0.0.0:4006/graphql")
        EXTRA @join__graph(name: "extra", url: "http://0.0.0.0:4007/graphql")
    }

    union SearchResult
      @join__type(graph: SEARCH)
      @join__unionMember(graph: SEARCH, member: "Product")
      = Product | User

    type Product @join__type(graph: SEARCH) {
        upc: String!
        price: Int
    }

    type User @join__type(graph: EXTRA) {
        id: ID!
    }

    type Query @join__type(graph: SEARCH) {
        search: [SearchResult] @join__field(graph: SEARCH)
    }
    "#;
    parse_supergraph(&parse_graphql_schema(schema).unwrap()).unwrap()
  }

  fn root_query(planned: &crate::PlannedOperation) -> String {
    let Some(Fetch::Single(single)) = &planned.root.fetch else {
      panic!("expected a single root fetch");
    };
    single
      .source
      .args
      .iter()
      .find_map(|arg| match arg {
        Argument::Static { name, value } if name == "query" => {
          Some(String::from_utf8(value.clone()).unwrap())
        }
        _ => None,
      })
      .unwrap()
  }

  #[test]
  fn drops_member_fragments_the_source_cannot_resolve() {
    let supergraph = search_supergraph();
    let document = parse_graphql_operation(
      "query { search { ... on Product { upc } ... on User { id } } }",
    )
    .unwrap();

    let planned =
      plan_operation(&document, None, &supergraph, &supergraph.data_sources()).unwrap();

    let query = root_query(&planned);
    assert!(query.contains("... on Product { upc }"), "{query}");
    assert!(!query.contains("User"), "{query}");
    // the renderer needs the discriminator even if the client did not ask
    assert!(query.contains("__typename"), "{query}");
  }

  #[test]
  fn wraps_direct_abstract_fields_into_member_fragments() {
    let supergraph = search_supergraph();
    // `upc` is selected directly on the union; the known member gets it via
    // an inline fragment
    let document = parse_graphql_operation("query { search { upc } }").unwrap();

    let planned =
      plan_operation(&document, None, &supergraph, &supergraph.data_sources()).unwrap();

    let query = root_query(&planned);
    assert!(query.contains("... on Product { upc }"), "{query}");

    // the rendered field carries a type condition so only matching members
    // emit it
    let PlanNode::List(search) = &planned.root.fields[0].value else {
      panic!("expected a list");
    };
    let PlanNode::Object(item) = &*search.value else {
      panic!("expected an object item");
    };
    let upc = item.fields.iter().find(|f| f.name == "upc").unwrap();
    assert!(upc.skip.is_some());
  }
}
