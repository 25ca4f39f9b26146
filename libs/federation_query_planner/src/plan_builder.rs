use crate::error::PlannerError;
use crate::node_selection::{required_fields_fragment, NodeSelectionOutcome};
use crate::operation::{FieldRef, Operation, Selection, SelectionSetRef, VariableDefinition};
use crate::suggestions::root_type_name;
use crate::supergraph::{unwrap_graphql_type, Supergraph, SupergraphField};
use graphql_parser::query::Selection as AstSelection;
use plan_executor::datasource::DataSource;
use plan_executor::plan::{
  Argument, DataSourceInvocation, Fetch, Field, List, ListFilter, Object, PlanNode, SingleFetch,
  SkipCondition, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the executable plan tree out of a settled operation: one fetch per
/// root field, `_entities` fetches for subgraph hops, Serial/Parallel
/// grouping derived from the recorded field dependencies.
pub fn build_plan(
  operation: &Operation,
  supergraph: &Supergraph,
  data_sources: &[Arc<dyn DataSource>],
  outcome: &NodeSelectionOutcome,
) -> Result<Object, PlannerError> {
  let mut sources = HashMap::new();
  for source in data_sources {
    sources.insert(source.hash(), source.clone());
  }

  let builder = PlanBuilder {
    operation,
    supergraph,
    sources,
    outcome,
  };
  builder.build_root()
}

struct PlanBuilder<'a> {
  operation: &'a Operation,
  supergraph: &'a Supergraph,
  sources: HashMap<u64, Arc<dyn DataSource>>,
  outcome: &'a NodeSelectionOutcome,
}

impl PlanBuilder<'_> {
  fn build_root(&self) -> Result<Object, PlannerError> {
    let root_type = root_type_name(self.operation);
    let root_path = self.operation.operation_type.root_path();

    let mut fields = Vec::new();
    let mut fetches = Vec::new();

    for (field_ref, condition) in self.collect_fields(self.operation.root, root_type) {
      let field = self.operation.field(field_ref);
      let logical_path = format!("{root_path}.{}", field.response_name());
      let rendered = !self.outcome.skip_field_refs.contains(&field_ref);

      if field.name == "__typename" {
        if rendered {
          fields.push(Field {
            name: field.response_name().to_string(),
            value: PlanNode::Value(Value {
              path: vec!["__typename".to_string()],
              quote: true,
            }),
            skip: None,
            has_resolver: false,
          });
        }
        continue;
      }

      let effective_type = condition.clone().unwrap_or_else(|| root_type.to_string());
      let suggestion = self
        .outcome
        .suggestions
        .selected_for_path(&effective_type, &field.name, &logical_path)
        .ok_or_else(|| PlannerError::UnresolvedField {
          type_name: effective_type.clone(),
          field_name: field.name.clone(),
          path: logical_path.clone(),
        })?;

      let data_source = self.source(
        suggestion.data_source_hash,
        &effective_type,
        &field.name,
        &logical_path,
      )?;

      let selection =
        self.subgraph_field_selection(field_ref, &effective_type, suggestion.data_source_hash, &logical_path)?;
      let query = self.operation_query(&selection);

      let mut args = vec![Argument::Static {
        name: "query".to_string(),
        value: query.clone().into_bytes(),
      }];
      args.extend(self.context_variable_args(&query));

      fetches.push((
        field_ref,
        suggestion.data_source_hash,
        Fetch::Single(SingleFetch {
          source: DataSourceInvocation { args, data_source },
          buffer_name: field.response_name().to_string(),
        }),
      ));

      if rendered {
        fields.push(self.response_field(
          field_ref,
          &effective_type,
          suggestion.data_source_hash,
          true,
          &[],
          &logical_path,
          None,
        )?);
      }
    }

    Ok(Object {
      fields,
      path: Vec::new(),
      fetch: self.group_fetches(fetches),
      operation_type: self.operation.operation_type,
    })
  }

  /// Flattens a selection set to `(field, concrete-type condition)` pairs.
  fn collect_fields(
    &self,
    selection_set_ref: SelectionSetRef,
    type_name: &str,
  ) -> Vec<(FieldRef, Option<String>)> {
    let mut collected = Vec::new();
    for selection in &self.operation.selection_set(selection_set_ref).selections {
      match selection {
        Selection::Field(field_ref) => collected.push((*field_ref, None)),
        Selection::InlineFragment(fragment_ref) => {
          let fragment = self.operation.inline_fragment(*fragment_ref);
          let condition = if fragment.type_condition.is_empty()
            || fragment.type_condition == type_name
          {
            None
          } else {
            Some(fragment.type_condition.clone())
          };
          for (field_ref, inner_condition) in
            self.collect_fields(fragment.selection_set, type_name)
          {
            collected.push((field_ref, inner_condition.or_else(|| condition.clone())));
          }
        }
      }
    }
    collected
  }

  #[allow(clippy::too_many_arguments)]
  fn response_field(
    &self,
    field_ref: FieldRef,
    enclosing_type: &str,
    ds_hash: u64,
    has_resolver: bool,
    data_prefix: &[String],
    logical_path: &str,
    skip: Option<SkipCondition>,
  ) -> Result<Field, PlannerError> {
    let field = self.operation.field(field_ref);
    let response_name = field.response_name().to_string();

    if field.name == "__typename" {
      let mut path = data_prefix.to_vec();
      path.push("__typename".to_string());
      return Ok(Field {
        name: response_name,
        value: PlanNode::Value(Value { path, quote: true }),
        skip,
        has_resolver: false,
      });
    }

    let gql_field = self.field_def(enclosing_type, &field.name, logical_path)?;
    let base_type = unwrap_graphql_type(&gql_field.field_type).to_string();
    let is_list = gql_field.field_type.trim_start_matches('!').starts_with('[');

    let mut value_path = data_prefix.to_vec();
    value_path.push(response_name.clone());

    let value = match field.selection_set {
      None => PlanNode::Value(Value {
        path: value_path,
        quote: self.quote_scalar(&base_type),
      }),
      Some(child_selection_set) => {
        if is_list {
          let item_object =
            self.build_object(child_selection_set, &base_type, ds_hash, Vec::new(), logical_path)?;
          PlanNode::List(List {
            path: value_path,
            value: Box::new(PlanNode::Object(item_object)),
            filter: first_n_filter(field),
          })
        } else {
          let object =
            self.build_object(child_selection_set, &base_type, ds_hash, value_path, logical_path)?;
          PlanNode::Object(object)
        }
      }
    };

    Ok(Field {
      name: response_name,
      value,
      skip,
      has_resolver,
    })
  }

  fn build_object(
    &self,
    selection_set_ref: SelectionSetRef,
    type_name: &str,
    current_ds: u64,
    object_path: Vec<String>,
    logical_path: &str,
  ) -> Result<Object, PlannerError> {
    let mut fields = Vec::new();
    let mut fetches = Vec::new();

    for (field_ref, condition) in self.collect_fields(selection_set_ref, type_name) {
      if self.outcome.skip_field_refs.contains(&field_ref) {
        continue;
      }

      let field = self.operation.field(field_ref);
      let effective_type = condition.clone().unwrap_or_else(|| type_name.to_string());
      let child_logical = format!("{logical_path}.{}", field.response_name());

      // fields inside a narrowing fragment only render for matching objects
      let skip = condition.map(|concrete| SkipCondition::IfNotEqual {
        left: Argument::ObjectVariable {
          name: "__typename".to_string(),
          path: vec!["__typename".to_string()],
        },
        right: Argument::Static {
          name: "type".to_string(),
          value: concrete.into_bytes(),
        },
      });

      if field.name == "__typename" {
        fields.push(Field {
          name: field.response_name().to_string(),
          value: PlanNode::Value(Value {
            path: vec!["__typename".to_string()],
            quote: true,
          }),
          skip,
          has_resolver: false,
        });
        continue;
      }

      let suggestion = self
        .outcome
        .suggestions
        .selected_for_path(&effective_type, &field.name, &child_logical)
        .ok_or_else(|| PlannerError::UnresolvedField {
          type_name: effective_type.clone(),
          field_name: field.name.clone(),
          path: child_logical.clone(),
        })?;

      let jump_hash = suggestion.data_source_hash;
      let is_hop = jump_hash != current_ds
        || self
          .outcome
          .field_requirements_configs
          .contains_key(&(field_ref, jump_hash));

      if !is_hop {
        fields.push(self.response_field(
          field_ref,
          &effective_type,
          current_ds,
          false,
          &[],
          &child_logical,
          skip,
        )?);
        continue;
      }

      let fetch = self.entity_fetch(field_ref, &effective_type, jump_hash, &child_logical)?;
      fetches.push((field_ref, jump_hash, fetch));

      let prefix = vec!["_entities".to_string(), "0".to_string()];
      fields.push(self.response_field(
        field_ref,
        &effective_type,
        jump_hash,
        true,
        &prefix,
        &child_logical,
        skip,
      )?);
    }

    Ok(Object {
      fields,
      path: object_path,
      fetch: self.group_fetches(fetches),
      operation_type: self.operation.operation_type,
    })
  }

  /// A cross-subgraph hop: an `_entities` fetch whose representation is built
  /// from the key (and `@requires`) configurations recorded by the
  /// node-selection pass.
  fn entity_fetch(
    &self,
    field_ref: FieldRef,
    entity_type: &str,
    jump_hash: u64,
    logical_path: &str,
  ) -> Result<Fetch, PlannerError> {
    let field = self.operation.field(field_ref);
    let data_source = self.source(jump_hash, entity_type, &field.name, logical_path)?;

    let field_selection =
      self.subgraph_field_selection(field_ref, entity_type, jump_hash, logical_path)?;

    let mut configs = self
      .outcome
      .field_requirements_configs
      .get(&(field_ref, jump_hash))
      .cloned()
      .unwrap_or_default();
    if configs.is_empty() {
      // fall back to the entity's first key on its own type
      if let Some(gql_type) = self.supergraph.types.get(entity_type) {
        if let Some(key) = gql_type.keys.first() {
          configs.push(plan_executor::datasource::FieldConfig {
            type_name: entity_type.to_string(),
            field_name: String::new(),
            selection_set: key.selection_set.clone(),
            resolvable: key.resolvable,
          });
        }
      }
    }

    let (representation, mut representation_args) =
      self.representation_template(entity_type, &configs, jump_hash, logical_path)?;

    let used = self.used_variables(&field_selection);
    let mut variable_defs = vec!["$representations: [_Any!]!".to_string()];
    for variable in &used {
      variable_defs.push(format!("${}: {}", variable.name, variable.var_type));
    }

    let query = format!(
      "query({}) {{ _entities(representations: $representations) {{ ... on {} {{ {} }} }} }}",
      variable_defs.join(", "),
      entity_type,
      field_selection
    );

    let mut args = vec![
      Argument::Static {
        name: "query".to_string(),
        value: query.into_bytes(),
      },
      Argument::Static {
        name: "representations".to_string(),
        value: format!("[{representation}]").into_bytes(),
      },
    ];
    args.append(&mut representation_args);
    for variable in &used {
      args.push(Argument::ContextVariable {
        name: variable.name.clone(),
        variable_name: variable.name.clone(),
      });
    }

    Ok(Fetch::Single(SingleFetch {
      source: DataSourceInvocation { args, data_source },
      buffer_name: field.response_name().to_string(),
    }))
  }

  /// `{"__typename":"User","id":"{{ .id }}"}` plus the internal object
  /// variables feeding the template.
  fn representation_template(
    &self,
    entity_type: &str,
    configs: &[plan_executor::datasource::FieldConfig],
    jump_hash: u64,
    logical_path: &str,
  ) -> Result<(String, Vec<Argument>), PlannerError> {
    let mut members = Vec::new();
    let mut args = Vec::new();

    let to_interface_object = self
      .sources
      .get(&jump_hash)
      .is_some_and(|source| source.has_interface_object(entity_type));
    if to_interface_object {
      // an interface-object subgraph resolves the entity at the interface
      // level, so the representation names the interface itself
      members.push(format!("\"__typename\":\"{entity_type}\""));
    } else {
      members.push("\"__typename\":\"{{ .__typename }}\"".to_string());
      args.push(Argument::ObjectVariable {
        name: ".__typename".to_string(),
        path: vec!["__typename".to_string()],
      });
    }

    let mut seen = vec!["__typename".to_string()];
    for config in configs {
      let fragment = required_fields_fragment(&config.selection_set, false).map_err(|_| {
        PlannerError::RequiredFieldsParse {
          selection_set: config.selection_set.clone(),
          type_name: entity_type.to_string(),
          path: logical_path.to_string(),
        }
      })?;
      self.representation_members(
        entity_type,
        &fragment.items,
        Vec::new(),
        &mut members,
        &mut args,
        &mut seen,
        logical_path,
      )?;
    }

    Ok((format!("{{{}}}", members.join(",")), args))
  }

  #[allow(clippy::too_many_arguments)]
  fn representation_members(
    &self,
    type_name: &str,
    selections: &[AstSelection<'static, String>],
    path_prefix: Vec<String>,
    members: &mut Vec<String>,
    args: &mut Vec<Argument>,
    seen: &mut Vec<String>,
    logical_path: &str,
  ) -> Result<(), PlannerError> {
    for item in selections {
      let AstSelection::Field(ast_field) = item else {
        continue;
      };

      let mut segments = path_prefix.clone();
      segments.push(ast_field.name.clone());
      let dotted = segments.join(".");
      if seen.contains(&dotted) {
        continue;
      }
      seen.push(dotted.clone());

      if !ast_field.selection_set.items.is_empty() {
        let child_type = self
          .supergraph
          .types
          .get(type_name)
          .and_then(|t| t.fields.get(&ast_field.name))
          .map(|f| unwrap_graphql_type(&f.field_type).to_string())
          .unwrap_or_default();

        let mut inner_members = Vec::new();
        self.representation_members(
          &child_type,
          &ast_field.selection_set.items,
          segments,
          &mut inner_members,
          args,
          seen,
          logical_path,
        )?;
        members.push(format!("\"{}\":{{{}}}", ast_field.name, inner_members.join(",")));
        continue;
      }

      let base_type = self
        .supergraph
        .types
        .get(type_name)
        .and_then(|t| t.fields.get(&ast_field.name))
        .map(|f| unwrap_graphql_type(&f.field_type).to_string())
        .unwrap_or_else(|| "String".to_string());

      let placeholder = format!("{{{{ .{dotted} }}}}");
      if self.quote_scalar(&base_type) {
        members.push(format!("\"{}\":\"{}\"", ast_field.name, placeholder));
      } else {
        members.push(format!("\"{}\":{}", ast_field.name, placeholder));
      }
      args.push(Argument::ObjectVariable {
        name: format!(".{dotted}"),
        path: segments,
      });
    }

    Ok(())
  }

  /// The field as it appears in a subgraph operation, with the descendants
  /// that stay on the same data source.
  fn subgraph_field_selection(
    &self,
    field_ref: FieldRef,
    enclosing_type: &str,
    ds_hash: u64,
    logical_path: &str,
  ) -> Result<String, PlannerError> {
    let field = self.operation.field(field_ref);

    let mut rendered = String::new();
    if let Some(alias) = &field.alias {
      rendered.push_str(alias);
      rendered.push_str(": ");
    }
    rendered.push_str(&field.name);

    if !field.arguments.is_empty() {
      let arguments = field
        .arguments
        .iter()
        .map(|argument| format!("{}: {}", argument.name, argument.value))
        .collect::<Vec<_>>()
        .join(", ");
      rendered.push_str(&format!("({arguments})"));
    }

    if let Some(child_selection_set) = field.selection_set {
      let gql_field = self.field_def(enclosing_type, &field.name, logical_path)?;
      let child_type = unwrap_graphql_type(&gql_field.field_type).to_string();
      let inner =
        self.subgraph_selection_set(child_selection_set, &child_type, ds_hash, logical_path)?;
      if !inner.is_empty() {
        rendered.push_str(&format!(" {{ {inner} }}"));
      }
    }

    Ok(rendered)
  }

  fn subgraph_selection_set(
    &self,
    selection_set_ref: SelectionSetRef,
    type_name: &str,
    ds_hash: u64,
    parent_logical: &str,
  ) -> Result<String, PlannerError> {
    let mut parts = Vec::new();

    for selection in &self.operation.selection_set(selection_set_ref).selections {
      match selection {
        Selection::Field(field_ref) => {
          let field = self.operation.field(*field_ref);
          let path = format!("{parent_logical}.{}", field.response_name());

          let Some(suggestion) = self
            .outcome
            .suggestions
            .selected_for_path(type_name, &field.name, &path)
          else {
            continue;
          };
          if suggestion.data_source_hash != ds_hash {
            continue;
          }
          // a field with recorded requirements gets its own entity fetch,
          // even against the same source
          if !suggestion.is_required_key_field
            && field.name != "__typename"
            && self
              .outcome
              .field_requirements_configs
              .contains_key(&(*field_ref, ds_hash))
          {
            continue;
          }

          parts.push(self.subgraph_field_selection(*field_ref, type_name, ds_hash, &path)?);
        }
        Selection::InlineFragment(fragment_ref) => {
          let fragment = self.operation.inline_fragment(*fragment_ref);
          let condition = if fragment.type_condition.is_empty() {
            type_name.to_string()
          } else {
            fragment.type_condition.clone()
          };
          let inner = self.subgraph_selection_set(
            fragment.selection_set,
            &condition,
            ds_hash,
            parent_logical,
          )?;
          if !inner.is_empty() {
            parts.push(format!("... on {condition} {{ {inner} }}"));
          }
        }
      }
    }

    Ok(parts.join(" "))
  }

  fn operation_query(&self, selection: &str) -> String {
    let mut head = self.operation.operation_type.to_string();
    if let Some(name) = &self.operation.name {
      head.push(' ');
      head.push_str(name);
    }

    let used = self.used_variables(selection);
    if !used.is_empty() {
      let defs = used
        .iter()
        .map(|variable| match &variable.default_value {
          Some(default) => format!("${}: {} = {}", variable.name, variable.var_type, default),
          None => format!("${}: {}", variable.name, variable.var_type),
        })
        .collect::<Vec<_>>()
        .join(", ");
      head.push_str(&format!("({defs})"));
    }

    format!("{head} {{ {selection} }}")
  }

  fn used_variables(&self, selection: &str) -> Vec<VariableDefinition> {
    self
      .operation
      .variable_definitions
      .iter()
      .filter(|variable| selection.contains(&format!("${}", variable.name)))
      .cloned()
      .collect()
  }

  fn context_variable_args(&self, query: &str) -> Vec<Argument> {
    self
      .used_variables(query)
      .into_iter()
      .map(|variable| Argument::ContextVariable {
        name: variable.name.clone(),
        variable_name: variable.name,
      })
      .collect()
  }

  /// Independent hops run in parallel; a hop whose dependencies landed on a
  /// sibling hop's source runs after it, serially.
  fn group_fetches(&self, fetches: Vec<(FieldRef, u64, Fetch)>) -> Option<Fetch> {
    match fetches.len() {
      0 => None,
      1 => Some(fetches.into_iter().next().unwrap().2),
      _ => {
        let hashes: Vec<u64> = fetches.iter().map(|(_, hash, _)| *hash).collect();

        let dependency_hashes = |field_ref: FieldRef, ds_hash: u64| -> Vec<u64> {
          self
            .outcome
            .field_depends_on
            .get(&(field_ref, ds_hash))
            .map(|deps| {
              deps
                .iter()
                .filter_map(|dep| self.outcome.field_landed_to.get(dep).copied())
                .collect()
            })
            .unwrap_or_default()
        };

        let needs_serial = fetches.iter().any(|(field_ref, ds_hash, _)| {
          dependency_hashes(*field_ref, *ds_hash)
            .iter()
            .any(|dep_hash| *dep_hash != *ds_hash && hashes.contains(dep_hash))
        });

        if !needs_serial {
          return Some(Fetch::Parallel(
            fetches.into_iter().map(|(_, _, fetch)| fetch).collect(),
          ));
        }

        // providers first: a hop whose source another hop depends on runs
        // ahead of it
        let depended_upon: Vec<u64> = fetches
          .iter()
          .flat_map(|(field_ref, ds_hash, _)| dependency_hashes(*field_ref, *ds_hash))
          .collect();
        let mut ordered = fetches;
        ordered.sort_by_key(|(_, hash, _)| !depended_upon.contains(hash));
        Some(Fetch::Serial(
          ordered.into_iter().map(|(_, _, fetch)| fetch).collect(),
        ))
      }
    }
  }

  fn quote_scalar(&self, base_type: &str) -> bool {
    match base_type {
      "String" | "ID" => true,
      "Int" | "Float" | "Boolean" => false,
      // enums and custom scalars travel as strings
      other => !self.supergraph.types.contains_key(other),
    }
  }

  fn field_def(
    &self,
    type_name: &str,
    field_name: &str,
    path: &str,
  ) -> Result<&SupergraphField, PlannerError> {
    self
      .supergraph
      .types
      .get(type_name)
      .and_then(|t| t.fields.get(field_name))
      .ok_or_else(|| PlannerError::UnknownField {
        type_name: type_name.to_string(),
        field_name: field_name.to_string(),
        path: path.to_string(),
      })
  }

  fn source(
    &self,
    hash: u64,
    type_name: &str,
    field_name: &str,
    path: &str,
  ) -> Result<Arc<dyn DataSource>, PlannerError> {
    self
      .sources
      .get(&hash)
      .cloned()
      .ok_or_else(|| PlannerError::SuggestionWithoutDataSource {
        type_name: type_name.to_string(),
        field_name: field_name.to_string(),
        path: path.to_string(),
      })
  }
}

/// A literal `first:` argument caps how many list items render.
fn first_n_filter(field: &crate::operation::FieldNode) -> Option<ListFilter> {
  field
    .arguments
    .iter()
    .find(|argument| argument.name == "first")
    .and_then(|argument| argument.value.parse::<usize>().ok())
    .map(ListFilter::FirstN)
}
