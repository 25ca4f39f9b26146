use anyhow::{anyhow, Ok, Result};
use graphql_parser::schema::{Definition as SchemaDefinition, TypeDefinition, Value};
use plan_executor::datasource::{DataSource, FieldConfig, SubgraphFederationMetadata};
use plan_executor::graphql_source::GraphQLSubgraphSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use switchboard_common::graphql::ParsedGraphQLSchema;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize, Clone)]
pub struct SupergraphField {
  pub field_type: String,
  pub sources: Vec<String>,
  pub requires: Option<String>,
  pub provides: Option<String>,
  pub external: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
  #[default]
  Object,
  Interface,
  Union,
}

/// One `@join__type(key: …)` entry.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct TypeKey {
  pub graph: String,
  pub selection_set: String,
  pub resolvable: bool,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize, Clone)]
pub struct SupergraphType {
  pub kind: TypeKind,
  pub keys: Vec<TypeKey>,
  /// Subgraphs representing this type as an interface object.
  pub interface_objects: Vec<String>,
  pub fields: HashMap<String, SupergraphField>,
  pub owner: Option<String>,
  /// Subgraphs that know this type at all.
  pub subgraphs: Vec<String>,
  /// For unions: members per subgraph, from `@join__unionMember`.
  pub union_members: HashMap<String, Vec<String>>,
  /// For interfaces: concrete types implementing them.
  pub implementers: Vec<String>,
}

impl SupergraphType {
  pub fn get_field(&self, name: &str, parent_type_name: &str) -> Result<&SupergraphField> {
    match self.fields.get(name) {
      Some(f) => Ok(f),
      None => Err(anyhow!(format!(
        "Field \"{}\" is not available on type {}",
        name, parent_type_name
      ))),
    }
  }

  pub fn keys_for_graph(&self, graph: &str) -> Vec<&TypeKey> {
    self.keys.iter().filter(|key| key.graph == graph).collect()
  }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct Supergraph {
  pub types: HashMap<String, SupergraphType>,
  pub subgraphs: HashMap<String, String>,
}

impl<'a> Supergraph {
  pub fn get_gql_type(
    &'a self,
    name: &'a str,
    item_description: &'a str,
  ) -> Result<&'a SupergraphType> {
    match self.types.get(name) {
      Some(t) => Ok(t),
      None => Err(anyhow!(format!(
        "{item_description} \"{name}\" not defined in your supergraph schema!",
      ))),
    }
  }

  /// Federation capabilities of one subgraph, as the planner and the data
  /// sources consume them.
  pub fn subgraph_metadata(&self, graph: &str) -> SubgraphFederationMetadata {
    let mut metadata = SubgraphFederationMetadata::default();

    for (type_name, gql_type) in &self.types {
      for key in gql_type.keys_for_graph(graph) {
        let config = FieldConfig {
          type_name: type_name.clone(),
          field_name: String::new(),
          selection_set: key.selection_set.clone(),
          resolvable: key.resolvable,
        };
        metadata
          .keys
          .entry(type_name.clone())
          .or_default()
          .push(config.clone());
        metadata.federation.keys.push(config);

        if gql_type.kind == TypeKind::Interface {
          metadata.entity_interfaces.insert(type_name.clone());
        }
      }

      if gql_type.interface_objects.iter().any(|g| g == graph) {
        metadata.interface_objects.insert(type_name.clone());
      }

      for (field_name, field) in &gql_type.fields {
        if let Some(requires) = &field.requires {
          if field.sources.iter().any(|source| source == graph) {
            metadata.requires.insert(
              format!("{type_name}.{field_name}"),
              FieldConfig {
                type_name: type_name.clone(),
                field_name: field_name.clone(),
                selection_set: requires.clone(),
                resolvable: true,
              },
            );
          }
        }
      }
    }

    metadata
  }

  /// One stock HTTP data source per subgraph, hashed by subgraph name.
  /// Sorted by name so suggestion ordering stays deterministic.
  pub fn data_sources(&self) -> Vec<Arc<dyn DataSource>> {
    let mut names: Vec<&String> = self.subgraphs.keys().collect();
    names.sort();
    names
      .into_iter()
      .map(|name| {
        Arc::new(GraphQLSubgraphSource::new(
          name.clone(),
          self.subgraphs[name].clone(),
          self.subgraph_metadata(name),
        )) as Arc<dyn DataSource>
      })
      .collect()
  }
}

fn get_argument_value(args: &[(String, Value<'_, String>)], key: &str) -> Option<String> {
  args
    .iter()
    .find(|(k, _)| k == key)
    .map(|(_, v)| v.to_string().trim().to_string())
}

pub fn parse_supergraph(
  supergraph_schema: &ParsedGraphQLSchema,
) -> Result<Supergraph, anyhow::Error> {
  let result = supergraph_schema.clone();
  let mut parsed_supergraph = Supergraph::default();
  // object -> interface pairs, applied once all types are known
  let mut implementations: Vec<(String, String)> = Vec::new();

  for e in result.definitions {
    if let SchemaDefinition::TypeDefinition(t) = e {
      match t {
        // subgraph names and their corresponding URLs
        TypeDefinition::Enum(a) => {
          for mut value in a.values {
            if value.directives.is_empty() {
              continue;
            }

            // in any supergraph there is exactly one enum defining the
            // subgraphs, so the first directive is the one we want
            let directive = value.directives.remove(0);
            let arguments = directive.arguments;

            if directive.name == "join__graph" {
              let name = get_argument_value(&arguments, "name")
                .unwrap_or_default()
                .trim_matches('"')
                .to_uppercase();
              let url = get_argument_value(&arguments, "url")
                .unwrap_or_default()
                .trim_matches('"')
                .to_string();

              if !name.is_empty() {
                parsed_supergraph.subgraphs.insert(name, url);
              }
            }
          }
        }
        TypeDefinition::Object(obj) => {
          let graphql_type = parse_type_body(TypeKind::Object, &obj.directives, &obj.fields);
          for interface in &obj.implements_interfaces {
            implementations.push((obj.name.clone(), interface.clone()));
          }
          parsed_supergraph
            .types
            .insert(obj.name.clone(), graphql_type);
        }
        TypeDefinition::Interface(iface) => {
          let graphql_type = parse_type_body(TypeKind::Interface, &iface.directives, &iface.fields);
          parsed_supergraph
            .types
            .insert(iface.name.clone(), graphql_type);
        }
        TypeDefinition::Union(union_type) => {
          let mut graphql_type = SupergraphType {
            kind: TypeKind::Union,
            ..Default::default()
          };

          for directive in &union_type.directives {
            match directive.name.as_str() {
              "join__type" => {
                if let Some(graph) = get_argument_value(&directive.arguments, "graph") {
                  if !graphql_type.subgraphs.contains(&graph) {
                    graphql_type.subgraphs.push(graph);
                  }
                }
              }
              "join__unionMember" => {
                if let (Some(graph), Some(member)) = (
                  get_argument_value(&directive.arguments, "graph"),
                  get_argument_value(&directive.arguments, "member"),
                ) {
                  graphql_type
                    .union_members
                    .entry(graph)
                    .or_default()
                    .push(member.trim_matches('"').to_string());
                }
              }
              _ => {}
            }
          }

          // without join metadata every subgraph is assumed to know every
          // member, which the implementers list captures
          graphql_type.implementers = union_type.types.clone();

          parsed_supergraph
            .types
            .insert(union_type.name.clone(), graphql_type);
        }
        _ => {}
      }
    }
  }

  for (object, interface) in implementations {
    if let Some(interface_type) = parsed_supergraph.types.get_mut(&interface) {
      interface_type.implementers.push(object);
    }
  }

  if parsed_supergraph.subgraphs.is_empty() || parsed_supergraph.types.is_empty() {
    return Err(anyhow::anyhow!("Your supergraph schema doesn't seem to be correct! The parser has resulted in 0 types, and 0 subgraphs."));
  }

  Ok(parsed_supergraph)
}

fn parse_type_body(
  kind: TypeKind,
  directives: &[graphql_parser::schema::Directive<'static, String>],
  fields: &[graphql_parser::schema::Field<'static, String>],
) -> SupergraphType {
  let mut graphql_type = SupergraphType {
    kind,
    ..Default::default()
  };

  // subgraphs the whole type belongs to; fields without a specific
  // `@join__field(graph: …)` inherit these
  let mut graphql_type_subgraphs = Vec::new();

  for directive in directives {
    match directive.name.as_str() {
      "join__type" => {
        if let Some(graph) = get_argument_value(&directive.arguments, "graph") {
          if !graphql_type_subgraphs.contains(&graph) {
            graphql_type_subgraphs.push(graph.clone());
          }

          if let Some(key) = get_argument_value(&directive.arguments, "key") {
            let resolvable = get_argument_value(&directive.arguments, "resolvable")
              .map(|value| value != "false")
              .unwrap_or(true);
            graphql_type.keys.push(TypeKey {
              graph: graph.clone(),
              selection_set: key.trim_matches('"').to_string(),
              resolvable,
            });
          }

          if get_argument_value(&directive.arguments, "isInterfaceObject").as_deref() == Some("true")
          {
            graphql_type.interface_objects.push(graph);
          }
        }
      }
      "join__owner" => {
        if let Some(graph) = get_argument_value(&directive.arguments, "graph") {
          graphql_type.owner = Some(graph.trim_matches('"').to_string());
        }
      }
      _ => {}
    }
  }

  graphql_type.subgraphs = graphql_type_subgraphs.clone();

  for field in fields {
    let mut specific_sources_found = false;
    let mut collected_sources = Vec::new();

    let mut graphql_type_field = SupergraphField {
      sources: Vec::new(),
      field_type: field.field_type.to_string(),
      requires: None,
      provides: None,
      external: false,
    };

    for field_directive in &field.directives {
      if field_directive.name == "join__field" {
        for (k, v) in &field_directive.arguments {
          match k.as_str() {
            "graph" => {
              let subgraph = v.to_string().trim_matches('"').to_string();
              if !collected_sources.contains(&subgraph) {
                collected_sources.push(subgraph);
              }
              specific_sources_found = true;
            }
            "requires" => {
              graphql_type_field.requires = Some(v.to_string().trim_matches('"').to_string());
            }
            "provides" => {
              graphql_type_field.provides = Some(v.to_string().trim_matches('"').to_string());
            }
            "external" => {
              graphql_type_field.external = v.to_string() == "true";
            }
            _ => {}
          }
        }
      }
    }

    if specific_sources_found {
      graphql_type_field.sources = collected_sources;
    } else {
      graphql_type_field.sources = graphql_type_subgraphs.clone();
    }

    graphql_type
      .fields
      .insert(field.name.clone(), graphql_type_field);
  }

  graphql_type
}

pub fn unwrap_graphql_type(typename: &str) -> &str {
  let mut unwrapped = typename;
  while unwrapped.ends_with('!') || unwrapped.starts_with('[') || unwrapped.ends_with(']') {
    unwrapped = unwrapped.trim_end_matches('!');
    unwrapped = unwrapped.trim_start_matches('[');
    unwrapped = unwrapped.trim_end_matches(']');
  }
  unwrapped
}
