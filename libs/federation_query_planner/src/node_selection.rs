use crate::error::PlannerError;
use crate::operation::{FieldNode, FieldRef, Operation, Selection, SelectionSetRef};
use crate::suggestions::{root_type_name, seed_suggestions, NodeSuggestion, NodeSuggestions};
use crate::supergraph::{unwrap_graphql_type, Supergraph};
use graphql_parser::query::{Selection as AstSelection, SelectionSet};
use plan_executor::datasource::{DataSource, FieldConfig};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use xxhash_rust::xxh64::xxh64;

/// Walks the operation multiple times to rewrite it until every field can be
/// resolved: required fields are injected, abstract selections rewritten,
/// and field-to-field dependencies recorded. Re-walks while new fields were
/// added or fields are still unresolved.
pub struct NodeSelectionVisitor<'a> {
  pub(crate) operation: &'a mut Operation,
  pub(crate) supergraph: &'a Supergraph,
  pub(crate) data_sources: Vec<Arc<dyn DataSource>>,
  pub(crate) source_names: HashMap<u64, String>,

  pub(crate) suggestions: NodeSuggestions,

  // stack of selection set refs, used to attach pending requirements
  selection_set_stack: Vec<SelectionSetRef>,
  // fields added by the planner that must be stripped from the client response
  pub(crate) skip_field_refs: Vec<FieldRef>,

  pending_key_requirements: HashMap<SelectionSetRef, PendingKeyRequirements>,
  pending_field_requirements: HashMap<SelectionSetRef, PendingFieldRequirements>,

  visited_fields_requires_checks: HashSet<(FieldRef, u64)>,
  visited_fields_key_checks: HashSet<(FieldRef, u64)>,
  pub(crate) visited_fields_abstract_checks: HashSet<FieldRef>,

  // field (ref, ds hash) -> refs it must wait for
  pub(crate) field_depends_on: HashMap<(FieldRef, u64), Vec<FieldRef>>,
  // field (ref, ds hash) -> key/requires configurations backing its representation
  pub(crate) field_requirements_configs: HashMap<(FieldRef, u64), Vec<FieldConfig>>,
  // injected field ref -> data source it was landed to
  pub(crate) field_landed_to: HashMap<FieldRef, u64>,

  secondary_run: bool,
  has_new_fields: bool,
  has_unresolved_fields: bool,
  first_unresolved: Option<(String, String, String)>,
}

#[derive(Debug, Default)]
struct PendingKeyRequirements {
  exists_tracker: HashSet<u64>,
  parent_ds_hashes: Vec<u64>,
  configs: Vec<KeyRequirement>,
}

#[derive(Debug, Clone)]
struct KeyRequirement {
  ds_hash: u64,
  path: String,
  is_interface_object: bool,
  possible_keys: Vec<FieldConfig>,
  requested_by_field_refs: Vec<FieldRef>,
}

#[derive(Debug, Default)]
struct PendingFieldRequirements {
  exists_tracker: HashSet<(u64, String)>,
  configs: Vec<FieldRequirement>,
}

#[derive(Debug, Clone)]
struct FieldRequirement {
  ds_hash: u64,
  path: String,
  selection_set: String,
  requested_by_field_refs: Vec<FieldRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkFlow {
  Continue,
  /// A rewrite happened; abort the pass so the next one observes it.
  Stop,
}

/// Everything the plan builder needs once the walk reached its fixed point.
pub struct NodeSelectionOutcome {
  pub suggestions: NodeSuggestions,
  pub skip_field_refs: HashSet<FieldRef>,
  pub field_depends_on: HashMap<(FieldRef, u64), Vec<FieldRef>>,
  pub field_requirements_configs: HashMap<(FieldRef, u64), Vec<FieldConfig>>,
  pub field_landed_to: HashMap<FieldRef, u64>,
  pub source_names: HashMap<u64, String>,
}

impl<'a> NodeSelectionVisitor<'a> {
  pub fn new(
    operation: &'a mut Operation,
    supergraph: &'a Supergraph,
    data_sources: &[Arc<dyn DataSource>],
  ) -> Self {
    let mut source_names = HashMap::new();
    for name in supergraph.subgraphs.keys() {
      source_names.insert(xxh64(name.as_bytes(), 0), name.clone());
    }

    NodeSelectionVisitor {
      operation,
      supergraph,
      data_sources: data_sources.to_vec(),
      source_names,
      suggestions: NodeSuggestions::new(),
      selection_set_stack: Vec::new(),
      skip_field_refs: Vec::new(),
      pending_key_requirements: HashMap::new(),
      pending_field_requirements: HashMap::new(),
      visited_fields_requires_checks: HashSet::new(),
      visited_fields_key_checks: HashSet::new(),
      visited_fields_abstract_checks: HashSet::new(),
      field_depends_on: HashMap::new(),
      field_requirements_configs: HashMap::new(),
      field_landed_to: HashMap::new(),
      secondary_run: false,
      has_new_fields: false,
      has_unresolved_fields: false,
      first_unresolved: None,
    }
  }

  /// Starts from suggestions produced by a preceding selection algorithm;
  /// seeding only fills the paths it left out.
  pub fn with_suggestions(
    operation: &'a mut Operation,
    supergraph: &'a Supergraph,
    data_sources: &[Arc<dyn DataSource>],
    suggestions: NodeSuggestions,
  ) -> Self {
    let mut visitor = NodeSelectionVisitor::new(operation, supergraph, data_sources);
    visitor.suggestions = suggestions;
    visitor
  }

  pub fn should_revisit(&self) -> bool {
    self.has_new_fields || self.has_unresolved_fields
  }

  pub fn has_new_fields(&self) -> bool {
    self.has_new_fields
  }

  pub fn has_unresolved_fields(&self) -> bool {
    self.has_unresolved_fields
  }

  pub fn unresolved_error(&self) -> PlannerError {
    let (type_name, field_name, path) = self.first_unresolved.clone().unwrap_or_default();
    PlannerError::UnresolvedField {
      type_name,
      field_name,
      path,
    }
  }

  pub fn into_outcome(self) -> NodeSelectionOutcome {
    NodeSelectionOutcome {
      suggestions: self.suggestions,
      skip_field_refs: self.skip_field_refs.into_iter().collect(),
      field_depends_on: self.field_depends_on,
      field_requirements_configs: self.field_requirements_configs,
      field_landed_to: self.field_landed_to,
      source_names: self.source_names,
    }
  }

  /// One pass over the operation. Flags are reset at the top of every pass.
  #[tracing::instrument(level = "debug", skip_all, fields(secondary_run = self.secondary_run))]
  pub fn walk(&mut self) -> Result<(), PlannerError> {
    self.has_new_fields = false;
    self.has_unresolved_fields = false;
    self.first_unresolved = None;
    self.selection_set_stack.clear();

    seed_suggestions(self.operation, self.supergraph, &mut self.suggestions)?;

    let root = self.operation.root;
    let root_type = root_type_name(self.operation).to_string();
    let root_path = self.operation.operation_type.root_path().to_string();
    self.visit_selection_set(root, &root_type, &root_path)?;

    self.secondary_run = true;
    Ok(())
  }

  fn visit_selection_set(
    &mut self,
    selection_set_ref: SelectionSetRef,
    type_name: &str,
    parent_path: &str,
  ) -> Result<WalkFlow, PlannerError> {
    self.selection_set_stack.push(selection_set_ref);

    let selections = self.operation.selection_set(selection_set_ref).selections.clone();
    for selection in selections {
      let flow = match selection {
        Selection::Field(field_ref) => self.visit_field(field_ref, type_name, parent_path)?,
        Selection::InlineFragment(fragment_ref) => {
          let fragment = self.operation.inline_fragment(fragment_ref).clone();
          let condition = if fragment.type_condition.is_empty() {
            type_name.to_string()
          } else {
            fragment.type_condition
          };
          self.visit_selection_set(fragment.selection_set, &condition, parent_path)?
        }
      };
      if flow == WalkFlow::Stop {
        self.selection_set_stack.pop();
        return Ok(WalkFlow::Stop);
      }
    }

    // field requirements flush first, they may themselves add keys
    self.process_pending_field_requirements(selection_set_ref, type_name, parent_path)?;
    self.process_pending_key_requirements(selection_set_ref, parent_path)?;

    self.selection_set_stack.pop();
    Ok(WalkFlow::Continue)
  }

  fn visit_field(
    &mut self,
    field_ref: FieldRef,
    type_name: &str,
    parent_path: &str,
  ) -> Result<WalkFlow, PlannerError> {
    let field = self.operation.field(field_ref).clone();
    let field_name = field.name.clone();
    let current_path = format!("{parent_path}.{}", field.response_name());

    let field_suggestions: Vec<NodeSuggestion> = self
      .suggestions
      .suggestions_for_path(type_name, &field_name, &current_path)
      .into_iter()
      .cloned()
      .collect();

    if field_name != "__typename" && !field_suggestions.iter().any(|s| s.selected) {
      self.has_unresolved_fields = true;
      if self.first_unresolved.is_none() {
        self.first_unresolved = Some((
          type_name.to_string(),
          field_name.clone(),
          current_path.clone(),
        ));
      }
    }

    for suggestion in field_suggestions
      .iter()
      .filter(|s| s.selected && !s.is_required_key_field)
    {
      let Some(ds) = self
        .data_sources
        .iter()
        .find(|source| source.hash() == suggestion.data_source_hash)
        .cloned()
      else {
        return Err(PlannerError::SuggestionWithoutDataSource {
          type_name: type_name.to_string(),
          field_name: field_name.clone(),
          path: current_path.clone(),
        });
      };

      self.handle_field_required_by_requires(field_ref, type_name, &field_name, &current_path, &ds)?;
      self.handle_fields_required_by_key(
        field_ref,
        parent_path,
        type_name,
        &field_name,
        &current_path,
        &ds,
      )?;
      if self.rewrite_abstract_selection(field_ref, type_name, &ds)? {
        self.has_new_fields = true;
        return Ok(WalkFlow::Stop);
      }
    }

    if field_name == "__typename" {
      return Ok(WalkFlow::Continue);
    }

    if let Some(child_selection_set) = field.selection_set {
      let Some(gql_type) = self.supergraph.types.get(type_name) else {
        return Ok(WalkFlow::Continue);
      };
      let Some(gql_field) = gql_type.fields.get(&field_name) else {
        return Ok(WalkFlow::Continue);
      };
      let child_type = unwrap_graphql_type(&gql_field.field_type).to_string();
      return self.visit_selection_set(child_selection_set, &child_type, &current_path);
    }

    Ok(WalkFlow::Continue)
  }

  fn handle_field_required_by_requires(
    &mut self,
    field_ref: FieldRef,
    type_name: &str,
    field_name: &str,
    current_path: &str,
    ds: &Arc<dyn DataSource>,
  ) -> Result<(), PlannerError> {
    if !self
      .visited_fields_requires_checks
      .insert((field_ref, ds.hash()))
    {
      return Ok(());
    }

    // __typename cannot carry a @requires directive
    if field_name == "__typename" {
      return Ok(());
    }

    let Some(config) = ds.required_fields_by_requires(type_name, field_name) else {
      return Ok(());
    };

    // the fields will be injected on leaving the current selection set
    self.add_pending_field_requirement(field_ref, ds.hash(), config, current_path);
    self.has_new_fields = true;
    Ok(())
  }

  fn handle_fields_required_by_key(
    &mut self,
    field_ref: FieldRef,
    parent_path: &str,
    type_name: &str,
    field_name: &str,
    current_path: &str,
    ds: &Arc<dyn DataSource>,
  ) -> Result<(), PlannerError> {
    if !self.visited_fields_key_checks.insert((field_ref, ds.hash())) {
      return Ok(());
    }

    let has_requires = ds.required_fields_by_requires(type_name, field_name).is_some();
    let parent_hashes = self.suggestions.selected_hashes_at(parent_path);

    let entity_interface = ds.has_entity_interface(type_name);
    let interface_object = ds.has_interface_object(type_name);

    // __typename cannot carry @key, except on an entity interface where the
    // concrete __typename is how the subgraph jump resolves polymorphism
    if field_name == "__typename" && !entity_interface {
      return Ok(());
    }

    // keys matter only when the field moves to another data source; the one
    // exception is @requires, which still needs the entity representation
    // for its resolver on the same source
    let same_as_parent = parent_hashes.len() == 1 && parent_hashes[0] == ds.hash();
    if same_as_parent && !has_requires {
      return Ok(());
    }

    let mut key_configs = ds.required_fields_by_key(type_name);

    if key_configs.is_empty() && has_requires {
      // the entity resolver may be disabled; a field with @requires still
      // needs the key fields passed into its resolver
      key_configs = ds.federation_configuration().keys_for_type(type_name, false);
    }

    if key_configs.is_empty() {
      if parent_hashes.is_empty() || same_as_parent {
        // root selections have no parent fetch to join against
        return Ok(());
      }
      return Err(PlannerError::UnsatisfiableKeyRequirement {
        type_name: type_name.to_string(),
        path: current_path.to_string(),
      });
    }

    if same_as_parent {
      let first = key_configs[0].clone();
      self.add_pending_key_requirement(field_ref, ds.hash(), vec![first], false, parent_path, parent_hashes);
    } else {
      self.add_pending_key_requirement(
        field_ref,
        ds.hash(),
        key_configs,
        interface_object,
        parent_path,
        parent_hashes,
      );
    }
    self.has_new_fields = true;
    Ok(())
  }

  fn add_pending_field_requirement(
    &mut self,
    requested_by: FieldRef,
    ds_hash: u64,
    config: FieldConfig,
    current_path: &str,
  ) {
    let current_selection_set = *self.selection_set_stack.last().expect("inside a selection set");

    let pending = self
      .pending_field_requirements
      .entry(current_selection_set)
      .or_default();

    if pending
      .exists_tracker
      .insert((ds_hash, config.selection_set.clone()))
    {
      pending.configs.push(FieldRequirement {
        ds_hash,
        path: current_path.to_string(),
        selection_set: config.selection_set.clone(),
        requested_by_field_refs: vec![requested_by],
      });
    } else {
      for requirement in &mut pending.configs {
        if requirement.ds_hash == ds_hash && requirement.selection_set == config.selection_set {
          if !requirement.requested_by_field_refs.contains(&requested_by) {
            requirement.requested_by_field_refs.push(requested_by);
          }
          break;
        }
      }
    }

    self
      .field_requirements_configs
      .entry((requested_by, ds_hash))
      .or_default()
      .push(config);
  }

  fn add_pending_key_requirement(
    &mut self,
    requested_by: FieldRef,
    ds_hash: u64,
    possible_keys: Vec<FieldConfig>,
    is_interface_object: bool,
    parent_path: &str,
    parent_ds_hashes: Vec<u64>,
  ) {
    let current_selection_set = *self.selection_set_stack.last().expect("inside a selection set");

    let pending = self
      .pending_key_requirements
      .entry(current_selection_set)
      .or_insert_with(|| PendingKeyRequirements {
        exists_tracker: HashSet::new(),
        parent_ds_hashes,
        configs: Vec::new(),
      });

    if pending.exists_tracker.insert(ds_hash) {
      pending.configs.push(KeyRequirement {
        ds_hash,
        path: parent_path.to_string(),
        is_interface_object,
        possible_keys,
        requested_by_field_refs: vec![requested_by],
      });
    } else {
      for requirement in &mut pending.configs {
        if requirement.ds_hash == ds_hash {
          if !requirement.requested_by_field_refs.contains(&requested_by) {
            requirement.requested_by_field_refs.push(requested_by);
          }
          break;
        }
      }
    }
  }

  fn process_pending_field_requirements(
    &mut self,
    selection_set_ref: SelectionSetRef,
    type_name: &str,
    parent_path: &str,
  ) -> Result<(), PlannerError> {
    let Some(pending) = self.pending_field_requirements.remove(&selection_set_ref) else {
      return Ok(());
    };

    for requirement in pending.configs {
      let fragment = required_fields_fragment(&requirement.selection_set, false).map_err(|_| {
        PlannerError::RequiredFieldsParse {
          selection_set: requirement.selection_set.clone(),
          type_name: type_name.to_string(),
          path: requirement.path.clone(),
        }
      })?;

      let (skip_refs, injected) =
        self.add_required_fields(selection_set_ref, &fragment, type_name, parent_path, None)?;
      self.skip_field_refs.extend(&skip_refs);

      for requested_by in &requirement.requested_by_field_refs {
        let key = (*requested_by, requirement.ds_hash);
        let deps = self.field_depends_on.entry(key).or_default();
        for injected_ref in &injected {
          if injected_ref != requested_by && !deps.contains(injected_ref) {
            deps.push(*injected_ref);
          }
        }
      }
    }

    Ok(())
  }

  fn process_pending_key_requirements(
    &mut self,
    selection_set_ref: SelectionSetRef,
    parent_path: &str,
  ) -> Result<(), PlannerError> {
    let Some(pending) = self.pending_key_requirements.remove(&selection_set_ref) else {
      return Ok(());
    };

    let mut available = pending.parent_ds_hashes;
    let mut pending_requirements = pending.configs;

    // iterative saturation: each matched requirement's source becomes
    // available for the next round
    while !pending_requirements.is_empty() {
      let mut new_available = Vec::with_capacity(available.len());
      let mut still_pending = Vec::with_capacity(pending_requirements.len());

      for requirement in pending_requirements {
        if self.match_data_sources_by_key(selection_set_ref, &requirement, &available, parent_path)? {
          new_available.push(requirement.ds_hash);
        } else {
          still_pending.push(requirement);
        }
      }

      if new_available.is_empty() {
        let first = &still_pending[0];
        return Err(PlannerError::UnsatisfiableKeyRequirement {
          type_name: first
            .possible_keys
            .first()
            .map(|key| key.type_name.clone())
            .unwrap_or_default(),
          path: first.path.clone(),
        });
      }

      available = new_available;
      pending_requirements = still_pending;
    }

    Ok(())
  }

  fn match_data_sources_by_key(
    &mut self,
    selection_set_ref: SelectionSetRef,
    requirement: &KeyRequirement,
    available: &[u64],
    parent_path: &str,
  ) -> Result<bool, PlannerError> {
    let sources = self.data_sources.clone();
    for ds in &sources {
      if !available.contains(&ds.hash()) {
        continue;
      }
      for key_config in &requirement.possible_keys {
        if ds.has_key_requirement(&key_config.type_name, &key_config.selection_set) {
          self.add_key_requirements_to_operation(
            selection_set_ref,
            requirement,
            ds,
            key_config,
            parent_path,
          )?;
          return Ok(true);
        }
      }
    }
    Ok(false)
  }

  fn add_key_requirements_to_operation(
    &mut self,
    selection_set_ref: SelectionSetRef,
    requirement: &KeyRequirement,
    landed_to: &Arc<dyn DataSource>,
    key_config: &FieldConfig,
    parent_path: &str,
  ) -> Result<(), PlannerError> {
    let requirements_from_interface_object = requirement.is_interface_object;
    let requirements_to_interface_object = landed_to.has_interface_object(&key_config.type_name);

    // an interface-object to interface-object jump is polymorphic at the
    // interface level, so no concrete __typename travels with the key
    let disallow_typename = requirements_from_interface_object && requirements_to_interface_object;

    let fragment = required_fields_fragment(&key_config.selection_set, !disallow_typename)
      .map_err(|_| PlannerError::RequiredFieldsParse {
        selection_set: key_config.selection_set.clone(),
        type_name: key_config.type_name.clone(),
        path: requirement.path.clone(),
      })?;

    let landed_name = self
      .source_names
      .get(&landed_to.hash())
      .cloned()
      .unwrap_or_else(|| format!("{:x}", landed_to.hash()));

    let (skip_refs, injected) = self.add_required_fields(
      selection_set_ref,
      &fragment,
      &key_config.type_name,
      parent_path,
      Some((landed_name, landed_to.hash())),
    )?;
    self.skip_field_refs.extend(&skip_refs);

    for requested_by in &requirement.requested_by_field_refs {
      if injected.contains(requested_by) {
        // a field that is itself part of the key owes nothing to the key
        continue;
      }
      let key = (*requested_by, requirement.ds_hash);
      let deps = self.field_depends_on.entry(key).or_default();
      for injected_ref in &injected {
        if injected_ref != requested_by && !deps.contains(injected_ref) {
          deps.push(*injected_ref);
        }
      }
      self
        .field_requirements_configs
        .entry(key)
        .or_default()
        .push(key_config.clone());
    }

    for injected_ref in &injected {
      self.field_landed_to.insert(*injected_ref, landed_to.hash());
    }

    Ok(())
  }

  /// Injects the parsed requirement selections into the operation. Returns
  /// `(skip_field_refs, all_field_refs)`: newly created fields land in both
  /// lists, fields the client already requested only in the second.
  fn add_required_fields(
    &mut self,
    selection_set_ref: SelectionSetRef,
    requirement_selections: &SelectionSet<'static, String>,
    type_name: &str,
    base_path: &str,
    landed: Option<(String, u64)>,
  ) -> Result<(Vec<FieldRef>, Vec<FieldRef>), PlannerError> {
    let mut skip_refs = Vec::new();
    let mut all_refs = Vec::new();

    for item in &requirement_selections.items {
      let AstSelection::Field(ast_field) = item else {
        return Err(PlannerError::RequiredFieldsInjection {
          selection_set: format!("{requirement_selections}"),
          type_name: type_name.to_string(),
          path: base_path.to_string(),
        });
      };

      let field_path = format!("{base_path}.{}", ast_field.name);

      let field_ref = match self.operation.find_field(selection_set_ref, &ast_field.name) {
        Some(existing) => existing,
        None => {
          let created = self
            .operation
            .add_field(selection_set_ref, FieldNode::leaf(ast_field.name.clone()));
          skip_refs.push(created);

          if let Some((landed_name, landed_hash)) = &landed {
            self.suggestions.add(NodeSuggestion {
              path: field_path.clone(),
              type_name: type_name.to_string(),
              field_name: ast_field.name.clone(),
              source_name: landed_name.clone(),
              data_source_hash: *landed_hash,
              selected: true,
              is_required_key_field: true,
            });
          }
          created
        }
      };
      all_refs.push(field_ref);

      if !ast_field.selection_set.items.is_empty() {
        let child_selection_set = self.operation.ensure_selection_set(field_ref);
        let child_type = self
          .supergraph
          .types
          .get(type_name)
          .and_then(|t| t.fields.get(&ast_field.name))
          .map(|f| unwrap_graphql_type(&f.field_type).to_string())
          .unwrap_or_default();

        let (nested_skip, nested_all) = self.add_required_fields(
          child_selection_set,
          &ast_field.selection_set,
          &child_type,
          &field_path,
          landed.clone(),
        )?;
        skip_refs.extend(nested_skip);
        all_refs.extend(nested_all);
      }
    }

    Ok((skip_refs, all_refs))
  }
}

/// Parses a `@key`/`@requires` selection-set string into an AST fragment,
/// optionally prefixed with `__typename`.
pub(crate) fn required_fields_fragment(
  selection_set: &str,
  include_typename: bool,
) -> Result<SelectionSet<'static, String>, graphql_parser::query::ParseError> {
  let wrapped = if include_typename {
    format!("{{ __typename {selection_set} }}")
  } else {
    format!("{{ {selection_set} }}")
  };

  let document = graphql_parser::parse_query::<String>(&wrapped)?.into_static();
  for definition in document.definitions {
    if let graphql_parser::query::Definition::Operation(
      graphql_parser::query::OperationDefinition::SelectionSet(selection_set),
    ) = definition
    {
      return Ok(selection_set);
    }
  }

  unreachable!("a braced selection set always parses to a bare selection set")
}
