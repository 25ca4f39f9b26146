use crate::datasource::Instruction;
use crate::plan::{Argument, Fetch, Field, List, ListFilter, Object, PlanNode, SkipCondition, Value};
use bytes::BytesMut;
use futures::future::{join_all, BoxFuture};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use switchboard_common::json;
use tokio_util::sync::CancellationToken;
use xxhash_rust::xxh64::xxh64;

/// Operation variables keyed by `xxh64(name)`, holding raw JSON bytes.
pub type Variables = HashMap<u64, Vec<u8>>;

/// Per-operation execution state handed to every fetch.
///
/// Cancellation is ambient: data sources observe the token, the executor
/// itself never polls it.
#[derive(Debug, Default, Clone)]
pub struct ExecutionContext {
  pub cancellation: CancellationToken,
  pub variables: Variables,
  pub extra_arguments: Vec<Argument>,
}

impl ExecutionContext {
  pub fn new() -> Self {
    ExecutionContext::default()
  }

  pub fn with_variables(variables: &serde_json::Map<String, serde_json::Value>) -> Self {
    let mut ctx = ExecutionContext::default();
    for (name, value) in variables {
      ctx.variables.insert(
        xxh64(name.as_bytes(), 0),
        serde_json::to_vec(value).unwrap_or_default(),
      );
    }
    ctx
  }

  pub fn variable(&self, name: &str) -> Option<&[u8]> {
    self
      .variables
      .get(&xxh64(name.as_bytes(), 0))
      .map(|value| value.as_slice())
  }
}

/// Fetch buffers keyed by the xxh64 of their path.
///
/// The map mutex is only held across lookup/insert. A buffer, once inserted
/// for a path, is written by exactly one fetch and read later by the
/// rendering walk; ordering is established by awaiting the fetch joins.
#[derive(Debug, Default)]
pub struct LockableBufferMap {
  buffers: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<BytesMut>>>>,
}

impl LockableBufferMap {
  pub fn acquire(&self, hash: u64) -> Arc<tokio::sync::Mutex<BytesMut>> {
    let mut buffers = self.buffers.lock().unwrap();
    buffers
      .entry(hash)
      .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(BytesMut::with_capacity(1024))))
      .clone()
  }

  pub fn get(&self, hash: u64) -> Option<Arc<tokio::sync::Mutex<BytesMut>>> {
    self.buffers.lock().unwrap().get(&hash).cloned()
  }

  pub fn clear(&self) {
    self.buffers.lock().unwrap().clear();
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArgument {
  pub key: String,
  pub value: Vec<u8>,
}

pub type ResolvedArgs = Vec<ResolvedArgument>;

pub fn resolved_arg_by_key<'a>(args: &'a ResolvedArgs, key: &str) -> Option<&'a [u8]> {
  args
    .iter()
    .find(|arg| arg.key == key)
    .map(|arg| arg.value.as_slice())
}

#[derive(thiserror::Error, Debug)]
pub enum ExecuteError {
  #[error("failed to write response: {0}")]
  Write(#[from] std::io::Error),
}

/// Walks a plan tree, drives its fetches into buffers and renders the JSON
/// response in plan order. Parallelism only affects buffer population,
/// never emission order.
#[derive(Debug, Default)]
pub struct Executor {
  buffers: LockableBufferMap,
}

impl Executor {
  pub fn new() -> Self {
    Executor::default()
  }

  #[tracing::instrument(level = "debug", skip_all)]
  pub async fn execute<W: Write + Send>(
    &mut self,
    ctx: &ExecutionContext,
    root: &Object,
    out: &mut W,
  ) -> Result<Vec<Instruction>, ExecuteError> {
    self.buffers.clear();

    let mut render = Render {
      ctx,
      buffers: &self.buffers,
      out,
      err: None,
      instructions: Vec::new(),
    };

    let path = root.operation_type.root_path().to_string();
    render.resolve_object(root, b"", path, true).await;

    match render.err {
      Some(err) => Err(ExecuteError::Write(err)),
      None => Ok(render.instructions),
    }
  }
}

struct Render<'e, W: Write + Send> {
  ctx: &'e ExecutionContext,
  buffers: &'e LockableBufferMap,
  out: &'e mut W,
  err: Option<std::io::Error>,
  instructions: Vec<Instruction>,
}

impl<'e, W: Write + Send> Render<'e, W> {
  /// Writes are elided once the first error is captured.
  fn write(&mut self, data: &[u8]) {
    if self.err.is_some() {
      return;
    }
    if let Err(err) = self.out.write_all(data) {
      self.err = Some(err);
    }
  }

  fn resolve_node<'a>(
    &'a mut self,
    node: &'a PlanNode,
    data: &'a [u8],
    path: String,
    should_fetch: bool,
  ) -> BoxFuture<'a, ()> {
    Box::pin(async move {
      match node {
        PlanNode::Object(object) => self.resolve_object(object, data, path, should_fetch).await,
        PlanNode::List(list) => self.resolve_list(list, data, path).await,
        PlanNode::Value(value) => self.resolve_value(value, data),
      }
    })
  }

  async fn resolve_object(
    &mut self,
    object: &Object,
    data: &[u8],
    path: String,
    should_fetch: bool,
  ) {
    let mut data = data;
    if !data.is_empty() && !object.path.is_empty() {
      match json::get(data, &as_refs(&object.path)) {
        Some(navigated) => data = navigated,
        None => {
          self.write(b"null");
          return;
        }
      }
    }

    if should_fetch {
      if let Some(fetch) = &object.fetch {
        let instructions = execute_fetch(fetch, self.ctx, self.buffers, data, &path).await;
        self.instructions.extend(instructions);
      }
    }

    if data == b"null" {
      self.write(b"null");
      return;
    }

    self.write(b"{");
    let mut first = true;
    for field in &object.fields {
      if let Some(condition) = &field.skip {
        if evaluate_condition(condition, self.ctx, data) {
          continue;
        }
      }
      if !first {
        self.write(b",");
      }
      first = false;
      self.resolve_field(field, data, &path).await;
    }
    self.write(b"}");
  }

  async fn resolve_field(&mut self, field: &Field, data: &[u8], parent_path: &str) {
    let path = format!("{}.{}", parent_path, field.name);

    let handle;
    let guard;
    let mut data = data;
    if field.has_resolver {
      match self.buffers.get(xxh64(path.as_bytes(), 0)) {
        None => {
          self.write(b"\"");
          self.write(field.name.as_bytes());
          self.write(b"\":null");
          return;
        }
        Some(buffer) => {
          handle = buffer;
          guard = handle.lock().await;
          data = &guard[..];
        }
      }
    }

    self.write(b"\"");
    self.write(field.name.as_bytes());
    self.write(b"\":");

    if data.is_empty() && !field.value.has_resolvers() {
      self.write(b"null");
      return;
    }

    self.resolve_node(&field.value, data, path, true).await;
  }

  fn resolve_value(&mut self, value: &Value, data: &[u8]) {
    if data.is_empty() || data == b"null" {
      self.write(b"null");
      return;
    }

    let resolved = if value.path.is_empty() {
      Some(data)
    } else {
      json::get(data, &as_refs(&value.path))
    };

    match resolved {
      None => self.write(b"null"),
      Some(bytes) if bytes == b"null" => self.write(b"null"),
      Some(bytes) => {
        if value.quote {
          self.write(b"\"");
        }
        self.write(bytes);
        if value.quote {
          self.write(b"\"");
        }
      }
    }
  }

  async fn resolve_list(&mut self, list: &List, data: &[u8], path: String) {
    if data == b"null" {
      self.write(b"null");
      return;
    }

    // an empty or missing list still emits balanced brackets
    let items = match json::array_items(data, &as_refs(&list.path)) {
      Some(items) => items,
      None => {
        self.write(b"[]");
        return;
      }
    };

    let mut max_items = items.len();
    if let Some(ListFilter::FirstN(first_n)) = list.filter {
      max_items = max_items.min(first_n);
    }

    if let PlanNode::Object(object) = &*list.value {
      if object.fetch.is_some() {
        let prefetches = items[..max_items].iter().enumerate().map(|(index, item)| {
          prefetch_object(object, self.ctx, self.buffers, item, format!("{path}.{index}"))
        });
        for instructions in join_all(prefetches).await {
          self.instructions.extend(instructions);
        }
      }
    }

    self.write(b"[");
    for index in 0..max_items {
      if index != 0 {
        self.write(b",");
      }
      self
        .resolve_node(&list.value, items[index], format!("{path}.{index}"), false)
        .await;
    }
    self.write(b"]");
  }
}

/// Runs the fetch of one list item ahead of rendering; only buffers are
/// populated, nothing is written.
fn prefetch_object<'a>(
  object: &'a Object,
  ctx: &'a ExecutionContext,
  buffers: &'a LockableBufferMap,
  data: &'a [u8],
  path: String,
) -> BoxFuture<'a, Vec<Instruction>> {
  Box::pin(async move {
    let mut data = data;
    if !data.is_empty() && !object.path.is_empty() {
      match json::get(data, &as_refs(&object.path)) {
        Some(navigated) => data = navigated,
        None => return Vec::new(),
      }
    }
    match &object.fetch {
      Some(fetch) => execute_fetch(fetch, ctx, buffers, data, &path).await,
      None => Vec::new(),
    }
  })
}

fn execute_fetch<'a>(
  fetch: &'a Fetch,
  ctx: &'a ExecutionContext,
  buffers: &'a LockableBufferMap,
  data: &'a [u8],
  path: &'a str,
) -> BoxFuture<'a, Vec<Instruction>> {
  Box::pin(async move {
    match fetch {
      Fetch::Single(single) => {
        let buffer_name = format!("{}.{}", path, single.buffer_name);
        let buffer = buffers.acquire(xxh64(buffer_name.as_bytes(), 0));
        let mut guard = buffer.lock().await;
        guard.clear();
        let args = resolve_args(ctx, &single.source.args, data);
        vec![single.source.data_source.resolve(ctx, args, &mut guard).await]
      }
      Fetch::Serial(fetches) => {
        let mut instructions = Vec::new();
        for fetch in fetches {
          instructions.extend(execute_fetch(fetch, ctx, buffers, data, path).await);
        }
        instructions
      }
      Fetch::Parallel(fetches) => join_all(
        fetches
          .iter()
          .map(|fetch| execute_fetch(fetch, ctx, buffers, data, path)),
      )
      .await
      .into_iter()
      .flatten()
      .collect(),
    }
  })
}

fn evaluate_condition(condition: &SkipCondition, ctx: &ExecutionContext, data: &[u8]) -> bool {
  match condition {
    SkipCondition::IfEqual { left, right } => {
      condition_operand(ctx, data, left) == condition_operand(ctx, data, right)
    }
    SkipCondition::IfNotEqual { left, right } => {
      condition_operand(ctx, data, left) != condition_operand(ctx, data, right)
    }
  }
}

fn condition_operand(ctx: &ExecutionContext, data: &[u8], argument: &Argument) -> Vec<u8> {
  match argument {
    Argument::Static { value, .. } => value.clone(),
    Argument::ContextVariable { variable_name, .. } => ctx
      .variable(variable_name)
      .map(|value| value.to_vec())
      .unwrap_or_default(),
    Argument::ObjectVariable { path, .. } => json::get(data, &as_refs(path))
      .map(|value| value.to_vec())
      .unwrap_or_default(),
    Argument::List { .. } => Vec::new(),
  }
}

/// Materialises fetch arguments against the current data and the execution
/// context, applies `{{ .tag }}` templates, then drops internal arguments
/// (keys starting with a dot).
pub fn resolve_args(ctx: &ExecutionContext, args: &[Argument], data: &[u8]) -> ResolvedArgs {
  let mut resolved = Vec::with_capacity(args.len() + ctx.extra_arguments.len());

  for argument in args.iter().chain(ctx.extra_arguments.iter()) {
    let (key, value) = match argument {
      Argument::Static { name, value } => (name.clone(), value.clone()),
      Argument::ObjectVariable { name, path } => (
        name.clone(),
        json::get(data, &as_refs(path))
          .map(|value| value.to_vec())
          .unwrap_or_default(),
      ),
      Argument::ContextVariable {
        name,
        variable_name,
      } => (
        name.clone(),
        ctx
          .variable(variable_name)
          .map(|value| value.to_vec())
          .unwrap_or_default(),
      ),
      Argument::List { name, arguments } => {
        let list_args = resolve_args(ctx, arguments, data);
        let mut values = serde_json::Map::new();
        for arg in &list_args {
          values.insert(
            arg.key.clone(),
            serde_json::Value::String(String::from_utf8_lossy(&arg.value).into_owned()),
          );
        }
        (
          name.clone(),
          serde_json::to_vec(&values).unwrap_or_default(),
        )
      }
    };
    resolved.push(ResolvedArgument { key, value });
  }

  for index in 0..resolved.len() {
    if find_subslice(&resolved[index].value, b"{{").is_none() {
      continue;
    }
    let templated = apply_template(&resolved, &resolved[index].value.clone());
    resolved[index].value = templated;
  }

  resolved.retain(|arg| !arg.key.starts_with('.'));
  resolved
}

fn apply_template(args: &ResolvedArgs, value: &[u8]) -> Vec<u8> {
  let mut out = Vec::with_capacity(value.len());
  let mut rest = value;

  loop {
    let Some(open) = find_subslice(rest, b"{{") else {
      out.extend_from_slice(rest);
      return out;
    };
    out.extend_from_slice(&rest[..open]);
    let after = &rest[open + 2..];
    let Some(close) = find_subslice(after, b"}}") else {
      out.extend_from_slice(&rest[open..]);
      return out;
    };
    let tag = String::from_utf8_lossy(&after[..close]);
    let tag = tag.trim_matches(|c| c == ' ' || c == '\t' || c == '\n' || c == '\r');
    out.extend_from_slice(&expand_tag(args, tag));
    rest = &after[close + 2..];
  }
}

fn expand_tag(args: &ResolvedArgs, tag: &str) -> Vec<u8> {
  // `{{ .key }}` substitutes the sibling argument `key`
  if tag.matches('.').count() == 1 {
    let name = tag.trim_start_matches('.');
    for arg in args {
      if arg.key == name {
        return arg.value.clone();
      }
    }
  }

  // `{{ .key.a.b }}` substitutes the JSON-navigated sub-value
  for arg in args {
    let mut key = arg.key.clone();
    if tag.starts_with('.') && !key.starts_with('.') {
      key.insert(0, '.');
    }
    let Some(rest) = tag.strip_prefix(key.as_str()) else {
      continue;
    };
    if rest.is_empty() {
      return arg.value.clone();
    }
    let rest = rest.trim_start_matches('.');
    let segments: Vec<&str> = rest.split('.').collect();
    return json::get(&arg.value, &segments)
      .map(|value| value.to_vec())
      .unwrap_or_default();
  }

  // unknown tags survive verbatim
  format!("{{{{ {tag} }}}}").into_bytes()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
  haystack
    .windows(needle.len())
    .position(|window| window == needle)
}

fn as_refs(path: &[String]) -> Vec<&str> {
  path.iter().map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::datasource::{DataSource, FederationConfiguration, FieldConfig, ResolveFuture};
  use crate::plan::{DataSourceInvocation, OperationType, SingleFetch};
  use std::time::Duration;

  /// Serves canned bytes after an optional per-entity delay, so ordering
  /// tests can randomise completion order.
  #[derive(Debug, Default)]
  struct TestSource {
    hash: u64,
    response: Vec<u8>,
    delays_ms: HashMap<String, u64>,
    federation: FederationConfiguration,
  }

  impl DataSource for TestSource {
    fn hash(&self) -> u64 {
      self.hash
    }

    fn resolve<'a>(
      &'a self,
      _ctx: &'a ExecutionContext,
      args: ResolvedArgs,
      out: &'a mut BytesMut,
    ) -> ResolveFuture<'a> {
      Box::pin(async move {
        if let Some(id) = resolved_arg_by_key(&args, "id") {
          let id = String::from_utf8_lossy(id).into_owned();
          if let Some(delay) = self.delays_ms.get(&id) {
            tokio::time::sleep(Duration::from_millis(*delay)).await;
          }
        }
        match resolved_arg_by_key(&args, "body") {
          Some(body) => out.extend_from_slice(body),
          None => out.extend_from_slice(&self.response),
        }
        Instruction::CloseConnection
      })
    }

    fn required_fields_by_key(&self, _type_name: &str) -> Vec<FieldConfig> {
      Vec::new()
    }

    fn required_fields_by_requires(
      &self,
      _type_name: &str,
      _field_name: &str,
    ) -> Option<FieldConfig> {
      None
    }

    fn has_key_requirement(&self, _type_name: &str, _selection_set: &str) -> bool {
      false
    }

    fn federation_configuration(&self) -> &FederationConfiguration {
      &self.federation
    }
  }

  fn single_fetch(source: TestSource, buffer_name: &str, args: Vec<Argument>) -> Fetch {
    Fetch::Single(SingleFetch {
      source: DataSourceInvocation {
        args,
        data_source: Arc::new(source),
      },
      buffer_name: buffer_name.to_string(),
    })
  }

  fn scalar_field(name: &str, quote: bool) -> Field {
    Field {
      name: name.to_string(),
      value: PlanNode::Value(Value {
        path: vec![name.to_string()],
        quote,
      }),
      skip: None,
      has_resolver: false,
    }
  }

  async fn run(root: &Object, ctx: &ExecutionContext) -> (String, Vec<Instruction>) {
    let mut out = Vec::new();
    let instructions = Executor::new()
      .execute(ctx, root, &mut out)
      .await
      .expect("execution failed");
    (String::from_utf8(out).unwrap(), instructions)
  }

  #[tokio::test]
  async fn renders_object_from_fetched_buffer() {
    let root = Object {
      fields: vec![Field {
        name: "me".to_string(),
        value: PlanNode::Object(Object {
          fields: vec![scalar_field("id", true), scalar_field("name", true)],
          path: vec!["me".to_string()],
          fetch: None,
          operation_type: OperationType::Query,
        }),
        skip: None,
        has_resolver: true,
      }],
      path: vec![],
      fetch: Some(single_fetch(
        TestSource {
          hash: 1,
          response: br#"{"me":{"id":"u1","name":"Ada"}}"#.to_vec(),
          ..Default::default()
        },
        "me",
        vec![],
      )),
      operation_type: OperationType::Query,
    };

    let (body, instructions) = run(&root, &ExecutionContext::new()).await;
    assert_eq!(body, r#"{"me":{"id":"u1","name":"Ada"}}"#);
    assert_eq!(instructions, vec![Instruction::CloseConnection]);
  }

  #[tokio::test]
  async fn missing_buffer_renders_field_null() {
    let root = Object {
      fields: vec![Field {
        name: "me".to_string(),
        value: PlanNode::Value(Value {
          path: vec![],
          quote: false,
        }),
        skip: None,
        has_resolver: true,
      }],
      path: vec![],
      fetch: None,
      operation_type: OperationType::Query,
    };

    let (body, instructions) = run(&root, &ExecutionContext::new()).await;
    assert_eq!(body, r#"{"me":null}"#);
    assert!(instructions.is_empty());
  }

  #[tokio::test]
  async fn parallel_list_resolution_keeps_declaration_order() {
    // resolve times are deliberately shuffled; the rendered order must stay
    // declarative
    let item_source = TestSource {
      hash: 2,
      delays_ms: HashMap::from([
        ("a".to_string(), 30),
        ("b".to_string(), 10),
        ("c".to_string(), 20),
      ]),
      ..Default::default()
    };

    let item_object = Object {
      fields: vec![
        scalar_field("id", true),
        Field {
          name: "detail".to_string(),
          value: PlanNode::Value(Value {
            path: vec!["value".to_string()],
            quote: true,
          }),
          skip: None,
          has_resolver: true,
        },
      ],
      path: vec![],
      fetch: Some(single_fetch(
        item_source,
        "detail",
        vec![
          Argument::ObjectVariable {
            name: "id".to_string(),
            path: vec!["id".to_string()],
          },
          Argument::Static {
            name: "body".to_string(),
            value: br#"{"value":"r{{ .id }}"}"#.to_vec(),
          },
        ],
      )),
      operation_type: OperationType::Query,
    };

    let root = Object {
      fields: vec![Field {
        name: "items".to_string(),
        value: PlanNode::List(List {
          path: vec!["items".to_string()],
          value: Box::new(PlanNode::Object(item_object)),
          filter: None,
        }),
        skip: None,
        has_resolver: true,
      }],
      path: vec![],
      fetch: Some(single_fetch(
        TestSource {
          hash: 1,
          response: br#"{"items":[{"id":"a"},{"id":"b"},{"id":"c"}]}"#.to_vec(),
          ..Default::default()
        },
        "items",
        vec![],
      )),
      operation_type: OperationType::Query,
    };

    let (body, instructions) = run(&root, &ExecutionContext::new()).await;
    assert_eq!(
      body,
      r#"{"items":[{"id":"a","detail":"ra"},{"id":"b","detail":"rb"},{"id":"c","detail":"rc"}]}"#
    );
    // one root fetch plus one per item
    assert_eq!(instructions.len(), 4);
  }

  #[tokio::test]
  async fn empty_and_missing_lists_emit_balanced_brackets() {
    let list_field = |path: &str| Field {
      name: path.to_string(),
      value: PlanNode::List(List {
        path: vec![path.to_string()],
        value: Box::new(PlanNode::Value(Value {
          path: vec![],
          quote: false,
        })),
        filter: None,
      }),
      skip: None,
      has_resolver: true,
    };

    let root = Object {
      fields: vec![list_field("empty"), list_field("missing")],
      path: vec![],
      fetch: Some(single_fetch(
        TestSource {
          hash: 1,
          response: br#"{"empty":[]}"#.to_vec(),
          ..Default::default()
        },
        "empty",
        vec![],
      )),
      operation_type: OperationType::Query,
    };

    let (body, _) = run(&root, &ExecutionContext::new()).await;
    assert_eq!(body, r#"{"empty":[],"missing":null}"#);
  }

  #[tokio::test]
  async fn first_n_filter_truncates_rendering() {
    let root = Object {
      fields: vec![Field {
        name: "numbers".to_string(),
        value: PlanNode::List(List {
          path: vec!["numbers".to_string()],
          value: Box::new(PlanNode::Value(Value {
            path: vec![],
            quote: false,
          })),
          filter: Some(ListFilter::FirstN(2)),
        }),
        skip: None,
        has_resolver: true,
      }],
      path: vec![],
      fetch: Some(single_fetch(
        TestSource {
          hash: 1,
          response: br#"{"numbers":[1,2,3,4]}"#.to_vec(),
          ..Default::default()
        },
        "numbers",
        vec![],
      )),
      operation_type: OperationType::Query,
    };

    let (body, _) = run(&root, &ExecutionContext::new()).await;
    assert_eq!(body, r#"{"numbers":[1,2]}"#);
  }

  #[tokio::test]
  async fn skipped_first_field_emits_no_leading_comma() {
    let skip_always = SkipCondition::IfEqual {
      left: Argument::Static {
        name: "left".to_string(),
        value: b"1".to_vec(),
      },
      right: Argument::Static {
        name: "right".to_string(),
        value: b"1".to_vec(),
      },
    };

    let root = Object {
      fields: vec![
        Field {
          skip: Some(skip_always),
          ..scalar_field_with_data("hidden")
        },
        scalar_field_with_data("shown"),
      ],
      path: vec![],
      fetch: Some(single_fetch(
        TestSource {
          hash: 1,
          response: br#"{"hidden":1,"shown":2}"#.to_vec(),
          ..Default::default()
        },
        "data",
        vec![],
      )),
      operation_type: OperationType::Query,
    };

    let mut out = Vec::new();
    // fields read from the object's own data here, not a buffer
    let ctx = ExecutionContext::new();
    let buffers = LockableBufferMap::default();
    let mut render = Render {
      ctx: &ctx,
      buffers: &buffers,
      out: &mut out,
      err: None,
      instructions: Vec::new(),
    };
    render
      .resolve_object(&root, br#"{"hidden":1,"shown":2}"#, "query".to_string(), false)
      .await;
    assert_eq!(String::from_utf8(out).unwrap(), r#"{"shown":2}"#);
  }

  fn scalar_field_with_data(name: &str) -> Field {
    Field {
      name: name.to_string(),
      value: PlanNode::Value(Value {
        path: vec![name.to_string()],
        quote: false,
      }),
      skip: None,
      has_resolver: false,
    }
  }

  #[tokio::test]
  async fn context_variables_resolve_by_name_hash() {
    let mut variables = serde_json::Map::new();
    variables.insert("first".to_string(), serde_json::json!(5));
    let ctx = ExecutionContext::with_variables(&variables);

    let args = resolve_args(
      &ctx,
      &[Argument::ContextVariable {
        name: "first".to_string(),
        variable_name: "first".to_string(),
      }],
      b"",
    );
    assert_eq!(resolved_arg_by_key(&args, "first"), Some(b"5".as_slice()));
  }

  #[test]
  fn template_substitutes_sibling_arguments() {
    let ctx = ExecutionContext::new();
    let args = resolve_args(
      &ctx,
      &[
        Argument::Static {
          name: "x".to_string(),
          value: b"42".to_vec(),
        },
        Argument::Static {
          name: "query".to_string(),
          value: b"value is {{ .x }}".to_vec(),
        },
      ],
      b"",
    );
    assert_eq!(
      resolved_arg_by_key(&args, "query"),
      Some(b"value is 42".as_slice())
    );
  }

  #[test]
  fn template_navigates_json_sub_values() {
    let ctx = ExecutionContext::new();
    let args = resolve_args(
      &ctx,
      &[
        Argument::Static {
          name: "x".to_string(),
          value: br#"{"a":{"b":"deep"}}"#.to_vec(),
        },
        Argument::Static {
          name: "query".to_string(),
          value: b"{{ .x.a.b }}".to_vec(),
        },
      ],
      b"",
    );
    assert_eq!(resolved_arg_by_key(&args, "query"), Some(b"deep".as_slice()));
  }

  #[test]
  fn unknown_template_tags_survive_verbatim() {
    let ctx = ExecutionContext::new();
    let args = resolve_args(
      &ctx,
      &[Argument::Static {
        name: "query".to_string(),
        value: b"{{ .missing }} stays".to_vec(),
      }],
      b"",
    );
    assert_eq!(
      resolved_arg_by_key(&args, "query"),
      Some(b"{{ .missing }} stays".as_slice())
    );
  }

  #[test]
  fn internal_arguments_are_filtered_after_templating() {
    let ctx = ExecutionContext::new();
    let args = resolve_args(
      &ctx,
      &[
        Argument::ObjectVariable {
          name: ".id".to_string(),
          path: vec!["id".to_string()],
        },
        Argument::Static {
          name: "representations".to_string(),
          value: br#"[{"__typename":"User","id":"{{ .id }}"}]"#.to_vec(),
        },
      ],
      br#"{"id":"u1"}"#,
    );

    assert!(resolved_arg_by_key(&args, ".id").is_none());
    assert_eq!(
      resolved_arg_by_key(&args, "representations"),
      Some(br#"[{"__typename":"User","id":"u1"}]"#.as_slice())
    );
  }

  #[test]
  fn list_arguments_marshal_into_a_json_object() {
    let ctx = ExecutionContext::new();
    let args = resolve_args(
      &ctx,
      &[Argument::List {
        name: "filters".to_string(),
        arguments: vec![Argument::Static {
          name: "limit".to_string(),
          value: b"10".to_vec(),
        }],
      }],
      b"",
    );
    assert_eq!(
      resolved_arg_by_key(&args, "filters"),
      Some(br#"{"limit":"10"}"#.as_slice())
    );
  }
}
