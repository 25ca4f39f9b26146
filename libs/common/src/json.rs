//! Borrowed navigation over raw JSON bytes.
//!
//! Fetch buffers hold subgraph responses as raw JSON. The response renderer
//! needs sub-values of those buffers without materialising them: a returned
//! slice borrows the buffer, string values are returned without their outer
//! quotes, and escape sequences stay byte-for-byte as the subgraph sent them.

/// Navigates `data` along `path` and returns the value slice.
///
/// Path segments address object keys; a segment that parses as an index
/// addresses an array element. String values are returned without the outer
/// quotes. Returns `None` when the path does not exist or a segment does not
/// match the shape of the value it is applied to.
pub fn get<'a>(data: &'a [u8], path: &[&str]) -> Option<&'a [u8]> {
  let mut current = trim(data);

  for segment in path {
    current = trim(current);
    current = match current.first() {
      Some(b'{') => object_member(current, segment)?,
      Some(b'[') => array_element(current, segment.parse().ok()?)?,
      _ => return None,
    };
  }

  Some(unquote(trim(current)))
}

/// Navigates `data` along `path` and returns the elements of the array found
/// there. String elements are unquoted the same way [`get`] unquotes values.
pub fn array_items<'a>(data: &'a [u8], path: &[&str]) -> Option<Vec<&'a [u8]>> {
  let mut current = trim(data);

  for segment in path {
    current = trim(current);
    current = match current.first() {
      Some(b'{') => object_member(current, segment)?,
      Some(b'[') => array_element(current, segment.parse().ok()?)?,
      _ => return None,
    };
    current = trim(current);
  }

  if current.first() != Some(&b'[') {
    return None;
  }

  let mut items = Vec::new();
  let mut i = skip_ws(current, 1);
  if current.get(i) == Some(&b']') {
    return Some(items);
  }

  loop {
    let end = value_end(current, i)?;
    items.push(unquote(&current[i..end]));
    i = skip_ws(current, end);
    match current.get(i) {
      Some(b',') => i = skip_ws(current, i + 1),
      Some(b']') => return Some(items),
      _ => return None,
    }
  }
}

fn trim(data: &[u8]) -> &[u8] {
  let start = skip_ws(data, 0);
  let mut end = data.len();
  while end > start && is_ws(data[end - 1]) {
    end -= 1;
  }
  &data[start..end]
}

fn is_ws(byte: u8) -> bool {
  matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

fn skip_ws(data: &[u8], mut i: usize) -> usize {
  while i < data.len() && is_ws(data[i]) {
    i += 1;
  }
  i
}

fn unquote(value: &[u8]) -> &[u8] {
  if value.len() >= 2 && value[0] == b'"' && value[value.len() - 1] == b'"' {
    &value[1..value.len() - 1]
  } else {
    value
  }
}

/// Finds the value of `key` in an object slice starting at `{`.
fn object_member<'a>(object: &'a [u8], key: &str) -> Option<&'a [u8]> {
  let mut i = skip_ws(object, 1);

  loop {
    if object.get(i) != Some(&b'"') {
      return None;
    }
    let key_end = string_end(object, i)?;
    let member_key = &object[i + 1..key_end - 1];

    i = skip_ws(object, key_end);
    if object.get(i) != Some(&b':') {
      return None;
    }
    i = skip_ws(object, i + 1);

    let value_start = i;
    let value_stop = value_end(object, value_start)?;
    if member_key == key.as_bytes() {
      return Some(&object[value_start..value_stop]);
    }

    i = skip_ws(object, value_stop);
    match object.get(i) {
      Some(b',') => i = skip_ws(object, i + 1),
      _ => return None,
    }
  }
}

fn array_element(array: &[u8], index: usize) -> Option<&[u8]> {
  let mut i = skip_ws(array, 1);
  if array.get(i) == Some(&b']') {
    return None;
  }

  let mut current = 0;
  loop {
    let end = value_end(array, i)?;
    if current == index {
      return Some(&array[i..end]);
    }
    current += 1;
    i = skip_ws(array, end);
    match array.get(i) {
      Some(b',') => i = skip_ws(array, i + 1),
      _ => return None,
    }
  }
}

/// Index one past the end of the value starting at `start`.
fn value_end(data: &[u8], start: usize) -> Option<usize> {
  match data.get(start)? {
    b'"' => string_end(data, start),
    b'{' | b'[' => {
      let mut depth = 0usize;
      let mut i = start;
      while i < data.len() {
        match data[i] {
          b'"' => {
            i = string_end(data, i)?;
            continue;
          }
          b'{' | b'[' => depth += 1,
          b'}' | b']' => {
            depth -= 1;
            if depth == 0 {
              return Some(i + 1);
            }
          }
          _ => {}
        }
        i += 1;
      }
      None
    }
    _ => {
      let mut i = start;
      while i < data.len() && !matches!(data[i], b',' | b'}' | b']') && !is_ws(data[i]) {
        i += 1;
      }
      (i > start).then_some(i)
    }
  }
}

/// Index one past the closing quote of the string starting at `start`.
fn string_end(data: &[u8], start: usize) -> Option<usize> {
  let mut i = start + 1;
  while i < data.len() {
    match data[i] {
      b'\\' => i += 2,
      b'"' => return Some(i + 1),
      _ => i += 1,
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn navigates_nested_objects() {
    let data = br#"{"user":{"address":{"city":"Berlin"},"age":42}}"#;

    assert_eq!(
      get(data, &["user", "address", "city"]),
      Some(b"Berlin".as_slice())
    );
    assert_eq!(get(data, &["user", "age"]), Some(b"42".as_slice()));
    assert_eq!(
      get(data, &["user", "address"]),
      Some(br#"{"city":"Berlin"}"#.as_slice())
    );
  }

  #[test]
  fn missing_paths_return_none() {
    let data = br#"{"a":{"b":1}}"#;

    assert_eq!(get(data, &["a", "c"]), None);
    assert_eq!(get(data, &["x"]), None);
    assert_eq!(get(data, &["a", "b", "c"]), None);
  }

  #[test]
  fn string_escapes_stay_verbatim() {
    let data = br#"{"name":"foo \" \\ bar"}"#;

    assert_eq!(get(data, &["name"]), Some(br#"foo \" \\ bar"#.as_slice()));
  }

  #[test]
  fn indexes_into_arrays() {
    let data = br#"{"items":[{"id":1},{"id":2}]}"#;

    assert_eq!(get(data, &["items", "1", "id"]), Some(b"2".as_slice()));
    assert_eq!(get(data, &["items", "2"]), None);
  }

  #[test]
  fn null_values_surface_as_null_bytes() {
    let data = br#"{"a":null}"#;

    assert_eq!(get(data, &["a"]), Some(b"null".as_slice()));
  }

  #[test]
  fn collects_array_items() {
    let data = br#"{"reviews":[{"body":"ok"},{"body":"bad"}]}"#;

    let items = array_items(data, &["reviews"]).unwrap();
    assert_eq!(items, vec![br#"{"body":"ok"}"#.as_slice(), br#"{"body":"bad"}"#.as_slice()]);
  }

  #[test]
  fn collects_scalar_array_items_unquoted() {
    let data = br#"["a","b",3]"#;

    let items = array_items(data, &[]).unwrap();
    assert_eq!(items, vec![b"a".as_slice(), b"b".as_slice(), b"3".as_slice()]);
  }

  #[test]
  fn empty_array_yields_no_items() {
    let data = br#"{"reviews":[]}"#;

    assert_eq!(array_items(data, &["reviews"]).unwrap().len(), 0);
    assert_eq!(array_items(data, &["missing"]), None);
  }

  #[test]
  fn tolerates_padding_whitespace() {
    let data = b" { \"a\" : [ 1 , 2 ] } ";

    assert_eq!(get(data, &["a", "0"]), Some(b"1".as_slice()));
    let items = array_items(data, &["a"]).unwrap();
    assert_eq!(items, vec![b"1".as_slice(), b"2".as_slice()]);
  }
}
