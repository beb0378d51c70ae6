use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::trace;

use crate::keys::{MergeKeys, Path};
use crate::PatchError;

/// Directive key recognised inside patch objects.
pub(crate) const DIRECTIVE: &str = "$patch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Merge,
    Replace,
    Delete,
}

pub(crate) struct Merger<'k> {
    keys: &'k MergeKeys,
}

impl<'k> Merger<'k> {
    pub(crate) fn new(keys: &'k MergeKeys) -> Self {
        Self { keys }
    }

    pub(crate) fn merge<'p>(&self, base: &Value, patch: &'p Value, path: &mut Path<'p>) -> Result<Value, PatchError> {
        match patch {
            Value::Object(p) => match base {
                Value::Object(b) => self.merge_object(Some(b), p, path),
                Value::Array(_) => Err(mismatch(path, base, patch)),
                _ => self.merge_object(None, p, path),
            },
            Value::Array(p) => match base {
                Value::Array(b) => self.merge_list(b, p, path),
                Value::Object(_) => Err(mismatch(path, base, patch)),
                _ => self.merge_list(&[], p, path),
            },
            scalar => match base {
                Value::Object(_) | Value::Array(_) if !scalar.is_null() => Err(mismatch(path, base, patch)),
                _ => Ok(scalar.clone()),
            },
        }
    }

    fn merge_object<'p>(
        &self,
        base: Option<&Map<String, Value>>,
        patch: &'p Map<String, Value>,
        path: &mut Path<'p>,
    ) -> Result<Value, PatchError> {
        let base = match directive(patch, path)? {
            Directive::Merge => base,
            Directive::Replace => None,
            Directive::Delete => {
                return Err(PatchError::InvalidPatchDocument(format!(
                    "{}: \"$patch\": \"delete\" is only valid on entries of a keyed list",
                    path
                )))
            }
        };
        let mut out = base.cloned().unwrap_or_default();
        for (k, pv) in patch.iter() {
            if k == DIRECTIVE {
                continue;
            }
            if k.starts_with('$') {
                return Err(PatchError::InvalidPatchDocument(format!("{}: unsupported directive {:?}", path, k)));
            }
            if pv.is_null() {
                out.remove(k);
                continue;
            }
            path.push_field(k);
            let merged = self.merge(out.get(k).unwrap_or(&Value::Null), pv, path)?;
            path.pop();
            out.insert(k.clone(), merged);
        }
        Ok(Value::Object(out))
    }

    /// Keyed lists: matched entries merge in base order, unmatched patch
    /// entries append in patch order, unmatched base entries stay. Lists
    /// without a merge key are replaced by the patch list.
    ///
    /// A patch entry that is not an object or lacks its key is reported by
    /// its index in the patch list; past that point paths use `[key=id]`.
    fn merge_list<'p>(&self, base: &[Value], patch: &'p [Value], path: &mut Path<'p>) -> Result<Value, PatchError> {
        let Some(key) = self.keys.key_for(path) else {
            return Ok(Value::Array(patch.to_vec()));
        };

        let mut out: Vec<Option<Value>> = base.iter().cloned().map(Some).collect();
        let mut by_key: BTreeMap<String, usize> = BTreeMap::new();
        for (i, entry) in base.iter().enumerate() {
            if let Some(id) = identity(entry, key) {
                by_key.entry(id).or_insert(i);
            }
        }

        for (i, entry) in patch.iter().enumerate() {
            path.push_index(i);
            let Some(obj) = entry.as_object() else {
                return Err(PatchError::InvalidPatchDocument(format!(
                    "{}: entries of a list merged by {:?} must be objects",
                    path, key
                )));
            };
            let Some(id) = identity(entry, key) else {
                return Err(PatchError::InvalidPatchDocument(format!("{}: missing merge key {:?}", path, key)));
            };
            path.pop();
            path.push_keyed(key, obj.get(key).unwrap_or(&Value::Null));
            let existing = by_key.get(&id).copied();
            match directive(obj, path)? {
                Directive::Delete => {
                    if let Some(pos) = existing {
                        out[pos] = None;
                        by_key.remove(&id);
                    }
                }
                d => {
                    let base_entry = match (d, existing) {
                        (Directive::Merge, Some(pos)) => out[pos].as_ref().unwrap_or(&Value::Null),
                        _ => &Value::Null,
                    };
                    let merged = self.merge(base_entry, entry, path)?;
                    match existing {
                        Some(pos) => out[pos] = Some(merged),
                        None => {
                            trace!(path = %path, key, id = %id, "appending keyed list entry");
                            by_key.insert(id, out.len());
                            out.push(Some(merged));
                        }
                    }
                }
            }
            path.pop();
        }
        Ok(Value::Array(out.into_iter().flatten().collect()))
    }
}

fn identity(entry: &Value, key: &str) -> Option<String> {
    entry.get(key).filter(|v| !v.is_null()).map(Value::to_string)
}

fn directive(obj: &Map<String, Value>, path: &Path<'_>) -> Result<Directive, PatchError> {
    match obj.get(DIRECTIVE) {
        None => Ok(Directive::Merge),
        Some(Value::String(s)) => match s.as_str() {
            "merge" => Ok(Directive::Merge),
            "replace" => Ok(Directive::Replace),
            "delete" => Ok(Directive::Delete),
            other => Err(PatchError::InvalidPatchDocument(format!(
                "{}: unsupported \"$patch\" value {:?}",
                path, other
            ))),
        },
        Some(_) => Err(PatchError::InvalidPatchDocument(format!("{}: \"$patch\" must be a string", path))),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn mismatch(path: &Path<'_>, base: &Value, patch: &Value) -> PatchError {
    PatchError::TypeMismatch { path: path.to_string(), base: kind_of(base), patch: kind_of(patch) }
}
