//! Sparse field updates applied by an upsert-merge.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{Error, Result, datapoint::Field};

/// A non-empty set of `field → value` assignments. Fields not in the patch are
/// left untouched by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
  values: BTreeMap<Field, f64>,
}

impl Patch {
  pub fn new() -> Self { Self::default() }

  /// Builder-style [`Patch::set`].
  pub fn with(mut self, field: Field, value: f64) -> Self {
    self.values.insert(field, value);
    self
  }

  pub fn set(&mut self, field: Field, value: f64) {
    self.values.insert(field, value);
  }

  pub fn get(&self, field: Field) -> Option<f64> {
    self.values.get(&field).copied()
  }

  pub fn is_empty(&self) -> bool { self.values.is_empty() }

  pub fn len(&self) -> usize { self.values.len() }

  /// Assignments in column order.
  pub fn iter(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
    self.values.iter().map(|(f, v)| (*f, *v))
  }

  /// Check the patch is something a store can apply: at least one field, and
  /// only finite values.
  pub fn validate(&self) -> Result<()> {
    if self.values.is_empty() {
      return Err(Error::Validation("patch contains no fields".into()));
    }
    if let Some((field, value)) = self.iter().find(|(_, v)| !v.is_finite()) {
      return Err(Error::Validation(format!(
        "field {field} must be a finite number, got {value}"
      )));
    }
    Ok(())
  }

  /// Parse a JSON object of `name → number`. Unknown names and non-numeric
  /// values (including `null`) are rejected.
  pub fn from_json(object: &Map<String, Value>) -> Result<Self> {
    let mut patch = Patch::new();
    for (name, value) in object {
      let field: Field = name
        .parse()
        .map_err(|_| Error::Validation(format!("unknown field {name:?}")))?;
      let number = value.as_f64().ok_or_else(|| {
        Error::Validation(format!("field {name} expects a number, got {value}"))
      })?;
      patch.set(field, number);
    }
    patch.validate()?;
    Ok(patch)
  }

  /// Parse from a string-keyed map, as collectors usually produce.
  pub fn from_pairs<'a>(
    pairs: impl IntoIterator<Item = (&'a str, f64)>,
  ) -> Result<Self> {
    let mut patch = Patch::new();
    for (name, value) in pairs {
      let field: Field = name
        .parse()
        .map_err(|_| Error::Validation(format!("unknown field {name:?}")))?;
      patch.set(field, value);
    }
    patch.validate()?;
    Ok(patch)
  }
}

impl FromIterator<(Field, f64)> for Patch {
  fn from_iter<I: IntoIterator<Item = (Field, f64)>>(iter: I) -> Self {
    Self { values: iter.into_iter().collect() }
  }
}
