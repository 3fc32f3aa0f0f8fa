//! Call parameter forms.
//!
//! A method takes either positional arguments or a single named-field
//! object — never both. On the wire the middleware always receives a
//! JSON array: positional params are the array itself, named params are
//! wrapped as a one-element array holding the object.

use serde_json::{Map, Value};

/// Arguments for one method call.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Ordered positional arguments, e.g. `["ssh"]` for `service.started`.
    Positional(Vec<Value>),
    /// A single named-field mapping, e.g. the payload of `user.create`.
    Named(Map<String, Value>),
}

impl Params {
    /// No arguments.
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    pub fn positional(args: impl IntoIterator<Item = Value>) -> Self {
        Self::Positional(args.into_iter().collect())
    }

    /// Named form. Taking the object type directly keeps "must be a
    /// JSON object" out of the runtime contract entirely; callers with
    /// a `Value` in hand destructure it first.
    pub fn named(fields: Map<String, Value>) -> Self {
        Self::Named(fields)
    }

    /// Serialize to the wire form: always a JSON array.
    pub fn into_wire(self) -> Value {
        match self {
            Self::Positional(args) => Value::Array(args),
            Self::Named(map) => Value::Array(vec![Value::Object(map)]),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Vec<Value>> for Params {
    fn from(args: Vec<Value>) -> Self {
        Self::Positional(args)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self::Named(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn positional_wire_form_is_the_array() {
        let wire = Params::positional([json!("ssh")]).into_wire();
        assert_eq!(wire, json!(["ssh"]));
    }

    #[test]
    fn named_wire_form_wraps_the_object() {
        let mut fields = Map::new();
        fields.insert("hostname".into(), json!("nas01"));
        let wire = Params::named(fields).into_wire();
        assert_eq!(wire, json!([{"hostname": "nas01"}]));
    }

    #[test]
    fn none_is_an_empty_array() {
        assert_eq!(Params::none().into_wire(), json!([]));
    }

    #[test]
    fn from_vec_is_positional() {
        let p: Params = vec![json!(1), json!(2)].into();
        assert_eq!(p.into_wire(), json!([1, 2]));
    }
}
