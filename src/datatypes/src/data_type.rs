// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::value::Data;

/// A free-form key with an optional value, attached to a type.
///
/// Recognized keys: `"skip"` (no index for this column), `"base"` (bitmap
/// coder base), `"max_length"` (strings), `"max_size"` (vectors and sets).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(key: impl Into<String>) -> Attribute {
        Attribute {
            key: key.into(),
            value: None,
        }
    }

    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Attribute {
        Attribute {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

/// A named field inside a record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Field {
        Field {
            name: name.into(),
            ty,
        }
    }
}

/// The closed sum of type shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeKind {
    None,
    Bool,
    Int64,
    UInt64,
    Double,
    Duration,
    Timestamp,
    String,
    Pattern,
    Address,
    Subnet,
    Port,
    Enumeration(Vec<String>),
    Vector(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Record(Vec<Field>),
    Alias(Box<Type>),
}

/// An event type: a shape plus an optional name and attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Type {
    name: Option<String>,
    attrs: Vec<Attribute>,
    kind: TypeKind,
}

impl Type {
    fn of(kind: TypeKind) -> Type {
        Type {
            name: None,
            attrs: Vec::new(),
            kind,
        }
    }

    pub fn none() -> Type {
        Type::of(TypeKind::None)
    }

    pub fn boolean() -> Type {
        Type::of(TypeKind::Bool)
    }

    pub fn int64() -> Type {
        Type::of(TypeKind::Int64)
    }

    pub fn uint64() -> Type {
        Type::of(TypeKind::UInt64)
    }

    pub fn double() -> Type {
        Type::of(TypeKind::Double)
    }

    pub fn duration() -> Type {
        Type::of(TypeKind::Duration)
    }

    pub fn timestamp() -> Type {
        Type::of(TypeKind::Timestamp)
    }

    pub fn string() -> Type {
        Type::of(TypeKind::String)
    }

    pub fn pattern() -> Type {
        Type::of(TypeKind::Pattern)
    }

    pub fn address() -> Type {
        Type::of(TypeKind::Address)
    }

    pub fn subnet() -> Type {
        Type::of(TypeKind::Subnet)
    }

    pub fn port() -> Type {
        Type::of(TypeKind::Port)
    }

    pub fn enumeration(fields: Vec<String>) -> Type {
        Type::of(TypeKind::Enumeration(fields))
    }

    pub fn vector(elem: Type) -> Type {
        Type::of(TypeKind::Vector(Box::new(elem)))
    }

    pub fn set(elem: Type) -> Type {
        Type::of(TypeKind::Set(Box::new(elem)))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::of(TypeKind::Map(Box::new(key), Box::new(value)))
    }

    /// Builds a record type. Field names must be unique; duplicates are a
    /// construction bug.
    pub fn record(fields: Vec<Field>) -> Type {
        debug_assert!(
            {
                let mut names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
                names.sort_unstable();
                names.windows(2).all(|w| w[0] != w[1])
            },
            "record fields must have unique names"
        );
        Type::of(TypeKind::Record(fields))
    }

    pub fn alias(inner: Type) -> Type {
        Type::of(TypeKind::Alias(Box::new(inner)))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Type {
        self.name = Some(name.into());
        self
    }

    pub fn with_attrs(mut self, attrs: Vec<Attribute>) -> Type {
        self.attrs = attrs;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn attrs(&self) -> &[Attribute] {
        &self.attrs
    }

    /// Looks up an attribute by key.
    pub fn attr(&self, key: &str) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.key == key)
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Follows alias wrappers down to the underlying type.
    pub fn unwrapped(&self) -> &Type {
        let mut t = self;
        while let TypeKind::Alias(inner) = &t.kind {
            t = inner;
        }
        t
    }

    pub fn is_record(&self) -> bool {
        matches!(self.unwrapped().kind, TypeKind::Record(_))
    }

    /// Returns the record fields, or `None` for non-record types.
    pub fn fields(&self) -> Option<&[Field]> {
        match &self.unwrapped().kind {
            TypeKind::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// A record is flat iff none of its fields is again a record.
    pub fn is_flat(&self) -> bool {
        match &self.unwrapped().kind {
            TypeKind::Record(fields) => fields.iter().all(|f| !f.ty.is_record()),
            _ => true,
        }
    }

    /// Inlines nested records, joining field names with `.`.
    ///
    /// Flattening is idempotent and preserves the type's name and
    /// attributes. Non-record types flatten to themselves.
    pub fn flatten(&self) -> Type {
        match &self.unwrapped().kind {
            TypeKind::Record(fields) => {
                let mut flat = Vec::with_capacity(fields.len());
                for field in fields {
                    flatten_into(&mut flat, &field.name, &field.ty);
                }
                Type {
                    name: self.name.clone(),
                    attrs: self.attrs.clone(),
                    kind: TypeKind::Record(flat),
                }
            }
            _ => self.clone(),
        }
    }

    /// Rebuilds nested records from `.`-joined field names. The companion of
    /// [flatten](Type::flatten).
    pub fn unflatten(&self) -> Type {
        let fields = match &self.unwrapped().kind {
            TypeKind::Record(fields) => fields,
            _ => return self.clone(),
        };
        let mut root = Node::default();
        for field in fields {
            let mut node = &mut root;
            let mut parts = field.name.split('.').peekable();
            while let Some(part) = parts.next() {
                if parts.peek().is_none() {
                    node.leaves.push(Field::new(part, field.ty.clone()));
                } else {
                    node = node.child(part);
                }
            }
        }
        Type {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            kind: TypeKind::Record(root.build()),
        }
    }
}

#[derive(Default)]
struct Node {
    order: Vec<String>,
    children: std::collections::HashMap<String, Node>,
    leaves: Vec<Field>,
}

impl Node {
    fn child(&mut self, name: &str) -> &mut Node {
        if !self.children.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.children.entry(name.to_string()).or_default()
    }

    fn build(mut self) -> Vec<Field> {
        let mut fields = self.leaves;
        for name in self.order {
            if let Some(node) = self.children.remove(&name) {
                fields.push(Field::new(name, Type::record(node.build())));
            }
        }
        fields
    }
}

fn flatten_into(out: &mut Vec<Field>, prefix: &str, ty: &Type) {
    match &ty.unwrapped().kind {
        TypeKind::Record(fields) => {
            for field in fields {
                let name = format!("{prefix}.{}", field.name);
                flatten_into(out, &name, &field.ty);
            }
        }
        _ => out.push(Field::new(prefix, ty.clone())),
    }
}

/// Whether two types are structurally equal modulo names, attributes, and
/// alias wrappers.
pub fn congruent(x: &Type, y: &Type) -> bool {
    use TypeKind::*;
    match (&x.unwrapped().kind, &y.unwrapped().kind) {
        (None, None)
        | (Bool, Bool)
        | (Int64, Int64)
        | (UInt64, UInt64)
        | (Double, Double)
        | (Duration, Duration)
        | (Timestamp, Timestamp)
        | (String, String)
        | (Pattern, Pattern)
        | (Address, Address)
        | (Subnet, Subnet)
        | (Port, Port) => true,
        (Enumeration(a), Enumeration(b)) => a == b,
        (Vector(a), Vector(b)) | (Set(a), Set(b)) => congruent(a, b),
        (Map(ka, va), Map(kb, vb)) => congruent(ka, kb) && congruent(va, vb),
        (Record(a), Record(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(fa, fb)| congruent(&fa.ty, &fb.ty))
        }
        _ => false,
    }
}

/// Whether a value matches the shape of a type. `Data::None` matches every
/// type; containers are checked recursively.
pub fn type_check(t: &Type, d: &Data) -> bool {
    match (&t.unwrapped().kind, d) {
        (_, Data::None) => true,
        (TypeKind::Bool, Data::Bool(_)) => true,
        (TypeKind::Int64, Data::Int(_)) => true,
        (TypeKind::UInt64, Data::UInt(_)) => true,
        (TypeKind::Double, Data::Double(_)) => true,
        (TypeKind::Duration, Data::Duration(_)) => true,
        (TypeKind::Timestamp, Data::Timestamp(_)) => true,
        (TypeKind::String, Data::String(_)) => true,
        (TypeKind::Pattern, Data::Pattern(_)) => true,
        (TypeKind::Address, Data::Address(_)) => true,
        (TypeKind::Subnet, Data::Subnet(_)) => true,
        (TypeKind::Port, Data::Port(_)) => true,
        (TypeKind::Enumeration(fields), Data::Enum(x)) => fields.contains(x),
        (TypeKind::Vector(elem), Data::Vector(xs)) => xs.iter().all(|x| type_check(elem, x)),
        (TypeKind::Set(elem), Data::Set(xs)) => xs.iter().all(|x| type_check(elem, x)),
        (TypeKind::Map(k, v), Data::Map(xs)) => {
            xs.iter().all(|(key, val)| type_check(k, key) && type_check(v, val))
        }
        (TypeKind::Record(fields), Data::Vector(xs)) => {
            fields.len() == xs.len()
                && fields.iter().zip(xs).all(|(f, x)| type_check(&f.ty, x))
        }
        _ => false,
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            return write!(f, "{name}");
        }
        match &self.kind {
            TypeKind::None => write!(f, "none"),
            TypeKind::Bool => write!(f, "bool"),
            TypeKind::Int64 => write!(f, "int"),
            TypeKind::UInt64 => write!(f, "uint"),
            TypeKind::Double => write!(f, "double"),
            TypeKind::Duration => write!(f, "duration"),
            TypeKind::Timestamp => write!(f, "timestamp"),
            TypeKind::String => write!(f, "string"),
            TypeKind::Pattern => write!(f, "pattern"),
            TypeKind::Address => write!(f, "addr"),
            TypeKind::Subnet => write!(f, "subnet"),
            TypeKind::Port => write!(f, "port"),
            TypeKind::Enumeration(fields) => write!(f, "enum {{{}}}", fields.join(", ")),
            TypeKind::Vector(t) => write!(f, "vector<{t}>"),
            TypeKind::Set(t) => write!(f, "set<{t}>"),
            TypeKind::Map(k, v) => write!(f, "map<{k}, {v}>"),
            TypeKind::Record(fields) => {
                let items = fields
                    .iter()
                    .map(|x| format!("{}: {}", x.name, x.ty))
                    .collect::<Vec<_>>();
                write!(f, "record {{{}}}", items.join(", "))
            }
            TypeKind::Alias(t) => write!(f, "{t}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::value::OrderedFloat;

    fn conn_layout() -> Type {
        Type::record(vec![
            Field::new("ts", Type::timestamp()),
            Field::new(
                "id",
                Type::record(vec![
                    Field::new("orig_h", Type::address()),
                    Field::new("resp_p", Type::port()),
                ]),
            ),
            Field::new("proto", Type::string()),
        ])
        .with_name("conn")
    }

    #[test]
    fn test_flatten() {
        let flat = conn_layout().flatten();
        let names: Vec<_> = flat
            .fields()
            .unwrap()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, ["ts", "id.orig_h", "id.resp_p", "proto"]);
        assert!(flat.is_flat());
        assert_eq!(flat.name(), Some("conn"));
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let flat = conn_layout().flatten();
        assert_eq!(flat.flatten(), flat);
    }

    #[test]
    fn test_unflatten_roundtrip() {
        let t = conn_layout();
        assert_eq!(t.flatten().unflatten(), t);
    }

    #[test]
    fn test_congruence_ignores_names_and_aliases() {
        let a = Type::record(vec![Field::new("x", Type::int64())]).with_name("a");
        let b = Type::alias(Type::record(vec![Field::new("y", Type::int64())]));
        assert!(congruent(&a, &b));

        let c = Type::record(vec![Field::new("x", Type::string())]);
        assert!(!congruent(&a, &c));
    }

    #[test]
    fn test_type_check() {
        assert!(type_check(&Type::int64(), &Data::Int(42)));
        assert!(type_check(&Type::int64(), &Data::None));
        assert!(!type_check(&Type::int64(), &Data::UInt(42)));
        assert!(type_check(
            &Type::double(),
            &Data::Double(OrderedFloat(4.2))
        ));

        let v = Type::vector(Type::uint64());
        assert!(type_check(&v, &Data::Vector(vec![Data::UInt(1)])));
        assert!(!type_check(&v, &Data::Vector(vec![Data::Int(1)])));

        let s = Type::set(Type::string());
        let mut xs = BTreeSet::new();
        xs.insert(Data::from("foo"));
        assert!(type_check(&s, &Data::Set(xs)));

        let rec = conn_layout();
        assert!(type_check(
            &rec.flatten(),
            &Data::Vector(vec![
                Data::Timestamp(1),
                Data::Address("10.0.0.1".parse().unwrap()),
                Data::Port("22/tcp".parse().unwrap()),
                Data::from("tcp"),
            ])
        ));
    }

    #[test]
    fn test_enumeration_membership() {
        let t = Type::enumeration(vec!["low".into(), "high".into()]);
        assert!(type_check(&t, &Data::Enum("low".into())));
        assert!(!type_check(&t, &Data::Enum("mid".into())));
    }
}
