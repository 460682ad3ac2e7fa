//! Schema Describer
//!
//! Walks handler input and output types into a generic JSON document used
//! to publish the API's shapes. Nothing here runs on the dispatch path.
//!
//! ## Rendering
//! - struct: object keyed by wire field name, `?` suffix for optional fields
//! - `Option`, `Box`, `Arc`, `Rc`, `&T`: the wrapped type
//! - sequences: one-element array holding the element description
//! - maps: `{ "MAP[<key>]": <value description> }`
//! - primitives: their wire type name (`"string"`, `"int32"`, ...)
//! - a struct already being expanded higher up the walk: `"..."`

use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Placeholder for a recursive reference
pub const RECURSION_MARKER: &str = "...";

/// Types that can describe their wire shape
pub trait Describe: 'static {
    fn describe(d: &mut Describer<'_>) -> Value;
}

/// Literal descriptions that replace a type's own [`Describe`] output
#[derive(Debug, Clone, Default)]
pub struct TypeOverrides {
    entries: HashMap<TypeId, String>,
}

impl TypeOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe `T` as the given literal
    pub fn insert<T: ?Sized + 'static>(&mut self, description: impl Into<String>) -> &mut Self {
        self.entries.insert(TypeId::of::<T>(), description.into());
        self
    }

    /// Builder form of [`TypeOverrides::insert`]
    pub fn with<T: ?Sized + 'static>(mut self, description: impl Into<String>) -> Self {
        self.insert::<T>(description);
        self
    }

    pub fn get<T: ?Sized + 'static>(&self) -> Option<&str> {
        self.entries.get(&TypeId::of::<T>()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Recursive type walker with an override table and a cycle guard
pub struct Describer<'a> {
    overrides: &'a TypeOverrides,
    expanding: HashSet<TypeId>,
}

impl<'a> Describer<'a> {
    pub fn new(overrides: &'a TypeOverrides) -> Self {
        Self {
            overrides,
            expanding: HashSet::new(),
        }
    }

    /// Describe `T` from a fresh walk
    pub fn describe<T: Describe + ?Sized>(&mut self) -> Value {
        self.expanding.clear();
        self.visit::<T>()
    }

    /// Describe `T` as part of the current walk
    pub fn visit<T: Describe + ?Sized>(&mut self) -> Value {
        if let Some(literal) = self.overrides.get::<T>() {
            return Value::String(literal.to_string());
        }
        T::describe(self)
    }

    /// Describe a struct-like type through its fields
    ///
    /// Returns [`RECURSION_MARKER`] when `T` is already being expanded.
    pub fn object<T: ?Sized + 'static>(&mut self, fields: impl FnOnce(&mut ObjectShape<'_, 'a>)) -> Value {
        let id = TypeId::of::<T>();
        if !self.expanding.insert(id) {
            return Value::String(RECURSION_MARKER.to_string());
        }

        let described = {
            let mut shape = ObjectShape {
                describer: self,
                fields: Map::new(),
            };
            fields(&mut shape);
            shape.fields
        };

        self.expanding.remove(&id);
        Value::Object(described)
    }

    /// Describe a sequence of `T`
    pub fn sequence<T: Describe + ?Sized>(&mut self) -> Value {
        Value::Array(vec![self.visit::<T>()])
    }

    /// Describe a map from `K` to `V`
    pub fn map<K: Describe + ?Sized, V: Describe + ?Sized>(&mut self) -> Value {
        let key = match self.visit::<K>() {
            Value::String(name) => name,
            _ => type_name::<K>().to_string(),
        };
        let mut entry = Map::new();
        entry.insert(format!("MAP[{}]", key), self.visit::<V>());
        Value::Object(entry)
    }
}

/// Field collector handed to [`Describer::object`]
pub struct ObjectShape<'d, 'a> {
    describer: &'d mut Describer<'a>,
    fields: Map<String, Value>,
}

impl ObjectShape<'_, '_> {
    /// Field always present on the wire
    ///
    /// An empty alias means the field is not wire-visible and is skipped.
    pub fn field<T: Describe + ?Sized>(&mut self, alias: &str) -> &mut Self {
        if !alias.is_empty() {
            let described = self.describer.visit::<T>();
            self.fields.insert(alias.to_string(), described);
        }
        self
    }

    /// Field omitted from the wire when empty; rendered as `alias?`
    pub fn optional<T: Describe + ?Sized>(&mut self, alias: &str) -> &mut Self {
        if !alias.is_empty() {
            let described = self.describer.visit::<T>();
            self.fields.insert(format!("{}?", alias), described);
        }
        self
    }
}

// =============================================================================
// Implementations for std types
// =============================================================================

macro_rules! describe_primitive {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe(_: &mut Describer<'_>) -> Value {
                    Value::String($name.to_string())
                }
            }
        )*
    };
}

describe_primitive! {
    bool => "bool",
    char => "char",
    String => "string",
    str => "string",
    i8 => "int8",
    i16 => "int16",
    i32 => "int32",
    i64 => "int64",
    i128 => "int128",
    isize => "int",
    u8 => "uint8",
    u16 => "uint16",
    u32 => "uint32",
    u64 => "uint64",
    u128 => "uint128",
    usize => "uint",
    f32 => "float32",
    f64 => "float64",
    Value => "any",
    serde_json::value::RawValue => "any",
}

impl Describe for () {
    fn describe(_: &mut Describer<'_>) -> Value {
        Value::Null
    }
}

macro_rules! describe_transparent {
    ($($wrapper:ident),*) => {
        $(
            impl<T: Describe + ?Sized> Describe for $wrapper<T> {
                fn describe(d: &mut Describer<'_>) -> Value {
                    d.visit::<T>()
                }
            }
        )*
    };
}

describe_transparent!(Box, Arc, Rc);

impl<T: Describe + ?Sized> Describe for &'static T {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.visit::<T>()
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.visit::<T>()
    }
}

macro_rules! describe_sequence {
    ($($seq:ident),*) => {
        $(
            impl<T: Describe> Describe for $seq<T> {
                fn describe(d: &mut Describer<'_>) -> Value {
                    d.sequence::<T>()
                }
            }
        )*
    };
}

describe_sequence!(Vec, VecDeque, BTreeSet);

impl<T: Describe, S: 'static> Describe for HashSet<T, S> {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.sequence::<T>()
    }
}

impl<T: Describe> Describe for [T] {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.sequence::<T>()
    }
}

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.sequence::<T>()
    }
}

impl<K: Describe, V: Describe, S: 'static> Describe for HashMap<K, V, S> {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.map::<K, V>()
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.map::<K, V>()
    }
}
