//! Heap entities (`Objekt`) and the static area's per-class counterpart (`Klass`).

use std::rc::Rc;

use rustc_hash::FxHashMap;
use symex_core::{Signature, TypeTag, Value};

use crate::error::ResolutionError;

/// The type tag a stored value must be compatible with, derived from a
/// field descriptor's leading character (`L`/`[` both admit any reference
/// value, since array/class element typing is the resolver's concern, not
/// the heap's).
fn descriptor_tag(descriptor: &str) -> Option<TypeTag> {
    TypeTag::from_code(descriptor.chars().next()?)
}

fn compatible(descriptor: &str, value: &Value) -> bool {
    match descriptor_tag(descriptor) {
        Some(tag) if tag.is_reference() => value.type_tag().is_none(),
        Some(tag) => value.type_tag() == Some(tag),
        None => false,
    }
}

/// A class/object instance: a type name and a field-signature-keyed map of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    type_name: Rc<str>,
    fields: FxHashMap<Signature, Value>,
}

impl Instance {
    pub fn new(type_name: Rc<str>) -> Self {
        Self {
            type_name,
            fields: FxHashMap::default(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn field_signatures(&self) -> impl Iterator<Item = &Signature> {
        self.fields.keys()
    }

    pub fn get_field_value(&self, signature: &Signature) -> Option<&Value> {
        self.fields.get(signature)
    }

    /// Store a field value, rejecting one whose type tag is not compatible
    /// with the signature's descriptor (§3 invariant).
    pub fn put_field_value(&mut self, signature: Signature, value: Value) -> Result<(), ResolutionError> {
        if !compatible(&signature.descriptor, &value) {
            return Err(ResolutionError::IncompatibleFieldType {
                class: signature.class_name.to_string(),
                member: signature.member_name.to_string(),
            });
        }
        self.fields.insert(signature, value);
        Ok(())
    }
}

/// An array: a length value plus an index -> value mapping, where both the
/// index and the stored value may be symbolic.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayObj {
    element_type: TypeTag,
    length: Value,
    elements: FxHashMap<Value, Value>,
}

impl ArrayObj {
    pub fn new(element_type: TypeTag, length: Value) -> Self {
        Self {
            element_type,
            length,
            elements: FxHashMap::default(),
        }
    }

    pub fn element_type(&self) -> TypeTag {
        self.element_type
    }

    pub fn length(&self) -> &Value {
        &self.length
    }

    pub fn get(&self, index: &Value) -> Option<&Value> {
        self.elements.get(index)
    }

    pub fn put(&mut self, index: Value, value: Value) {
        self.elements.insert(index, value);
    }

    /// Concrete length, when the array was allocated with a literal size
    /// (the common case); `None` when the length is itself symbolic.
    pub fn concrete_length(&self) -> Option<i32> {
        match &self.length {
            Value::Simplex(symex_core::Simplex::Int(n)) => Some(*n),
            _ => None,
        }
    }
}

/// A heap entity: either an object instance or an array.
#[derive(Debug, Clone, PartialEq)]
pub enum Objekt {
    Instance(Instance),
    Array(ArrayObj),
}

impl Objekt {
    pub fn type_name(&self) -> &str {
        match self {
            Objekt::Instance(i) => i.type_name(),
            Objekt::Array(a) => match a.element_type() {
                TypeTag::Class => "[L",
                _ => "[",
            },
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Objekt::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_instance_mut(&mut self) -> Option<&mut Instance> {
        match self {
            Objekt::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayObj> {
        match self {
            Objekt::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut ArrayObj> {
        match self {
            Objekt::Array(a) => Some(a),
            _ => None,
        }
    }
}

/// The static-area counterpart of `Objekt`: a class's static fields.
///
/// The *existence* of a `Klass` entry for a class in the static area is
/// what `ensureKlass` (§4.3) checks — once allocated, a class is never
/// re-initialized even if its `<clinit>` frame hasn't returned yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Klass {
    class_name: Rc<str>,
    fields: FxHashMap<Signature, Value>,
}

impl Klass {
    pub fn new(class_name: Rc<str>) -> Self {
        Self {
            class_name,
            fields: FxHashMap::default(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn get_field_value(&self, signature: &Signature) -> Option<&Value> {
        self.fields.get(signature)
    }

    /// Look up a field's value by member name alone, ignoring descriptor —
    /// for observers (the runner's observed-variable notification) that
    /// only know a field's name, not its full signature.
    pub fn field_value_by_name(&self, member_name: &str) -> Option<&Value> {
        self.fields.iter().find(|(sig, _)| &*sig.member_name == member_name).map(|(_, v)| v)
    }

    pub fn put_field_value(&mut self, signature: Signature, value: Value) -> Result<(), ResolutionError> {
        if !compatible(&signature.descriptor, &value) {
            return Err(ResolutionError::IncompatibleFieldType {
                class: signature.class_name.to_string(),
                member: signature.member_name.to_string(),
            });
        }
        self.fields.insert(signature, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symex_core::Simplex;

    #[test]
    fn put_rejects_incompatible_type() {
        let mut instance = Instance::new(Rc::from("pkg/Foo"));
        let sig = Signature::new("pkg/Foo", "I", "count");
        let err = instance
            .put_field_value(sig, Value::Simplex(Simplex::Long(1)))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::IncompatibleFieldType { .. }));
    }

    #[test]
    fn put_accepts_compatible_type() {
        let mut instance = Instance::new(Rc::from("pkg/Foo"));
        let sig = Signature::new("pkg/Foo", "I", "count");
        instance
            .put_field_value(sig.clone(), Value::Simplex(Simplex::Int(42)))
            .unwrap();
        assert_eq!(instance.get_field_value(&sig), Some(&Value::Simplex(Simplex::Int(42))));
    }

    #[test]
    fn array_stores_symbolic_index_and_value() {
        let mut array = ArrayObj::new(TypeTag::Int, Value::Simplex(Simplex::Int(10)));
        let index = Value::Term {
            ty: TypeTag::Int,
            id: 0,
        };
        array.put(index.clone(), Value::Simplex(Simplex::Int(99)));
        assert_eq!(array.get(&index), Some(&Value::Simplex(Simplex::Int(99))));
        assert_eq!(array.concrete_length(), Some(10));
    }
}
