//! The class hierarchy oracle: parsed class file data and the field/method
//! resolution rules that read it. Class-file parsing itself is out of
//! scope; callers hand in already-parsed [`ClassFile`] records (e.g. via
//! [`TestClassHierarchy`] in tests, or a real parser elsewhere).

use std::rc::Rc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use symex_core::{Signature, Simplex};

use crate::error::ResolutionError;
use crate::frame::Bytecode;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub signature: Signature,
    pub access_flags: AccessFlags,
    /// Present for a `static final` field initialized from a `ConstantValue`
    /// attribute; lets `getstatic` read it without forcing initialization.
    pub constant_value: Option<Simplex>,
}

/// One entry of a method's exception table: `catch_type = None` matches any
/// throwable (a `finally` block), `Some(class_name)` matches that class or
/// a subclass of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_pc: u32,
    pub catch_type: Option<Rc<str>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub signature: Signature,
    pub access_flags: AccessFlags,
    /// `None` for abstract/native methods.
    pub code: Option<Bytecode>,
    pub max_locals: u32,
    pub handlers: Vec<ExceptionHandler>,
    /// The field/method signatures `getstatic`/`putstatic`/`getfield`/
    /// `putfield`/`invokestatic` index by their 2-byte operand, in place of
    /// a real class file's constant pool (flattened away here, same as
    /// [`FieldInfo::constant_value`]).
    pub constant_pool: Vec<Signature>,
}

impl MethodInfo {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(AccessFlags::ABSTRACT)
    }

    pub fn constant_pool_signature(&self, index: u16) -> Option<&Signature> {
        self.constant_pool.get(index as usize)
    }

    /// The innermost handler covering `pc` whose `catch_type` is
    /// compatible with `exception_class`, if any.
    pub fn handler_for(&self, pc: u32, exception_class: &str, hierarchy: &dyn ClassHierarchy) -> Option<u32> {
        self.handlers
            .iter()
            .find(|h| {
                h.start_pc <= pc
                    && pc < h.end_pc
                    && match &h.catch_type {
                        None => true,
                        Some(catch_type) => hierarchy.is_subclass(exception_class, catch_type),
                    }
            })
            .map(|h| h.handler_pc)
    }
}

/// A parsed class: name, supertype links, and member tables. Constant-pool
/// indirection is flattened away — `FieldInfo::constant_value` carries the
/// resolved literal directly, since that's the only constant-pool detail
/// the engine ever needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub name: Rc<str>,
    pub super_class: Option<Rc<str>>,
    pub interfaces: Vec<Rc<str>>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub access_flags: AccessFlags,
}

impl ClassFile {
    pub fn find_field(&self, member_name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| &*f.signature.member_name == member_name)
    }

    pub fn find_method(&self, member_name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| &*m.signature.member_name == member_name && m.signature.descriptor == descriptor)
    }

    pub fn clinit(&self) -> Option<&MethodInfo> {
        self.find_method("<clinit>", "()V")
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(AccessFlags::INTERFACE)
    }
}

/// The read-only oracle a state's resolver consults: parsed class data plus
/// the hosted-VM field/method resolution and assignability rules.
pub trait ClassHierarchy {
    fn get_class_file(&self, name: &str) -> Result<&ClassFile, ResolutionError>;

    /// Every known class name, used to gather `EXPANDS` candidates for
    /// reference resolution: every concrete, non-interface class assignable
    /// to a reference's declared type is a candidate the fork considers.
    fn all_class_names(&self) -> Vec<Rc<str>>;

    /// Field resolution: declaring class, then its direct superinterfaces
    /// recursively, then the superclass chain. The returned signature
    /// carries the class that actually declares the field.
    fn resolve_field(&self, current_class: &str, signature: &Signature) -> Result<Signature, ResolutionError> {
        let class_file = self.get_class_file(current_class)?;
        if let Some(field) = class_file.find_field(&signature.member_name) {
            return Ok(field.signature.declared_in(current_class));
        }
        for interface in &class_file.interfaces {
            if let Ok(resolved) = self.resolve_field(interface, signature) {
                return Ok(resolved);
            }
        }
        if let Some(super_class) = &class_file.super_class {
            return self.resolve_field(super_class, signature);
        }
        Err(ResolutionError::FieldNotFound {
            class: current_class.to_string(),
            member: signature.member_name.to_string(),
        })
    }

    /// Method resolution: declaring class, then superinterfaces, then the
    /// superclass chain (a simplification of the hosted VM's two-phase
    /// class-then-interface search, adequate for a modeled bytecode set
    /// with no diamond default-method ambiguity).
    fn resolve_method(
        &self,
        current_class: &str,
        signature: &Signature,
        _is_interface: bool,
    ) -> Result<Signature, ResolutionError> {
        let class_file = self.get_class_file(current_class)?;
        if let Some(method) = class_file.find_method(&signature.member_name, &signature.descriptor) {
            return Ok(method.signature.declared_in(current_class));
        }
        for interface in &class_file.interfaces {
            if let Ok(resolved) = self.resolve_method(interface, signature, true) {
                return Ok(resolved);
            }
        }
        if let Some(super_class) = &class_file.super_class {
            return self.resolve_method(super_class, signature, false);
        }
        Err(ResolutionError::MethodNotFound {
            class: current_class.to_string(),
            member: signature.member_name.to_string(),
            descriptor: signature.descriptor.to_string(),
        })
    }

    /// Whether `a` is `b` or a (possibly indirect) subclass of `b`.
    fn is_subclass(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        match self.get_class_file(a) {
            Ok(class_file) => class_file
                .super_class
                .as_deref()
                .is_some_and(|sup| self.is_subclass(sup, b)),
            Err(_) => false,
        }
    }

    /// Array component covariance: `a[]` is assignable to `b[]` when `a` is
    /// `b` or a subclass of it.
    fn is_assignable(&self, array_type_a: &str, array_type_b: &str) -> bool {
        array_type_a == array_type_b || self.is_subclass(array_type_a, array_type_b)
    }
}

/// An in-memory [`ClassHierarchy`] built from hand-assembled [`ClassFile`]
/// records, for tests and standalone runs that don't wire in a real
/// class-file parser.
#[derive(Debug, Clone, Default)]
pub struct TestClassHierarchy {
    classes: FxHashMap<Rc<str>, ClassFile>,
}

impl TestClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class_file: ClassFile) -> Self {
        self.classes.insert(class_file.name.clone(), class_file);
        self
    }
}

impl ClassHierarchy for TestClassHierarchy {
    fn get_class_file(&self, name: &str) -> Result<&ClassFile, ResolutionError> {
        self.classes
            .get(name)
            .ok_or_else(|| ResolutionError::ClassFileNotFound(name.to_string()))
    }

    fn all_class_names(&self) -> Vec<Rc<str>> {
        self.classes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> ClassFile {
        ClassFile {
            name: Rc::from("java/lang/Object"),
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            access_flags: AccessFlags::PUBLIC,
        }
    }

    fn base_with_field() -> ClassFile {
        ClassFile {
            name: Rc::from("pkg/Base"),
            super_class: Some(Rc::from("java/lang/Object")),
            interfaces: vec![],
            fields: vec![FieldInfo {
                signature: Signature::new("pkg/Base", "I", "count"),
                access_flags: AccessFlags::PRIVATE,
                constant_value: None,
            }],
            methods: vec![],
            access_flags: AccessFlags::PUBLIC,
        }
    }

    fn derived() -> ClassFile {
        ClassFile {
            name: Rc::from("pkg/Derived"),
            super_class: Some(Rc::from("pkg/Base")),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            access_flags: AccessFlags::PUBLIC,
        }
    }

    fn hierarchy() -> TestClassHierarchy {
        TestClassHierarchy::new()
            .with_class(object())
            .with_class(base_with_field())
            .with_class(derived())
    }

    #[test]
    fn field_resolution_walks_superclass_chain() {
        let hierarchy = hierarchy();
        let sig = Signature::new("pkg/Derived", "I", "count");
        let resolved = hierarchy.resolve_field("pkg/Derived", &sig).unwrap();
        assert_eq!(&*resolved.class_name, "pkg/Base");
    }

    #[test]
    fn unknown_field_fails() {
        let hierarchy = hierarchy();
        let sig = Signature::new("pkg/Derived", "I", "missing");
        assert!(hierarchy.resolve_field("pkg/Derived", &sig).is_err());
    }

    #[test]
    fn is_subclass_transitive() {
        let hierarchy = hierarchy();
        assert!(hierarchy.is_subclass("pkg/Derived", "java/lang/Object"));
        assert!(!hierarchy.is_subclass("java/lang/Object", "pkg/Derived"));
    }
}
