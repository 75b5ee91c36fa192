//! Field and method signatures.

use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

/// An ordered triple identifying a field or method: the declaring class, the
/// descriptor (field type, or `(params)return` for methods), and the member
/// name.
///
/// Cheap to clone (`Rc<str>` sharing), used as a hash map key throughout the
/// heap, static area, and resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub class_name: Rc<str>,
    pub descriptor: Rc<str>,
    pub member_name: Rc<str>,
}

impl Signature {
    pub fn new(
        class_name: impl Into<Rc<str>>,
        descriptor: impl Into<Rc<str>>,
        member_name: impl Into<Rc<str>>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            descriptor: descriptor.into(),
            member_name: member_name.into(),
        }
    }

    /// A copy of this signature with a different declaring class, used when a
    /// field/method resolution walks up to a superclass or superinterface.
    pub fn declared_in(&self, class_name: impl Into<Rc<str>>) -> Self {
        Self {
            class_name: class_name.into(),
            descriptor: self.descriptor.clone(),
            member_name: self.member_name.clone(),
        }
    }

    /// True if this descriptor is a method descriptor (`(...)...`) rather
    /// than a bare field type.
    pub fn is_method(&self) -> bool {
        self.descriptor.starts_with('(')
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} {}", self.class_name, self.member_name, self.descriptor)
    }
}
