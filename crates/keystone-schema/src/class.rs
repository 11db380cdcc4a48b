//! Node classes and the handles used to refer to them.

use std::any::TypeId;
use std::fmt;

use keystone_core::AccessPolicy;

use crate::spec::SpecBuilder;

/// A node type declared in Rust. The impl is the registration: the compiler
/// reads `TYPE_NAME`, `parent`, and `gql_spec` and needs nothing else.
pub trait NodeClass: 'static {
    /// API type name, also stored as `Node::type_name`.
    const TYPE_NAME: &'static str;

    /// Abstract classes compile to types with no standard mutations and no
    /// factory.
    const ABSTRACT: bool = false;

    /// The class this one extends. Its compiled type becomes an interface of
    /// this one and its declarations are inherited.
    fn parent() -> Option<ClassRef> {
        None
    }

    /// Declare fields, relations, and mutations.
    fn gql_spec(_gql: &mut SpecBuilder) {}

    fn access() -> AccessPolicy {
        AccessPolicy::private()
    }
}

/// Copyable handle on a [`NodeClass`], usable where the class is only known
/// at runtime (parent links, relation targets).
#[derive(Clone, Copy)]
pub struct ClassRef {
    type_id: fn() -> TypeId,
    name: &'static str,
    is_abstract: bool,
    parent: fn() -> Option<ClassRef>,
    declare: fn(&mut SpecBuilder),
    access: fn() -> AccessPolicy,
}

impl ClassRef {
    pub fn of<T: NodeClass>() -> Self {
        Self {
            type_id: TypeId::of::<T>,
            name: T::TYPE_NAME,
            is_abstract: T::ABSTRACT,
            parent: T::parent,
            declare: T::gql_spec,
            access: T::access,
        }
    }

    /// Class identity; two handles on the same class compare equal.
    pub fn id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn parent(&self) -> Option<ClassRef> {
        (self.parent)()
    }

    pub fn access(&self) -> AccessPolicy {
        (self.access)()
    }

    pub(crate) fn declare(&self, builder: &mut SpecBuilder) {
        (self.declare)(builder)
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ClassRef {}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassRef").field(&self.name).finish()
    }
}
