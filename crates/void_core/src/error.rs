//! Error types for the core library

use std::fmt;

/// The core error type
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// State type registry error
    TypeRegistry(TypeRegistryError),
    /// Namespace parsing error
    Namespace(NamespaceError),
    /// Generic error with message
    Message(Box<str>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TypeRegistry(e) => write!(f, "Type registry error: {}", e),
            Error::Namespace(e) => write!(f, "Namespace error: {}", e),
            Error::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;

/// State type registry errors
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRegistryError {
    /// Type not registered
    NotRegistered(Box<str>),
    /// Type already registered
    AlreadyRegistered(Box<str>),
    /// Inherited type is not registered yet
    UnknownParent { state_type: Box<str>, parent: Box<str> },
    /// Field declared twice on the same type
    DuplicateField { state_type: Box<str>, field: Box<str> },
    /// Nested record refers to itself, directly or through other records
    NestedCycle(Box<str>),
    /// Nested record type is not registered yet
    UnknownNested { state_type: Box<str>, nested: Box<str> },
}

impl fmt::Display for TypeRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRegistryError::NotRegistered(name) => write!(f, "State type not registered: {}", name),
            TypeRegistryError::AlreadyRegistered(name) => {
                write!(f, "State type already registered: {}", name)
            }
            TypeRegistryError::UnknownParent { state_type, parent } => {
                write!(f, "State type '{}' inherits unregistered type '{}'", state_type, parent)
            }
            TypeRegistryError::DuplicateField { state_type, field } => {
                write!(f, "State type '{}' declares field '{}' twice", state_type, field)
            }
            TypeRegistryError::NestedCycle(name) => {
                write!(f, "State type '{}' nests itself", name)
            }
            TypeRegistryError::UnknownNested { state_type, nested } => {
                write!(f, "State type '{}' nests unregistered type '{}'", state_type, nested)
            }
        }
    }
}

impl From<TypeRegistryError> for Error {
    fn from(e: TypeRegistryError) -> Self {
        Error::TypeRegistry(e)
    }
}

/// Namespace parsing errors
#[derive(Debug, Clone, PartialEq)]
pub enum NamespaceError {
    /// A path component is empty (`a..b`)
    EmptyComponent(Box<str>),
    /// An index suffix is not of the form `name[N]`
    MalformedIndex(Box<str>),
}

impl fmt::Display for NamespaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceError::EmptyComponent(path) => write!(f, "Empty component in '{}'", path),
            NamespaceError::MalformedIndex(component) => {
                write!(f, "Malformed index in component '{}'", component)
            }
        }
    }
}

impl From<NamespaceError> for Error {
    fn from(e: NamespaceError) -> Self {
        Error::Namespace(e)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Message(s.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Message(s.into_boxed_str())
    }
}
