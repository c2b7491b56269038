//! Type descriptors used throughout the IR
//! 
//! The front end (parser and type checker) produces these descriptors; the IR
//! layer only compares them and prints them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type descriptor of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDesc {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Str,
    /// Return type of functions without a result
    Void,
}

impl TypeDesc {
    /// Default integer type of the language
    pub fn int() -> Self {
        TypeDesc::Int64
    }

    /// Default float type of the language
    pub fn float() -> Self {
        TypeDesc::Float64
    }

    /// Check if this is an integer type
    pub fn is_int(&self) -> bool {
        matches!(self, TypeDesc::Int8 | TypeDesc::Int16 | TypeDesc::Int32 | TypeDesc::Int64)
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, TypeDesc::Float32 | TypeDesc::Float64)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, TypeDesc::Bool)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeDesc::Void)
    }

    /// Size in bytes, `None` for types without a fixed size
    pub fn size_in_bytes(&self) -> Option<u32> {
        match self {
            TypeDesc::Int8 | TypeDesc::Bool => Some(1),
            TypeDesc::Int16 => Some(2),
            TypeDesc::Int32 | TypeDesc::Float32 => Some(4),
            TypeDesc::Int64 | TypeDesc::Float64 => Some(8),
            TypeDesc::Str | TypeDesc::Void => None,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeDesc::Int8 => "int8",
            TypeDesc::Int16 => "int16",
            TypeDesc::Int32 => "int32",
            TypeDesc::Int64 => "int",
            TypeDesc::Float32 => "float32",
            TypeDesc::Float64 => "float",
            TypeDesc::Bool => "bool",
            TypeDesc::Str => "str",
            TypeDesc::Void => "void",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_predicates() {
        assert!(TypeDesc::Int32.is_int());
        assert!(TypeDesc::int().is_int());
        assert!(!TypeDesc::Float32.is_int());
        assert!(TypeDesc::Float64.is_float());
        assert!(TypeDesc::Bool.is_bool());
        assert!(TypeDesc::Void.is_void());
    }

    #[test]
    fn test_type_sizes() {
        assert_eq!(TypeDesc::Int8.size_in_bytes(), Some(1));
        assert_eq!(TypeDesc::Int16.size_in_bytes(), Some(2));
        assert_eq!(TypeDesc::Float32.size_in_bytes(), Some(4));
        assert_eq!(TypeDesc::Int64.size_in_bytes(), Some(8));
        assert_eq!(TypeDesc::Str.size_in_bytes(), None);
    }

    #[test]
    fn test_type_display() {
        assert_eq!(TypeDesc::Int32.to_string(), "int32");
        assert_eq!(TypeDesc::Int64.to_string(), "int");
        assert_eq!(TypeDesc::Bool.to_string(), "bool");
    }

    #[test]
    fn test_type_serde() {
        let json = serde_json::to_string(&TypeDesc::Float32).unwrap();
        assert_eq!(json, "\"Float32\"");
        let back: TypeDesc = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TypeDesc::Float32);
    }
}
