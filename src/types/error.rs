use thiserror::Error;

/// Schema violations found while validating a parsed rule file.
///
/// Every variant carries the located path of the offending node, built as
/// `file name` + `[index]` chain + optional `(rule name)` + `.property`,
/// e.g. `celica.yaml[0](celica).children[1].type`. A schema error blocks
/// activation of the new snapshot; the previous snapshot keeps serving.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{path}: rule file must be a list")]
    NotAList { path: String },

    #[error("{path}: rule must be a mapping")]
    NotAMapping { path: String },

    #[error("{path}: '{type_name}' type is not supported")]
    UnknownType { path: String, type_name: String },

    #[error("{path}: '{property}' property is not supported")]
    UnsupportedProperty { path: String, property: String },

    #[error("{path}: children property is required")]
    MissingChildren { path: String },

    #[error("{path}: a tag property is required")]
    MissingTagAction { path: String },

    #[error("{path}: a condition property is required")]
    MissingConditions { path: String },

    #[error("{path}: default rule is already in use")]
    DuplicateDefault { path: String },

    #[error("{path}: default rule cannot contain conditions")]
    DefaultWithConditions { path: String },

    #[error("{path}: {message}")]
    InvalidProperty { path: String, message: String },
}

impl SchemaError {
    /// The located path of the offending node or property.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            SchemaError::NotAList { path }
            | SchemaError::NotAMapping { path }
            | SchemaError::UnknownType { path, .. }
            | SchemaError::UnsupportedProperty { path, .. }
            | SchemaError::MissingChildren { path }
            | SchemaError::MissingTagAction { path }
            | SchemaError::MissingConditions { path }
            | SchemaError::DuplicateDefault { path }
            | SchemaError::DefaultWithConditions { path }
            | SchemaError::InvalidProperty { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_message() {
        let err = SchemaError::UnknownType {
            path: "celica.yaml[0](celica).type".into(),
            type_name: "swap".into(),
        };
        assert_eq!(
            err.to_string(),
            "celica.yaml[0](celica).type: 'swap' type is not supported"
        );
        assert_eq!(err.path(), "celica.yaml[0](celica).type");
    }

    #[test]
    fn unsupported_property_message() {
        let err = SchemaError::UnsupportedProperty {
            path: "rules.yaml[2].children".into(),
            property: "children".into(),
        };
        assert_eq!(
            err.to_string(),
            "rules.yaml[2].children: 'children' property is not supported"
        );
    }

    #[test]
    fn invalid_property_message() {
        let err = SchemaError::InvalidProperty {
            path: "rules.yaml[0].any_of".into(),
            message: "any_of cannot contain weights".into(),
        };
        assert_eq!(
            err.to_string(),
            "rules.yaml[0].any_of: any_of cannot contain weights"
        );
    }
}
