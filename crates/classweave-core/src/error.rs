//! Typed failures of the transformation engine.
//!
//! These travel inside `anyhow::Error` so callers can attach context; tests
//! and the CLI recover the variant with `downcast_ref::<WeaveError>()`.

use std::path::PathBuf;

use crate::analyzer::ReferenceRole;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeaveError {
    /// An input archive does not exist. Raised before anything is written.
    MissingInput {
        path: PathBuf,
    },

    /// A synthetic member collides with an existing member of the class, or
    /// names a target member that does not exist.
    DefinitionConflict {
        owner: String,
        name: String,
        descriptor: String,
        reason: String,
    },

    /// No class in the hierarchy declares the member. Recoverable: the name
    /// is left unchanged.
    UnresolvedOwner {
        owner: String,
        name: String,
        descriptor: String,
    },

    /// A stub would have to be both an interface and a class.
    VerifierUnsafeStub {
        name: String,
        roles: Vec<ReferenceRole>,
    },

    /// A renamed-name lookup ran before the renaming engine was bound.
    StaleReadBeforeReady {
        lookup: String,
    },
}

impl std::fmt::Display for WeaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeaveError::MissingInput { path } => {
                write!(f, "Input archive {} does not exist", path.display())
            }
            WeaveError::DefinitionConflict {
                owner,
                name,
                descriptor,
                reason,
            } => write!(
                f,
                "Definition conflict on {}.{}:{}: {}",
                owner, name, descriptor, reason
            ),
            WeaveError::UnresolvedOwner {
                owner,
                name,
                descriptor,
            } => write!(
                f,
                "No declaring class found for {}.{}:{} (left unrenamed)",
                owner, name, descriptor
            ),
            WeaveError::VerifierUnsafeStub { name, roles } => {
                let roles: Vec<&str> = roles.iter().map(ReferenceRole::as_str).collect();
                write!(
                    f,
                    "Cannot synthesize a stub for {}: referenced as {}",
                    name,
                    roles.join(" and ")
                )
            }
            WeaveError::StaleReadBeforeReady { lookup } => write!(
                f,
                "Renaming engine read before it was bound ({})",
                lookup
            ),
        }
    }
}

impl std::error::Error for WeaveError {}

/// Finds a `WeaveError` anywhere in an error chain.
pub fn find_weave_error(err: &anyhow::Error) -> Option<&WeaveError> {
    err.chain().find_map(|e| e.downcast_ref::<WeaveError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_display_messages() {
        let err = WeaveError::DefinitionConflict {
            owner: "a/Foo".into(),
            name: "bar".into(),
            descriptor: "J".into(),
            reason: "existing field has descriptor I".into(),
        };
        assert_eq!(
            err.to_string(),
            "Definition conflict on a/Foo.bar:J: existing field has descriptor I"
        );

        let err = WeaveError::VerifierUnsafeStub {
            name: "x/Y".into(),
            roles: vec![ReferenceRole::Interface, ReferenceRole::Type],
        };
        assert!(err.to_string().contains("interface and type"));
    }

    #[test]
    fn test_found_through_context() {
        let err: anyhow::Error = Err::<(), _>(WeaveError::StaleReadBeforeReady {
            lookup: "a/Foo".into(),
        })
        .context("while processing in.jar")
        .unwrap_err();
        assert!(matches!(
            find_weave_error(&err),
            Some(WeaveError::StaleReadBeforeReady { .. })
        ));
    }
}
