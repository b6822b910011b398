//! Error types for ACL operations.
//!
//! This module provides the `AclError` type and `Result<T>` alias used across
//! the crate. Uses `thiserror` for derive macros.
//!
//! Batch validation never stops at the first bad token: every rejected
//! subject, permission, and mode is collected into [`Rejections`] and
//! reported together in [`AclError::Rejected`].

use std::fmt;

use thiserror::Error;

// ============================================================================
// Error taxonomy
// ============================================================================

/// Coarse classification of an [`AclError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed subject token or unresolvable namespace/identifier.
    InvalidSubjectString,
    /// Permission token not present in the resource's vocabulary.
    InvalidPermissionString,
    /// Mode not present in the resource's mode vocabulary.
    InvalidMode,
    /// The administrative check rejected the action.
    PermissionDenied,
    /// A resource or subject lookup failed entirely.
    NotFound,
    /// The storage backend failed.
    Storage,
    /// Configuration or registration problem.
    Config,
}

/// Why a subject token was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectRejectionReason {
    /// Not of the form `namespace:identifier`.
    Malformed,
    /// No resolver is registered for the namespace.
    UnknownNamespace(String),
    /// The resolver did not recognise the identifier.
    Unresolved(String),
}

/// A single rejected subject token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRejection {
    /// The token as supplied by the caller.
    pub token: String,
    /// Why it was rejected.
    pub reason: SubjectRejectionReason,
}

impl SubjectRejection {
    /// Create a rejection for `token`.
    pub fn new(token: impl Into<String>, reason: SubjectRejectionReason) -> Self {
        Self {
            token: token.into(),
            reason,
        }
    }
}

impl fmt::Display for SubjectRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            SubjectRejectionReason::Malformed => {
                write!(f, "`{}` (expected namespace:identifier)", self.token)
            }
            SubjectRejectionReason::UnknownNamespace(ns) => {
                write!(f, "`{}` (unknown namespace `{ns}`)", self.token)
            }
            SubjectRejectionReason::Unresolved(msg) => write!(f, "`{}` ({msg})", self.token),
        }
    }
}

/// Every token rejected by one batch validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rejections {
    /// Rejected subject tokens.
    pub subjects: Vec<SubjectRejection>,
    /// Rejected permission tokens, as supplied.
    pub permissions: Vec<String>,
    /// Rejected mode, if any.
    pub mode: Option<String>,
}

impl Rejections {
    /// Create an empty rejection set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing was rejected.
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty() && self.permissions.is_empty() && self.mode.is_none()
    }

    /// Total number of rejected tokens.
    pub fn len(&self) -> usize {
        self.subjects.len() + self.permissions.len() + usize::from(self.mode.is_some())
    }

    /// Rejected subject tokens, as supplied.
    pub fn subject_tokens(&self) -> Vec<&str> {
        self.subjects.iter().map(|r| r.token.as_str()).collect()
    }

    /// Merge another rejection set into this one.
    pub fn extend(&mut self, other: Rejections) {
        self.subjects.extend(other.subjects);
        self.permissions.extend(other.permissions);
        if self.mode.is_none() {
            self.mode = other.mode;
        }
    }

    /// `Ok(())` when empty, otherwise [`AclError::Rejected`].
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AclError::Rejected(self))
        }
    }
}

impl fmt::Display for Rejections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.subjects.is_empty() {
            let tokens: Vec<String> = self.subjects.iter().map(|r| r.to_string()).collect();
            parts.push(format!("invalid subjects: {}", tokens.join(", ")));
        }
        if !self.permissions.is_empty() {
            parts.push(format!(
                "invalid permissions: {}",
                self.permissions.join(", ")
            ));
        }
        if let Some(mode) = &self.mode {
            parts.push(format!("invalid mode: {mode}"));
        }
        write!(f, "{}", parts.join("; "))
    }
}

// ============================================================================
// AclError
// ============================================================================

/// Errors that can occur in ACL operations.
#[derive(Error, Debug)]
pub enum AclError {
    /// One or more supplied tokens failed validation.
    #[error("Rejected: {0}")]
    Rejected(Rejections),

    /// The actor may not administer this resource's ACLs.
    #[error("Permission denied: `{actor}` may not modify access on `{resource}`")]
    PermissionDenied { actor: String, resource: String },

    /// Resource or subject not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AclError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a permission denied error.
    pub fn permission_denied(actor: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::PermissionDenied {
            actor: actor.into(),
            resource: resource.into(),
        }
    }

    /// Classify this error.
    ///
    /// A rejection carrying both subject and permission failures reports
    /// [`ErrorKind::InvalidSubjectString`]; inspect [`AclError::rejections`]
    /// for the full picture.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected(r) if !r.subjects.is_empty() => ErrorKind::InvalidSubjectString,
            Self::Rejected(r) if !r.permissions.is_empty() => ErrorKind::InvalidPermissionString,
            Self::Rejected(_) => ErrorKind::InvalidMode,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) | Self::Io(_) => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// The aggregated rejections, if this is a validation failure.
    pub fn rejections(&self) -> Option<&Rejections> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }

    /// Whether this is a `PermissionDenied` error.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Whether this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, AclError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_empty() {
        let r = Rejections::new();
        assert!(r.is_empty());
        assert_eq!(r.len(), 0);
        assert!(r.into_result().is_ok());
    }

    #[test]
    fn test_rejections_into_result() {
        let mut r = Rejections::new();
        r.permissions.push("fly".into());
        let err = r.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPermissionString);
        assert_eq!(err.rejections().unwrap().permissions, vec!["fly"]);
    }

    #[test]
    fn test_rejections_display_lists_everything() {
        let mut r = Rejections::new();
        r.subjects.push(SubjectRejection::new(
            "nope",
            SubjectRejectionReason::Malformed,
        ));
        r.subjects.push(SubjectRejection::new(
            "ghost:x",
            SubjectRejectionReason::UnknownNamespace("ghost".into()),
        ));
        r.permissions.push("fly".into());
        r.permissions.push("swim".into());

        let msg = r.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("ghost:x"));
        assert!(msg.contains("fly"));
        assert!(msg.contains("swim"));
        assert_eq!(r.len(), 4);
        assert_eq!(r.subject_tokens(), vec!["nope", "ghost:x"]);
    }

    #[test]
    fn test_rejections_extend() {
        let mut a = Rejections::new();
        a.permissions.push("fly".into());
        let mut b = Rejections::new();
        b.permissions.push("swim".into());
        b.mode = Some("weird".into());
        a.extend(b);
        assert_eq!(a.permissions, vec!["fly", "swim"]);
        assert_eq!(a.mode.as_deref(), Some("weird"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AclError::permission_denied("bob", "board:news").kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(AclError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(AclError::storage("x").kind(), ErrorKind::Storage);
        assert_eq!(AclError::config("x").kind(), ErrorKind::Config);

        let mut r = Rejections::new();
        r.mode = Some("bogus".into());
        assert_eq!(AclError::Rejected(r).kind(), ErrorKind::InvalidMode);
    }

    #[test]
    fn test_subject_failures_take_precedence_in_kind() {
        let mut r = Rejections::new();
        r.subjects
            .push(SubjectRejection::new("x", SubjectRejectionReason::Malformed));
        r.permissions.push("fly".into());
        let err = AclError::Rejected(r);
        assert_eq!(err.kind(), ErrorKind::InvalidSubjectString);
        assert_eq!(err.rejections().unwrap().len(), 2);
    }

    #[test]
    fn test_error_display() {
        let err = AclError::permission_denied("bob", "board:news");
        assert_eq!(
            err.to_string(),
            "Permission denied: `bob` may not modify access on `board:news`"
        );
        assert!(err.is_permission_denied());
        assert!(AclError::not_found("board:x").is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AclError = io.into();
        assert!(matches!(err, AclError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
