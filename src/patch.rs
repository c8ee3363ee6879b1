//! Partial updates in JSON Patch form.
//!
//! A [`PatchDocument`] is built against a patch model: a type that declares
//! which top-level fields of a resource may be changed. Paths are checked
//! against that list when the document is built, so a disallowed field is
//! rejected before any request exists.
//!
//! Documents carry no resource version. Two writers patching the same field
//! race and the last request to reach the server wins.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde_json::Value;

use crate::client::ClientError;
use crate::request::RequestBody;

pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// Declares the fields of a resource open to partial updates.
pub trait Patchable {
    /// Wire (camelCase) names of the patchable fields.
    const PATCHABLE_FIELDS: &'static [&'static str];
}

/// One field-level operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

impl PatchOperation {
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Remove { path }
            | PatchOperation::Replace { path, .. } => path,
        }
    }
}

/// An ordered, validated list of operations against patch model `T`.
pub struct PatchDocument<T> {
    operations: Vec<PatchOperation>,
    _model: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for PatchDocument<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchDocument")
            .field("model", &std::any::type_name::<T>())
            .field("operations", &self.operations)
            .finish()
    }
}

impl<T> Clone for PatchDocument<T> {
    fn clone(&self) -> Self {
        Self {
            operations: self.operations.clone(),
            _model: PhantomData,
        }
    }
}

impl<T: Patchable> PatchDocument<T> {
    pub fn builder() -> PatchBuilder<T> {
        PatchBuilder::new()
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Wire body: a JSON array of operations in the order they were added.
    pub fn encode(&self) -> Result<RequestBody, ClientError> {
        let bytes = serde_json::to_vec(&self.operations)?;
        Ok(RequestBody {
            content_type: JSON_PATCH_CONTENT_TYPE,
            bytes: bytes.into(),
        })
    }
}

/// Collects operations for a [`PatchDocument`].
///
/// ```rust
/// use falu::models::MessagePatchModel;
/// use falu::patch::PatchDocument;
///
/// let patch = PatchDocument::<MessagePatchModel>::builder()
///     .replace("/metadata/order", "o-42")
///     .remove("/metadata/draft")
///     .build()
///     .unwrap();
/// assert_eq!(patch.len(), 2);
///
/// let rejected = PatchDocument::<MessagePatchModel>::builder()
///     .replace("/body", "new text")
///     .build();
/// assert!(rejected.is_err());
/// ```
pub struct PatchBuilder<T> {
    operations: Vec<PatchOperation>,
    error: Option<ClientError>,
    _model: PhantomData<fn() -> T>,
}

impl<T: Patchable> PatchBuilder<T> {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
            error: None,
            _model: PhantomData,
        }
    }

    pub fn add<V: Serialize>(self, path: &str, value: V) -> Self {
        self.push_value(path, value, |path, value| PatchOperation::Add { path, value })
    }

    pub fn replace<V: Serialize>(self, path: &str, value: V) -> Self {
        self.push_value(path, value, |path, value| PatchOperation::Replace { path, value })
    }

    pub fn remove(mut self, path: &str) -> Self {
        self.operations.push(PatchOperation::Remove {
            path: normalize_path(path),
        });
        self
    }

    /// Validate every path against `T::PATCHABLE_FIELDS`.
    pub fn build(self) -> Result<PatchDocument<T>, ClientError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        for operation in &self.operations {
            ensure_patchable::<T>(operation.path())?;
        }
        Ok(PatchDocument {
            operations: self.operations,
            _model: PhantomData,
        })
    }

    fn push_value<V: Serialize>(
        mut self,
        path: &str,
        value: V,
        make: impl FnOnce(String, Value) -> PatchOperation,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        match serde_json::to_value(value) {
            Ok(value) => self.operations.push(make(normalize_path(path), value)),
            Err(e) => self.error = Some(ClientError::Parse(e)),
        }
        self
    }
}

impl<T: Patchable> Default for PatchBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn ensure_patchable<T: Patchable>(path: &str) -> Result<(), ClientError> {
    let field = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .unwrap_or_default();

    if field.is_empty() {
        return Err(ClientError::invalid_argument("patch", format!("'{path}' does not name a field")));
    }
    if !T::PATCHABLE_FIELDS.iter().any(|allowed| *allowed == field) {
        return Err(ClientError::invalid_argument(
            "patch",
            format!(
                "'{field}' is not patchable on {}; allowed fields: {}",
                short_type_name::<T>(),
                T::PATCHABLE_FIELDS.join(", ")
            ),
        ));
    }
    Ok(())
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
