//! Startup-time dependency injection.
//!
//! Components declare *field requests* — a field name plus the capability
//! (concrete type) the bound value must satisfy. The owning context exposes
//! a pool of named injectable values (plain values, shared handles, and the
//! components themselves). [`resolve`] is the pure matching function: given
//! one component's requests and the pool it produces a validated binding
//! set or a typed error, and never applies anything itself.
//!
//! ## Name resolution
//!
//! A request for field `f` on component `c` first looks up `f` in the pool,
//! then falls back to the mangled name `c_f`. The fallback lets one context
//! expose several same-typed values to different components
//! (`drive_motor`, `shooter_motor`, ...) without colliding.
//!
//! ## All-or-nothing wiring
//!
//! Resolution runs to completion for every request before the caller applies
//! a single binding, so a component is either fully wired or never reaches
//! `execute()` at all.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

// ─── Capability & Requests ──────────────────────────────────────────

/// The type a requested field must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    id: TypeId,
    name: &'static str,
}

impl Capability {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Human-readable type name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if `value`'s concrete type satisfies this capability.
    pub fn satisfied_by(&self, value: &dyn Any) -> bool {
        value.type_id() == self.id
    }
}

/// One declared injection request: a field name plus its capability.
#[derive(Debug, Clone)]
pub struct FieldRequest {
    pub field: &'static str,
    pub capability: Capability,
}

impl FieldRequest {
    /// Request a plain injectable of type `T`.
    pub fn new<T: Any>(field: &'static str) -> Self {
        Self {
            field,
            capability: Capability::of::<T>(),
        }
    }

    /// Request a sibling component of type `C`.
    ///
    /// Components live in the pool as `Rc<RefCell<C>>`, so this is
    /// shorthand for requesting the `RefCell<C>` capability.
    pub fn component<C: Any>(field: &'static str) -> Self {
        Self::new::<RefCell<C>>(field)
    }
}

// ─── Injectable Pool ────────────────────────────────────────────────

/// One named value exposed by the owning context.
///
/// The pool only binds shared references; ownership stays with whoever
/// produced the value.
#[derive(Clone)]
pub struct Injectable {
    name: String,
    type_name: &'static str,
    value: Rc<dyn Any>,
}

impl Injectable {
    pub fn new<T: Any>(name: impl Into<String>, value: T) -> Self {
        Self::shared(name, Rc::new(value))
    }

    pub fn shared<T: Any>(name: impl Into<String>, value: Rc<T>) -> Self {
        Self {
            name: name.into(),
            type_name: std::any::type_name::<T>(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn value(&self) -> &dyn Any {
        &*self.value
    }

    /// Shared handle to the underlying value, if it is a `T`.
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.value).downcast::<T>().ok()
    }
}

impl std::fmt::Debug for Injectable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injectable")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .finish()
    }
}

/// Pool of named candidate values, ordered by name.
#[derive(Debug, Default)]
pub struct InjectablePool {
    entries: BTreeMap<String, Injectable>,
}

impl InjectablePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an owned value. Returns the displaced entry, if any.
    pub fn insert<T: Any>(&mut self, name: &str, value: T) -> Option<Injectable> {
        self.insert_entry(Injectable::new(name, value))
    }

    /// Insert a shared handle. Returns the displaced entry, if any.
    pub fn insert_shared<T: Any>(&mut self, name: &str, value: Rc<T>) -> Option<Injectable> {
        self.insert_entry(Injectable::shared(name, value))
    }

    pub fn insert_entry(&mut self, entry: Injectable) -> Option<Injectable> {
        self.entries.insert(entry.name.clone(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&Injectable> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Fatal startup error: a field request could not be bound.
#[derive(Debug, Error)]
pub enum InjectionError {
    /// Neither `field` nor the mangled `owner_field` exists in the pool.
    #[error(
        "component {owner} requests field '{field}' ({capability}), \
         which is absent from the pool"
    )]
    Missing {
        owner: String,
        field: &'static str,
        capability: &'static str,
    },

    /// A candidate exists but its type does not satisfy the capability.
    #[error(
        "component {owner} field '{field}' does not match the pool value \
         '{candidate}' (got {actual}, expected {expected})"
    )]
    TypeMismatch {
        owner: String,
        field: &'static str,
        candidate: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The same field was requested twice by one component.
    #[error("component {owner} declares field '{field}' more than once")]
    DuplicateRequest {
        owner: String,
        field: &'static str,
    },

    /// `Bindings::get` was called for a field that was never resolved.
    /// Indicates a mismatch between `requests()` and `wire()`.
    #[error("field '{field}' ({capability}) was not resolved for this component")]
    Unbound {
        field: String,
        capability: &'static str,
    },
}

// ─── Bindings ───────────────────────────────────────────────────────

/// Validated binding set for one component, produced by [`resolve`].
#[derive(Debug)]
pub struct Bindings {
    owner: String,
    entries: BTreeMap<&'static str, Injectable>,
}

impl Bindings {
    /// Owner (component) name these bindings were resolved for.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bound value for `field`, as a shared `T` handle.
    ///
    /// Only fields listed in the component's `requests()` are present;
    /// the capability was already checked during resolution, so a failure
    /// here means `wire()` disagrees with `requests()`.
    pub fn get<T: Any>(&self, field: &str) -> Result<Rc<T>, InjectionError> {
        let entry = self
            .entries
            .get(field)
            .ok_or_else(|| InjectionError::Unbound {
                field: field.to_string(),
                capability: std::any::type_name::<T>(),
            })?;
        entry.downcast::<T>().ok_or_else(|| InjectionError::Unbound {
            field: field.to_string(),
            capability: std::any::type_name::<T>(),
        })
    }

    /// Bound sibling component for `field`, as an `Rc<RefCell<C>>` handle.
    pub fn component<C: Any>(&self, field: &str) -> Result<Rc<RefCell<C>>, InjectionError> {
        self.get::<RefCell<C>>(field)
    }
}

// ─── Resolver ───────────────────────────────────────────────────────

/// Resolve every request of one component against the pool.
///
/// Pure: produces either a complete binding set or the first typed error,
/// and never mutates the pool or the component. The caller applies the
/// bindings only after the whole set resolved.
pub fn resolve(
    requests: &[FieldRequest],
    pool: &InjectablePool,
    owner: &str,
) -> Result<Bindings, InjectionError> {
    let mut entries: BTreeMap<&'static str, Injectable> = BTreeMap::new();

    for request in requests {
        if entries.contains_key(request.field) {
            return Err(InjectionError::DuplicateRequest {
                owner: owner.to_string(),
                field: request.field,
            });
        }

        // Exact name first, then the owner-mangled fallback.
        let candidate = pool
            .get(request.field)
            .or_else(|| pool.get(&format!("{owner}_{}", request.field)));

        let Some(candidate) = candidate else {
            return Err(InjectionError::Missing {
                owner: owner.to_string(),
                field: request.field,
                capability: request.capability.name(),
            });
        };

        if !request.capability.satisfied_by(candidate.value()) {
            return Err(InjectionError::TypeMismatch {
                owner: owner.to_string(),
                field: request.field,
                candidate: candidate.name().to_string(),
                expected: request.capability.name(),
                actual: candidate.type_name(),
            });
        }

        debug!("-> {owner}.{} = {}", request.field, candidate.name());
        entries.insert(request.field, candidate.clone());
    }

    Ok(Bindings {
        owner: owner.to_string(),
        entries,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────
