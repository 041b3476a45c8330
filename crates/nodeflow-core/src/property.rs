//! Named, statically typed property accessors.
//!
//! An entity type lists its properties once by implementing [`Properties`].
//! [`PropertyCache`] builds that table the first time the type is looked up
//! and hands out the same [`PropertyAccessor`] for every later lookup of the
//! same `(type, name)` pair. Entries are never evicted.

use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use thiserror::Error;

/// Property lookup and access errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("type `{owner}` has no property named `{property}`")]
    UnknownProperty {
        owner: &'static str,
        property: String,
    },
    #[error("property `{owner}.{property}` holds `{actual}`, not `{expected}`")]
    TypeMismatch {
        owner: &'static str,
        property: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("property `{owner}.{property}` is not readable")]
    NotReadable {
        owner: &'static str,
        property: &'static str,
    },
    #[error("property `{owner}.{property}` is not writable")]
    NotWritable {
        owner: &'static str,
        property: &'static str,
    },
}

/// Result type for property operations.
pub type PropertyResult<T> = Result<T, ConfigurationError>;

/// A type whose named properties can be looked up through a [`PropertyCache`].
pub trait Properties: Sized + 'static {
    /// Register every property of the type.
    fn describe(table: &mut PropertyTable<Self>);
}

/// Untyped facts about a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: &'static str,
    pub owner: &'static str,
    pub value_type: &'static str,
    pub can_read: bool,
    pub can_write: bool,
}

/// Read/write access to one property of `E` with value type `V`.
pub struct PropertyAccessor<E, V> {
    name: &'static str,
    getter: Option<fn(&E) -> V>,
    setter: Option<fn(&mut E, V)>,
}

impl<E: 'static, V: 'static> PropertyAccessor<E, V> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn can_read(&self) -> bool {
        self.getter.is_some()
    }

    pub fn can_write(&self) -> bool {
        self.setter.is_some()
    }

    /// Read the property from `instance`.
    pub fn get(&self, instance: &E) -> PropertyResult<V> {
        let getter = self.getter.ok_or(ConfigurationError::NotReadable {
            owner: type_name::<E>(),
            property: self.name,
        })?;
        Ok(getter(instance))
    }

    /// Write the property on `instance`.
    pub fn set(&self, instance: &mut E, value: V) -> PropertyResult<()> {
        let setter = self.setter.ok_or(ConfigurationError::NotWritable {
            owner: type_name::<E>(),
            property: self.name,
        })?;
        setter(instance, value);
        Ok(())
    }

    pub fn info(&self) -> PropertyInfo {
        PropertyInfo {
            name: self.name,
            owner: type_name::<E>(),
            value_type: type_name::<V>(),
            can_read: self.can_read(),
            can_write: self.can_write(),
        }
    }
}

impl<E, V> fmt::Debug for PropertyAccessor<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccessor")
            .field("name", &self.name)
            .field("can_read", &self.getter.is_some())
            .field("can_write", &self.setter.is_some())
            .finish()
    }
}

struct Entry {
    info: PropertyInfo,
    accessor: Rc<dyn Any>,
}

/// Builder passed to [`Properties::describe`].
pub struct PropertyTable<E> {
    entries: Vec<Entry>,
    _owner: PhantomData<fn(&E)>,
}

impl<E: 'static> PropertyTable<E> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            _owner: PhantomData,
        }
    }

    /// Register a readable and writable property.
    pub fn property<V: 'static>(
        &mut self,
        name: &'static str,
        get: fn(&E) -> V,
        set: fn(&mut E, V),
    ) -> &mut Self {
        self.insert(PropertyAccessor {
            name,
            getter: Some(get),
            setter: Some(set),
        })
    }

    /// Register a property that can only be read.
    pub fn read_only<V: 'static>(&mut self, name: &'static str, get: fn(&E) -> V) -> &mut Self {
        self.insert(PropertyAccessor {
            name,
            getter: Some(get),
            setter: None,
        })
    }

    /// Register a property that can only be written.
    pub fn write_only<V: 'static>(&mut self, name: &'static str, set: fn(&mut E, V)) -> &mut Self {
        self.insert(PropertyAccessor {
            name,
            getter: None,
            setter: Some(set),
        })
    }

    fn insert<V: 'static>(&mut self, accessor: PropertyAccessor<E, V>) -> &mut Self {
        // Re-registering a name replaces the earlier entry.
        let name = accessor.name;
        self.entries.retain(|entry| entry.info.name != name);
        self.entries.push(Entry {
            info: accessor.info(),
            accessor: Rc::new(accessor),
        });
        self
    }
}

type TypeTable = HashMap<&'static str, Entry>;

/// Memoized property accessors, keyed by entity type and property name.
///
/// Cloning yields another handle to the same cache.
#[derive(Clone, Default)]
pub struct PropertyCache {
    types: Rc<RefCell<HashMap<TypeId, TypeTable>>>,
}

thread_local! {
    static SHARED_CACHE: PropertyCache = PropertyCache::new();
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by everything on the current thread.
    pub fn shared() -> Self {
        SHARED_CACHE.with(PropertyCache::clone)
    }

    /// Look up the accessor for property `name` of `E`.
    ///
    /// Fails if `E` has no such property or if it does not hold a `V`.
    pub fn get<E: Properties, V: 'static>(
        &self,
        name: &str,
    ) -> PropertyResult<Rc<PropertyAccessor<E, V>>> {
        self.with_table::<E, _>(|table| {
            let entry = table.get(name).ok_or_else(|| unknown::<E>(name))?;
            Rc::clone(&entry.accessor)
                .downcast::<PropertyAccessor<E, V>>()
                .map_err(|_| ConfigurationError::TypeMismatch {
                    owner: entry.info.owner,
                    property: entry.info.name,
                    expected: type_name::<V>(),
                    actual: entry.info.value_type,
                })
        })
    }

    /// Untyped facts about property `name` of `E`.
    pub fn info<E: Properties>(&self, name: &str) -> PropertyResult<PropertyInfo> {
        self.with_table::<E, _>(|table| {
            table
                .get(name)
                .map(|entry| entry.info)
                .ok_or_else(|| unknown::<E>(name))
        })
    }

    /// Names of every property of `E`, sorted.
    pub fn names<E: Properties>(&self) -> Vec<&'static str> {
        let mut names = self.with_table::<E, _>(|table| table.keys().copied().collect::<Vec<_>>());
        names.sort_unstable();
        names
    }

    /// Whether the table for `E` has been built.
    pub fn is_cached<E: Properties>(&self) -> bool {
        self.types.borrow().contains_key(&TypeId::of::<E>())
    }

    fn with_table<E: Properties, R>(&self, f: impl FnOnce(&TypeTable) -> R) -> R {
        let mut types = self.types.borrow_mut();
        let table = types.entry(TypeId::of::<E>()).or_insert_with(|| {
            let mut table = PropertyTable::<E>::new();
            E::describe(&mut table);
            log::trace!(
                "property cache: built {} accessors for {}",
                table.entries.len(),
                type_name::<E>()
            );
            table
                .entries
                .into_iter()
                .map(|entry| (entry.info.name, entry))
                .collect()
        });
        f(table)
    }
}

fn unknown<E>(name: &str) -> ConfigurationError {
    ConfigurationError::UnknownProperty {
        owner: type_name::<E>(),
        property: name.to_string(),
    }
}

impl fmt::Debug for PropertyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCache")
            .field("types", &self.types.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Sample {
        name: String,
        width: f64,
        revision: u32,
    }

    impl Properties for Sample {
        fn describe(table: &mut PropertyTable<Self>) {
            table
                .property("name", |s| s.name.clone(), |s, v| s.name = v)
                .property("width", |s| s.width, |s, v| s.width = v)
                .read_only("revision", |s| s.revision);
        }
    }

    #[test]
    fn test_get_is_memoized() {
        let cache = PropertyCache::new();
        let first = cache.get::<Sample, f64>("width").unwrap();
        let second = cache.get::<Sample, f64>("width").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unknown_property() {
        let cache = PropertyCache::new();
        let err = cache.get::<Sample, f64>("nonexistent").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownProperty {
                owner: type_name::<Sample>(),
                property: "nonexistent".to_string(),
            }
        );
    }

    #[test]
    fn test_type_mismatch() {
        let cache = PropertyCache::new();
        let err = cache.get::<Sample, String>("width").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::TypeMismatch {
                owner: type_name::<Sample>(),
                property: "width",
                expected: type_name::<String>(),
                actual: "f64",
            }
        );
    }

    #[test]
    fn test_accessor_reads_and_writes() {
        let cache = PropertyCache::new();
        let name = cache.get::<Sample, String>("name").unwrap();
        let mut sample = Sample::default();

        name.set(&mut sample, "node".to_string()).unwrap();
        assert_eq!(name.get(&sample).unwrap(), "node");
        assert!(name.can_read() && name.can_write());
    }

    #[test]
    fn test_read_only_property() {
        let cache = PropertyCache::new();
        let revision = cache.get::<Sample, u32>("revision").unwrap();
        let mut sample = Sample::default();

        assert!(!revision.can_write());
        let err = revision.set(&mut sample, 3).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::NotWritable {
                owner: type_name::<Sample>(),
                property: "revision",
            }
        );
    }

    #[test]
    fn test_info_and_names() {
        let cache = PropertyCache::new();
        assert!(!cache.is_cached::<Sample>());

        let info = cache.info::<Sample>("revision").unwrap();
        assert!(info.can_read);
        assert!(!info.can_write);
        assert_eq!(info.value_type, "u32");
        assert!(cache.is_cached::<Sample>());
        assert_eq!(cache.names::<Sample>(), vec!["name", "revision", "width"]);
    }

    #[test]
    fn test_error_display() {
        let err = ConfigurationError::NotReadable {
            owner: "Node",
            property: "secret",
        };
        assert_eq!(err.to_string(), "property `Node.secret` is not readable");
    }
}
