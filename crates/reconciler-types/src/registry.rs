//! Registry trait for self-registering implementations.
//!
//! Backends (storage, listings) expose a `Registry` type implementing this trait
//! so the service can map configuration names to factory functions.

/// Base trait for implementation registries.
///
/// Each backend module provides a Registry struct that implements this trait,
/// declaring the name used in configuration and the factory that builds it.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This matches the key under the backend's `implementations` table, for example
	/// "memory" for `storage.implementations.memory` or "http" for
	/// `listings.implementations.http`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
