//! Registry of every backend implementation compiled into the binary.

use reconciler_config::Config;
use reconciler_core::{ReconcilerBuilder, ReconcilerEngine, ReconcilerFactories};
use reconciler_listing::ListingFactory;
use reconciler_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Factories for each backend kind, keyed by implementation name.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub listings: HashMap<String, ListingFactory>,
}

impl FactoryRegistry {
	fn new() -> Self {
		Self {
			storage: HashMap::new(),
			listings: HashMap::new(),
		}
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the global registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in reconciler_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.storage.insert(name.to_string(), factory);
		}

		for (name, factory) in reconciler_listing::get_all_implementations() {
			tracing::debug!("Registering listing implementation: {}", name);
			registry.listings.insert(name.to_string(), factory);
		}

		registry
	})
}

/// Selects the factories for the implementations named in the configuration.
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Builds the engine for a configuration using the registered implementations.
pub fn build_reconciler_from_config(
	config: Config,
) -> Result<ReconcilerEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let listing_factories =
		build_factories!(registry, config.listings.implementations, listings, "listings");

	let factories = ReconcilerFactories {
		storage_factories,
		listing_factories,
	};

	Ok(ReconcilerBuilder::new(config).build(factories)?)
}
