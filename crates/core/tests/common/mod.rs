//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use metaresolve_core::testing::{fixtures, MockTransport};
use metaresolve_core::{MetadataResolver, ResolverConfig};
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Resolver over a fresh mock transport.
pub fn resolver_with(config: ResolverConfig) -> (MetadataResolver<MockTransport>, Arc<MockTransport>) {
    init_tracing();
    let transport = Arc::new(MockTransport::new());
    let resolver = MetadataResolver::with_transport(config, Arc::clone(&transport))
        .expect("Failed to build resolver");
    (resolver, transport)
}

pub fn resolver() -> (MetadataResolver<MockTransport>, Arc<MockTransport>) {
    resolver_with(fixtures::config())
}
