//! Protobuf bindings for the topics service.
//!
//! The files under `src/generated` are produced by `buf generate` from
//! `proto/` and checked in; do not edit them by hand.

pub mod cache_client {
    pub mod pubsub {
        include!("generated/cache_client/pubsub/cache_client.pubsub.rs");
        include!("generated/cache_client/pubsub/cache_client.pubsub.tonic.rs");
    }
}
