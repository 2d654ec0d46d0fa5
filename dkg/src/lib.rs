// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Distributed key generation for the randomness beacon.
//!
//! Runs the Pedersen DKG over an authenticated network, either to bootstrap
//! a fresh group or to reshare an existing key into a new group at a
//! scheduled transition, and hands every surviving participant its
//! [`lantern_key::Share`] plus the qualified group description.

mod errors;
mod handler;
mod state;

pub use errors::DkgError;
pub use handler::{Config, Entropy, Handler, Network, Outcome, DEFAULT_TIMEOUT};
pub use state::{DistKeyGenerator, GeneratorConfig};
