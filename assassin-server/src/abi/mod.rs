//! ABI bindings for the game contract.
//!
//! Generated with Alloy's `sol!` macro: event definitions drive the
//! listener's log decoding, and the `#[sol(rpc)]` interface drives the typed
//! reader and the operator writer.

pub mod assassin_game;
