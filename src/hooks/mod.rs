//! Hooks for observing the capability registry.
//!
//! The [`lifecycle`] submodule defines the [`LifecycleListener`] trait the
//! hosting module loader implements to hear about activations,
//! deactivations and status changes, and the [`LifecycleHooks`] dispatcher
//! the registry uses to deliver them.

pub mod lifecycle;

pub use lifecycle::{
    CapabilityLifecycleEvent, HookError, LifecycleEventKind, LifecycleHooks, LifecycleListener,
};
