//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a store.
//!
//! # Tasks
//! - Trash GC: Reclaims expired entries at configured intervals

mod trash_gc;

pub use trash_gc::{
    effective_interval, spawn_trash_gc, Sweep, TrashGc, DEFAULT_GC_INTERVAL, MIN_GC_INTERVAL,
};
