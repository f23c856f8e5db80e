//! Background loops.

pub mod geometry_sync_loop;
