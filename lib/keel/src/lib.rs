#![allow(clippy::new_without_default)]

pub mod logging;
pub mod shutdown;
pub mod time;
