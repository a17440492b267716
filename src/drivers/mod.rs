//! Thread and timer helpers.

pub mod gen_timer;
pub mod task_pin;
