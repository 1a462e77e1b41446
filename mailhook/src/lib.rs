pub mod controller;

pub use controller::{Gateway, Mailhook, RunOptions};
