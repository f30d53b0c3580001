#![allow(dead_code)]

pub mod fixtures;
pub mod strategies;
pub mod worker;

pub use fixtures::*;
pub use worker::*;
