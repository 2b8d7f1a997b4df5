// Library crate: the scene graph engine, exposed for integration tests and
// the headless JSON command runner.

pub mod assets;
pub mod bvh;
pub mod clone;
pub mod command;
pub mod csg;
pub mod error;
pub mod fixtures;
pub mod geometry;
pub mod harness;
pub mod history;
pub mod node;
pub mod persistence;
pub mod scene;
pub mod schedule;
pub mod settings;
pub mod validation;
