//! Output generation

mod nginx;

pub use nginx::{EmitterOptions, NginxEmitter};
