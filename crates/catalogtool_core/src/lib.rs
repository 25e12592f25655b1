pub mod config;
pub mod fetch;
pub mod normalize;
pub mod patch;
pub mod refresh;
pub mod registry;
pub mod runtime;

#[cfg(test)]
mod test_server;
