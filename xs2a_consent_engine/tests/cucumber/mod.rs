mod consent_world;
mod setups;
mod steps;

pub use consent_world::ConsentWorld;
