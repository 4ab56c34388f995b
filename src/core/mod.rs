pub mod game;
pub mod queue;
pub mod registry;
pub mod room;
pub mod user;
