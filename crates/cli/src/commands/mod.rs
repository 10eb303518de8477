pub mod onboard;
pub mod repl;
