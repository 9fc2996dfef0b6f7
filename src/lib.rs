// Force results analysis core for the EOL tester
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
