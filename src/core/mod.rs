pub mod bot;
pub mod config;
pub mod ledger;
pub mod lifecycle;
pub mod messenger;
pub mod reminder;
pub mod schedule;
pub mod terminal;
pub mod worktime;
pub mod zone;

#[cfg(test)]
pub mod testing;
